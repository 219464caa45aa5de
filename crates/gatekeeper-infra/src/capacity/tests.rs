use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;

use gatekeeper_core::domain::CredentialState;
use gatekeeper_core::ports::ManualClock;

use super::*;

#[derive(Clone)]
enum Behavior {
    Succeed,
    Fail(UpstreamFailure),
    Hang,
}

struct ScriptedClient {
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamClient for ScriptedClient {
    async fn send(&self, _request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            Behavior::Succeed => Ok(UpstreamResponse {
                status: 200,
                body: json!({ "ok": true }),
            }),
            Behavior::Fail(failure) => Err(failure),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(UpstreamResponse {
                    status: 200,
                    body: json!({}),
                })
            }
        }
    }
}

struct Harness {
    manager: CapacityManager,
    clients: Vec<Arc<ScriptedClient>>,
    clock: Arc<ManualClock>,
}

fn secret(index: usize) -> String {
    format!("sk-test-credential-{index:04}")
}

fn harness(behaviors: Vec<Behavior>, max_errors: u32) -> Harness {
    let secrets: Vec<String> = (0..behaviors.len()).map(secret).collect();
    let clients: Vec<Arc<ScriptedClient>> = behaviors
        .into_iter()
        .map(|behavior| Arc::new(ScriptedClient::new(behavior)))
        .collect();

    let config = CapacityConfig {
        credentials: secrets.clone(),
        max_errors_per_credential: max_errors,
        error_reset_window: Duration::from_secs(300),
        max_retries: 3,
        attempt_timeout: Duration::from_secs(5),
    };
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let manager = CapacityManager::new(&config, clock.clone(), |key| {
        let index = secrets.iter().position(|s| s == key).unwrap();
        let client: Arc<dyn UpstreamClient> = clients[index].clone();
        client
    });

    Harness {
        manager,
        clients,
        clock,
    }
}

fn request() -> UpstreamRequest {
    UpstreamRequest::new("generate", json!({ "prompt": "hello" }))
}

fn server_error() -> UpstreamFailure {
    UpstreamFailure::Server {
        status: 503,
        message: "overloaded".into(),
    }
}

fn rate_limited(secs: u64) -> UpstreamFailure {
    UpstreamFailure::RateLimited {
        retry_after: Some(Duration::from_secs(secs)),
        message: "quota exceeded".into(),
    }
}

#[tokio::test]
async fn test_zero_credentials_fail_fast() {
    let h = harness(vec![], 5);

    let err = h.manager.perform_call(&request()).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Configuration));
    assert!(h.manager.next_credential().is_none());
    assert_eq!(h.manager.get_usage_stats().total_credentials, 0);
}

#[tokio::test]
async fn test_round_robin_is_fair() {
    let h = harness(vec![Behavior::Succeed, Behavior::Succeed, Behavior::Succeed], 5);

    for _ in 0..9 {
        h.manager.perform_call(&request()).await.unwrap();
    }

    for client in &h.clients {
        assert_eq!(client.calls(), 3);
    }
}

#[test]
fn test_next_credential_cycles() {
    let h = harness(vec![Behavior::Succeed, Behavior::Succeed], 5);

    let picks: Vec<usize> = (0..6)
        .map(|_| h.manager.next_credential().unwrap().index())
        .collect();
    assert_eq!(picks, vec![0, 1, 0, 1, 0, 1]);
}

#[tokio::test]
async fn test_failing_credential_is_ejected_until_window_elapses() {
    let h = harness(vec![Behavior::Fail(server_error()), Behavior::Succeed], 5);

    // Every call fails on the first credential and is retried on the second.
    for _ in 0..5 {
        h.manager.perform_call(&request()).await.unwrap();
    }
    assert_eq!(h.clients[0].calls(), 5);

    for _ in 0..4 {
        assert_eq!(h.manager.next_credential().unwrap().index(), 1);
    }

    h.clock.advance(Duration::from_secs(299));
    assert_eq!(h.manager.next_credential().unwrap().index(), 1);

    h.clock.advance(Duration::from_secs(1));
    let picks: Vec<usize> = (0..2)
        .map(|_| h.manager.next_credential().unwrap().index())
        .collect();
    assert!(picks.contains(&0));

    let stats = h.manager.get_usage_stats();
    assert_eq!(stats.active_credentials, 2);
    assert_eq!(stats.credentials[0].error_count, 0);
}

#[tokio::test]
async fn test_success_recovers_trust_gradually() {
    let h = harness(vec![Behavior::Fail(server_error())], 5);

    for _ in 0..3 {
        let _ = h.manager.perform_call_with(&request(), 1, Duration::from_secs(5)).await;
    }
    assert_eq!(h.manager.get_usage_stats().credentials[0].error_count, 3);

    *h.clients[0].behavior.lock().unwrap() = Behavior::Succeed;
    h.manager.perform_call(&request()).await.unwrap();

    let usage = &h.manager.get_usage_stats().credentials[0];
    assert_eq!(usage.error_count, 2);
    assert_eq!(usage.state, CredentialState::Degrading);
}

#[tokio::test]
async fn test_rate_limited_credential_is_skipped_until_reset() {
    let h = harness(vec![Behavior::Fail(rate_limited(30)), Behavior::Succeed], 5);

    h.manager.perform_call(&request()).await.unwrap();

    let stats = h.manager.get_usage_stats();
    assert_eq!(stats.credentials[0].state, CredentialState::Suspended);
    assert_eq!(
        stats.credentials[0].suspended_until,
        Some(h.clock.now() + chrono::Duration::seconds(30))
    );
    for _ in 0..3 {
        assert_eq!(h.manager.next_credential().unwrap().index(), 1);
    }

    h.clock.advance(Duration::from_secs(30));
    let usage = &h.manager.get_usage_stats().credentials[0];
    assert!(usage.active);
    // A rate-limit reinstatement does not forgive the error.
    assert_eq!(usage.error_count, 1);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let rejection = UpstreamFailure::Client {
        status: 400,
        message: "invalid prompt".into(),
    };
    let h = harness(vec![Behavior::Fail(rejection.clone()), Behavior::Succeed], 1);

    let err = h.manager.perform_call(&request()).await.unwrap_err();
    match err {
        UpstreamError::Rejected(failure) => assert_eq!(failure, rejection),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.clients[0].calls(), 1);
    assert_eq!(h.clients[1].calls(), 0);

    // A bad request leaves the credential's record untouched.
    let usage = &h.manager.get_usage_stats().credentials[0];
    assert!(usage.active);
    assert_eq!(usage.error_count, 0);
    assert_eq!(usage.request_count, 0);
    assert!(usage.last_used_at.is_none());
}

#[tokio::test]
async fn test_exhausted_call_surfaces_last_failure() {
    let h = harness(
        vec![
            Behavior::Fail(server_error()),
            Behavior::Fail(UpstreamFailure::Transport("connection reset".into())),
        ],
        10,
    );

    let err = h.manager.perform_call(&request()).await.unwrap_err();
    match err {
        UpstreamError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            // Attempts went first, second, first.
            assert_eq!(last, server_error());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_as_failure() {
    let h = harness(vec![Behavior::Hang], 5);

    let err = h
        .manager
        .perform_call_with(&request(), 1, Duration::from_secs(2))
        .await
        .unwrap_err();

    assert_eq!(
        err.cause(),
        Some(&UpstreamFailure::Timeout(Duration::from_secs(2)))
    );
    assert_eq!(h.manager.get_usage_stats().credentials[0].error_count, 1);
}

#[tokio::test]
async fn test_fully_suspended_pool_is_reset() {
    let h = harness(
        vec![Behavior::Fail(server_error()), Behavior::Fail(server_error())],
        1,
    );

    let err = h.manager.perform_call(&request()).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Exhausted { attempts: 3, .. }));

    // Third attempt went back to the first credential after the reset.
    assert_eq!(h.clients[0].calls(), 2);
    assert_eq!(h.clients[1].calls(), 1);
}

#[tokio::test]
async fn test_fully_throttled_pool_stops_after_one_rotation() {
    let h = harness(
        vec![
            Behavior::Fail(rate_limited(60)),
            Behavior::Fail(rate_limited(60)),
        ],
        10,
    );

    let err = h.manager.perform_call(&request()).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Exhausted { attempts: 2, .. }));

    // Nothing left to try: no network call is made at all.
    let err = h.manager.perform_call(&request()).await.unwrap_err();
    match err {
        UpstreamError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 0);
            assert_eq!(last.retry_after(), Some(Duration::from_secs(60)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.clients[0].calls(), 1);
    assert_eq!(h.clients[1].calls(), 1);
}

#[tokio::test]
async fn test_repeated_throttled_pick_does_not_exhaust_rotation() {
    let h = harness(vec![Behavior::Fail(rate_limited(60)), Behavior::Succeed], 10);
    h.manager.perform_call(&request()).await.unwrap();
    // Back in rotation, but the provider deadline still holds.
    h.manager.reset_pool();

    let mut throttled = HashSet::new();
    throttled.insert(0);
    assert!(!h.manager.rotation_exhausted(&throttled));
    throttled.insert(0);
    assert!(!h.manager.rotation_exhausted(&throttled));
    throttled.insert(1);
    assert!(h.manager.rotation_exhausted(&throttled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_reach_the_unthrottled_credential() {
    let Harness {
        manager, clients, ..
    } = harness(vec![Behavior::Fail(rate_limited(60)), Behavior::Succeed], 10);
    manager.perform_call(&request()).await.unwrap();
    manager.reset_pool();

    let manager = Arc::new(manager);
    let calls: Vec<_> = (0..64)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.perform_call(&request()).await })
        })
        .collect();

    for call in calls {
        assert!(call.await.unwrap().is_ok());
    }
    // The throttled credential is never called again.
    assert_eq!(clients[0].calls(), 1);
    assert_eq!(clients[1].calls(), 65);
}

#[tokio::test]
async fn test_usage_stats_are_masked() {
    let h = harness(vec![Behavior::Succeed, Behavior::Succeed], 5);

    h.manager.perform_call(&request()).await.unwrap();
    h.manager.perform_call(&request()).await.unwrap();

    let stats = h.manager.get_usage_stats();
    let rendered = serde_json::to_string(&stats).unwrap();
    assert!(!rendered.contains(&secret(0)));
    assert_eq!(stats.credentials[0].id, "#0 sk-t...0000");
    assert_eq!(stats.credentials[0].requests_last_minute, 1);
    assert_eq!(stats.credentials[1].requests_last_minute, 1);
}

#[test]
fn test_duplicate_credentials_collapse() {
    let config = CapacityConfig {
        credentials: vec![secret(0), secret(0), format!(" {} ", secret(1))],
        ..CapacityConfig::default()
    };
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let client: Arc<dyn UpstreamClient> = Arc::new(ScriptedClient::new(Behavior::Succeed));

    let manager = CapacityManager::new(&config, clock, |_| client.clone());
    assert_eq!(manager.len(), 2);
}

#[tokio::test]
async fn test_sweep_reinstates_and_evicts() {
    let h = harness(vec![Behavior::Fail(server_error()), Behavior::Succeed], 1);

    h.manager.perform_call(&request()).await.unwrap();
    assert_eq!(h.manager.get_usage_stats().active_credentials, 1);

    h.clock.advance(Duration::from_secs(300));
    let outcome = h.manager.sweep(h.clock.now());

    assert_eq!(outcome.released, 1);
    assert_eq!(outcome.evicted, 2);
    assert_eq!(h.manager.get_usage_stats().active_credentials, 2);
}
