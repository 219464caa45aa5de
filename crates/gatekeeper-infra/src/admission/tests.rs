use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use gatekeeper_core::domain::BlockRecord;
use gatekeeper_core::ports::{BlockStore, ManualClock, Sweepable};
use gatekeeper_core::{AdmissionError, RepoError};

use super::*;
use crate::block_store::InMemoryBlockStore;

struct FailingBlockStore;

#[async_trait]
impl BlockStore for FailingBlockStore {
    async fn find(&self, _ip: IpAddr) -> Result<Option<BlockRecord>, RepoError> {
        Err(RepoError::Connection("database unavailable".into()))
    }

    async fn upsert(&self, _record: BlockRecord) -> Result<(), RepoError> {
        Err(RepoError::Connection("database unavailable".into()))
    }
}

fn config(per_minute: u32, per_hour: u32, threshold: u32) -> AdmissionConfig {
    AdmissionConfig {
        max_request_size: 1024,
        max_requests_per_minute: per_minute,
        max_requests_per_hour: per_hour,
        block_duration: Duration::from_secs(15 * 60),
        suspicious_threshold: threshold,
    }
}

fn controller(
    config: AdmissionConfig,
) -> (AdmissionController, Arc<InMemoryBlockStore>, Arc<ManualClock>) {
    let store = Arc::new(InMemoryBlockStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let controller = AdmissionController::new(config, store.clone(), clock.clone());
    (controller, store, clock)
}

fn ip(last: u8) -> IpAddr {
    IpAddr::from([203, 0, 113, last])
}

#[tokio::test]
async fn test_fourth_request_in_minute_is_rejected() {
    let (controller, _, _) = controller(config(3, 100, 5));

    for expected_remaining in [2, 1, 0] {
        let decision = controller.check_rate_limit(ip(1)).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, expected_remaining);
    }

    let decision = controller.check_rate_limit(ip(1)).await;
    assert!(!decision.allowed);
    assert_eq!(decision.remaining, 0);

    // Other addresses are unaffected.
    assert!(controller.check_rate_limit(ip(2)).await.allowed);
}

#[tokio::test]
async fn test_minute_window_resets() {
    let (controller, _, clock) = controller(config(2, 100, 5));

    controller.check_rate_limit(ip(1)).await;
    controller.check_rate_limit(ip(1)).await;
    assert!(!controller.check_rate_limit(ip(1)).await.allowed);

    clock.advance(Duration::from_secs(60));
    let decision = controller.check_rate_limit(ip(1)).await;
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 1);
}

#[tokio::test]
async fn test_second_violation_blocks_at_threshold_two() {
    let (controller, store, clock) = controller(config(1, 100, 2));

    controller.check_rate_limit(ip(1)).await;
    assert!(!controller.check_rate_limit(ip(1)).await.allowed);
    assert_eq!(controller.get_ip_statistics(ip(1)).suspicion_score, 1);
    assert!(!controller.is_blocked(ip(1)).await);

    clock.advance(Duration::from_secs(61));
    controller.check_rate_limit(ip(1)).await;
    assert!(!controller.check_rate_limit(ip(1)).await.allowed);

    assert!(controller.is_blocked(ip(1)).await);
    let stats = controller.get_ip_statistics(ip(1));
    assert_eq!(stats.block_reason.as_deref(), Some(REASON_SUSPICIOUS));

    let record = store.find(ip(1)).await.unwrap().unwrap();
    assert!(record.blocked);
}

#[tokio::test]
async fn test_hour_limit_blocks_immediately() {
    let (controller, _, clock) = controller(config(2, 3, 5));

    controller.check_rate_limit(ip(1)).await;
    controller.check_rate_limit(ip(1)).await;
    clock.advance(Duration::from_secs(60));
    assert!(controller.check_rate_limit(ip(1)).await.allowed);

    let decision = controller.check_rate_limit(ip(1)).await;
    assert!(!decision.allowed);

    let stats = controller.get_ip_statistics(ip(1));
    assert!(stats.blocked);
    assert_eq!(stats.block_reason.as_deref(), Some(REASON_HOURLY_LIMIT));
    // The ladder was skipped.
    assert_eq!(stats.suspicion_score, 0);
}

#[tokio::test]
async fn test_never_admits_more_than_limits() {
    let (controller, _, clock) = controller(config(5, 12, 1000));

    let mut admitted = 0;
    for _ in 0..3 {
        for _ in 0..20 {
            if controller.check_rate_limit(ip(9)).await.allowed {
                admitted += 1;
            }
        }
        clock.advance(Duration::from_secs(60));
    }

    // Five per minute, capped at twelve for the hour.
    assert_eq!(admitted, 12);
}

#[tokio::test]
async fn test_block_is_idempotent_and_overwrites() {
    let (controller, _, clock) = controller(config(10, 100, 5));

    controller.block_ip(ip(1), "manual").await;
    clock.advance(Duration::from_secs(120));
    let second = controller.block_ip(ip(1), "manual").await;

    let stats = controller.get_ip_statistics(ip(1));
    assert_eq!(stats.blocked_until, Some(second.blocked_until));
    assert_eq!(
        second.blocked_until,
        clock.now() + chrono::Duration::minutes(15)
    );
}

#[tokio::test]
async fn test_block_statistics_round_trip() {
    let (controller, _, clock) = controller(config(10, 100, 5));

    controller.block_ip(ip(4), "manual review").await;
    let stats = controller.get_ip_statistics(ip(4));

    assert!(stats.blocked);
    assert_eq!(
        stats.blocked_until,
        Some(clock.now() + chrono::Duration::minutes(15))
    );
    assert_eq!(controller.list_blocked().len(), 1);
    assert_eq!(controller.get_protection_stats().blocked_ips, 1);
}

#[tokio::test]
async fn test_unblock_makes_address_fresh() {
    let (controller, store, _) = controller(config(2, 100, 1));

    controller.check_rate_limit(ip(1)).await;
    controller.check_rate_limit(ip(1)).await;
    assert!(!controller.check_rate_limit(ip(1)).await.allowed);
    assert!(controller.is_blocked(ip(1)).await);

    controller.unblock_ip(ip(1)).await;

    assert!(!controller.is_blocked(ip(1)).await);
    assert!(!store.find(ip(1)).await.unwrap().unwrap().blocked);
    let decision = controller.check_rate_limit(ip(1)).await;
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 1);
    assert_eq!(controller.get_ip_statistics(ip(1)).suspicion_score, 0);
}

#[tokio::test]
async fn test_durable_block_is_honoured_after_restart() {
    let (controller, store, clock) = controller(config(10, 100, 5));
    let now = clock.now();
    store
        .upsert(BlockRecord {
            ip_address: ip(7),
            blocked: true,
            blocked_until: Some(now + chrono::Duration::minutes(3)),
            reason: Some("hourly limit exceeded".into()),
            updated_at: now,
        })
        .await
        .unwrap();

    assert!(controller.is_blocked(ip(7)).await);
    // The durable hit populated the cache.
    assert!(controller.get_ip_statistics(ip(7)).blocked);

    let err = controller.admit(ip(7), None).await.unwrap_err();
    assert!(matches!(err, AdmissionError::Blocked { until: Some(_) }));
}

#[tokio::test]
async fn test_expired_block_is_dropped() {
    let (controller, _, clock) = controller(config(10, 100, 5));

    controller.block_ip(ip(1), "manual").await;
    clock.advance(Duration::from_secs(15 * 60));

    assert!(!controller.is_blocked(ip(1)).await);
    assert!(controller.check_rate_limit(ip(1)).await.allowed);
}

#[tokio::test]
async fn test_store_failure_does_not_prevent_block() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let controller =
        AdmissionController::new(config(10, 100, 5), Arc::new(FailingBlockStore), clock);

    assert!(!controller.is_blocked(ip(1)).await);
    controller.block_ip(ip(1), "manual").await;
    assert!(controller.is_blocked(ip(1)).await);
    assert!(!controller.check_rate_limit(ip(1)).await.allowed);
}

#[tokio::test]
async fn test_admit_checks_size_first() {
    let (controller, _, _) = controller(config(10, 100, 5));

    let err = controller.admit(ip(1), Some(4096)).await.unwrap_err();
    assert_eq!(
        err,
        AdmissionError::PayloadTooLarge {
            size: 4096,
            limit: 1024
        }
    );
    // Oversized requests do not consume rate budget.
    assert_eq!(controller.get_ip_statistics(ip(1)).minute_requests, 0);

    let admission = controller.admit(ip(1), Some(1024)).await.unwrap();
    assert_eq!(admission.remaining, 9);
}

#[tokio::test]
async fn test_admit_reports_over_limit() {
    let (controller, _, _) = controller(config(1, 100, 5));

    controller.admit(ip(1), None).await.unwrap();
    let err = controller.admit(ip(1), None).await.unwrap_err();
    match err {
        AdmissionError::OverLimit {
            remaining,
            retry_after,
        } => {
            assert_eq!(remaining, 0);
            assert_eq!(retry_after, Duration::from_secs(60));
        }
        other => panic!("unexpected rejection: {other:?}"),
    }
}

#[test]
fn test_check_request_size() {
    let (controller, _, _) = controller(config(10, 100, 5));

    assert!(controller.check_request_size(1024).allowed);
    let check = controller.check_request_size(1025);
    assert!(!check.allowed);
    assert!(check.reason.unwrap().contains("1025"));
}

#[tokio::test]
async fn test_sweep_keeps_suspicion() {
    let (controller, _, clock) = controller(config(1, 100, 5));

    controller.check_rate_limit(ip(1)).await;
    controller.check_rate_limit(ip(1)).await;
    controller.block_ip(ip(2), "manual").await;

    clock.advance(Duration::from_secs(2 * 60 * 60));
    let outcome = controller.sweep(clock.now());

    assert_eq!(outcome.evicted, 2);
    assert_eq!(outcome.released, 1);
    assert_eq!(controller.get_protection_stats().tracked_ips, 0);
    assert_eq!(controller.get_ip_statistics(ip(1)).suspicion_score, 1);
}
