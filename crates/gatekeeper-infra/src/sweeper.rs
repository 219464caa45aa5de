//! Background eviction of expired counters, blocks and suspensions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use gatekeeper_core::ports::{Clock, SweepOutcome, Sweepable};

/// One sweeper per store. Cheap to clone, so it can be handed to a cron
/// job as well as to an interval task.
#[derive(Clone)]
pub struct Sweeper {
    name: &'static str,
    target: Arc<dyn Sweepable>,
    clock: Arc<dyn Clock>,
}

impl Sweeper {
    pub fn new(name: &'static str, target: Arc<dyn Sweepable>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            target,
            clock,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn run_once(&self) -> SweepOutcome {
        let outcome = self.target.sweep(self.clock.now());
        if outcome == SweepOutcome::default() {
            tracing::trace!(sweeper = self.name, "Sweep found nothing to do");
        } else {
            tracing::debug!(
                sweeper = self.name,
                evicted = outcome.evicted,
                released = outcome.released,
                "Sweep completed"
            );
        }
        outcome
    }

    /// Run on a fixed period until the handle is shut down. The first
    /// sweep happens one full period after spawning.
    pub fn spawn(self, period: Duration) -> SweeperHandle {
        let (stop, mut stopped) = watch::channel(false);
        let name = self.name;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() completes its first tick immediately.
            ticker.tick().await;

            tracing::info!(sweeper = name, period_secs = period.as_secs(), "Sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once();
                    }
                    _ = stopped.changed() => break,
                }
            }
            tracing::info!(sweeper = name, "Sweeper stopped");
        });

        SweeperHandle { name, stop, task }
    }
}

pub struct SweeperHandle {
    name: &'static str,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the task and wait for it to finish its current sweep.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(sweeper = self.name, error = %e, "Sweeper task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, Utc};
    use gatekeeper_core::ports::ManualClock;

    use super::*;

    #[derive(Default)]
    struct CountingTarget {
        sweeps: AtomicUsize,
    }

    impl Sweepable for CountingTarget {
        fn sweep(&self, _now: DateTime<Utc>) -> SweepOutcome {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            SweepOutcome {
                evicted: 1,
                released: 0,
            }
        }
    }

    #[test]
    fn test_run_once_reports_outcome() {
        let target = Arc::new(CountingTarget::default());
        let sweeper = Sweeper::new("test", target.clone(), Arc::new(ManualClock::default()));

        assert_eq!(sweeper.run_once().evicted, 1);
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_runs_each_period_until_shutdown() {
        let target = Arc::new(CountingTarget::default());
        let sweeper = Sweeper::new("test", target.clone(), Arc::new(ManualClock::default()));
        let handle = sweeper.spawn(Duration::from_secs(300));

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(302)).await;
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 2);

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 2);
    }
}
