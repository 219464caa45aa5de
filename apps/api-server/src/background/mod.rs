//! Background sweeps of the admission and capacity state.
//!
//! With the `scheduler` feature the sweeps run as cron jobs. Without it, or
//! when the cron expression is rejected, each store gets an interval task.

#[cfg(feature = "scheduler")]
mod scheduler;

use gatekeeper_infra::{Sweeper, SweeperHandle};

use crate::config::SweepConfig;
use crate::state::AppState;

enum Driver {
    Interval(Vec<SweeperHandle>),
    #[cfg(feature = "scheduler")]
    Cron(scheduler::Scheduler),
}

/// Running background tasks, stopped together on shutdown.
pub struct BackgroundTasks {
    driver: Driver,
}

impl BackgroundTasks {
    pub async fn start(state: &AppState, config: &SweepConfig) -> Self {
        let sweepers = vec![
            Sweeper::new("admission", state.admission.clone(), state.clock.clone()),
            Sweeper::new("capacity", state.capacity.clone(), state.clock.clone()),
        ];

        let driver = match cron_driver(&sweepers, &config.cron).await {
            Some(driver) => driver,
            None => Driver::Interval(
                sweepers
                    .into_iter()
                    .map(|sweeper| sweeper.spawn(config.interval))
                    .collect(),
            ),
        };

        Self { driver }
    }

    pub async fn shutdown(self) {
        match self.driver {
            Driver::Interval(handles) => {
                for handle in handles {
                    handle.shutdown().await;
                }
            }
            #[cfg(feature = "scheduler")]
            Driver::Cron(mut scheduler) => {
                if let Err(e) = scheduler.shutdown().await {
                    tracing::error!(error = %e, "Failed to stop scheduler");
                }
            }
        }
    }
}

#[cfg(feature = "scheduler")]
async fn cron_driver(sweepers: &[Sweeper], cron: &str) -> Option<Driver> {
    let result = async {
        let scheduler = scheduler::Scheduler::new().await?;
        for sweeper in sweepers {
            let sweeper = sweeper.clone();
            scheduler
                .add_cron(cron, move || {
                    sweeper.run_once();
                })
                .await?;
        }
        scheduler.start().await?;
        Ok::<_, tokio_cron_scheduler::JobSchedulerError>(scheduler)
    }
    .await;

    match result {
        Ok(scheduler) => Some(Driver::Cron(scheduler)),
        Err(e) => {
            tracing::error!(error = %e, cron = %cron, "Cron sweep unavailable, using interval tasks");
            None
        }
    }
}

#[cfg(not(feature = "scheduler"))]
async fn cron_driver(_sweepers: &[Sweeper], _cron: &str) -> Option<Driver> {
    None
}
