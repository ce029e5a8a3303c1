use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::application::services::{JobRunner, RunOutcome};
use crate::domain::ports::time_service::TimeService;

/// In-process scheduler for deployments without an external cron. Each tick
/// is one `run_once`; after a processed job the next tick starts at once.
pub struct JobWorker {
    runner: Arc<JobRunner>,
    interval: Duration,
    time_service: Arc<dyn TimeService>,
}

impl JobWorker {
    pub fn new(
        runner: Arc<JobRunner>,
        interval: Duration,
        time_service: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            runner,
            interval,
            time_service,
        }
    }

    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "Starting JobWorker...");
        loop {
            match self.tick().await {
                Ok(true) => {
                    // Job processed, check for next one immediately
                    continue;
                }
                Ok(false) => {
                    self.time_service.sleep(self.interval).await;
                }
                Err(e) => {
                    error!("Error running job worker tick: {}", e);
                    self.time_service.sleep(self.interval).await;
                }
            }
        }
    }

    /// Returns whether a job was picked up.
    pub async fn tick(&self) -> Result<bool, String> {
        let report = self.runner.run_once(None).await.map_err(|e| e.to_string())?;
        match &report.outcome {
            RunOutcome::Idle => Ok(false),
            outcome => {
                info!(?outcome, "Worker tick finished");
                Ok(outcome.processed_job())
            }
        }
    }
}
