use anyhow::Result;
use autoani_core::{AbTest, LifecycleController, SweepConfig};
use chrono::Utc;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Periodically concludes RUNNING tests that reached significance or ran
/// past their maximum duration.
pub struct SweepScheduler {
    config: SweepConfig,
    lifecycle: Arc<LifecycleController>,
}

impl SweepScheduler {
    #[must_use]
    pub fn new(config: SweepConfig, lifecycle: Arc<LifecycleController>) -> Self {
        Self { config, lifecycle }
    }

    /// Registers the sweep job and starts the cron scheduler.
    ///
    /// Returns `None` when the sweep is disabled. Otherwise the caller owns the
    /// running scheduler and shuts it down on exit.
    ///
    /// # Errors
    /// Returns an error if the cron expression is invalid or the scheduler fails to start.
    pub async fn start(self) -> Result<Option<JobScheduler>> {
        if !self.config.enabled {
            info!("Auto-conclusion sweep is disabled");
            return Ok(None);
        }

        info!(
            "Starting auto-conclusion sweep with cron: {}",
            self.config.cron_schedule
        );

        let lifecycle = self.lifecycle.clone();
        let job = Job::new_async(self.config.cron_schedule.as_str(), move |_uuid, _lock| {
            let lifecycle = lifecycle.clone();
            Box::pin(async move {
                if let Err(e) = run_sweep(&lifecycle).await {
                    error!("Auto-conclusion sweep failed: {}", e);
                }
            })
        })?;

        let scheduler = JobScheduler::new().await?;
        scheduler.add(job).await?;
        scheduler.start().await?;

        info!("Auto-conclusion sweep scheduled");
        Ok(Some(scheduler))
    }

    /// Runs one sweep immediately.
    ///
    /// # Errors
    /// Returns an error if running tests cannot be listed.
    pub async fn run_once(&self) -> Result<Vec<AbTest>> {
        run_sweep(&self.lifecycle).await
    }
}

async fn run_sweep(lifecycle: &LifecycleController) -> Result<Vec<AbTest>> {
    let concluded = lifecycle.sweep(Utc::now()).await?;

    for test in &concluded {
        info!(
            test_id = %test.id,
            winner = test.winner.as_deref().unwrap_or("none"),
            "Concluded A/B test: {}",
            test.conclusion.as_deref().unwrap_or_default()
        );
    }
    if concluded.is_empty() {
        info!("Sweep finished, no tests due for conclusion");
    }

    Ok(concluded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoani_core::{ExperimentDefaults, InMemoryTestStore, NewAbTest, TestStatus};
    use chrono::Duration;

    fn lifecycle() -> Arc<LifecycleController> {
        Arc::new(LifecycleController::new(
            Arc::new(InMemoryTestStore::new()),
            ExperimentDefaults::default(),
        ))
    }

    #[tokio::test]
    async fn run_once_concludes_expired_tests() {
        let lifecycle = lifecycle();
        let expired =
            NewAbTest::new("Trade-in form", "A", &["A", "B"]).with_max_duration(Duration::hours(1));
        let expired = lifecycle.create(expired).await.unwrap();
        lifecycle
            .start_at(&expired.id, Utc::now() - Duration::hours(2))
            .await
            .unwrap();

        let fresh = lifecycle
            .create(NewAbTest::new("Hero image", "A", &["A", "B"]))
            .await
            .unwrap();
        lifecycle.start(&fresh.id).await.unwrap();

        let scheduler = SweepScheduler::new(SweepConfig::default(), lifecycle.clone());
        let concluded = scheduler.run_once().await.unwrap();

        assert_eq!(concluded.len(), 1);
        assert_eq!(concluded[0].id, expired.id);
        assert!(concluded[0]
            .conclusion
            .as_deref()
            .unwrap()
            .starts_with("max duration elapsed"));
        assert_eq!(
            lifecycle.get(&fresh.id).await.unwrap().status,
            TestStatus::Running
        );
    }

    #[tokio::test]
    async fn disabled_sweep_does_not_start() {
        let config = SweepConfig {
            enabled: false,
            ..SweepConfig::default()
        };
        let scheduler = SweepScheduler::new(config, lifecycle());
        assert!(scheduler.start().await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_cron_is_rejected() {
        let config = SweepConfig {
            enabled: true,
            cron_schedule: "every five minutes".to_string(),
        };
        let scheduler = SweepScheduler::new(config, lifecycle());
        assert!(scheduler.start().await.is_err());
    }
}
