//! Test lifecycle: DRAFT → RUNNING ⇄ PAUSED → COMPLETED.
//!
//! All status writes go through [`TestStore::update_lifecycle`], which is a
//! compare-and-swap on the previous status, so two concurrent stops cannot
//! both conclude a test and a transition never lands on a stale status.

use crate::analyzer::analyze;
use crate::config::ExperimentDefaults;
use crate::error::AbTestError;
use crate::experiment::{AbTest, NewAbTest, TestStatus, TrafficSplit, Variant};
use crate::traits::TestStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Why a test was concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Manual,
    SignificanceReached,
    MaxDurationElapsed,
}

impl StopReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "stopped manually",
            Self::SignificanceReached => "significance reached",
            Self::MaxDurationElapsed => "max duration elapsed",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct LifecycleController {
    store: Arc<dyn TestStore>,
    defaults: ExperimentDefaults,
}

impl LifecycleController {
    #[must_use]
    pub fn new(store: Arc<dyn TestStore>, defaults: ExperimentDefaults) -> Self {
        Self { store, defaults }
    }

    #[must_use]
    pub fn defaults(&self) -> &ExperimentDefaults {
        &self.defaults
    }

    /// Validates and persists a new test in DRAFT.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` if the definition breaks an invariant or
    /// the id is taken, or `Storage` if persistence fails.
    pub async fn create(&self, request: NewAbTest) -> Result<AbTest, AbTestError> {
        let arm_ids: Vec<&str> = request.variants.iter().map(|v| v.arm_id.as_str()).collect();
        let traffic_split = request
            .traffic_split
            .clone()
            .unwrap_or_else(|| TrafficSplit::equal(&arm_ids));

        let test = AbTest {
            id: request
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: request.name,
            description: request.description,
            status: TestStatus::Draft,
            control_arm: request.control_arm,
            variants: request
                .variants
                .into_iter()
                .map(|v| Variant::new(v.arm_id, v.content))
                .collect(),
            traffic_split,
            confidence_level: request
                .confidence_level
                .unwrap_or(self.defaults.confidence_level),
            min_sample_size: request
                .min_sample_size
                .unwrap_or(self.defaults.min_sample_size),
            max_duration_secs: request
                .max_duration_secs
                .or_else(|| self.defaults.max_duration().map(|d| d.num_seconds())),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            winner: None,
            winner_confidence: None,
            conclusion: None,
        };

        test.validate()?;

        if self.store.get_test(&test.id).await?.is_some() {
            return Err(AbTestError::InvalidConfiguration(format!(
                "a test with id {} already exists",
                test.id
            )));
        }

        self.store.insert_test(&test).await?;
        info!(
            test_id = %test.id,
            name = %test.name,
            arms = test.variants.len(),
            "Created A/B test"
        );

        Ok(test)
    }

    /// Fetches a test.
    ///
    /// # Errors
    /// Returns `UnknownTestOrArm` if no such test exists.
    pub async fn get(&self, test_id: &str) -> Result<AbTest, AbTestError> {
        self.store
            .get_test(test_id)
            .await?
            .ok_or_else(|| AbTestError::unknown_test(test_id))
    }

    /// Lists tests, newest first.
    ///
    /// # Errors
    /// Returns `Storage` if the store query fails.
    pub async fn list(&self, status: Option<TestStatus>) -> Result<Vec<AbTest>, AbTestError> {
        Ok(self.store.list_tests(status).await?)
    }

    /// DRAFT → RUNNING.
    ///
    /// # Errors
    /// Returns `InvalidStateTransition` from any status other than DRAFT.
    pub async fn start(&self, test_id: &str) -> Result<AbTest, AbTestError> {
        self.start_at(test_id, Utc::now()).await
    }

    /// [`start`](Self::start) with an explicit clock reading.
    ///
    /// # Errors
    /// Returns `InvalidStateTransition` from any status other than DRAFT.
    pub async fn start_at(&self, test_id: &str, now: DateTime<Utc>) -> Result<AbTest, AbTestError> {
        self.transition(test_id, "start", TestStatus::Draft, |test| {
            test.status = TestStatus::Running;
            test.started_at = Some(now);
        })
        .await
    }

    /// RUNNING → PAUSED.
    ///
    /// # Errors
    /// Returns `InvalidStateTransition` unless the test is RUNNING.
    pub async fn pause(&self, test_id: &str) -> Result<AbTest, AbTestError> {
        self.transition(test_id, "pause", TestStatus::Running, |test| {
            test.status = TestStatus::Paused;
        })
        .await
    }

    /// PAUSED → RUNNING.
    ///
    /// # Errors
    /// Returns `InvalidStateTransition` unless the test is PAUSED.
    pub async fn resume(&self, test_id: &str) -> Result<AbTest, AbTestError> {
        self.transition(test_id, "resume", TestStatus::Paused, |test| {
            test.status = TestStatus::Running;
        })
        .await
    }

    async fn transition<F>(
        &self,
        test_id: &str,
        action: &'static str,
        from: TestStatus,
        apply: F,
    ) -> Result<AbTest, AbTestError>
    where
        F: FnOnce(&mut AbTest),
    {
        let mut test = self.get(test_id).await?;
        if test.status != from {
            return Err(AbTestError::InvalidStateTransition {
                test_id: test.id,
                from: test.status,
                action,
            });
        }

        apply(&mut test);

        if !self.store.update_lifecycle(&test, from).await? {
            let current = self.get(test_id).await?;
            return Err(AbTestError::InvalidStateTransition {
                test_id: current.id,
                from: current.status,
                action,
            });
        }

        info!(test_id = %test.id, action, status = %test.status, "A/B test transitioned");
        Ok(test)
    }

    /// Concludes a test: analyzes it, records the winner, and marks it COMPLETED.
    ///
    /// Stopping an already COMPLETED test returns it unchanged.
    ///
    /// # Errors
    /// Returns `UnknownTestOrArm` for a missing test or `Storage` if persistence fails.
    pub async fn stop(&self, test_id: &str, reason: StopReason) -> Result<AbTest, AbTestError> {
        self.stop_at(test_id, reason, Utc::now()).await
    }

    /// [`stop`](Self::stop) with an explicit clock reading.
    ///
    /// # Errors
    /// Returns `UnknownTestOrArm` for a missing test or `Storage` if persistence fails.
    pub async fn stop_at(
        &self,
        test_id: &str,
        reason: StopReason,
        now: DateTime<Utc>,
    ) -> Result<AbTest, AbTestError> {
        let mut test = self.get(test_id).await?;
        if test.status.is_terminal() {
            debug!(test_id = %test.id, "Stop requested for completed test, nothing to do");
            return Ok(test);
        }

        let previous = test.status;
        let analysis = analyze(&test);

        test.status = TestStatus::Completed;
        test.ended_at = Some(now);
        test.winner_confidence = analysis.winner_confidence();
        test.winner = analysis.winner_arm.clone();
        test.conclusion = Some(format!("{reason}: {}", analysis.summary()));

        if !self.store.update_lifecycle(&test, previous).await? {
            let current = self.get(test_id).await?;
            if current.status.is_terminal() {
                return Ok(current);
            }
            return Err(AbTestError::InvalidStateTransition {
                test_id: current.id,
                from: current.status,
                action: "stop",
            });
        }

        info!(
            test_id = %test.id,
            %reason,
            winner = test.winner.as_deref().unwrap_or("none"),
            p_value = analysis.p_value,
            "A/B test completed"
        );
        Ok(test)
    }

    /// Stops a RUNNING test when its window elapsed or it reached significance
    /// on at least the minimum sample size. Duration is checked first.
    ///
    /// Returns the concluded test, or `None` if it keeps running.
    ///
    /// # Errors
    /// Returns `UnknownTestOrArm` for a missing test or `Storage` if persistence fails.
    pub async fn check_auto_conclusion(
        &self,
        test_id: &str,
    ) -> Result<Option<AbTest>, AbTestError> {
        self.check_auto_conclusion_at(test_id, Utc::now()).await
    }

    /// [`check_auto_conclusion`](Self::check_auto_conclusion) with an explicit clock reading.
    ///
    /// # Errors
    /// Returns `UnknownTestOrArm` for a missing test or `Storage` if persistence fails.
    pub async fn check_auto_conclusion_at(
        &self,
        test_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AbTest>, AbTestError> {
        let test = self.get(test_id).await?;
        match conclusion_due(&test, now) {
            Some(reason) => Ok(Some(self.stop_at(test_id, reason, now).await?)),
            None => Ok(None),
        }
    }

    /// Runs the auto-conclusion check over every RUNNING test.
    ///
    /// A failure on one test is logged and does not stop the sweep.
    ///
    /// # Errors
    /// Returns `Storage` if running tests cannot be listed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<AbTest>, AbTestError> {
        let running = self.store.list_tests(Some(TestStatus::Running)).await?;
        debug!(count = running.len(), "Sweeping running A/B tests");

        let mut concluded = Vec::new();
        for test in running {
            let Some(reason) = conclusion_due(&test, now) else {
                continue;
            };
            match self.stop_at(&test.id, reason, now).await {
                Ok(stopped) => concluded.push(stopped),
                Err(e) => error!(test_id = %test.id, "Auto-conclusion failed: {}", e),
            }
        }

        Ok(concluded)
    }
}

fn conclusion_due(test: &AbTest, now: DateTime<Utc>) -> Option<StopReason> {
    if test.status != TestStatus::Running {
        return None;
    }
    if test.duration_elapsed(now) {
        return Some(StopReason::MaxDurationElapsed);
    }
    if test.total_impressions() >= test.min_sample_size && analyze(test).is_significant {
        return Some(StopReason::SignificanceReached);
    }
    None
}
