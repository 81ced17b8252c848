use crate::error::AbTestError;
use crate::events::{EventKind, IgnoreReason, RecordOutcome};
use crate::experiment::TestStatus;
use crate::lifecycle::LifecycleController;
use crate::traits::TestStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Counts impressions and conversions per arm.
///
/// Stray events (unknown test or arm, test not running) are logged and
/// ignored so late client traffic cannot corrupt a concluded test.
pub struct EventRecorder {
    store: Arc<dyn TestStore>,
    lifecycle: Arc<LifecycleController>,
}

impl EventRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn TestStore>, lifecycle: Arc<LifecycleController>) -> Self {
        Self { store, lifecycle }
    }

    /// Records that a visitor was shown `arm_id`.
    ///
    /// # Errors
    /// Returns `Storage` if the store fails. Stray events are not errors.
    pub async fn record_impression(
        &self,
        test_id: &str,
        arm_id: &str,
    ) -> Result<RecordOutcome, AbTestError> {
        self.record(EventKind::Impression, test_id, arm_id).await
    }

    /// Records that a visitor shown `arm_id` converted, then runs the
    /// auto-conclusion check. A failing check is logged, never returned.
    ///
    /// # Errors
    /// Returns `Storage` if the store fails. Stray events are not errors.
    pub async fn record_conversion(
        &self,
        test_id: &str,
        arm_id: &str,
    ) -> Result<RecordOutcome, AbTestError> {
        let outcome = self.record(EventKind::Conversion, test_id, arm_id).await?;

        if outcome.is_recorded() {
            if let Err(e) = self.lifecycle.check_auto_conclusion(test_id).await {
                warn!(test_id, "Auto-conclusion check failed: {}", e);
            }
        }

        Ok(outcome)
    }

    async fn record(
        &self,
        kind: EventKind,
        test_id: &str,
        arm_id: &str,
    ) -> Result<RecordOutcome, AbTestError> {
        let Some(test) = self.store.get_test(test_id).await? else {
            return Ok(ignore(kind, test_id, arm_id, IgnoreReason::UnknownTest));
        };

        if test.status != TestStatus::Running {
            let reason = IgnoreReason::NotRunning {
                test_status: test.status,
            };
            return Ok(ignore(kind, test_id, arm_id, reason));
        }

        if !test.has_arm(arm_id) {
            return Ok(ignore(kind, test_id, arm_id, IgnoreReason::UnknownArm));
        }

        let updated = match kind {
            EventKind::Impression => self.store.increment_impressions(test_id, arm_id).await?,
            EventKind::Conversion => self.store.increment_conversions(test_id, arm_id).await?,
        };

        match updated {
            Some(variant) => {
                debug!(
                    test_id,
                    arm_id,
                    event = %kind,
                    impressions = variant.impressions,
                    conversions = variant.conversions,
                    conversion_rate = variant.conversion_rate(),
                    "Recorded A/B test event"
                );
                Ok(RecordOutcome::Recorded { variant })
            }
            None => {
                let reason = self.classify_rejection(kind, test_id).await?;
                Ok(ignore(kind, test_id, arm_id, reason))
            }
        }
    }

    /// Works out why the store declined an increment the pre-checks allowed.
    async fn classify_rejection(
        &self,
        kind: EventKind,
        test_id: &str,
    ) -> Result<IgnoreReason, AbTestError> {
        let reason = match self.store.get_test(test_id).await? {
            None => IgnoreReason::UnknownTest,
            Some(test) if test.status != TestStatus::Running => IgnoreReason::NotRunning {
                test_status: test.status,
            },
            Some(_) if kind == EventKind::Conversion => IgnoreReason::ConversionWithoutImpression,
            Some(_) => IgnoreReason::UnknownArm,
        };
        Ok(reason)
    }
}

fn ignore(kind: EventKind, test_id: &str, arm_id: &str, reason: IgnoreReason) -> RecordOutcome {
    warn!(test_id, arm_id, event = %kind, %reason, "Ignoring A/B test event");
    RecordOutcome::Ignored(reason)
}
