use crate::analyzer::{analyze, AnalysisResult};
use crate::assignment::assign;
use crate::config::ExperimentDefaults;
use crate::error::AbTestError;
use crate::experiment::TestStatus;
use crate::lifecycle::LifecycleController;
use crate::recorder::EventRecorder;
use crate::traits::TestStore;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Arm served to a visitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub test_id: String,
    pub visitor_id: String,
    pub arm_id: String,
    pub content: JsonValue,
    pub is_control: bool,
    /// False when the test is not running and the control arm is served by default.
    pub test_running: bool,
}

/// Wires a store, lifecycle controller and event recorder together.
///
/// Hosts hold one engine behind an `Arc` and pass it to whatever surfaces
/// need it; there is no process-wide state.
pub struct ExperimentEngine {
    store: Arc<dyn TestStore>,
    lifecycle: Arc<LifecycleController>,
    recorder: EventRecorder,
}

impl ExperimentEngine {
    #[must_use]
    pub fn new(store: Arc<dyn TestStore>, defaults: ExperimentDefaults) -> Self {
        let lifecycle = Arc::new(LifecycleController::new(store.clone(), defaults));
        let recorder = EventRecorder::new(store.clone(), lifecycle.clone());
        Self {
            store,
            lifecycle,
            recorder,
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    #[must_use]
    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn TestStore> {
        &self.store
    }

    /// Picks the arm a visitor sees. Tests that are not running serve control.
    ///
    /// # Errors
    /// Returns `UnknownTestOrArm` for a missing test, or `InvalidConfiguration`
    /// if the stored split is unusable.
    pub async fn assign_visitor(
        &self,
        test_id: &str,
        visitor_id: &str,
    ) -> Result<Assignment, AbTestError> {
        let test = self.lifecycle.get(test_id).await?;
        let test_running = test.status == TestStatus::Running;

        let arm_id = if test_running {
            assign(&test.id, visitor_id, &test.traffic_split)?
        } else {
            test.control_arm.clone()
        };

        let content = test
            .variant(&arm_id)
            .map(|v| v.content.clone())
            .ok_or_else(|| AbTestError::UnknownTestOrArm {
                test_id: test.id.clone(),
                arm_id: Some(arm_id.clone()),
            })?;

        Ok(Assignment {
            is_control: arm_id == test.control_arm,
            test_id: test.id,
            visitor_id: visitor_id.to_string(),
            arm_id,
            content,
            test_running,
        })
    }

    /// Current statistics for a test.
    ///
    /// # Errors
    /// Returns `UnknownTestOrArm` for a missing test.
    pub async fn results(&self, test_id: &str) -> Result<AnalysisResult, AbTestError> {
        let test = self.lifecycle.get(test_id).await?;
        Ok(analyze(&test))
    }
}
