//! Domain model for A/B tests.
//!
//! An [`AbTest`] owns an ordered list of [`Variant`] arms and a
//! [`TrafficSplit`] describing how visitors are distributed across them.
//! Lifecycle state is the [`TestStatus`] enum; string and JSON forms only
//! appear at the persistence and wire boundaries.

use crate::error::AbTestError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fmt;

/// Allowed deviation of a traffic split's total from 100.
pub const SPLIT_TOLERANCE: f64 = 0.5;

/// Lifecycle status of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Created, not yet receiving traffic.
    Draft,
    /// Assigning visitors and counting events.
    Running,
    /// Temporarily halted; events are ignored.
    Paused,
    /// Concluded. Terminal.
    Completed,
}

impl TestStatus {
    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One arm of a test with its running counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Arm identifier, e.g. "A" or "B".
    pub arm_id: String,
    /// Arm content or configuration. Opaque to the engine.
    #[serde(default)]
    pub content: JsonValue,
    /// Number of visitors exposed to this arm.
    pub impressions: u64,
    /// Number of exposed visitors who converted.
    pub conversions: u64,
}

impl Variant {
    #[must_use]
    pub fn new(arm_id: impl Into<String>, content: JsonValue) -> Self {
        Self {
            arm_id: arm_id.into(),
            content,
            impressions: 0,
            conversions: 0,
        }
    }

    /// Conversions divided by impressions, 0 when there are no impressions.
    #[must_use]
    pub fn conversion_rate(&self) -> f64 {
        if self.impressions == 0 {
            0.0
        } else {
            self.conversions as f64 / self.impressions as f64
        }
    }
}

/// Share of traffic routed to one arm, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmWeight {
    pub arm_id: String,
    pub percentage: f64,
}

/// Ordered traffic allocation. Order matters: assignment walks it front to back.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafficSplit(Vec<ArmWeight>);

impl TrafficSplit {
    #[must_use]
    pub fn new(weights: Vec<ArmWeight>) -> Self {
        Self(weights)
    }

    /// Splits traffic evenly across `arm_ids`, preserving their order.
    #[must_use]
    pub fn equal<S: AsRef<str>>(arm_ids: &[S]) -> Self {
        if arm_ids.is_empty() {
            return Self::default();
        }
        let share = 100.0 / arm_ids.len() as f64;
        Self(
            arm_ids
                .iter()
                .map(|id| ArmWeight {
                    arm_id: id.as_ref().to_string(),
                    percentage: share,
                })
                .collect(),
        )
    }

    /// Builds a split from `(arm, percentage)` pairs in the given order.
    #[must_use]
    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, f64)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(arm_id, percentage)| ArmWeight {
                    arm_id: arm_id.into(),
                    percentage,
                })
                .collect(),
        )
    }

    #[must_use]
    pub fn weights(&self) -> &[ArmWeight] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.0.iter().map(|w| w.percentage).sum()
    }

    #[must_use]
    pub fn weight_of(&self, arm_id: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|w| w.arm_id == arm_id)
            .map(|w| w.percentage)
    }
}

/// A single experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbTest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TestStatus,
    pub control_arm: String,
    pub variants: Vec<Variant>,
    pub traffic_split: TrafficSplit,
    /// Target confidence level in (0, 1), e.g. 0.95.
    pub confidence_level: f64,
    /// Total impressions across all arms required before significance can conclude the test.
    pub min_sample_size: u64,
    /// Maximum running time in seconds, if time-boxed.
    #[serde(default)]
    pub max_duration_secs: Option<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub winner: Option<String>,
    /// Winner confidence in percent, `(1 - p) * 100`.
    #[serde(default)]
    pub winner_confidence: Option<f64>,
    #[serde(default)]
    pub conclusion: Option<String>,
}

impl AbTest {
    #[must_use]
    pub fn variant(&self, arm_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.arm_id == arm_id)
    }

    #[must_use]
    pub fn has_arm(&self, arm_id: &str) -> bool {
        self.variant(arm_id).is_some()
    }

    #[must_use]
    pub fn control(&self) -> Option<&Variant> {
        self.variant(&self.control_arm)
    }

    #[must_use]
    pub fn total_impressions(&self) -> u64 {
        self.variants.iter().map(|v| v.impressions).sum()
    }

    #[must_use]
    pub fn total_conversions(&self) -> u64 {
        self.variants.iter().map(|v| v.conversions).sum()
    }

    #[must_use]
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.and_then(Duration::try_seconds)
    }

    /// True when the test is time-boxed and its window has elapsed at `now`.
    #[must_use]
    pub fn duration_elapsed(&self, now: DateTime<Utc>) -> bool {
        match (self.started_at, self.max_duration()) {
            (Some(started), Some(max)) => now - started >= max,
            _ => false,
        }
    }

    /// Checks the structural invariants of a test definition.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` describing the first violated invariant.
    pub fn validate(&self) -> Result<(), AbTestError> {
        if self.name.trim().is_empty() {
            return Err(AbTestError::invalid_config("test name must not be empty"));
        }

        if self.variants.len() < 2 {
            return Err(AbTestError::invalid_config(format!(
                "a test needs at least 2 arms, got {}",
                self.variants.len()
            )));
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            if variant.arm_id.trim().is_empty() {
                return Err(AbTestError::invalid_config("arm identifiers must not be empty"));
            }
            if !seen.insert(variant.arm_id.as_str()) {
                return Err(AbTestError::invalid_config(format!(
                    "duplicate arm identifier '{}'",
                    variant.arm_id
                )));
            }
            if variant.conversions > variant.impressions {
                return Err(AbTestError::invalid_config(format!(
                    "arm '{}' has more conversions than impressions",
                    variant.arm_id
                )));
            }
        }

        if !seen.contains(self.control_arm.as_str()) {
            return Err(AbTestError::invalid_config(format!(
                "control arm '{}' is not one of the test's arms",
                self.control_arm
            )));
        }

        validate_split(&self.traffic_split, &seen)?;

        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(AbTestError::invalid_config(format!(
                "confidence level must be between 0 and 1 exclusive, got {}",
                self.confidence_level
            )));
        }

        if let Some(secs) = self.max_duration_secs {
            if secs <= 0 {
                return Err(AbTestError::invalid_config("max duration must be positive"));
            }
            if Duration::try_seconds(secs).is_none() {
                return Err(AbTestError::invalid_config(format!(
                    "max duration of {secs} seconds is out of range"
                )));
            }
        }

        if let Some(winner) = &self.winner {
            if !seen.contains(winner.as_str()) {
                return Err(AbTestError::invalid_config(format!(
                    "winner '{winner}' is not one of the test's arms"
                )));
            }
        }

        Ok(())
    }
}

fn validate_split(split: &TrafficSplit, arms: &HashSet<&str>) -> Result<(), AbTestError> {
    if split.is_empty() {
        return Err(AbTestError::invalid_config("traffic split is empty"));
    }

    let mut listed = HashSet::new();
    for weight in split.weights() {
        if !arms.contains(weight.arm_id.as_str()) {
            return Err(AbTestError::invalid_config(format!(
                "traffic split references unknown arm '{}'",
                weight.arm_id
            )));
        }
        if !listed.insert(weight.arm_id.as_str()) {
            return Err(AbTestError::invalid_config(format!(
                "traffic split lists arm '{}' twice",
                weight.arm_id
            )));
        }
        if !weight.percentage.is_finite() || weight.percentage < 0.0 {
            return Err(AbTestError::invalid_config(format!(
                "traffic weight for arm '{}' must be a non-negative number",
                weight.arm_id
            )));
        }
    }

    if listed.len() != arms.len() {
        return Err(AbTestError::invalid_config(
            "traffic split must assign a weight to every arm",
        ));
    }

    let total = split.total();
    if (total - 100.0).abs() > SPLIT_TOLERANCE {
        return Err(AbTestError::invalid_config(format!(
            "traffic split must sum to 100, got {total:.2}"
        )));
    }

    Ok(())
}

/// Arm definition supplied by an operator when creating a test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVariant {
    pub arm_id: String,
    #[serde(default)]
    pub content: JsonValue,
}

/// Operator request to create a test. Unset fields fall back to configured defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAbTest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub control_arm: String,
    pub variants: Vec<NewVariant>,
    #[serde(default)]
    pub traffic_split: Option<TrafficSplit>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub min_sample_size: Option<u64>,
    #[serde(default)]
    pub max_duration_secs: Option<i64>,
}

impl NewAbTest {
    /// Convenience constructor for a test whose arms carry no content.
    #[must_use]
    pub fn new(name: impl Into<String>, control_arm: impl Into<String>, arms: &[&str]) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            control_arm: control_arm.into(),
            variants: arms
                .iter()
                .map(|arm| NewVariant {
                    arm_id: (*arm).to_string(),
                    content: JsonValue::Null,
                })
                .collect(),
            traffic_split: None,
            confidence_level: None,
            min_sample_size: None,
            max_duration_secs: None,
        }
    }

    #[must_use]
    pub fn with_split(mut self, split: TrafficSplit) -> Self {
        self.traffic_split = Some(split);
        self
    }

    #[must_use]
    pub fn with_min_sample_size(mut self, min_sample_size: u64) -> Self {
        self.min_sample_size = Some(min_sample_size);
        self
    }

    #[must_use]
    pub fn with_max_duration(mut self, max: Duration) -> Self {
        self.max_duration_secs = Some(max.num_seconds());
        self
    }
}
