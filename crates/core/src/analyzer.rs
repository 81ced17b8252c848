//! Statistical analysis of a test's aggregated counters.
//!
//! [`analyze`] is pure: it reads the impression and conversion counts already
//! on the [`AbTest`] and never touches storage.

use crate::experiment::{AbTest, Variant};
use crate::stats::{proportion_ci, proportion_standard_error, two_proportion_z_test, Z_95};
use serde::{Deserialize, Serialize};

/// Per-arm summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantStats {
    pub arm_id: String,
    pub is_control: bool,
    pub impressions: u64,
    pub conversions: u64,
    pub conversion_rate: f64,
    pub standard_error: f64,
    /// Lower bound of the 95% interval, clamped to 0.
    pub ci_lower: f64,
    /// Upper bound of the 95% interval, clamped to 1.
    pub ci_upper: f64,
}

impl VariantStats {
    fn from_variant(variant: &Variant, control_arm: &str) -> Self {
        let conversion_rate = variant.conversion_rate();
        let (ci_lower, ci_upper) = proportion_ci(variant.conversions, variant.impressions, Z_95);

        Self {
            arm_id: variant.arm_id.clone(),
            is_control: variant.arm_id == control_arm,
            impressions: variant.impressions,
            conversions: variant.conversions,
            conversion_rate,
            standard_error: proportion_standard_error(conversion_rate, variant.impressions),
            ci_lower,
            ci_upper,
        }
    }
}

/// Result of comparing the control arm with the best-performing challenger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub test_id: String,
    pub per_arm: Vec<VariantStats>,
    pub control_arm: String,
    /// Best non-control arm by conversion rate; `None` if the test has no challenger.
    pub challenger_arm: Option<String>,
    pub z_score: f64,
    pub p_value: f64,
    pub is_significant: bool,
    /// Relative lift of the challenger over control, in percent.
    pub improvement_pct: f64,
    pub winner_arm: Option<String>,
    pub confidence_level: f64,
    pub total_impressions: u64,
    pub total_conversions: u64,
    pub min_sample_size_reached: bool,
}

impl AnalysisResult {
    /// Confidence in the winner, `(1 - p) * 100`, when there is one.
    #[must_use]
    pub fn winner_confidence(&self) -> Option<f64> {
        self.winner_arm
            .as_ref()
            .map(|_| ((1.0 - self.p_value) * 100.0).clamp(0.0, 100.0))
    }

    #[must_use]
    pub fn arm(&self, arm_id: &str) -> Option<&VariantStats> {
        self.per_arm.iter().find(|s| s.arm_id == arm_id)
    }

    /// Human-readable one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        match (&self.winner_arm, &self.challenger_arm) {
            (Some(winner), _) if *winner == self.control_arm => format!(
                "control {} outperformed {} (p={:.4})",
                self.control_arm,
                self.challenger_arm.as_deref().unwrap_or("challenger"),
                self.p_value
            ),
            (Some(winner), _) => format!(
                "{} beat control {} by {:.2}% (p={:.4})",
                winner, self.control_arm, self.improvement_pct, self.p_value
            ),
            (None, Some(_)) => format!(
                "no statistically significant difference (p={:.4})",
                self.p_value
            ),
            (None, None) => "no challenger arm to compare".to_string(),
        }
    }
}

/// Analyzes a test's counters.
///
/// The control arm is compared against the non-control arm with the highest
/// conversion rate (first listed on ties) using a pooled two-proportion
/// z-test. Missing data yields a not-significant result with `p_value = 1`.
#[must_use]
pub fn analyze(test: &AbTest) -> AnalysisResult {
    let per_arm: Vec<VariantStats> = test
        .variants
        .iter()
        .map(|v| VariantStats::from_variant(v, &test.control_arm))
        .collect();

    let control = per_arm.iter().find(|s| s.is_control);
    let challenger = best_challenger(&per_arm);

    let total_impressions = test.total_impressions();
    let mut result = AnalysisResult {
        test_id: test.id.clone(),
        per_arm: Vec::new(),
        control_arm: test.control_arm.clone(),
        challenger_arm: challenger.map(|c| c.arm_id.clone()),
        z_score: 0.0,
        p_value: 1.0,
        is_significant: false,
        improvement_pct: 0.0,
        winner_arm: None,
        confidence_level: test.confidence_level,
        total_impressions,
        total_conversions: test.total_conversions(),
        min_sample_size_reached: total_impressions >= test.min_sample_size,
    };

    if let (Some(control), Some(challenger)) = (control, challenger) {
        let z_test = two_proportion_z_test(
            control.conversions,
            control.impressions,
            challenger.conversions,
            challenger.impressions,
        );

        if !z_test.is_degenerate() {
            result.z_score = z_test.z_score;
            result.p_value = z_test.p_value;
            result.is_significant = z_test.p_value < 1.0 - test.confidence_level;
            result.improvement_pct = if control.conversion_rate > 0.0 {
                (challenger.conversion_rate - control.conversion_rate) / control.conversion_rate
                    * 100.0
            } else {
                0.0
            };

            if result.is_significant {
                let winner = if challenger.conversion_rate > control.conversion_rate {
                    challenger
                } else {
                    control
                };
                result.winner_arm = Some(winner.arm_id.clone());
            }
        }
    }

    result.per_arm = per_arm;
    result
}

fn best_challenger(per_arm: &[VariantStats]) -> Option<&VariantStats> {
    per_arm
        .iter()
        .filter(|s| !s.is_control)
        .fold(None, |best: Option<&VariantStats>, candidate| match best {
            Some(current) if current.conversion_rate >= candidate.conversion_rate => Some(current),
            _ => Some(candidate),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{TestStatus, TrafficSplit};
    use chrono::Utc;
    use serde_json::Value as JsonValue;

    fn test_with_counts(arms: &[(&str, u64, u64)]) -> AbTest {
        AbTest {
            id: "t1".to_string(),
            name: "Financing CTA".to_string(),
            description: None,
            status: TestStatus::Running,
            control_arm: arms[0].0.to_string(),
            variants: arms
                .iter()
                .map(|(arm, impressions, conversions)| Variant {
                    arm_id: (*arm).to_string(),
                    content: JsonValue::Null,
                    impressions: *impressions,
                    conversions: *conversions,
                })
                .collect(),
            traffic_split: TrafficSplit::equal(
                &arms.iter().map(|(arm, _, _)| *arm).collect::<Vec<_>>(),
            ),
            confidence_level: 0.95,
            min_sample_size: 1000,
            max_duration_secs: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            winner: None,
            winner_confidence: None,
            conclusion: None,
        }
    }

    #[test]
    fn significant_lift_names_challenger_winner() {
        let test = test_with_counts(&[("A", 1000, 100), ("B", 1000, 130)]);
        let result = analyze(&test);

        assert!(result.is_significant);
        assert!(result.p_value < 0.05, "p was {}", result.p_value);
        assert_eq!(result.winner_arm.as_deref(), Some("B"));
        assert_eq!(result.challenger_arm.as_deref(), Some("B"));
        assert!((result.improvement_pct - 30.0).abs() < 1e-9);
        assert!(result.min_sample_size_reached);
        assert!(result.winner_confidence().unwrap() > 95.0);
    }

    #[test]
    fn zero_impressions_is_not_an_error() {
        let test = test_with_counts(&[("A", 0, 0), ("B", 500, 50)]);
        let result = analyze(&test);

        assert!(!result.is_significant);
        assert!((result.p_value - 1.0).abs() < f64::EPSILON);
        assert!((result.improvement_pct - 0.0).abs() < f64::EPSILON);
        assert!(result.winner_arm.is_none());
    }

    #[test]
    fn empty_test_has_no_winner() {
        let test = test_with_counts(&[("A", 0, 0), ("B", 0, 0)]);
        let result = analyze(&test);

        assert!(!result.is_significant);
        assert!((result.p_value - 1.0).abs() < f64::EPSILON);
        assert!(result.winner_confidence().is_none());
        assert_eq!(result.per_arm.len(), 2);
    }

    #[test]
    fn control_can_win() {
        let test = test_with_counts(&[("A", 1000, 150), ("B", 1000, 100)]);
        let result = analyze(&test);

        assert!(result.is_significant);
        assert_eq!(result.winner_arm.as_deref(), Some("A"));
        assert!(result.improvement_pct < 0.0);
    }

    #[test]
    fn zero_control_rate_reports_no_improvement() {
        let test = test_with_counts(&[("A", 1000, 0), ("B", 1000, 40)]);
        let result = analyze(&test);

        assert!(result.is_significant);
        assert!((result.improvement_pct - 0.0).abs() < f64::EPSILON);
        assert_eq!(result.winner_arm.as_deref(), Some("B"));
    }

    #[test]
    fn best_challenger_is_compared() {
        let test = test_with_counts(&[("A", 1000, 100), ("B", 1000, 105), ("C", 1000, 140)]);
        let result = analyze(&test);

        assert_eq!(result.challenger_arm.as_deref(), Some("C"));
        assert_eq!(result.winner_arm.as_deref(), Some("C"));
    }

    #[test]
    fn ties_prefer_first_listed_challenger() {
        let test = test_with_counts(&[("A", 100, 10), ("B", 100, 20), ("C", 100, 20)]);
        let result = analyze(&test);
        assert_eq!(result.challenger_arm.as_deref(), Some("B"));
    }

    #[test]
    fn stricter_confidence_level_rejects_marginal_result() {
        let mut test = test_with_counts(&[("A", 1000, 100), ("B", 1000, 130)]);
        test.confidence_level = 0.99;
        let result = analyze(&test);

        assert!(!result.is_significant);
        assert!(result.winner_arm.is_none());
    }

    #[test]
    fn per_arm_intervals_are_clamped() {
        let test = test_with_counts(&[("A", 3, 0), ("B", 3, 3)]);
        let result = analyze(&test);

        let a = result.arm("A").unwrap();
        let b = result.arm("B").unwrap();
        assert!(a.is_control);
        assert!((a.ci_lower - 0.0).abs() < f64::EPSILON);
        assert!((b.ci_upper - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sample_size_flag_tracks_total_impressions() {
        let test = test_with_counts(&[("A", 400, 40), ("B", 400, 44)]);
        let result = analyze(&test);
        assert_eq!(result.total_impressions, 800);
        assert!(!result.min_sample_size_reached);
    }

    #[test]
    fn summary_mentions_winner() {
        let test = test_with_counts(&[("A", 1000, 100), ("B", 1000, 130)]);
        let summary = analyze(&test).summary();
        assert!(summary.starts_with("B beat control A by 30.00%"), "{summary}");
    }
}
