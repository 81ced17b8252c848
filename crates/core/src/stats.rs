//! Statistical primitives for conversion experiments.
//!
//! Provides the normal distribution approximations, proportion confidence
//! intervals, the pooled two-proportion z-test, and sample-size planning.
//! Every significance computation in the workspace goes through
//! [`standard_normal_cdf`] so call sites cannot disagree numerically.

use serde::{Deserialize, Serialize};

/// Z-score for a two-sided 95% interval.
pub const Z_95: f64 = 1.96;

/// Error function, Abramowitz and Stegun formula 7.1.26.
///
/// Maximum absolute error is about 1.5e-7.
///
/// # Examples
/// ```
/// use autoani_core::stats::erf;
///
/// assert!((erf(1.0) - 0.842_700_79).abs() < 2e-7);
/// assert!((erf(-1.0) + 0.842_700_79).abs() < 2e-7);
/// ```
#[must_use]
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let a1 = 0.254_829_592;
    let a2 = -0.284_496_736;
    let a3 = 1.421_413_741;
    let a4 = -1.453_152_027;
    let a5 = 1.061_405_429;
    let p = 0.327_591_1;

    let t = 1.0 / (1.0 + p * x);
    // Horner form of a1*t + a2*t^2 + ... + a5*t^5
    let poly = ((((a5 * t + a4) * t + a3) * t + a2) * t + a1) * t;

    sign * (1.0 - poly * (-x * x).exp())
}

/// Standard normal CDF, Φ(x) = (1 + erf(x / √2)) / 2.
#[must_use]
pub fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Two-tailed p-value for a z statistic: 2 · (1 − Φ(|z|)).
#[must_use]
pub fn two_tailed_p_value(z: f64) -> f64 {
    (2.0 * (1.0 - standard_normal_cdf(z.abs()))).clamp(0.0, 1.0)
}

/// Inverse standard normal CDF, Abramowitz and Stegun 26.2.23.
///
/// Accurate to about 4.5e-4, which is sufficient for sample-size planning.
/// Returns ±infinity outside (0, 1).
#[must_use]
pub fn inverse_normal_cdf(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let (tail, sign) = if p < 0.5 { (p, -1.0) } else { (1.0 - p, 1.0) };
    let t = (-2.0 * tail.ln()).sqrt();

    let c0 = 2.515_517;
    let c1 = 0.802_853;
    let c2 = 0.010_328;
    let d1 = 1.432_788;
    let d2 = 0.189_269;
    let d3 = 0.001_308;

    let z = t - (c0 + c1 * t + c2 * t * t) / (1.0 + d1 * t + d2 * t * t + d3 * t * t * t);
    sign * z
}

/// Standard error of a proportion, `sqrt(p(1-p)/n)`; 0 when `n` is 0.
#[must_use]
pub fn proportion_standard_error(rate: f64, n: u64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    (rate * (1.0 - rate) / n as f64).max(0.0).sqrt()
}

/// Normal-approximation confidence interval `rate ± z·SE`, clamped to [0, 1].
///
/// # Examples
/// ```
/// use autoani_core::stats::proportion_ci;
///
/// let (lower, upper) = proportion_ci(100, 1000, 1.96);
/// assert!(lower > 0.08 && lower < 0.09);
/// assert!(upper > 0.11 && upper < 0.12);
/// ```
#[must_use]
pub fn proportion_ci(successes: u64, n: u64, z: f64) -> (f64, f64) {
    if n == 0 {
        return (0.0, 0.0);
    }
    let rate = successes as f64 / n as f64;
    let spread = z * proportion_standard_error(rate, n);
    ((rate - spread).max(0.0), (rate + spread).min(1.0))
}

/// Outcome of a pooled two-proportion z-test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwoProportionTest {
    pub pooled_rate: f64,
    pub standard_error: f64,
    pub z_score: f64,
    pub p_value: f64,
}

impl TwoProportionTest {
    /// The defined result when there is nothing to compare.
    #[must_use]
    pub fn no_data() -> Self {
        Self {
            pooled_rate: 0.0,
            standard_error: 0.0,
            z_score: 0.0,
            p_value: 1.0,
        }
    }

    /// True when the standard error was zero and the test carries no evidence.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.standard_error <= 0.0
    }
}

/// Pooled two-proportion z-test between arm 1 and arm 2.
///
/// Absent data (either arm without impressions, or a pooled rate of 0 or 1)
/// yields [`TwoProportionTest::no_data`] rather than an error.
///
/// # Formula
/// ```text
/// p̂  = (c1 + c2) / (n1 + n2)
/// SE = sqrt(p̂(1 - p̂)(1/n1 + 1/n2))
/// z  = |c2/n2 - c1/n1| / SE
/// ```
#[must_use]
pub fn two_proportion_z_test(
    conversions_1: u64,
    impressions_1: u64,
    conversions_2: u64,
    impressions_2: u64,
) -> TwoProportionTest {
    if impressions_1 == 0 || impressions_2 == 0 {
        return TwoProportionTest::no_data();
    }

    let n1 = impressions_1 as f64;
    let n2 = impressions_2 as f64;
    let rate_1 = conversions_1 as f64 / n1;
    let rate_2 = conversions_2 as f64 / n2;

    let pooled = (conversions_1 + conversions_2) as f64 / (n1 + n2);
    let standard_error = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2))
        .max(0.0)
        .sqrt();

    if standard_error < f64::EPSILON {
        return TwoProportionTest {
            pooled_rate: pooled,
            ..TwoProportionTest::no_data()
        };
    }

    let z_score = (rate_2 - rate_1).abs() / standard_error;

    TwoProportionTest {
        pooled_rate: pooled,
        standard_error,
        z_score,
        p_value: two_tailed_p_value(z_score),
    }
}

/// Sample size needed to detect a relative lift with a two-sided test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSizeEstimate {
    /// Visitors needed in each arm.
    pub per_arm: u64,
    /// Visitors needed across a two-arm test.
    pub total: u64,
}

/// Estimates the per-arm sample size for detecting `relative_mde` over `baseline_rate`.
///
/// Returns `None` when the inputs cannot produce a finite estimate
/// (zero effect, rates outside (0, 1), or alpha/power outside (0, 1)).
///
/// # Formula
/// ```text
/// n = (z_{1-α/2}·sqrt(2p̄(1-p̄)) + z_{power}·sqrt(p1(1-p1) + p2(1-p2)))² / (p2 - p1)²
/// ```
#[must_use]
pub fn required_sample_size(
    baseline_rate: f64,
    relative_mde: f64,
    alpha: f64,
    power: f64,
) -> Option<SampleSizeEstimate> {
    let p1 = baseline_rate;
    let p2 = baseline_rate * (1.0 + relative_mde);
    let delta = (p2 - p1).abs();

    let in_unit = |x: f64| x > 0.0 && x < 1.0;
    if delta < f64::EPSILON || !in_unit(p1) || !in_unit(p2) || !in_unit(alpha) || !in_unit(power)
    {
        return None;
    }

    let z_alpha = inverse_normal_cdf(1.0 - alpha / 2.0);
    let z_power = inverse_normal_cdf(power);
    let p_bar = (p1 + p2) / 2.0;

    let numerator = z_alpha * (2.0 * p_bar * (1.0 - p_bar)).sqrt()
        + z_power * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt();
    let per_arm = (numerator.powi(2) / delta.powi(2)).ceil();

    if !per_arm.is_finite() {
        return None;
    }

    let per_arm = per_arm as u64;
    Some(SampleSizeEstimate {
        per_arm,
        total: per_arm.saturating_mul(2),
    })
}
