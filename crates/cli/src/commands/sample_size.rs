//! Planning helper: how much traffic a test needs.

use anyhow::{anyhow, Result};
use autoani_core::stats::{required_sample_size, SampleSizeEstimate};
use clap::Args;

/// Arguments for the sample-size command.
#[derive(Args, Debug, Clone)]
pub struct SampleSizeArgs {
    /// Current conversion rate of the control arm (e.g. 0.10)
    #[arg(long)]
    pub baseline: f64,

    /// Smallest relative lift worth detecting (e.g. 0.2 for +20%)
    #[arg(long)]
    pub mde: f64,

    /// Significance level
    #[arg(long, default_value_t = 0.05)]
    pub alpha: f64,

    /// Statistical power
    #[arg(long, default_value_t = 0.8)]
    pub power: f64,
}

/// # Errors
/// Returns an error if the inputs cannot produce an estimate.
pub fn estimate(args: &SampleSizeArgs) -> Result<SampleSizeEstimate> {
    required_sample_size(args.baseline, args.mde, args.alpha, args.power).ok_or_else(|| {
        anyhow!(
            "cannot estimate a sample size for baseline={} mde={} alpha={} power={}",
            args.baseline,
            args.mde,
            args.alpha,
            args.power
        )
    })
}

/// Runs the sample-size command.
///
/// # Errors
/// Returns an error if the inputs cannot produce an estimate.
pub fn run_sample_size(args: &SampleSizeArgs) -> Result<()> {
    let estimate = estimate(args)?;

    println!(
        "Baseline {:.2}%, detecting a {:+.1}% relative change (alpha={}, power={})",
        args.baseline * 100.0,
        args.mde * 100.0,
        args.alpha,
        args.power
    );
    println!("Visitors per arm:      {}", estimate.per_arm);
    println!("Visitors for two arms: {}", estimate.total);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_percent_baseline_twenty_percent_lift() {
        let args = SampleSizeArgs {
            baseline: 0.1,
            mde: 0.2,
            alpha: 0.05,
            power: 0.8,
        };
        let estimate = estimate(&args).unwrap();
        assert!((3800..=3900).contains(&estimate.per_arm));
        assert_eq!(estimate.total, estimate.per_arm * 2);
    }

    #[test]
    fn zero_effect_has_no_estimate() {
        let args = SampleSizeArgs {
            baseline: 0.1,
            mde: 0.0,
            alpha: 0.05,
            power: 0.8,
        };
        assert!(estimate(&args).is_err());
    }
}
