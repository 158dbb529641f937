//! Sample-size command - prints the per-arm requirement for a target effect

use clap::Args;
use tracing::debug;

use crate::infrastructure::experiment::required_sample_size;

/// Arguments for the sample-size command
#[derive(Args, Clone, Debug)]
pub struct SampleSizeArgs {
    /// Significance level (alpha)
    #[arg(long, default_value_t = 0.05)]
    pub alpha: f64,

    /// Target power (1 - beta)
    #[arg(long, default_value_t = 0.8)]
    pub power: f64,

    /// Minimum detectable standardized effect size
    #[arg(long, default_value_t = 0.2)]
    pub effect_size: f64,
}

impl SampleSizeArgs {
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.alpha > 0.0 && self.alpha < 1.0,
            "alpha must be within (0, 1), got {}",
            self.alpha
        );
        anyhow::ensure!(
            self.power > 0.0 && self.power < 1.0,
            "power must be within (0, 1), got {}",
            self.power
        );
        anyhow::ensure!(
            self.effect_size > 0.0 && self.effect_size.is_finite(),
            "effect size must be positive, got {}",
            self.effect_size
        );
        Ok(())
    }
}

/// Run the sample-size command
pub fn run(args: SampleSizeArgs) -> anyhow::Result<()> {
    super::bootstrap();
    args.validate()?;

    let n = required_sample_size(args.alpha, args.power, args.effect_size);
    debug!(?args, required = n, "Computed required sample size");

    println!("{}", n);

    Ok(())
}
