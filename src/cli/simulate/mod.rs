//! Simulate command - runs a seeded two-arm experiment end to end

use std::collections::BTreeMap;

use anyhow::Context;
use clap::{Args, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Bernoulli, Distribution, Normal};
use tracing::info;

use crate::domain::experiment::{
    ExperimentConfig, ExperimentKind, ExperimentSummary, MetricKind, MetricValue,
};
use crate::infrastructure::observability::init_metrics;
use crate::infrastructure::services::{InMemoryExperimentEngine, RecordMetricParams};

/// Outcome shape of the simulated metric
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SimulatedMetric {
    /// Normally distributed scores
    Continuous,
    /// Conversions; means are read as rates
    Binary,
}

/// Arguments for the simulate command
#[derive(Args, Clone, Debug)]
pub struct SimulateArgs {
    /// Seed for the value generator
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of subjects to assign
    #[arg(long, default_value_t = 300)]
    pub subjects: usize,

    #[arg(long, value_enum, default_value_t = SimulatedMetric::Continuous)]
    pub metric: SimulatedMetric,

    /// Control mean (or conversion rate)
    #[arg(long, default_value_t = 0.75)]
    pub control_mean: f64,

    /// Treatment mean (or conversion rate)
    #[arg(long, default_value_t = 0.82)]
    pub treatment_mean: f64,

    /// Standard deviation of continuous values
    #[arg(long, default_value_t = 0.15)]
    pub std_dev: f64,

    /// Minimum number of observations before results are trusted
    #[arg(long, default_value_t = 100)]
    pub min_sample_size: usize,

    /// Confidence level of the analysis (engine default when omitted)
    #[arg(long)]
    pub confidence_level: Option<f64>,
}

impl Default for SimulateArgs {
    fn default() -> Self {
        Self {
            seed: 42,
            subjects: 300,
            metric: SimulatedMetric::Continuous,
            control_mean: 0.75,
            treatment_mean: 0.82,
            std_dev: 0.15,
            min_sample_size: 100,
            confidence_level: None,
        }
    }
}

/// Draws metric values for one arm
enum ArmSampler {
    Normal(Normal<f64>),
    Bernoulli(Bernoulli),
}

impl ArmSampler {
    fn new(metric: SimulatedMetric, mean: f64, std_dev: f64) -> anyhow::Result<Self> {
        Ok(match metric {
            SimulatedMetric::Continuous => Self::Normal(
                Normal::new(mean, std_dev).context("invalid normal distribution parameters")?,
            ),
            SimulatedMetric::Binary => Self::Bernoulli(
                Bernoulli::new(mean).context("conversion rate must be within [0, 1]")?,
            ),
        })
    }

    fn sample(&self, rng: &mut StdRng) -> MetricValue {
        match self {
            Self::Normal(d) => MetricValue::Number(d.sample(rng)),
            Self::Bernoulli(d) => MetricValue::Boolean(d.sample(rng)),
        }
    }
}

/// Run the simulate command
pub fn run(args: SimulateArgs) -> anyhow::Result<()> {
    let config = super::bootstrap();
    let metrics = init_metrics(&config.observability.metrics);
    let engine = crate::create_engine_with_config(&config);

    let summary = simulate(&engine, &args)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(metrics) = metrics {
        println!("{}", metrics.render());
    }

    Ok(())
}

/// Create, run, analyze and complete a simulated experiment
pub fn simulate(
    engine: &InMemoryExperimentEngine,
    args: &SimulateArgs,
) -> anyhow::Result<ExperimentSummary> {
    let metric_kind = match args.metric {
        SimulatedMetric::Continuous => MetricKind::Continuous,
        SimulatedMetric::Binary => MetricKind::Categorical,
    };

    let experiment_config = ExperimentConfig::new(
        "Simulated experiment",
        ExperimentKind::FeatureRollout,
        metric_kind,
        "outcome",
    )
    .with_description(format!("Seeded simulation (seed {})", args.seed))
    .with_min_sample_size(args.min_sample_size);

    let id = engine.create_experiment(experiment_config)?;
    engine.start(&id)?;

    let control = ArmSampler::new(args.metric, args.control_mean, args.std_dev)?;
    let treatment = ArmSampler::new(args.metric, args.treatment_mean, args.std_dev)?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let context = BTreeMap::new();

    for i in 0..args.subjects {
        let subject_id = format!("sim-{}", i);
        let variant = engine.assign_variant(&id, &subject_id, &context)?;
        let sampler = if variant == "treatment" {
            &treatment
        } else {
            &control
        };

        engine.record_metric(RecordMetricParams::new(
            id.clone(),
            variant,
            subject_id,
            sampler.sample(&mut rng),
        ))?;
    }

    let result = engine.analyze_experiment(&id, args.confidence_level)?;
    info!(
        experiment_id = %id,
        recommendation = %result.recommendation.message,
        "Simulation analyzed"
    );

    engine.complete(&id)?;

    Ok(engine.get_summary(&id)?)
}
