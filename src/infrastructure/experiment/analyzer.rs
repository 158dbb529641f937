//! Test selection and execution for two-arm analyses
//!
//! Selection is a pure function from the metric kind and the arm samples to a
//! [`TestKind`]; execution then dispatches on that enum.

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::distributions::two_sample_power;
use super::normality::{levene, normality_test};
use super::recommendation::{
    recommend, recommend_shortfall, RecommendationInput, DEFAULT_POWER_THRESHOLD,
};
use super::statistical::{
    chi_squared, cramers_v, mann_whitney_u, mean, pooled_t_test, standardized_effect_size,
    std_dev, welch_t_test, ContingencyTable, TestOutcome,
};
use crate::domain::experiment::{
    validate_confidence_level, ArmStatistics, Experiment, MetricKind, MetricValue, Observation,
    ResultMetadata, StatisticalResult, TestKind, TrafficSplit,
};
use crate::domain::DomainError;

// ============================================================================
// Settings
// ============================================================================

/// Thresholds driving test selection and recommendations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerSettings {
    /// Normality is rejected below this p-value
    pub normality_threshold: f64,
    /// Equal variances are rejected below this p-value
    pub variance_threshold: f64,
    /// Null results below this power are reported as underpowered
    pub power_threshold: f64,
    /// Arms smaller than this use Shapiro-Wilk, larger ones Kolmogorov-Smirnov
    pub shapiro_max_sample: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            normality_threshold: 0.05,
            variance_threshold: 0.05,
            power_threshold: DEFAULT_POWER_THRESHOLD,
            shapiro_max_sample: 50,
        }
    }
}

/// Per-call analysis options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Fail with `InsufficientData` instead of returning a flagged result
    pub strict: bool,
}

impl AnalysisOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Chosen test plus the assumption checks that led to it
#[derive(Debug, Clone, PartialEq)]
pub struct TestSelection {
    pub test: TestKind,
    /// Normality p-values for (control, treatment)
    pub normality_p_values: Option<(f64, f64)>,
    pub variance_p_value: Option<f64>,
}

impl TestSelection {
    fn direct(test: TestKind) -> Self {
        Self {
            test,
            normality_p_values: None,
            variance_p_value: None,
        }
    }
}

/// Choose the hypothesis test for a metric kind and the numeric arm samples
///
/// Categorical metrics go to chi-squared and counts to Mann-Whitney without
/// looking at the data. Continuous metrics fall back to Mann-Whitney when
/// either arm fails normality, then pick Welch or the pooled t-test by the
/// variance check.
pub fn select_test(
    metric_kind: MetricKind,
    control: &[f64],
    treatment: &[f64],
    settings: &AnalyzerSettings,
) -> Result<TestSelection, DomainError> {
    match metric_kind {
        MetricKind::Categorical => Ok(TestSelection::direct(TestKind::ChiSquared)),
        MetricKind::Count => Ok(TestSelection::direct(TestKind::MannWhitneyU)),
        MetricKind::Continuous => {
            let control_normality = normality_test(control, settings.shapiro_max_sample);
            let treatment_normality = normality_test(treatment, settings.shapiro_max_sample);
            let normality = Some((control_normality.p_value, treatment_normality.p_value));

            if control_normality.p_value < settings.normality_threshold
                || treatment_normality.p_value < settings.normality_threshold
            {
                return Ok(TestSelection {
                    test: TestKind::MannWhitneyU,
                    normality_p_values: normality,
                    variance_p_value: None,
                });
            }

            let variance = levene(&[control, treatment])?;
            let test = if variance.p_value < settings.variance_threshold {
                TestKind::WelchT
            } else {
                TestKind::StudentT
            };

            Ok(TestSelection {
                test,
                normality_p_values: normality,
                variance_p_value: Some(variance.p_value),
            })
        }
    }
}

// ============================================================================
// Arm samples
// ============================================================================

/// Values of one metric split into the two arms
#[derive(Debug, Clone, PartialEq)]
pub struct ArmSamples {
    pub control_variant: String,
    pub treatment_variant: String,
    pub control: Vec<MetricValue>,
    pub treatment: Vec<MetricValue>,
}

impl ArmSamples {
    /// Group the values of `metric` (primary when `None`) by variant
    ///
    /// Observations lacking the metric are skipped. Fails with
    /// `UnsupportedArity` unless exactly two variants carry values.
    pub fn collect(
        observations: &[Observation],
        metric: Option<&str>,
        split: &TrafficSplit,
    ) -> Result<Self, DomainError> {
        let mut groups: BTreeMap<&str, Vec<MetricValue>> = BTreeMap::new();

        for observation in observations {
            if let Some(value) = observation.metric(metric) {
                groups
                    .entry(observation.variant.as_str())
                    .or_default()
                    .push(value.clone());
            }
        }

        if groups.len() != 2 {
            return Err(DomainError::unsupported_arity(groups.len()));
        }

        let mut arms: Vec<(&str, Vec<MetricValue>)> = groups.into_iter().collect();
        arms.sort_by_key(|(variant, _)| arm_rank(variant, split));

        let (treatment_variant, treatment) = arms.pop().unwrap_or_default();
        let (control_variant, control) = arms.pop().unwrap_or_default();

        Ok(Self {
            control_variant: control_variant.to_string(),
            treatment_variant: treatment_variant.to_string(),
            control,
            treatment,
        })
    }

    pub fn total(&self) -> usize {
        self.control.len() + self.treatment.len()
    }

    /// Numeric encodings of both arms, if every value has one
    pub fn numeric(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        let encode = |values: &[MetricValue]| -> Option<Vec<f64>> {
            values.iter().map(MetricValue::as_f64).collect()
        };
        Some((encode(&self.control)?, encode(&self.treatment)?))
    }

    /// Secondary metrics carry no configured kind: plain numbers are
    /// continuous, anything else is categorical
    pub fn inferred_kind(&self) -> MetricKind {
        let all_numbers = self
            .control
            .iter()
            .chain(&self.treatment)
            .all(|v| matches!(v, MetricValue::Number(_)));

        if all_numbers {
            MetricKind::Continuous
        } else {
            MetricKind::Categorical
        }
    }
}

/// Control is the variant literally named "control"; otherwise the variant
/// listed first in the traffic split, then name order
fn arm_rank(variant: &str, split: &TrafficSplit) -> (bool, usize) {
    let position = split
        .variants()
        .position(|v| v == variant)
        .unwrap_or(usize::MAX);
    (variant != "control", position)
}

// ============================================================================
// StatisticalAnalyzer
// ============================================================================

/// What to analyze
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub experiment: &'a Experiment,
    /// Snapshot of the experiment's observations
    pub observations: &'a [Observation],
    /// Secondary metric name; `None` analyzes the primary metric
    pub metric: Option<&'a str>,
    pub confidence_level: f64,
    pub options: AnalysisOptions,
}

/// Runs the selection/execution pipeline and builds a [`StatisticalResult`]
#[derive(Debug, Clone, Default)]
pub struct StatisticalAnalyzer {
    settings: AnalyzerSettings,
}

impl StatisticalAnalyzer {
    pub fn new(settings: AnalyzerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    pub fn analyze(&self, request: AnalysisRequest<'_>) -> Result<StatisticalResult, DomainError> {
        validate_confidence_level(request.confidence_level)?;

        let experiment = request.experiment;
        let config = experiment.config();
        let metric_name = request
            .metric
            .unwrap_or(config.primary_metric.as_str())
            .to_string();

        let total = request
            .observations
            .iter()
            .filter(|o| o.metric(request.metric).is_some())
            .count();
        let shortfall = total < config.min_sample_size;

        if shortfall && request.options.strict {
            return Err(DomainError::insufficient_data(total, config.min_sample_size));
        }

        let samples = ArmSamples::collect(request.observations, request.metric, &config.traffic_split)?;

        let metric_kind = match request.metric {
            None => config.metric_kind,
            Some(_) => samples.inferred_kind(),
        };

        let numeric = samples.numeric();
        let (control_values, treatment_values) = match (metric_kind, numeric.clone()) {
            (MetricKind::Categorical, encoded) => encoded.unwrap_or_default(),
            (_, Some(encoded)) => encoded,
            (_, None) => {
                return Err(DomainError::invalid_data(format!(
                    "Metric '{}' has non-numeric values but is analyzed as {}",
                    metric_name, metric_kind
                )));
            }
        };

        if metric_kind != MetricKind::Categorical
            && (control_values.len() < 2 || treatment_values.len() < 2)
        {
            return Err(DomainError::invalid_data(format!(
                "Each arm needs at least 2 values, got {} = {}, {} = {}",
                samples.control_variant,
                control_values.len(),
                samples.treatment_variant,
                treatment_values.len()
            )));
        }

        let selection = select_test(metric_kind, &control_values, &treatment_values, &self.settings)?;

        debug!(
            experiment_id = %experiment.id(),
            metric = %metric_name,
            test = %selection.test,
            "Selected hypothesis test"
        );

        let table = ContingencyTable::from_arms(
            &category_labels(&samples.control),
            &category_labels(&samples.treatment),
        );

        let outcome = execute(
            selection.test,
            &control_values,
            &treatment_values,
            &table,
            request.confidence_level,
        )?;

        let effect_size = match (selection.test, &numeric) {
            (TestKind::ChiSquared, None) => cramers_v(outcome.statistic, &table),
            _ => standardized_effect_size(&control_values, &treatment_values),
        };

        let alpha = 1.0 - request.confidence_level;
        let power = two_sample_power(
            effect_size,
            samples.control.len(),
            samples.treatment.len(),
            alpha,
        )?;

        let is_significant = outcome.p_value < alpha;
        let practical_significance = effect_size.abs() >= config.minimum_effect_size;

        let input = RecommendationInput {
            is_significant,
            practical_significance,
            effect_size,
            p_value: outcome.p_value,
            power,
        };

        let recommendation = if shortfall {
            warn!(
                experiment_id = %experiment.id(),
                observed = total,
                required = config.min_sample_size,
                "Analysis ran below the configured minimum sample size"
            );
            recommend_shortfall(&input, total, config.min_sample_size)
        } else {
            recommend(&input, self.settings.power_threshold)
        };

        let mut normality_p_values = BTreeMap::new();
        if let Some((control_p, treatment_p)) = selection.normality_p_values {
            normality_p_values.insert(samples.control_variant.clone(), control_p);
            normality_p_values.insert(samples.treatment_variant.clone(), treatment_p);
        }

        Ok(StatisticalResult {
            experiment_id: experiment.id().clone(),
            metric: metric_name,
            test: selection.test,
            statistic: outcome.statistic,
            p_value: outcome.p_value,
            confidence_interval: outcome.confidence_interval,
            effect_size,
            power,
            is_significant,
            practical_significance,
            recommendation,
            control: arm_statistics(
                &samples.control_variant,
                samples.control.len(),
                numeric.as_ref().map(|(c, _)| c.as_slice()),
            ),
            treatment: arm_statistics(
                &samples.treatment_variant,
                samples.treatment.len(),
                numeric.as_ref().map(|(_, t)| t.as_slice()),
            ),
            timestamp: Utc::now(),
            metadata: ResultMetadata {
                confidence_level: request.confidence_level,
                significance_level: alpha,
                test: selection.test,
                metric_kind,
                normality_p_values,
                variance_p_value: selection.variance_p_value,
                total_observations: total,
                min_sample_size: config.min_sample_size,
                required_sample_size: experiment.required_sample_size(),
                insufficient_data: shortfall,
            },
        })
    }
}

/// Run the selected test
pub fn execute(
    test: TestKind,
    control: &[f64],
    treatment: &[f64],
    table: &ContingencyTable,
    confidence_level: f64,
) -> Result<TestOutcome, DomainError> {
    match test {
        TestKind::StudentT => pooled_t_test(control, treatment, confidence_level),
        TestKind::WelchT => welch_t_test(control, treatment, confidence_level),
        TestKind::MannWhitneyU => mann_whitney_u(control, treatment),
        TestKind::ChiSquared => chi_squared(table),
    }
}

fn category_labels(values: &[MetricValue]) -> Vec<String> {
    values.iter().map(MetricValue::category).collect()
}

fn arm_statistics(variant: &str, sample_size: usize, numeric: Option<&[f64]>) -> ArmStatistics {
    ArmStatistics {
        variant: variant.to_string(),
        sample_size,
        mean: numeric.map(mean),
        std_dev: numeric.map(std_dev),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{
        ExperimentConfig, ExperimentId, ExperimentKind, RecommendationCategory,
    };
    use crate::infrastructure::experiment::distributions::normal_quantile;

    fn experiment(metric_kind: MetricKind, min_sample_size: usize) -> Experiment {
        let config = ExperimentConfig::new(
            "Analyzer test",
            ExperimentKind::ModelComparison,
            metric_kind,
            "quality",
        )
        .with_min_sample_size(min_sample_size);

        let mut exp = Experiment::new(ExperimentId::from("exp-analyzer"), config, 393);
        exp.start().unwrap();
        exp
    }

    fn observe(exp: &Experiment, variant: &str, values: &[f64]) -> Vec<Observation> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                Observation::new(exp.id().clone(), variant, format!("{}-{}", variant, i), *v)
            })
            .collect()
    }

    fn quantile_sample(n: usize, mu: f64, sigma: f64) -> Vec<f64> {
        (1..=n)
            .map(|i| mu + sigma * normal_quantile((i as f64 - 0.5) / n as f64))
            .collect()
    }

    fn request<'a>(exp: &'a Experiment, observations: &'a [Observation]) -> AnalysisRequest<'a> {
        AnalysisRequest {
            experiment: exp,
            observations,
            metric: None,
            confidence_level: 0.95,
            options: AnalysisOptions::default(),
        }
    }

    mod selection_tests {
        use super::*;

        #[test]
        fn test_categorical_selects_chi_squared() {
            let selection =
                select_test(MetricKind::Categorical, &[], &[], &AnalyzerSettings::default())
                    .unwrap();
            assert_eq!(selection.test, TestKind::ChiSquared);
            assert!(selection.normality_p_values.is_none());
        }

        #[test]
        fn test_count_selects_mann_whitney() {
            let selection = select_test(
                MetricKind::Count,
                &[1.0, 2.0, 3.0],
                &[2.0, 3.0, 4.0],
                &AnalyzerSettings::default(),
            )
            .unwrap();
            assert_eq!(selection.test, TestKind::MannWhitneyU);
        }

        #[test]
        fn test_normal_equal_variance_selects_pooled() {
            let control = quantile_sample(40, 0.0, 1.0);
            let treatment = quantile_sample(40, 0.5, 1.0);
            let selection = select_test(
                MetricKind::Continuous,
                &control,
                &treatment,
                &AnalyzerSettings::default(),
            )
            .unwrap();

            assert_eq!(selection.test, TestKind::StudentT);
            assert!(selection.variance_p_value.is_some());
        }

        #[test]
        fn test_unequal_variance_selects_welch() {
            let control = quantile_sample(40, 0.0, 1.0);
            let treatment = quantile_sample(40, 0.0, 5.0);
            let selection = select_test(
                MetricKind::Continuous,
                &control,
                &treatment,
                &AnalyzerSettings::default(),
            )
            .unwrap();

            assert_eq!(selection.test, TestKind::WelchT);
        }

        #[test]
        fn test_non_normal_selects_mann_whitney() {
            let control = quantile_sample(30, 0.0, 1.0);
            let treatment: Vec<f64> = (0..30).map(|i| (f64::from(i) / 3.0).exp()).collect();
            let selection = select_test(
                MetricKind::Continuous,
                &control,
                &treatment,
                &AnalyzerSettings::default(),
            )
            .unwrap();

            assert_eq!(selection.test, TestKind::MannWhitneyU);
            assert!(selection.variance_p_value.is_none());
        }
    }

    mod arm_tests {
        use super::*;

        #[test]
        fn test_control_named_variant_comes_first() {
            let exp = experiment(MetricKind::Continuous, 10);
            let mut observations = observe(&exp, "treatment", &[1.0, 2.0]);
            observations.extend(observe(&exp, "control", &[3.0, 4.0, 5.0]));

            let samples =
                ArmSamples::collect(&observations, None, &exp.config().traffic_split).unwrap();
            assert_eq!(samples.control_variant, "control");
            assert_eq!(samples.control.len(), 3);
            assert_eq!(samples.treatment_variant, "treatment");
        }

        #[test]
        fn test_split_order_without_control() {
            let split = TrafficSplit::from_pairs([("zeta", 0.5), ("alpha", 0.5)]);
            let exp = experiment(MetricKind::Continuous, 10);
            let mut observations = observe(&exp, "alpha", &[1.0, 2.0]);
            observations.extend(observe(&exp, "zeta", &[3.0, 4.0]));

            let samples = ArmSamples::collect(&observations, None, &split).unwrap();
            assert_eq!(samples.control_variant, "zeta");
            assert_eq!(samples.treatment_variant, "alpha");
        }

        #[test]
        fn test_arity() {
            let exp = experiment(MetricKind::Continuous, 10);
            let mut observations = observe(&exp, "control", &[1.0, 2.0]);
            observations.extend(observe(&exp, "treatment", &[1.0, 2.0]));
            observations.extend(observe(&exp, "treatment_b", &[1.0, 2.0]));

            let result = ArmSamples::collect(&observations, None, &exp.config().traffic_split);
            assert_eq!(result, Err(DomainError::unsupported_arity(3)));

            let single = observe(&exp, "control", &[1.0, 2.0]);
            let result = ArmSamples::collect(&single, None, &exp.config().traffic_split);
            assert_eq!(result, Err(DomainError::unsupported_arity(1)));
        }

        #[test]
        fn test_inferred_kind() {
            let exp = experiment(MetricKind::Continuous, 10);
            let mut observations = observe(&exp, "control", &[1.0, 2.0]);
            observations.extend(observe(&exp, "treatment", &[1.0, 2.0]));
            let samples =
                ArmSamples::collect(&observations, None, &exp.config().traffic_split).unwrap();
            assert_eq!(samples.inferred_kind(), MetricKind::Continuous);

            observations.push(Observation::new(exp.id().clone(), "treatment", "u", true));
            let samples =
                ArmSamples::collect(&observations, None, &exp.config().traffic_split).unwrap();
            assert_eq!(samples.inferred_kind(), MetricKind::Categorical);
        }
    }

    mod analysis_tests {
        use super::*;

        #[test]
        fn test_clear_improvement_is_implement() {
            let exp = experiment(MetricKind::Continuous, 100);
            let mut observations = observe(&exp, "control", &quantile_sample(150, 0.75, 0.15));
            observations.extend(observe(&exp, "treatment", &quantile_sample(150, 0.82, 0.14)));

            let result = StatisticalAnalyzer::default()
                .analyze(request(&exp, &observations))
                .unwrap();

            assert!(matches!(result.test, TestKind::StudentT | TestKind::WelchT));
            assert!(result.p_value < 0.05);
            assert!(result.effect_size > 0.4);
            assert!(result.is_significant);
            assert!(result.practical_significance);
            assert_eq!(result.recommendation.category, RecommendationCategory::Implement);
            assert!(result.confidence_interval.unwrap().lower > 0.0);
            assert_eq!(result.control.sample_size, 150);
            assert_eq!(result.metadata.normality_p_values.len(), 2);
            assert!(!result.metadata.insufficient_data);
        }

        #[test]
        fn test_shortfall_is_flagged() {
            let exp = experiment(MetricKind::Continuous, 100);
            let mut observations = observe(&exp, "control", &quantile_sample(20, 0.5, 0.1));
            observations.extend(observe(&exp, "treatment", &quantile_sample(20, 0.9, 0.1)));

            let result = StatisticalAnalyzer::default()
                .analyze(request(&exp, &observations))
                .unwrap();

            assert!(result.metadata.insufficient_data);
            assert_eq!(
                result.recommendation.category,
                RecommendationCategory::InsufficientData
            );
        }

        #[test]
        fn test_strict_shortfall_is_an_error() {
            let exp = experiment(MetricKind::Continuous, 100);
            let mut observations = observe(&exp, "control", &[1.0, 2.0, 3.0]);
            observations.extend(observe(&exp, "treatment", &[1.0, 2.0, 3.0]));

            let mut req = request(&exp, &observations);
            req.options = AnalysisOptions::strict();

            let result = StatisticalAnalyzer::default().analyze(req);
            assert_eq!(result, Err(DomainError::insufficient_data(6, 100)));
        }

        #[test]
        fn test_text_in_continuous_metric_is_invalid_data() {
            let exp = experiment(MetricKind::Continuous, 10);
            let mut observations = observe(&exp, "control", &[1.0, 2.0, 3.0]);
            observations.extend(observe(&exp, "treatment", &[1.0, 2.0]));
            observations.push(Observation::new(exp.id().clone(), "treatment", "u", "great"));

            let result = StatisticalAnalyzer::default().analyze(request(&exp, &observations));
            assert!(matches!(result, Err(DomainError::InvalidData { .. })));
        }

        #[test]
        fn test_categorical_labels_use_cramers_v() {
            let exp = experiment(MetricKind::Categorical, 10);
            let mut observations = Vec::new();
            for (variant, labels) in [
                ("control", ["bronze", "bronze", "silver", "gold"]),
                ("treatment", ["gold", "gold", "silver", "gold"]),
            ] {
                for (i, label) in labels.iter().cycle().take(40).enumerate() {
                    observations.push(Observation::new(
                        exp.id().clone(),
                        variant,
                        format!("{}-{}", variant, i),
                        *label,
                    ));
                }
            }

            let result = StatisticalAnalyzer::default()
                .analyze(request(&exp, &observations))
                .unwrap();

            assert_eq!(result.test, TestKind::ChiSquared);
            assert!(result.confidence_interval.is_none());
            assert!(result.effect_size >= 0.0 && result.effect_size <= 1.0);
            assert!(result.control.mean.is_none());
            assert!(result.p_value < 0.05);
        }

        #[test]
        fn test_perfect_conversion_split_is_implement() {
            let exp = experiment(MetricKind::Categorical, 10);
            let mut observations = Vec::new();
            for i in 0..30 {
                observations.push(Observation::new(exp.id().clone(), "control", format!("c{}", i), false));
                observations.push(Observation::new(exp.id().clone(), "treatment", format!("t{}", i), true));
            }

            let result = StatisticalAnalyzer::default()
                .analyze(request(&exp, &observations))
                .unwrap();

            assert_eq!(result.test, TestKind::ChiSquared);
            assert_eq!(result.effect_size, f64::INFINITY);
            assert_eq!(result.power, 1.0);
            assert!(result.is_significant);
            assert!(result.practical_significance);
            assert_eq!(result.recommendation.category, RecommendationCategory::Implement);
        }

        #[test]
        fn test_constant_arms_with_different_levels() {
            let exp = experiment(MetricKind::Continuous, 10);
            let mut observations = observe(&exp, "control", &[3.0; 20]);
            observations.extend(observe(&exp, "treatment", &[2.0; 20]));

            let result = StatisticalAnalyzer::default()
                .analyze(request(&exp, &observations))
                .unwrap();

            assert_eq!(result.statistic, f64::NEG_INFINITY);
            assert_eq!(result.p_value, 0.0);
            assert_eq!(result.effect_size, f64::NEG_INFINITY);
            assert!(result.practical_significance);
            assert_eq!(result.recommendation.category, RecommendationCategory::Reject);
        }

        #[test]
        fn test_invalid_confidence_level() {
            let exp = experiment(MetricKind::Continuous, 10);
            let mut req = request(&exp, &[]);
            req.confidence_level = 1.2;

            let result = StatisticalAnalyzer::default().analyze(req);
            assert!(matches!(result, Err(DomainError::Configuration { .. })));
        }
    }
}
