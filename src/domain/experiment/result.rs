//! Statistical analysis results and reporting views

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::entity::{Experiment, ExperimentId, MetricKind};
use super::non_finite;

// ============================================================================
// TestKind
// ============================================================================

/// Hypothesis test executed for an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    /// Two-sample t-test with pooled (equal) variances
    StudentT,
    /// Two-sample t-test with unequal variances
    WelchT,
    /// Rank-based non-parametric comparison
    MannWhitneyU,
    /// Test of independence on a category x variant contingency table
    ChiSquared,
}

impl TestKind {
    /// Whether the test reports a confidence interval for the mean difference
    pub fn has_mean_interval(&self) -> bool {
        matches!(self, Self::StudentT | Self::WelchT)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StudentT => "Independent t-test",
            Self::WelchT => "Welch's t-test",
            Self::MannWhitneyU => "Mann-Whitney U test",
            Self::ChiSquared => "Chi-squared test",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Recommendation
// ============================================================================

/// Actionable outcome of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationCategory {
    Implement,
    Reject,
    Inconclusive,
    InsufficientData,
    NoEffect,
    ContinueMonitoring,
}

impl RecommendationCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Implement => "IMPLEMENT",
            Self::Reject => "REJECT",
            Self::Inconclusive => "INCONCLUSIVE",
            Self::InsufficientData => "INSUFFICIENT DATA",
            Self::NoEffect => "NO EFFECT",
            Self::ContinueMonitoring => "CONTINUE MONITORING",
        }
    }
}

impl fmt::Display for RecommendationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Recommendation category plus its rendered one-line message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub message: String,
}

// ============================================================================
// StatisticalResult
// ============================================================================

/// Confidence interval for the treatment minus control mean difference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    #[serde(with = "non_finite")]
    pub lower: f64,
    #[serde(with = "non_finite")]
    pub upper: f64,
    pub level: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Descriptive statistics for one arm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmStatistics {
    pub variant: String,
    pub sample_size: usize,
    /// Mean of the numeric encoding, absent for purely categorical values
    #[serde(default, with = "non_finite::option")]
    pub mean: Option<f64>,
    /// Sample standard deviation (n - 1 denominator)
    #[serde(default, with = "non_finite::option")]
    pub std_dev: Option<f64>,
}

/// How the analysis was configured and how the test was chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub confidence_level: f64,
    pub significance_level: f64,
    pub test: TestKind,
    pub metric_kind: MetricKind,
    /// Normality p-value per arm, continuous metrics only
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub normality_p_values: BTreeMap<String, f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "non_finite::option"
    )]
    pub variance_p_value: Option<f64>,
    pub total_observations: usize,
    pub min_sample_size: usize,
    pub required_sample_size: usize,
    pub insufficient_data: bool,
}

/// Outcome of one analysis run; recomputed on every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalResult {
    pub experiment_id: ExperimentId,
    pub metric: String,
    pub test: TestKind,
    /// Infinite for arms without spread whose means differ
    #[serde(with = "non_finite")]
    pub statistic: f64,
    #[serde(with = "non_finite")]
    pub p_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<ConfidenceInterval>,
    /// Standardized mean difference (treatment - control)
    #[serde(with = "non_finite")]
    pub effect_size: f64,
    /// NaN when an arm is too small to estimate it
    #[serde(with = "non_finite")]
    pub power: f64,
    pub is_significant: bool,
    pub practical_significance: bool,
    pub recommendation: Recommendation,
    pub control: ArmStatistics,
    pub treatment: ArmStatistics,
    pub timestamp: DateTime<Utc>,
    pub metadata: ResultMetadata,
}

// ============================================================================
// Summary
// ============================================================================

/// Compact rendering of a historical result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub test: String,
    pub metric: String,
    #[serde(with = "non_finite")]
    pub p_value: f64,
    #[serde(with = "non_finite")]
    pub effect_size: f64,
    pub is_significant: bool,
    pub practical_significance: bool,
    pub recommendation: String,
    #[serde(with = "non_finite")]
    pub power: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&StatisticalResult> for ResultSummary {
    fn from(result: &StatisticalResult) -> Self {
        Self {
            test: result.test.name().to_string(),
            metric: result.metric.clone(),
            p_value: result.p_value,
            effect_size: result.effect_size,
            is_significant: result.is_significant,
            practical_significance: result.practical_significance,
            recommendation: result.recommendation.message.clone(),
            power: result.power,
            timestamp: result.timestamp,
        }
    }
}

/// Read-only reporting view of an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub experiment: Experiment,
    pub total_observations: usize,
    pub variant_counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_observation_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_observation_at: Option<DateTime<Utc>>,
    pub results: Vec<ResultSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(TestKind::WelchT.to_string(), "Welch's t-test");
        assert!(TestKind::StudentT.has_mean_interval());
        assert!(!TestKind::ChiSquared.has_mean_interval());
        assert!(!TestKind::MannWhitneyU.has_mean_interval());
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(RecommendationCategory::InsufficientData.label(), "INSUFFICIENT DATA");
        let json = serde_json::to_string(&RecommendationCategory::NoEffect).unwrap();
        assert_eq!(json, "\"NO_EFFECT\"");
    }

    #[test]
    fn test_confidence_interval_contains() {
        let ci = ConfidenceInterval {
            lower: -0.1,
            upper: 0.3,
            level: 0.95,
        };
        assert!(ci.contains(0.0));
        assert!(!ci.contains(0.5));
    }
}
