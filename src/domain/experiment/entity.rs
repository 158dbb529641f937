//! Experiment domain entities

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::DomainError;

// ============================================================================
// ExperimentId
// ============================================================================

/// Opaque, engine-generated identifier for an experiment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(String);

impl ExperimentId {
    /// Generate a new unique ID
    pub fn generate() -> Self {
        Self(format!("exp-{}", uuid::Uuid::new_v4()))
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExperimentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ExperimentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ExperimentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// ExperimentKind / MetricKind
// ============================================================================

/// What an experiment is comparing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentKind {
    ModelComparison,
    PromptOptimization,
    FeatureRollout,
    UiOptimization,
    ComplianceEffectiveness,
    AssessmentMethodology,
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ModelComparison => "model_comparison",
            Self::PromptOptimization => "prompt_optimization",
            Self::FeatureRollout => "feature_rollout",
            Self::UiOptimization => "ui_optimization",
            Self::ComplianceEffectiveness => "compliance_effectiveness",
            Self::AssessmentMethodology => "assessment_methodology",
        };
        write!(f, "{}", s)
    }
}

/// Shape of the primary metric, drives test selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Real-valued outcome (scores, latencies, ratings)
    Continuous,
    /// Binary or categorical outcome (converted / not converted, labels)
    Categorical,
    /// Non-negative event counts
    Count,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuous => write!(f, "continuous"),
            Self::Categorical => write!(f, "categorical"),
            Self::Count => write!(f, "count"),
        }
    }
}

// ============================================================================
// ExperimentStatus
// ============================================================================

/// Lifecycle status of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Experiment is being configured, not yet running
    #[default]
    Draft,
    /// Experiment is assigning subjects to variants
    Running,
    /// Experiment is temporarily paused, assignment falls back to control
    Paused,
    /// Experiment finished normally
    Completed,
    /// Experiment was stopped early
    Cancelled,
    /// Experiment is retained for reporting only
    Archived,
}

impl ExperimentStatus {
    /// Check if the experiment is currently assigning variants
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if a transition to the target status is valid
    pub fn can_transition_to(&self, target: ExperimentStatus) -> bool {
        matches!(
            (self, target),
            (Self::Draft, Self::Running)
                | (Self::Running, Self::Paused)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Cancelled)
                | (Self::Paused, Self::Running)
                | (Self::Paused, Self::Completed)
                | (Self::Paused, Self::Cancelled)
                | (Self::Paused, Self::Archived)
                | (Self::Completed, Self::Archived)
                | (Self::Cancelled, Self::Archived)
        )
    }

    /// Check if the status is terminal for assignment purposes
    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Archived)
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

// ============================================================================
// TrafficSplit
// ============================================================================

/// Share of traffic routed to a variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficAllocation {
    pub variant: String,
    pub probability: f64,
}

/// Ordered mapping of variant name to assignment probability
///
/// Iteration order is the configured order, which is also the order the
/// assigner walks when accumulating probabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct TrafficSplit(Vec<TrafficAllocation>);

impl TrafficSplit {
    /// Build a split from `(variant, probability)` pairs, preserving order
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(variant, probability)| TrafficAllocation {
                    variant: variant.into(),
                    probability,
                })
                .collect(),
        )
    }

    /// Build an equal split across the given variants
    pub fn even<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = variants.into_iter().map(Into::into).collect();
        let share = if names.is_empty() {
            0.0
        } else {
            1.0 / names.len() as f64
        };
        Self::from_pairs(names.into_iter().map(|n| (n, share)))
    }

    /// Get all allocations in configured order
    pub fn allocations(&self) -> &[TrafficAllocation] {
        &self.0
    }

    /// Sum of all probabilities
    pub fn total(&self) -> f64 {
        self.0.iter().map(|a| a.probability).sum()
    }

    /// Variant names in configured order
    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|a| a.variant.as_str())
    }

    /// Check whether the split mentions a variant
    pub fn contains(&self, variant: &str) -> bool {
        self.0.iter().any(|a| a.variant == variant)
    }

    /// Walk the cumulative distribution and return the first variant whose
    /// cumulative probability reaches `ratio`
    pub fn variant_for_ratio(&self, ratio: f64) -> Option<&str> {
        let mut cumulative = 0.0;

        for allocation in &self.0 {
            cumulative += allocation.probability;

            if cumulative >= ratio {
                return Some(&allocation.variant);
            }
        }

        None
    }
}

// ============================================================================
// ExperimentConfig
// ============================================================================

/// Caller-supplied experiment configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: ExperimentKind,
    pub metric_kind: MetricKind,
    pub primary_metric: String,
    #[serde(default)]
    pub secondary_metrics: Vec<String>,
    /// Alpha, the false-positive threshold
    pub significance_level: f64,
    /// Target power (1 - beta)
    pub power: f64,
    /// Minimum standardized effect size considered practically relevant
    pub minimum_effect_size: f64,
    pub traffic_split: TrafficSplit,
    #[serde(default)]
    pub stratification_keys: Vec<String>,
    pub min_sample_size: usize,
    pub max_duration_hours: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ExperimentConfig {
    /// Create a configuration with conventional defaults: alpha 0.05, power 0.8,
    /// minimum effect 0.2, an even control/treatment split and 100 samples
    pub fn new(
        name: impl Into<String>,
        kind: ExperimentKind,
        metric_kind: MetricKind,
        primary_metric: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind,
            metric_kind,
            primary_metric: primary_metric.into(),
            secondary_metrics: Vec::new(),
            significance_level: 0.05,
            power: 0.8,
            minimum_effect_size: 0.2,
            traffic_split: TrafficSplit::even(["control", "treatment"]),
            stratification_keys: Vec::new(),
            min_sample_size: 100,
            max_duration_hours: 24 * 30,
            owner: None,
            tags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_secondary_metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secondary_metrics = metrics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_significance_level(mut self, alpha: f64) -> Self {
        self.significance_level = alpha;
        self
    }

    pub fn with_power(mut self, power: f64) -> Self {
        self.power = power;
        self
    }

    pub fn with_minimum_effect_size(mut self, effect_size: f64) -> Self {
        self.minimum_effect_size = effect_size;
        self
    }

    pub fn with_traffic_split(mut self, split: TrafficSplit) -> Self {
        self.traffic_split = split;
        self
    }

    pub fn with_stratification_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stratification_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_sample_size(mut self, min_sample_size: usize) -> Self {
        self.min_sample_size = min_sample_size;
        self
    }

    pub fn with_max_duration_hours(mut self, hours: u32) -> Self {
        self.max_duration_hours = hours;
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

// ============================================================================
// Experiment
// ============================================================================

/// A registered experiment: immutable configuration plus lifecycle state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    id: ExperimentId,
    config: ExperimentConfig,
    status: ExperimentStatus,
    required_sample_size: usize,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ended_at: Option<DateTime<Utc>>,
}

impl Experiment {
    /// Create a new experiment in Draft status
    pub fn new(id: ExperimentId, config: ExperimentConfig, required_sample_size: usize) -> Self {
        let now = Utc::now();
        Self {
            id,
            config,
            status: ExperimentStatus::Draft,
            required_sample_size,
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
        }
    }

    // Getters

    pub fn id(&self) -> &ExperimentId {
        &self.id
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// Statistically required sample size per arm, computed at creation
    pub fn required_sample_size(&self) -> usize {
        self.required_sample_size
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the experiment was completed or cancelled
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Check whether a running experiment has outlived its configured duration
    pub fn is_past_max_duration(&self, now: DateTime<Utc>) -> bool {
        match self.started_at {
            Some(started) if !self.status.is_ended() => {
                now - started > Duration::hours(i64::from(self.config.max_duration_hours))
            }
            _ => false,
        }
    }

    // Status transitions

    /// Start the experiment (Draft -> Running)
    pub fn start(&mut self) -> Result<(), DomainError> {
        if self.status != ExperimentStatus::Draft {
            return Err(self.transition_error(ExperimentStatus::Running));
        }
        self.started_at = Some(Utc::now());
        self.set_status(ExperimentStatus::Running)
    }

    /// Pause the experiment (Running -> Paused)
    pub fn pause(&mut self) -> Result<(), DomainError> {
        self.set_status(ExperimentStatus::Paused)
    }

    /// Resume the experiment (Paused -> Running)
    pub fn resume(&mut self) -> Result<(), DomainError> {
        if self.status != ExperimentStatus::Paused {
            return Err(self.transition_error(ExperimentStatus::Running));
        }
        self.set_status(ExperimentStatus::Running)
    }

    /// Complete the experiment (Running/Paused -> Completed)
    pub fn complete(&mut self) -> Result<(), DomainError> {
        self.set_status(ExperimentStatus::Completed)?;
        self.ended_at = Some(self.updated_at);
        Ok(())
    }

    /// Cancel the experiment (Running/Paused -> Cancelled)
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.set_status(ExperimentStatus::Cancelled)?;
        self.ended_at = Some(self.updated_at);
        Ok(())
    }

    /// Archive the experiment (Paused/Completed/Cancelled -> Archived)
    pub fn archive(&mut self) -> Result<(), DomainError> {
        self.set_status(ExperimentStatus::Archived)
    }

    // Private helpers

    fn set_status(&mut self, target: ExperimentStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(target) {
            return Err(self.transition_error(target));
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn transition_error(&self, target: ExperimentStatus) -> DomainError {
        DomainError::invalid_state(format!(
            "Experiment '{}' cannot transition from {} to {}",
            self.id, self.status, target
        ))
    }
}
