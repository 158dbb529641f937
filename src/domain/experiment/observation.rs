//! Metric observations recorded against an experiment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::entity::ExperimentId;

/// Unique identifier for an observation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationId(String);

impl ObservationId {
    /// Generate a new unique ID
    pub fn generate() -> Self {
        Self(format!("obs-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObservationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// MetricValue
// ============================================================================

/// A recorded metric value: numeric, boolean or categorical label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Numeric encoding; booleans map to 1/0 and numeric text is parsed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Number(_) => None,
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    /// Label used when the value is treated as a category
    pub fn category(&self) -> String {
        match self {
            Self::Boolean(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<u32> for MetricValue {
    fn from(v: u32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

// ============================================================================
// Observation
// ============================================================================

/// One immutable metric observation for a subject in a variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    id: ObservationId,
    pub experiment_id: ExperimentId,
    pub variant: String,
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub value: MetricValue,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secondary_values: BTreeMap<String, MetricValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl Observation {
    /// Create an observation stamped with the current time
    pub fn new(
        experiment_id: ExperimentId,
        variant: impl Into<String>,
        subject_id: impl Into<String>,
        value: impl Into<MetricValue>,
    ) -> Self {
        Self {
            id: ObservationId::generate(),
            experiment_id,
            variant: variant.into(),
            subject_id: subject_id.into(),
            session_id: None,
            timestamp: Utc::now(),
            value: value.into(),
            secondary_values: BTreeMap::new(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_secondary_values(mut self, values: BTreeMap<String, MetricValue>) -> Self {
        self.secondary_values = values;
        self
    }

    pub fn with_context(mut self, context: BTreeMap<String, String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> &ObservationId {
        &self.id
    }

    /// Value of a named metric: the primary value or a secondary one
    pub fn metric(&self, name: Option<&str>) -> Option<&MetricValue> {
        match name {
            None => Some(&self.value),
            Some(name) => self.secondary_values.get(name),
        }
    }
}
