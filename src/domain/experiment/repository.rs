//! Experiment repository traits and query types

use std::fmt::Debug;

use super::entity::{Experiment, ExperimentId, ExperimentKind, ExperimentStatus};
use super::observation::Observation;
use super::result::StatisticalResult;
use crate::domain::DomainError;

// ============================================================================
// ExperimentQuery
// ============================================================================

/// Query parameters for listing experiments
#[derive(Debug, Clone, Default)]
pub struct ExperimentQuery {
    /// Filter by status
    pub status: Option<ExperimentStatus>,
    /// Filter by experiment kind
    pub kind: Option<ExperimentKind>,
    /// Filter by owner
    pub owner: Option<String>,
    /// Filter by tag (experiment must carry it)
    pub tag: Option<String>,
    /// Maximum number of results
    pub limit: Option<usize>,
    /// Number of results to skip
    pub offset: Option<usize>,
}

impl ExperimentQuery {
    /// Create a new query with no filters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: ExperimentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_kind(mut self, kind: ExperimentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Check whether an experiment passes every filter
    pub fn matches(&self, experiment: &Experiment) -> bool {
        if let Some(status) = self.status {
            if experiment.status() != status {
                return false;
            }
        }

        if let Some(kind) = self.kind {
            if experiment.config().kind != kind {
                return false;
            }
        }

        if let Some(ref owner) = self.owner {
            if experiment.config().owner.as_deref() != Some(owner.as_str()) {
                return false;
            }
        }

        if let Some(ref tag) = self.tag {
            if !experiment.config().tags.iter().any(|t| t == tag) {
                return false;
            }
        }

        true
    }

    /// Apply ordering (oldest first, id as tie-break) and pagination
    pub fn paginate(&self, mut experiments: Vec<Experiment>) -> Vec<Experiment> {
        experiments.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);

        experiments.into_iter().skip(offset).take(limit).collect()
    }
}

// ============================================================================
// ExperimentRepository
// ============================================================================

/// Repository trait for experiments
pub trait ExperimentRepository: Send + Sync + Debug {
    /// Store a new experiment; fails with Conflict if the id is taken
    fn create(&self, experiment: Experiment) -> Result<Experiment, DomainError>;

    /// Get an experiment by ID
    fn get(&self, id: &ExperimentId) -> Result<Option<Experiment>, DomainError>;

    /// Replace an existing experiment
    fn update(&self, experiment: Experiment) -> Result<Experiment, DomainError>;

    /// List experiments with optional filters
    fn list(&self, query: &ExperimentQuery) -> Result<Vec<Experiment>, DomainError>;

    /// Check if an experiment exists
    fn exists(&self, id: &ExperimentId) -> Result<bool, DomainError> {
        Ok(self.get(id)?.is_some())
    }

    /// Count experiments matching the query
    fn count(&self, query: &ExperimentQuery) -> Result<usize, DomainError> {
        Ok(self.list(query)?.len())
    }
}

// ============================================================================
// ObservationRepository
// ============================================================================

/// Append-only store of observations, grouped per experiment
pub trait ObservationRepository: Send + Sync + Debug {
    /// Append an observation to its experiment's list
    fn append(&self, observation: Observation) -> Result<(), DomainError>;

    /// All observations of an experiment in recording order
    fn list_for_experiment(&self, id: &ExperimentId) -> Result<Vec<Observation>, DomainError>;

    /// Number of observations recorded for an experiment
    fn count_for_experiment(&self, id: &ExperimentId) -> Result<usize, DomainError> {
        Ok(self.list_for_experiment(id)?.len())
    }
}

// ============================================================================
// AnalysisHistoryRepository
// ============================================================================

/// Append-only history of analysis results per experiment
pub trait AnalysisHistoryRepository: Send + Sync + Debug {
    fn append(&self, result: StatisticalResult) -> Result<(), DomainError>;

    /// Results for an experiment, oldest first
    fn list_for_experiment(&self, id: &ExperimentId)
    -> Result<Vec<StatisticalResult>, DomainError>;
}
