//! In-memory observation and analysis history repositories

use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::experiment::{
    AnalysisHistoryRepository, ExperimentId, Observation, ObservationRepository,
    StatisticalResult,
};
use crate::domain::DomainError;

/// In-memory, append-only observation store
///
/// Observations of one experiment are kept in recording order.
#[derive(Debug, Default)]
pub struct InMemoryObservationRepository {
    observations: RwLock<HashMap<ExperimentId, Vec<Observation>>>,
}

impl InMemoryObservationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObservationRepository for InMemoryObservationRepository {
    fn append(&self, observation: Observation) -> Result<(), DomainError> {
        let mut observations = self
            .observations
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))?;

        observations
            .entry(observation.experiment_id.clone())
            .or_default()
            .push(observation);

        Ok(())
    }

    fn list_for_experiment(&self, id: &ExperimentId) -> Result<Vec<Observation>, DomainError> {
        let observations = self
            .observations
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(observations.get(id).cloned().unwrap_or_default())
    }

    fn count_for_experiment(&self, id: &ExperimentId) -> Result<usize, DomainError> {
        let observations = self
            .observations
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(observations.get(id).map_or(0, Vec::len))
    }
}

/// In-memory analysis history, oldest result first
#[derive(Debug, Default)]
pub struct InMemoryAnalysisHistoryRepository {
    results: RwLock<HashMap<ExperimentId, Vec<StatisticalResult>>>,
}

impl InMemoryAnalysisHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnalysisHistoryRepository for InMemoryAnalysisHistoryRepository {
    fn append(&self, result: StatisticalResult) -> Result<(), DomainError> {
        let mut results = self
            .results
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))?;

        results
            .entry(result.experiment_id.clone())
            .or_default()
            .push(result);

        Ok(())
    }

    fn list_for_experiment(
        &self,
        id: &ExperimentId,
    ) -> Result<Vec<StatisticalResult>, DomainError> {
        let results = self
            .results
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(results.get(id).cloned().unwrap_or_default())
    }
}
