//! In-memory implementation of the experiment repository

use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::experiment::{Experiment, ExperimentId, ExperimentQuery, ExperimentRepository};
use crate::domain::DomainError;

/// In-memory experiment repository implementation
#[derive(Debug)]
pub struct InMemoryExperimentRepository {
    experiments: RwLock<HashMap<String, Experiment>>,
}

impl InMemoryExperimentRepository {
    /// Create a new empty repository
    pub fn new() -> Self {
        Self {
            experiments: RwLock::new(HashMap::new()),
        }
    }

    /// Create a repository with initial experiments
    pub fn with_experiments(experiments: Vec<Experiment>) -> Self {
        let map = experiments
            .into_iter()
            .map(|e| (e.id().as_str().to_string(), e))
            .collect();

        Self {
            experiments: RwLock::new(map),
        }
    }
}

impl Default for InMemoryExperimentRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentRepository for InMemoryExperimentRepository {
    fn create(&self, experiment: Experiment) -> Result<Experiment, DomainError> {
        let id = experiment.id().as_str().to_string();
        let mut experiments = self
            .experiments
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))?;

        if experiments.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "Experiment '{}' already exists",
                id
            )));
        }

        experiments.insert(id, experiment.clone());
        Ok(experiment)
    }

    fn get(&self, id: &ExperimentId) -> Result<Option<Experiment>, DomainError> {
        let experiments = self
            .experiments
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(experiments.get(id.as_str()).cloned())
    }

    fn update(&self, experiment: Experiment) -> Result<Experiment, DomainError> {
        let id = experiment.id().as_str().to_string();
        let mut experiments = self
            .experiments
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))?;

        if !experiments.contains_key(&id) {
            return Err(DomainError::not_found(format!(
                "Experiment '{}' not found",
                id
            )));
        }

        experiments.insert(id, experiment.clone());
        Ok(experiment)
    }

    fn list(&self, query: &ExperimentQuery) -> Result<Vec<Experiment>, DomainError> {
        let experiments = self
            .experiments
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))?;

        let results = experiments
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();

        Ok(query.paginate(results))
    }

    fn exists(&self, id: &ExperimentId) -> Result<bool, DomainError> {
        let experiments = self
            .experiments
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(experiments.contains_key(id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{ExperimentConfig, ExperimentKind, ExperimentStatus, MetricKind};

    fn create_test_experiment(id: &str) -> Experiment {
        let config = ExperimentConfig::new(
            format!("Experiment {}", id),
            ExperimentKind::ModelComparison,
            MetricKind::Continuous,
            "quality",
        );
        Experiment::new(ExperimentId::from(id), config, 393)
    }

    #[test]
    fn test_create_and_get() {
        let repo = InMemoryExperimentRepository::new();
        let exp = create_test_experiment("exp-1");

        repo.create(exp.clone()).unwrap();

        let fetched = repo.get(exp.id()).unwrap().unwrap();
        assert_eq!(fetched, exp);
        assert!(repo.exists(exp.id()).unwrap());
        assert!(!repo.exists(&ExperimentId::from("exp-2")).unwrap());
    }

    #[test]
    fn test_create_duplicate() {
        let repo = InMemoryExperimentRepository::new();
        repo.create(create_test_experiment("exp-1")).unwrap();

        let result = repo.create(create_test_experiment("exp-1"));
        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[test]
    fn test_update() {
        let repo = InMemoryExperimentRepository::new();
        let mut exp = create_test_experiment("exp-1");
        repo.create(exp.clone()).unwrap();

        exp.start().unwrap();
        repo.update(exp.clone()).unwrap();

        let fetched = repo.get(exp.id()).unwrap().unwrap();
        assert_eq!(fetched.status(), ExperimentStatus::Running);
    }

    #[test]
    fn test_update_missing() {
        let repo = InMemoryExperimentRepository::new();
        let result = repo.update(create_test_experiment("exp-1"));
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[test]
    fn test_list_with_status_filter() {
        let mut running = create_test_experiment("exp-running");
        running.start().unwrap();

        let repo = InMemoryExperimentRepository::with_experiments(vec![
            create_test_experiment("exp-draft"),
            running,
        ]);

        let all = repo.list(&ExperimentQuery::new()).unwrap();
        assert_eq!(all.len(), 2);

        let running = repo
            .list(&ExperimentQuery::new().with_status(ExperimentStatus::Running))
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id().as_str(), "exp-running");

        assert_eq!(repo.count(&ExperimentQuery::new().with_limit(1)).unwrap(), 1);
    }
}
