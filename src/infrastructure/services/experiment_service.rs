//! Experiment engine
//!
//! Owns the experiment registry, the observation store and the analysis
//! history, and exposes the lifecycle, assignment, recording and analysis
//! operations hosts call.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::experiment::{
    validate_config, AnalysisHistoryRepository, Experiment, ExperimentConfig, ExperimentId,
    ExperimentQuery, ExperimentRepository, ExperimentSummary, MetricValue, Observation,
    ObservationRepository, ResultSummary, StatisticalResult,
};
use crate::domain::DomainError;
use crate::infrastructure::experiment::{
    required_sample_size, AnalysisOptions, AnalysisRequest, InMemoryAnalysisHistoryRepository,
    InMemoryExperimentRepository, InMemoryObservationRepository, StatisticalAnalyzer,
    VariantAssigner,
};
use crate::infrastructure::observability::{record_analysis, record_assignment, record_observation};

// ============================================================================
// Request Types
// ============================================================================

/// Parameters for recording one observation
#[derive(Debug, Clone)]
pub struct RecordMetricParams {
    pub experiment_id: ExperimentId,
    pub variant: String,
    pub subject_id: String,
    pub session_id: Option<String>,
    pub value: MetricValue,
    pub secondary_values: BTreeMap<String, MetricValue>,
    pub context: BTreeMap<String, String>,
}

impl RecordMetricParams {
    pub fn new(
        experiment_id: impl Into<ExperimentId>,
        variant: impl Into<String>,
        subject_id: impl Into<String>,
        value: impl Into<MetricValue>,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            variant: variant.into(),
            subject_id: subject_id.into(),
            session_id: None,
            value: value.into(),
            secondary_values: BTreeMap::new(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_secondary_value(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.secondary_values.insert(name.into(), value.into());
        self
    }

    pub fn with_context(mut self, context: BTreeMap<String, String>) -> Self {
        self.context = context;
        self
    }
}

/// Serializable copy of everything the engine holds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub experiments: Vec<Experiment>,
    pub observations: BTreeMap<ExperimentId, Vec<Observation>>,
    pub history: BTreeMap<ExperimentId, Vec<StatisticalResult>>,
}

// ============================================================================
// Experiment Engine
// ============================================================================

/// Engine backed by the in-memory repositories
pub type InMemoryExperimentEngine = ExperimentEngine<
    InMemoryExperimentRepository,
    InMemoryObservationRepository,
    InMemoryAnalysisHistoryRepository,
>;

/// Experiment engine
///
/// Creation and status transitions run inside a single critical section.
/// Recording relies on the observation repository for concurrent appends,
/// and analysis works on a snapshot of the observations taken up front.
#[derive(Debug)]
pub struct ExperimentEngine<R, O, H>
where
    R: ExperimentRepository,
    O: ObservationRepository,
    H: AnalysisHistoryRepository,
{
    experiments: Arc<R>,
    observations: Arc<O>,
    history: Arc<H>,
    analyzer: StatisticalAnalyzer,
    default_confidence_level: f64,
    lifecycle: Mutex<()>,
}

impl<R, O, H> ExperimentEngine<R, O, H>
where
    R: ExperimentRepository,
    O: ObservationRepository,
    H: AnalysisHistoryRepository,
{
    pub fn new(
        experiments: Arc<R>,
        observations: Arc<O>,
        history: Arc<H>,
        analyzer: StatisticalAnalyzer,
        default_confidence_level: f64,
    ) -> Self {
        Self {
            experiments,
            observations,
            history,
            analyzer,
            default_confidence_level,
            lifecycle: Mutex::new(()),
        }
    }

    pub fn default_confidence_level(&self) -> f64 {
        self.default_confidence_level
    }

    fn lock_lifecycle(&self) -> Result<MutexGuard<'_, ()>, DomainError> {
        self.lifecycle
            .lock()
            .map_err(|e| DomainError::internal(format!("Failed to acquire lifecycle lock: {}", e)))
    }

    fn load(&self, id: &ExperimentId) -> Result<Experiment, DomainError> {
        self.experiments
            .get(id)?
            .ok_or_else(|| DomainError::not_found(format!("Experiment '{}' not found", id)))
    }

    // ========================================================================
    // Registry Operations
    // ========================================================================

    /// Validate and store a new experiment in Draft status
    pub fn create_experiment(&self, config: ExperimentConfig) -> Result<ExperimentId, DomainError> {
        debug!(name = %config.name, kind = %config.kind, "Creating experiment");

        validate_config(&config)?;

        let required = required_sample_size(
            config.significance_level,
            config.power,
            config.minimum_effect_size,
        );

        if config.min_sample_size < required {
            warn!(
                name = %config.name,
                min_sample_size = config.min_sample_size,
                required_sample_size = required,
                "Configured minimum sample size is below the statistically required size per arm"
            );
        }

        let _guard = self.lock_lifecycle()?;

        let mut id = ExperimentId::generate();
        while self.experiments.exists(&id)? {
            id = ExperimentId::generate();
        }

        let experiment = self
            .experiments
            .create(Experiment::new(id, config, required))?;

        info!(
            experiment_id = %experiment.id(),
            required_sample_size = required,
            "Experiment created"
        );

        Ok(experiment.id().clone())
    }

    pub fn get(&self, id: &ExperimentId) -> Result<Option<Experiment>, DomainError> {
        debug!(experiment_id = %id, "Getting experiment");
        self.experiments.get(id)
    }

    pub fn list(&self, query: &ExperimentQuery) -> Result<Vec<Experiment>, DomainError> {
        debug!(?query, "Listing experiments");
        self.experiments.list(query)
    }

    /// Per-arm sample size needed to detect the configured minimum effect
    pub fn required_sample_size(&self, id: &ExperimentId) -> Result<usize, DomainError> {
        Ok(self.load(id)?.required_sample_size())
    }

    // ========================================================================
    // Lifecycle Operations
    // ========================================================================

    fn transition(
        &self,
        id: &ExperimentId,
        action: &str,
        apply: impl FnOnce(&mut Experiment) -> Result<(), DomainError>,
    ) -> Result<Experiment, DomainError> {
        debug!(experiment_id = %id, action, "Transitioning experiment");

        let _guard = self.lock_lifecycle()?;

        let mut experiment = self.load(id)?;
        apply(&mut experiment)?;
        let updated = self.experiments.update(experiment)?;

        info!(experiment_id = %id, status = %updated.status(), "Experiment {}", action);

        Ok(updated)
    }

    /// Start an experiment (Draft -> Running)
    pub fn start(&self, id: &ExperimentId) -> Result<Experiment, DomainError> {
        self.transition(id, "started", Experiment::start)
    }

    /// Pause an experiment (Running -> Paused)
    pub fn pause(&self, id: &ExperimentId) -> Result<Experiment, DomainError> {
        self.transition(id, "paused", Experiment::pause)
    }

    /// Resume an experiment (Paused -> Running)
    pub fn resume(&self, id: &ExperimentId) -> Result<Experiment, DomainError> {
        self.transition(id, "resumed", Experiment::resume)
    }

    /// Complete an experiment (Running/Paused -> Completed)
    pub fn complete(&self, id: &ExperimentId) -> Result<Experiment, DomainError> {
        self.transition(id, "completed", Experiment::complete)
    }

    /// Cancel an experiment (Running/Paused -> Cancelled)
    pub fn cancel(&self, id: &ExperimentId) -> Result<Experiment, DomainError> {
        self.transition(id, "cancelled", Experiment::cancel)
    }

    /// Archive an ended experiment
    pub fn archive(&self, id: &ExperimentId) -> Result<Experiment, DomainError> {
        self.transition(id, "archived", Experiment::archive)
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    /// Deterministically assign a subject to a variant
    pub fn assign_variant(
        &self,
        id: &ExperimentId,
        subject_id: &str,
        context: &BTreeMap<String, String>,
    ) -> Result<String, DomainError> {
        let experiment = self.load(id)?;
        let variant = VariantAssigner::assign(&experiment, subject_id, context);

        debug!(
            experiment_id = %id,
            subject_id = %subject_id,
            variant = %variant,
            status = %experiment.status(),
            "Assigned variant"
        );

        record_assignment(&variant);

        Ok(variant)
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Append an observation
    ///
    /// Accepted in every status; only assignment is gated on Running.
    pub fn record_metric(&self, params: RecordMetricParams) -> Result<(), DomainError> {
        let experiment = self.load(&params.experiment_id)?;

        if !experiment.status().is_running() {
            debug!(
                experiment_id = %params.experiment_id,
                status = %experiment.status(),
                "Recording observation for an experiment that is not running"
            );
        }

        let mut observation = Observation::new(
            params.experiment_id.clone(),
            params.variant,
            params.subject_id,
            params.value,
        )
        .with_secondary_values(params.secondary_values)
        .with_context(params.context);

        if let Some(session_id) = params.session_id {
            observation = observation.with_session(session_id);
        }

        let variant = observation.variant.clone();
        let observation_id = observation.id().clone();

        self.observations.append(observation)?;
        record_observation(&variant);

        debug!(
            experiment_id = %params.experiment_id,
            observation_id = %observation_id,
            variant = %variant,
            "Recorded observation"
        );

        Ok(())
    }

    /// Snapshot of the observations of an experiment, in recording order
    pub fn observations(&self, id: &ExperimentId) -> Result<Vec<Observation>, DomainError> {
        self.load(id)?;
        self.observations.list_for_experiment(id)
    }

    pub fn observation_count(&self, id: &ExperimentId) -> Result<usize, DomainError> {
        self.load(id)?;
        self.observations.count_for_experiment(id)
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    /// Analyze the primary metric
    ///
    /// `None` uses the configured default confidence level.
    pub fn analyze_experiment(
        &self,
        id: &ExperimentId,
        confidence_level: Option<f64>,
    ) -> Result<StatisticalResult, DomainError> {
        self.run_analysis(id, None, confidence_level, AnalysisOptions::default())
    }

    pub fn analyze_with_options(
        &self,
        id: &ExperimentId,
        confidence_level: Option<f64>,
        options: AnalysisOptions,
    ) -> Result<StatisticalResult, DomainError> {
        self.run_analysis(id, None, confidence_level, options)
    }

    /// Analyze a named secondary metric
    pub fn analyze_secondary(
        &self,
        id: &ExperimentId,
        metric: &str,
        confidence_level: Option<f64>,
    ) -> Result<StatisticalResult, DomainError> {
        let experiment = self.load(id)?;

        if !experiment
            .config()
            .secondary_metrics
            .iter()
            .any(|m| m == metric)
        {
            return Err(DomainError::not_found(format!(
                "Secondary metric '{}' is not configured for experiment '{}'",
                metric, id
            )));
        }

        self.run_analysis(id, Some(metric), confidence_level, AnalysisOptions::default())
    }

    fn run_analysis(
        &self,
        id: &ExperimentId,
        metric: Option<&str>,
        confidence_level: Option<f64>,
        options: AnalysisOptions,
    ) -> Result<StatisticalResult, DomainError> {
        let confidence_level = confidence_level.unwrap_or(self.default_confidence_level);

        debug!(
            experiment_id = %id,
            metric = metric.unwrap_or("primary"),
            confidence_level,
            strict = options.strict,
            "Analyzing experiment"
        );

        let experiment = self.load(id)?;
        let snapshot = self.observations.list_for_experiment(id)?;

        let result = self.analyzer.analyze(AnalysisRequest {
            experiment: &experiment,
            observations: &snapshot,
            metric,
            confidence_level,
            options,
        })?;

        self.history.append(result.clone())?;
        record_analysis(&result);

        info!(
            experiment_id = %id,
            metric = %result.metric,
            test = %result.test,
            p_value = result.p_value,
            effect_size = result.effect_size,
            recommendation = %result.recommendation.category.label(),
            "Experiment analyzed"
        );

        Ok(result)
    }

    /// Ordered analysis history, most recent last
    pub fn history(&self, id: &ExperimentId) -> Result<Vec<StatisticalResult>, DomainError> {
        self.load(id)?;
        self.history.list_for_experiment(id)
    }

    // ========================================================================
    // Summary
    // ========================================================================

    /// Read-only report over config, observations and analysis history
    pub fn get_summary(&self, id: &ExperimentId) -> Result<ExperimentSummary, DomainError> {
        debug!(experiment_id = %id, "Building experiment summary");

        let experiment = self.load(id)?;
        let observations = self.observations.list_for_experiment(id)?;
        let history = self.history.list_for_experiment(id)?;

        let mut variant_counts = BTreeMap::new();
        for observation in &observations {
            *variant_counts
                .entry(observation.variant.clone())
                .or_insert(0usize) += 1;
        }

        Ok(ExperimentSummary {
            experiment,
            total_observations: observations.len(),
            variant_counts,
            first_observation_at: observations.iter().map(|o| o.timestamp).min(),
            last_observation_at: observations.iter().map(|o| o.timestamp).max(),
            results: history.iter().map(ResultSummary::from).collect(),
        })
    }

    // ========================================================================
    // State Export / Import
    // ========================================================================

    pub fn export_state(&self) -> Result<EngineSnapshot, DomainError> {
        let _guard = self.lock_lifecycle()?;

        let experiments = self.experiments.list(&ExperimentQuery::new())?;
        let mut snapshot = EngineSnapshot::default();

        for experiment in &experiments {
            let id = experiment.id().clone();
            snapshot
                .observations
                .insert(id.clone(), self.observations.list_for_experiment(&id)?);
            snapshot
                .history
                .insert(id, self.history.list_for_experiment(experiment.id())?);
        }
        snapshot.experiments = experiments;

        info!(
            experiments = snapshot.experiments.len(),
            "Exported engine state"
        );

        Ok(snapshot)
    }

    /// Restore a snapshot
    ///
    /// Fails with `Conflict` before writing anything if one of the snapshot's
    /// experiments already exists.
    pub fn import_state(&self, snapshot: EngineSnapshot) -> Result<(), DomainError> {
        let _guard = self.lock_lifecycle()?;

        for experiment in &snapshot.experiments {
            if self.experiments.exists(experiment.id())? {
                return Err(DomainError::conflict(format!(
                    "Experiment '{}' already exists",
                    experiment.id()
                )));
            }
        }

        let EngineSnapshot {
            experiments,
            mut observations,
            mut history,
        } = snapshot;
        let count = experiments.len();

        for experiment in experiments {
            let id = experiment.id().clone();
            self.experiments.create(experiment)?;

            for observation in observations.remove(&id).unwrap_or_default() {
                self.observations.append(observation)?;
            }
            for result in history.remove(&id).unwrap_or_default() {
                self.history.append(result)?;
            }
        }

        info!(experiments = count, "Imported engine state");

        Ok(())
    }
}
