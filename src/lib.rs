//! PMP Experiment Engine
//!
//! Statistical experimentation for A/B tests:
//! - Experiment registry with a guarded lifecycle
//! - Deterministic, stratified variant assignment
//! - Append-only observation store
//! - Automatic test selection, power analysis and recommendations

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use infrastructure::experiment::{
    InMemoryAnalysisHistoryRepository, InMemoryExperimentRepository,
    InMemoryObservationRepository, StatisticalAnalyzer,
};
use infrastructure::services::{ExperimentEngine, InMemoryExperimentEngine};
use tracing::info;

/// Create an in-memory engine with default settings
pub fn create_engine() -> InMemoryExperimentEngine {
    create_engine_with_config(&AppConfig::default())
}

/// Create an in-memory engine with custom configuration
pub fn create_engine_with_config(config: &AppConfig) -> InMemoryExperimentEngine {
    let settings = config.engine.analyzer_settings();

    info!(
        default_confidence_level = config.engine.default_confidence_level,
        normality_threshold = settings.normality_threshold,
        variance_threshold = settings.variance_threshold,
        power_threshold = settings.power_threshold,
        "Creating experiment engine"
    );

    ExperimentEngine::new(
        Arc::new(InMemoryExperimentRepository::new()),
        Arc::new(InMemoryObservationRepository::new()),
        Arc::new(InMemoryAnalysisHistoryRepository::new()),
        StatisticalAnalyzer::new(settings),
        config.engine.default_confidence_level,
    )
}
