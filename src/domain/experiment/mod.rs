//! Experiment domain module for statistical A/B testing
//!
//! Experiments, their observations and analysis results, plus the
//! repository traits the engine persists them through.

mod entity;
mod non_finite;
mod observation;
mod repository;
mod result;
mod validation;

// Re-export all public types
pub use entity::{
    Experiment, ExperimentConfig, ExperimentId, ExperimentKind, ExperimentStatus, MetricKind,
    TrafficAllocation, TrafficSplit,
};
pub use observation::{MetricValue, Observation, ObservationId};
pub use repository::{
    AnalysisHistoryRepository, ExperimentQuery, ExperimentRepository, ObservationRepository,
};
pub use result::{
    ArmStatistics, ConfidenceInterval, ExperimentSummary, Recommendation, RecommendationCategory,
    ResultMetadata, ResultSummary, StatisticalResult, TestKind,
};
pub use validation::{
    validate_config, validate_confidence_level, validate_variant_name, ConfigValidationError,
    MAX_VARIANT_NAME_LENGTH, MIN_SAMPLE_SIZE_FLOOR, TRAFFIC_SUM_TOLERANCE,
};

#[cfg(test)]
pub use repository::mock::{MockExperimentRepository, MockObservationRepository};
