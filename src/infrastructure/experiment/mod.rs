//! Infrastructure layer for statistical experimentation
//!
//! In-memory repositories, deterministic variant assignment and the
//! statistical analysis pipeline.

mod analyzer;
mod distributions;
mod in_memory_observation_repo;
mod in_memory_repository;
mod normality;
mod recommendation;
mod statistical;
mod variant_assigner;

pub use analyzer::{
    execute, select_test, AnalysisOptions, AnalysisRequest, AnalyzerSettings, ArmSamples,
    StatisticalAnalyzer, TestSelection,
};
pub use distributions::{
    chi_squared_sf, f_sf, noncentral_t_cdf, normal_cdf, normal_quantile, normal_sf,
    required_sample_size, t_quantile, t_two_sided_p_value, two_sample_power,
};
pub use in_memory_observation_repo::{
    InMemoryAnalysisHistoryRepository, InMemoryObservationRepository,
};
pub use in_memory_repository::InMemoryExperimentRepository;
pub use normality::{kolmogorov_smirnov, levene, normality_test, shapiro_wilk, CheckOutcome};
pub use recommendation::{
    categorize, recommend, recommend_shortfall, RecommendationInput, DEFAULT_POWER_THRESHOLD,
};
pub use statistical::{
    chi_squared, cramers_v, mann_whitney_u, mean, median, pooled_t_test,
    standardized_effect_size, std_dev, variance, welch_degrees_of_freedom, welch_t_test,
    ContingencyTable, TestOutcome,
};
pub use variant_assigner::{VariantAssigner, ASSIGNMENT_BUCKETS, FALLBACK_VARIANT, UNKNOWN_STRATUM};
