//! Observability infrastructure - Metrics

mod config;
mod metrics;

pub use config::{MetricsConfig, ObservabilityConfig};
pub use metrics::{
    init_metrics, record_analysis, record_assignment, record_observation, PrometheusMetrics,
};
