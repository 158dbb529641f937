//! Prometheus metrics infrastructure
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed.

use std::sync::Arc;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use super::config::MetricsConfig;
use crate::domain::experiment::StatisticalResult;

/// Prometheus metrics handle for rendering the exposition text
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Render all recorded metrics in the Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Initialize Prometheus metrics
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            register_default_metrics();

            tracing::info!("Prometheus metrics initialized");

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

fn register_default_metrics() {
    gauge!("experiment_engine_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a variant assignment
pub fn record_assignment(variant: &str) {
    counter!("experiment_assignments_total", "variant" => variant.to_string()).increment(1);
}

/// Record an appended observation
pub fn record_observation(variant: &str) {
    counter!("experiment_observations_total", "variant" => variant.to_string()).increment(1);
}

/// Record a completed analysis
pub fn record_analysis(result: &StatisticalResult) {
    let labels = [
        ("test", result.test.name().to_string()),
        ("recommendation", result.recommendation.category.label().to_string()),
    ];

    counter!("experiment_analyses_total", &labels).increment(1);

    if result.p_value.is_finite() {
        histogram!("experiment_analysis_p_value", "test" => result.test.name().to_string())
            .record(result.p_value);
    }
}
