use serde::Deserialize;

use crate::infrastructure::experiment::AnalyzerSettings;
use crate::infrastructure::observability::ObservabilityConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Statistical thresholds of the experiment engine
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Confidence level used when the caller does not pass one
    pub default_confidence_level: f64,
    /// Normality is rejected below this p-value
    pub normality_threshold: f64,
    /// Equal variances are rejected below this p-value
    pub variance_threshold: f64,
    /// Null results below this power are reported as underpowered
    pub power_threshold: f64,
    /// Arms smaller than this are checked with Shapiro-Wilk
    pub shapiro_max_sample: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let settings = AnalyzerSettings::default();
        Self {
            default_confidence_level: 0.95,
            normality_threshold: settings.normality_threshold,
            variance_threshold: settings.variance_threshold,
            power_threshold: settings.power_threshold,
            shapiro_max_sample: settings.shapiro_max_sample,
        }
    }
}

impl EngineConfig {
    /// Analyzer thresholds derived from this configuration
    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            normality_threshold: self.normality_threshold,
            variance_threshold: self.variance_threshold,
            power_threshold: self.power_threshold,
            shapiro_max_sample: self.shapiro_max_sample,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
