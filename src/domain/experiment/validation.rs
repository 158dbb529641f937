//! Experiment configuration validation

use std::collections::HashSet;

use thiserror::Error;

use super::entity::ExperimentConfig;
use crate::domain::DomainError;

/// Maximum length for variant names
pub const MAX_VARIANT_NAME_LENGTH: usize = 50;

/// Allowed deviation of the traffic split sum from 1.0
pub const TRAFFIC_SUM_TOLERANCE: f64 = 1e-6;

/// Smallest accepted minimum sample size
pub const MIN_SAMPLE_SIZE_FLOOR: usize = 10;

/// Validation errors for experiment configurations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigValidationError {
    #[error("Experiment name cannot be empty")]
    EmptyName,

    #[error("Traffic split must contain at least one variant")]
    EmptyTrafficSplit,

    #[error("Traffic split must sum to 1.0, got {0}")]
    InvalidTrafficSum(f64),

    #[error("Traffic probability for variant '{variant}' must be within [0, 1], got {value}")]
    InvalidProbability { variant: String, value: f64 },

    #[error("Duplicate variant in traffic split: '{0}'")]
    DuplicateVariant(String),

    #[error("Variant name cannot be empty")]
    EmptyVariantName,

    #[error("Variant name exceeds maximum length of {0} characters")]
    VariantNameTooLong(usize),

    #[error("Variant name contains invalid character: '{0}'")]
    InvalidVariantNameCharacter(char),

    #[error("Significance level must be within (0, 1), got {0}")]
    SignificanceLevelOutOfRange(f64),

    #[error("Power must be within (0, 1), got {0}")]
    PowerOutOfRange(f64),

    #[error("Confidence level must be within (0, 1), got {0}")]
    ConfidenceLevelOutOfRange(f64),

    #[error("Minimum detectable effect size must be positive, got {0}")]
    NonPositiveEffectSize(f64),

    #[error("Minimum sample size must be at least {MIN_SAMPLE_SIZE_FLOOR}, got {0}")]
    MinSampleSizeTooSmall(usize),

    #[error("Stratification keys cannot be empty strings")]
    EmptyStratificationKey,
}

impl From<ConfigValidationError> for DomainError {
    fn from(error: ConfigValidationError) -> Self {
        DomainError::configuration(error.to_string())
    }
}

/// Validate a variant name
pub fn validate_variant_name(name: &str) -> Result<(), ConfigValidationError> {
    if name.is_empty() {
        return Err(ConfigValidationError::EmptyVariantName);
    }

    if name.len() > MAX_VARIANT_NAME_LENGTH {
        return Err(ConfigValidationError::VariantNameTooLong(
            MAX_VARIANT_NAME_LENGTH,
        ));
    }

    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(ConfigValidationError::InvalidVariantNameCharacter(ch));
    }

    Ok(())
}

/// Validate that a probability-like parameter lies strictly inside (0, 1)
fn in_open_unit_interval(value: f64) -> bool {
    value > 0.0 && value < 1.0
}

/// Validate a confidence level passed to analysis
pub fn validate_confidence_level(level: f64) -> Result<(), ConfigValidationError> {
    if !in_open_unit_interval(level) {
        return Err(ConfigValidationError::ConfidenceLevelOutOfRange(level));
    }

    Ok(())
}

/// Validate all invariants of an experiment configuration
pub fn validate_config(config: &ExperimentConfig) -> Result<(), ConfigValidationError> {
    if config.name.trim().is_empty() {
        return Err(ConfigValidationError::EmptyName);
    }

    let allocations = config.traffic_split.allocations();

    if allocations.is_empty() {
        return Err(ConfigValidationError::EmptyTrafficSplit);
    }

    let mut seen = HashSet::new();

    for allocation in allocations {
        validate_variant_name(&allocation.variant)?;

        if !seen.insert(allocation.variant.as_str()) {
            return Err(ConfigValidationError::DuplicateVariant(
                allocation.variant.clone(),
            ));
        }

        if !(0.0..=1.0).contains(&allocation.probability) {
            return Err(ConfigValidationError::InvalidProbability {
                variant: allocation.variant.clone(),
                value: allocation.probability,
            });
        }
    }

    let total = config.traffic_split.total();

    if (total - 1.0).abs() > TRAFFIC_SUM_TOLERANCE {
        return Err(ConfigValidationError::InvalidTrafficSum(total));
    }

    if !in_open_unit_interval(config.significance_level) {
        return Err(ConfigValidationError::SignificanceLevelOutOfRange(
            config.significance_level,
        ));
    }

    if !in_open_unit_interval(config.power) {
        return Err(ConfigValidationError::PowerOutOfRange(config.power));
    }

    if config.minimum_effect_size <= 0.0 || !config.minimum_effect_size.is_finite() {
        return Err(ConfigValidationError::NonPositiveEffectSize(
            config.minimum_effect_size,
        ));
    }

    if config.min_sample_size < MIN_SAMPLE_SIZE_FLOOR {
        return Err(ConfigValidationError::MinSampleSizeTooSmall(
            config.min_sample_size,
        ));
    }

    if config.stratification_keys.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigValidationError::EmptyStratificationKey);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{ExperimentKind, MetricKind, TrafficSplit};

    fn valid_config() -> ExperimentConfig {
        ExperimentConfig::new(
            "Prompt tone test",
            ExperimentKind::PromptOptimization,
            MetricKind::Continuous,
            "satisfaction",
        )
        .with_traffic_split(TrafficSplit::even(["control", "treatment"]))
    }

    mod variant_name_validation {
        use super::*;

        #[test]
        fn test_valid_variant_names() {
            assert!(validate_variant_name("control").is_ok());
            assert!(validate_variant_name("treatment").is_ok());
            assert!(validate_variant_name("variant_b").is_ok());
            assert!(validate_variant_name("arm-2").is_ok());
        }

        #[test]
        fn test_empty_variant_name() {
            assert_eq!(
                validate_variant_name(""),
                Err(ConfigValidationError::EmptyVariantName)
            );
        }

        #[test]
        fn test_variant_name_too_long() {
            let long = "v".repeat(51);
            assert_eq!(
                validate_variant_name(&long),
                Err(ConfigValidationError::VariantNameTooLong(50))
            );
        }

        #[test]
        fn test_invalid_character() {
            assert_eq!(
                validate_variant_name("arm b"),
                Err(ConfigValidationError::InvalidVariantNameCharacter(' '))
            );
        }
    }

    mod config_validation {
        use super::*;

        #[test]
        fn test_valid_config() {
            assert!(validate_config(&valid_config()).is_ok());
        }

        #[test]
        fn test_traffic_split_over_one() {
            let config = valid_config().with_traffic_split(
                TrafficSplit::from_pairs([("control", 0.6), ("treatment", 0.6)]),
            );

            assert!(matches!(
                validate_config(&config),
                Err(ConfigValidationError::InvalidTrafficSum(_))
            ));
        }

        #[test]
        fn test_traffic_split_within_tolerance() {
            let config = valid_config().with_traffic_split(TrafficSplit::from_pairs([
                ("control", 1.0 / 3.0),
                ("a", 1.0 / 3.0),
                ("b", 1.0 / 3.0),
            ]));

            assert!(validate_config(&config).is_ok());
        }

        #[test]
        fn test_empty_traffic_split() {
            let config = valid_config().with_traffic_split(TrafficSplit::default());
            assert_eq!(
                validate_config(&config),
                Err(ConfigValidationError::EmptyTrafficSplit)
            );
        }

        #[test]
        fn test_duplicate_variant() {
            let config = valid_config().with_traffic_split(TrafficSplit::from_pairs([
                ("control", 0.5),
                ("control", 0.5),
            ]));

            assert_eq!(
                validate_config(&config),
                Err(ConfigValidationError::DuplicateVariant("control".to_string()))
            );
        }

        #[test]
        fn test_significance_level_out_of_range() {
            let config = valid_config().with_significance_level(1.5);
            assert_eq!(
                validate_config(&config),
                Err(ConfigValidationError::SignificanceLevelOutOfRange(1.5))
            );

            let config = valid_config().with_significance_level(0.0);
            assert!(validate_config(&config).is_err());
        }

        #[test]
        fn test_power_out_of_range() {
            let config = valid_config().with_power(1.0);
            assert_eq!(
                validate_config(&config),
                Err(ConfigValidationError::PowerOutOfRange(1.0))
            );
        }

        #[test]
        fn test_min_sample_size_floor() {
            let config = valid_config().with_min_sample_size(9);
            assert_eq!(
                validate_config(&config),
                Err(ConfigValidationError::MinSampleSizeTooSmall(9))
            );

            let config = valid_config().with_min_sample_size(10);
            assert!(validate_config(&config).is_ok());
        }

        #[test]
        fn test_non_positive_effect_size() {
            let config = valid_config().with_minimum_effect_size(0.0);
            assert!(matches!(
                validate_config(&config),
                Err(ConfigValidationError::NonPositiveEffectSize(_))
            ));
        }

        #[test]
        fn test_empty_stratification_key() {
            let config = valid_config().with_stratification_keys(["region", " "]);
            assert_eq!(
                validate_config(&config),
                Err(ConfigValidationError::EmptyStratificationKey)
            );
        }

        #[test]
        fn test_converts_to_configuration_error() {
            let error: DomainError = ConfigValidationError::PowerOutOfRange(2.0).into();
            assert!(matches!(error, DomainError::Configuration { .. }));
        }
    }

    #[test]
    fn test_confidence_level() {
        assert!(validate_confidence_level(0.95).is_ok());
        assert!(validate_confidence_level(1.0).is_err());
        assert!(validate_confidence_level(-0.1).is_err());
    }
}
