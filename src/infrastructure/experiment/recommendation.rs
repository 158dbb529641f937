//! Maps analysis outcomes to an actionable recommendation

use crate::domain::experiment::{Recommendation, RecommendationCategory};

/// Default power below which a null result counts as underpowered
pub const DEFAULT_POWER_THRESHOLD: f64 = 0.8;

/// Inputs the recommendation depends on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecommendationInput {
    pub is_significant: bool,
    pub practical_significance: bool,
    pub effect_size: f64,
    pub p_value: f64,
    pub power: f64,
}

/// Pick the recommendation category
///
/// NaN power never satisfies either power comparison and falls through to
/// CONTINUE MONITORING.
pub fn categorize(input: &RecommendationInput, power_threshold: f64) -> RecommendationCategory {
    match (input.is_significant, input.practical_significance) {
        (true, true) if input.effect_size > 0.0 => RecommendationCategory::Implement,
        (true, true) => RecommendationCategory::Reject,
        (true, false) => RecommendationCategory::Inconclusive,
        (false, _) if input.power < power_threshold => RecommendationCategory::InsufficientData,
        (false, _) if input.power >= power_threshold => RecommendationCategory::NoEffect,
        _ => RecommendationCategory::ContinueMonitoring,
    }
}

/// Build the category and its one-line message
pub fn recommend(input: &RecommendationInput, power_threshold: f64) -> Recommendation {
    let category = categorize(input, power_threshold);
    let p = input.p_value;
    let d = input.effect_size;
    let power = input.power;

    let message = match category {
        RecommendationCategory::Implement => format!(
            "IMPLEMENT: treatment significantly outperforms control (p={:.3}, effect size={:.2}, power={:.2})",
            p, d, power
        ),
        RecommendationCategory::Reject => format!(
            "REJECT: treatment performs significantly worse than control (p={:.3}, effect size={:.2}, power={:.2})",
            p, d, power
        ),
        RecommendationCategory::Inconclusive => format!(
            "INCONCLUSIVE: difference is statistically significant but below the practical threshold (p={:.3}, effect size={:.2})",
            p, d
        ),
        RecommendationCategory::InsufficientData => format!(
            "INSUFFICIENT DATA: no significant difference and power is only {:.2}; collect more data or target a larger effect (p={:.3}, effect size={:.2})",
            power, p, d
        ),
        RecommendationCategory::NoEffect => format!(
            "NO EFFECT: well-powered test found no significant difference (p={:.3}, effect size={:.2}, power={:.2})",
            p, d, power
        ),
        RecommendationCategory::ContinueMonitoring => format!(
            "CONTINUE MONITORING: results are not yet conclusive (p={:.3}, effect size={:.2})",
            p, d
        ),
    };

    Recommendation { category, message }
}

/// Recommendation forced when fewer observations than the configured
/// minimum sample size were collected
pub fn recommend_shortfall(input: &RecommendationInput, observed: usize, required: usize) -> Recommendation {
    Recommendation {
        category: RecommendationCategory::InsufficientData,
        message: format!(
            "INSUFFICIENT DATA: only {} of the minimum {} observations collected (p={:.3}, effect size={:.2}, power={:.2})",
            observed, required, input.p_value, input.effect_size, input.power
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(significant: bool, practical: bool, effect: f64, power: f64) -> RecommendationInput {
        RecommendationInput {
            is_significant: significant,
            practical_significance: practical,
            effect_size: effect,
            p_value: if significant { 0.001 } else { 0.4 },
            power,
        }
    }

    #[test]
    fn test_decision_table() {
        let t = DEFAULT_POWER_THRESHOLD;
        assert_eq!(categorize(&input(true, true, 0.5, 0.9), t), RecommendationCategory::Implement);
        assert_eq!(categorize(&input(true, true, -0.5, 0.9), t), RecommendationCategory::Reject);
        assert_eq!(categorize(&input(true, true, 0.0, 0.9), t), RecommendationCategory::Reject);
        assert_eq!(categorize(&input(true, false, 0.05, 0.9), t), RecommendationCategory::Inconclusive);
        assert_eq!(categorize(&input(false, false, 0.05, 0.3), t), RecommendationCategory::InsufficientData);
        assert_eq!(categorize(&input(false, true, 0.3, 0.8), t), RecommendationCategory::NoEffect);
        assert_eq!(
            categorize(&input(false, false, 0.0, f64::NAN), t),
            RecommendationCategory::ContinueMonitoring
        );
    }

    #[test]
    fn test_message_formatting() {
        let rec = recommend(
            &RecommendationInput {
                is_significant: true,
                practical_significance: true,
                effect_size: 0.48213,
                p_value: 0.000123,
                power: 0.98765,
            },
            DEFAULT_POWER_THRESHOLD,
        );

        assert_eq!(rec.category, RecommendationCategory::Implement);
        assert!(rec.message.starts_with("IMPLEMENT"));
        assert!(rec.message.contains("p=0.000"));
        assert!(rec.message.contains("effect size=0.48"));
        assert!(rec.message.contains("power=0.99"));
    }

    #[test]
    fn test_underpowered_message_mentions_power() {
        let rec = recommend(&input(false, false, 0.1, 0.25), DEFAULT_POWER_THRESHOLD);
        assert!(rec.message.starts_with("INSUFFICIENT DATA"));
        assert!(rec.message.contains("0.25"));
    }

    #[test]
    fn test_shortfall_overrides_category() {
        let rec = recommend_shortfall(&input(true, true, 0.9, 0.95), 40, 100);
        assert_eq!(rec.category, RecommendationCategory::InsufficientData);
        assert!(rec.message.contains("only 40 of the minimum 100"));
    }
}
