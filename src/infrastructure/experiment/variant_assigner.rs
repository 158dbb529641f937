//! Deterministic variant assignment
//!
//! Ensures the same subject (and the same stratification context) always
//! gets assigned to the same variant of a given experiment, without keeping
//! an assignment table.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::domain::experiment::{Experiment, TrafficSplit};

/// Number of buckets the hash is reduced to before mapping onto the split
pub const ASSIGNMENT_BUCKETS: u64 = 10_000;

/// Value used for stratification keys missing from the context
pub const UNKNOWN_STRATUM: &str = "unknown";

/// Variant returned whenever the walk over the split finds nothing
pub const FALLBACK_VARIANT: &str = "control";

/// Hash-based assigner for experiment variants
#[derive(Debug, Clone, Copy, Default)]
pub struct VariantAssigner;

impl VariantAssigner {
    /// Build the hash input: experiment id, subject id, then the context
    /// values of the stratification keys in configured order
    pub fn assignment_key(
        experiment_id: &str,
        subject_id: &str,
        stratification_keys: &[String],
        context: &BTreeMap<String, String>,
    ) -> String {
        let mut key = format!("{}:{}", experiment_id, subject_id);

        for strat_key in stratification_keys {
            let value = context
                .get(strat_key)
                .map(String::as_str)
                .unwrap_or(UNKNOWN_STRATUM);
            key.push(':');
            key.push_str(value);
        }

        key
    }

    /// Map a key onto a ratio in [0, 1) with 1e-4 resolution
    ///
    /// The bucket is the whole 256-bit digest, read as a big-endian
    /// integer, modulo [`ASSIGNMENT_BUCKETS`].
    pub fn hash_ratio(key: &str) -> f64 {
        let digest = Sha256::digest(key.as_bytes());
        let bucket = digest
            .iter()
            .fold(0u64, |acc, &byte| (acc * 256 + u64::from(byte)) % ASSIGNMENT_BUCKETS);

        bucket as f64 / ASSIGNMENT_BUCKETS as f64
    }

    /// Pick the variant whose cumulative probability first reaches `ratio`
    pub fn variant_for(split: &TrafficSplit, ratio: f64) -> String {
        split
            .variant_for_ratio(ratio)
            .unwrap_or(FALLBACK_VARIANT)
            .to_string()
    }

    /// Assign a subject to a variant of an experiment
    ///
    /// Experiments that are not running always yield the fallback variant.
    pub fn assign(
        experiment: &Experiment,
        subject_id: &str,
        context: &BTreeMap<String, String>,
    ) -> String {
        if !experiment.status().is_running() {
            return FALLBACK_VARIANT.to_string();
        }

        let config = experiment.config();
        let key = Self::assignment_key(
            experiment.id().as_str(),
            subject_id,
            &config.stratification_keys,
            context,
        );

        Self::variant_for(&config.traffic_split, Self::hash_ratio(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{
        ExperimentConfig, ExperimentId, ExperimentKind, MetricKind,
    };
    use proptest::prelude::*;

    fn running_experiment(split: TrafficSplit, strat_keys: &[&str]) -> Experiment {
        let config = ExperimentConfig::new(
            "Assignment test",
            ExperimentKind::FeatureRollout,
            MetricKind::Categorical,
            "converted",
        )
        .with_traffic_split(split)
        .with_stratification_keys(strat_keys.iter().copied());

        let mut exp = Experiment::new(ExperimentId::from("exp-assign"), config, 100);
        exp.start().unwrap();
        exp
    }

    fn context(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_hash_ratio_deterministic_and_in_range() {
        let first = VariantAssigner::hash_ratio("exp-1:user-1");

        for _ in 0..100 {
            assert_eq!(VariantAssigner::hash_ratio("exp-1:user-1"), first);
        }
        assert!((0.0..1.0).contains(&first));
    }

    #[test]
    fn test_hash_ratio_uses_full_digest() {
        // Bucket of the full SHA-256 integer; the leading 8 bytes alone give 5971
        assert_eq!(VariantAssigner::hash_ratio("exp-1:user-1"), 0.2035);
        assert_eq!(VariantAssigner::hash_ratio("exp-assign:user-42"), 0.3859);
    }

    #[test]
    fn test_assignment_key_uses_unknown_for_missing_keys() {
        let keys = vec!["region".to_string(), "tier".to_string()];
        let key = VariantAssigner::assignment_key(
            "exp-1",
            "user-1",
            &keys,
            &context(&[("tier", "gold")]),
        );
        assert_eq!(key, "exp-1:user-1:unknown:gold");
    }

    #[test]
    fn test_assignment_ignores_unconfigured_context() {
        let exp = running_experiment(TrafficSplit::even(["control", "treatment"]), &[]);

        let a = VariantAssigner::assign(&exp, "user-42", &context(&[("region", "eu")]));
        let b = VariantAssigner::assign(&exp, "user-42", &context(&[("region", "us")]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_stratified_assignment_is_stable() {
        let exp = running_experiment(TrafficSplit::even(["control", "treatment"]), &["region"]);
        let ctx = context(&[("region", "eu"), ("device", "mobile")]);
        let first = VariantAssigner::assign(&exp, "user-7", &ctx);

        for _ in 0..50 {
            assert_eq!(VariantAssigner::assign(&exp, "user-7", &ctx), first);
        }

        // Unrelated context fields do not change the bucket
        let other = context(&[("region", "eu"), ("device", "desktop")]);
        assert_eq!(VariantAssigner::assign(&exp, "user-7", &other), first);
    }

    #[test]
    fn test_split_adherence() {
        let exp = running_experiment(
            TrafficSplit::from_pairs([("control", 0.5), ("treatment", 0.5)]),
            &[],
        );
        let empty = BTreeMap::new();

        let treatment = (0..100_000)
            .filter(|i| VariantAssigner::assign(&exp, &format!("user-{}", i), &empty) == "treatment")
            .count();

        let share = treatment as f64 / 100_000.0;
        assert!((share - 0.5).abs() < 0.01, "treatment share was {}", share);
    }

    #[test]
    fn test_uneven_split_adherence() {
        let exp = running_experiment(
            TrafficSplit::from_pairs([("control", 0.8), ("treatment", 0.2)]),
            &[],
        );
        let empty = BTreeMap::new();

        let treatment = (0..20_000)
            .filter(|i| VariantAssigner::assign(&exp, &format!("user-{}", i), &empty) == "treatment")
            .count();

        let share = treatment as f64 / 20_000.0;
        assert!((share - 0.2).abs() < 0.02, "treatment share was {}", share);
    }

    #[test]
    fn test_not_running_returns_control() {
        let config = ExperimentConfig::new(
            "Draft",
            ExperimentKind::FeatureRollout,
            MetricKind::Categorical,
            "converted",
        )
        .with_traffic_split(TrafficSplit::from_pairs([("treatment", 1.0)]));
        let mut exp = Experiment::new(ExperimentId::from("exp-draft"), config, 100);
        let empty = BTreeMap::new();

        assert_eq!(VariantAssigner::assign(&exp, "user-1", &empty), "control");

        exp.start().unwrap();
        assert_eq!(VariantAssigner::assign(&exp, "user-1", &empty), "treatment");

        exp.pause().unwrap();
        assert_eq!(VariantAssigner::assign(&exp, "user-1", &empty), "control");
    }

    #[test]
    fn test_fallback_when_walk_finds_nothing() {
        let split = TrafficSplit::from_pairs([("a", 0.3), ("b", 0.3)]);
        assert_eq!(VariantAssigner::variant_for(&split, 0.99), "control");
        assert_eq!(VariantAssigner::variant_for(&split, 0.1), "a");
    }

    proptest! {
        #[test]
        fn prop_assignment_is_deterministic(
            subject in "[a-zA-Z0-9_-]{1,32}",
            region in proptest::option::of("[a-z]{1,8}"),
            tier in "[a-z]{1,8}",
        ) {
            let exp = running_experiment(
                TrafficSplit::from_pairs([("control", 0.3), ("treatment", 0.7)]),
                &["region", "tier"],
            );
            let mut ctx = context(&[("tier", tier.as_str())]);
            if let Some(region) = region {
                ctx.insert("region".to_string(), region);
            }

            let first = VariantAssigner::assign(&exp, &subject, &ctx);
            prop_assert_eq!(VariantAssigner::assign(&exp, &subject, &ctx), first);
        }

        #[test]
        fn prop_hash_ratio_in_unit_interval(key in ".{0,64}") {
            let ratio = VariantAssigner::hash_ratio(&key);
            prop_assert!((0.0..1.0).contains(&ratio));
        }

        #[test]
        fn prop_assignment_is_a_split_variant_or_control(
            subject in "[a-z0-9]{1,24}",
            first_share in 0.0f64..=1.0,
            partial in any::<bool>(),
        ) {
            // A partial split leaves part of the range for the fallback
            let second_share = if partial { (1.0 - first_share) / 2.0 } else { 1.0 - first_share };
            let split = TrafficSplit::from_pairs([("blue", first_share), ("green", second_share)]);
            let exp = running_experiment(split.clone(), &[]);

            let variant = VariantAssigner::assign(&exp, &subject, &BTreeMap::new());
            prop_assert!(split.contains(&variant) || variant == FALLBACK_VARIANT);
        }
    }
}
