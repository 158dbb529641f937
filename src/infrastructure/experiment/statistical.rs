//! Statistical tests for two-arm experiments
//!
//! Every test compares a control sample against a treatment sample; signs
//! follow `treatment - control`.

use std::collections::BTreeMap;

use super::distributions::{chi_squared_sf, normal_sf, t_quantile, t_two_sided_p_value};
use crate::domain::experiment::ConfidenceInterval;
use crate::domain::DomainError;

/// Statistic, p-value and (for t-tests) the mean-difference interval
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub statistic: f64,
    pub p_value: f64,
    pub confidence_interval: Option<ConfidenceInterval>,
}

// ============================================================================
// Descriptive statistics
// ============================================================================

/// Calculate mean of a sample
pub fn mean(sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    sample.iter().sum::<f64>() / sample.len() as f64
}

/// Calculate variance of a sample (sample variance, n-1 denominator)
pub fn variance(sample: &[f64]) -> f64 {
    if sample.len() < 2 {
        return 0.0;
    }

    let m = mean(sample);
    let n = sample.len() as f64;
    sample.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1.0)
}

/// Calculate standard deviation of a sample
pub fn std_dev(sample: &[f64]) -> f64 {
    variance(sample).sqrt()
}

/// Median of a sample; 0 for an empty sample
pub fn median(sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }

    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Standardized mean difference `(mean_t - mean_c) / sqrt((sd_c^2 + sd_t^2) / 2)`
///
/// With zero spread in both arms the effect is 0 for equal means and
/// infinite (signed by the difference) otherwise.
pub fn standardized_effect_size(control: &[f64], treatment: &[f64]) -> f64 {
    let pooled_sd = ((variance(control) + variance(treatment)) / 2.0).sqrt();
    let difference = mean(treatment) - mean(control);

    if pooled_sd > 0.0 {
        difference / pooled_sd
    } else if difference == 0.0 {
        0.0
    } else {
        difference.signum() * f64::INFINITY
    }
}

fn require_two_values(control: &[f64], treatment: &[f64]) -> Result<(), DomainError> {
    if control.len() < 2 || treatment.len() < 2 {
        return Err(DomainError::invalid_data(format!(
            "Each arm needs at least 2 values, got control = {}, treatment = {}",
            control.len(),
            treatment.len()
        )));
    }
    Ok(())
}

// ============================================================================
// t-tests
// ============================================================================

fn t_statistic(difference: f64, standard_error: f64) -> f64 {
    if standard_error > 0.0 {
        difference / standard_error
    } else if difference == 0.0 {
        0.0
    } else {
        difference.signum() * f64::INFINITY
    }
}

/// Interval `diff ± t_{1-(1-level)/2, df} * se`
pub fn mean_difference_interval(
    difference: f64,
    standard_error: f64,
    df: f64,
    confidence_level: f64,
) -> Result<ConfidenceInterval, DomainError> {
    let critical = t_quantile(1.0 - (1.0 - confidence_level) / 2.0, df)?;
    let margin = critical * standard_error;

    Ok(ConfidenceInterval {
        lower: difference - margin,
        upper: difference + margin,
        level: confidence_level,
    })
}

/// Unpooled standard error `sqrt(sd_c^2/n_c + sd_t^2/n_t)`
fn unpooled_standard_error(control: &[f64], treatment: &[f64]) -> f64 {
    (variance(control) / control.len() as f64 + variance(treatment) / treatment.len() as f64)
        .sqrt()
}

/// Two-sample t-test assuming equal variances
pub fn pooled_t_test(
    control: &[f64],
    treatment: &[f64],
    confidence_level: f64,
) -> Result<TestOutcome, DomainError> {
    require_two_values(control, treatment)?;

    let n1 = control.len() as f64;
    let n2 = treatment.len() as f64;
    let df = n1 + n2 - 2.0;
    let difference = mean(treatment) - mean(control);

    let pooled_variance =
        ((n1 - 1.0) * variance(control) + (n2 - 1.0) * variance(treatment)) / df;
    let pooled_se = (pooled_variance * (1.0 / n1 + 1.0 / n2)).sqrt();

    let statistic = t_statistic(difference, pooled_se);
    let p_value = t_two_sided_p_value(statistic, df)?;

    let interval = mean_difference_interval(
        difference,
        unpooled_standard_error(control, treatment),
        df,
        confidence_level,
    )?;

    Ok(TestOutcome {
        statistic,
        p_value,
        confidence_interval: Some(interval),
    })
}

/// Welch-Satterthwaite degrees of freedom
pub fn welch_degrees_of_freedom(control: &[f64], treatment: &[f64]) -> f64 {
    let n1 = control.len() as f64;
    let n2 = treatment.len() as f64;
    let v1 = variance(control) / n1;
    let v2 = variance(treatment) / n2;

    let denominator = v1.powi(2) / (n1 - 1.0) + v2.powi(2) / (n2 - 1.0);

    if denominator > 0.0 {
        (v1 + v2).powi(2) / denominator
    } else {
        n1 + n2 - 2.0
    }
}

/// Welch's t-test for two independent samples with unequal variances
pub fn welch_t_test(
    control: &[f64],
    treatment: &[f64],
    confidence_level: f64,
) -> Result<TestOutcome, DomainError> {
    require_two_values(control, treatment)?;

    let difference = mean(treatment) - mean(control);
    let se = unpooled_standard_error(control, treatment);
    let df = welch_degrees_of_freedom(control, treatment);

    let statistic = t_statistic(difference, se);
    let p_value = t_two_sided_p_value(statistic, df)?;
    let interval = mean_difference_interval(difference, se, df, confidence_level)?;

    Ok(TestOutcome {
        statistic,
        p_value,
        confidence_interval: Some(interval),
    })
}

// ============================================================================
// Mann-Whitney U
// ============================================================================

/// Average ranks (1-based) of the values plus the tie term `sum(t^3 - t)`
fn average_ranks(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut tie_term = 0.0;
    let mut start = 0;

    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }

        let rank = (start + end + 1) as f64 / 2.0;
        for &index in &order[start..end] {
            ranks[index] = rank;
        }

        let tied = (end - start) as f64;
        tie_term += tied.powi(3) - tied;
        start = end;
    }

    (ranks, tie_term)
}

/// Arms at most this large use the exact U distribution when there are no ties
pub const MANN_WHITNEY_EXACT_MAX: usize = 8;

/// Null distribution of U for arm sizes `m` and `n`: entry `k` counts the
/// rank arrangements with `U = k`
///
/// Built from the Gaussian binomial `[m + n choose m]` one factor
/// `(1 - q^(n+i)) / (1 - q^i)` at a time.
fn u_frequencies(m: usize, n: usize) -> Vec<f64> {
    let max_u = m * n;
    let mut frequencies = vec![0.0; max_u + 1];
    frequencies[0] = 1.0;

    for i in 1..=m {
        for k in (n + i..=max_u).rev() {
            frequencies[k] -= frequencies[k - n - i];
        }
        for k in i..=max_u {
            frequencies[k] += frequencies[k - i];
        }
    }

    frequencies
}

/// Exact two-sided p-value `2 * P(U <= min(u, mn - u))`
fn exact_u_p_value(u: f64, m: usize, n: usize) -> f64 {
    let frequencies = u_frequencies(m.min(n), m.max(n));
    let total: f64 = frequencies.iter().sum();
    let lower = u.min((m * n) as f64 - u).floor() as usize;
    let tail: f64 = frequencies[..=lower].iter().sum();

    (2.0 * tail / total).min(1.0)
}

/// Mann-Whitney U test, two-sided. The statistic is U for the control arm.
///
/// Tie-free data with an arm of at most [`MANN_WHITNEY_EXACT_MAX`] values
/// gets the exact p-value; everything else uses the normal approximation
/// with tie and continuity corrections.
pub fn mann_whitney_u(control: &[f64], treatment: &[f64]) -> Result<TestOutcome, DomainError> {
    if control.is_empty() || treatment.is_empty() {
        return Err(DomainError::invalid_data(
            "Mann-Whitney U requires values in both arms",
        ));
    }

    let n1 = control.len() as f64;
    let n2 = treatment.len() as f64;
    let n = n1 + n2;

    let combined: Vec<f64> = control.iter().chain(treatment).copied().collect();
    let (ranks, tie_term) = average_ranks(&combined);

    let rank_sum_control: f64 = ranks[..control.len()].iter().sum();
    let u_control = rank_sum_control - n1 * (n1 + 1.0) / 2.0;

    let mu = n1 * n2 / 2.0;
    let sigma = (n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)))).sqrt();

    let exact = tie_term == 0.0 && control.len().min(treatment.len()) <= MANN_WHITNEY_EXACT_MAX;

    let p_value = if exact {
        exact_u_p_value(u_control, control.len(), treatment.len())
    } else if sigma > 0.0 {
        let z = ((u_control - mu).abs() - 0.5).max(0.0) / sigma;
        (2.0 * normal_sf(z)).min(1.0)
    } else {
        1.0
    };

    Ok(TestOutcome {
        statistic: u_control,
        p_value,
        confidence_interval: None,
    })
}

// ============================================================================
// Chi-squared
// ============================================================================

/// Category x arm counts; columns are `[control, treatment]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContingencyTable {
    counts: BTreeMap<String, [u64; 2]>,
}

impl ContingencyTable {
    /// Count each distinct category per arm
    pub fn from_arms<S: AsRef<str>>(control: &[S], treatment: &[S]) -> Self {
        let mut counts: BTreeMap<String, [u64; 2]> = BTreeMap::new();

        for (column, arm) in [control, treatment].into_iter().enumerate() {
            for category in arm {
                counts.entry(category.as_ref().to_string()).or_default()[column] += 1;
            }
        }

        Self { counts }
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    pub fn rows(&self) -> usize {
        self.counts.len()
    }

    pub fn count(&self, category: &str, column: usize) -> u64 {
        self.counts.get(category).map_or(0, |row| row[column])
    }

    pub fn total(&self) -> u64 {
        self.counts.values().map(|row| row[0] + row[1]).sum()
    }
}

/// Pearson chi-squared test of independence
///
/// Applies the Yates continuity correction when the table has one degree of
/// freedom. A table with a single category yields statistic 0 and p = 1.
pub fn chi_squared(table: &ContingencyTable) -> Result<TestOutcome, DomainError> {
    let column_totals = table
        .counts
        .values()
        .fold([0u64; 2], |acc, row| [acc[0] + row[0], acc[1] + row[1]]);

    if column_totals.iter().any(|t| *t == 0) {
        return Err(DomainError::invalid_data(
            "Chi-squared test requires observations in both arms",
        ));
    }

    if table.rows() < 2 {
        return Ok(TestOutcome {
            statistic: 0.0,
            p_value: 1.0,
            confidence_interval: None,
        });
    }

    let total = table.total() as f64;
    let df = (table.rows() - 1) as f64;
    let yates = table.rows() == 2;

    let mut statistic = 0.0;
    for row in table.counts.values() {
        let row_total = (row[0] + row[1]) as f64;

        for (observed, column_total) in row.iter().zip(column_totals) {
            let expected = row_total * column_total as f64 / total;
            let mut deviation = (*observed as f64 - expected).abs();
            if yates {
                deviation = (deviation - 0.5).max(0.0);
            }
            statistic += deviation * deviation / expected;
        }
    }

    Ok(TestOutcome {
        statistic,
        p_value: chi_squared_sf(statistic, df)?,
        confidence_interval: None,
    })
}

/// Cramér's V for a table with two columns
pub fn cramers_v(statistic: f64, table: &ContingencyTable) -> f64 {
    let total = table.total() as f64;
    let min_dim = table.rows().min(2) as f64 - 1.0;

    if total > 0.0 && min_dim > 0.0 {
        (statistic / (total * min_dim)).sqrt()
    } else {
        0.0
    }
}
