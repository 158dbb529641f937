//! Assumption checks run before choosing a parametric test

use std::f64::consts::PI;

use super::distributions::{f_sf, normal_cdf, normal_quantile, normal_sf};
use super::statistical::{mean, median, std_dev};
use crate::domain::DomainError;

/// Result of an assumption check: statistic plus p-value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckOutcome {
    pub statistic: f64,
    pub p_value: f64,
}

impl CheckOutcome {
    fn accept() -> Self {
        Self {
            statistic: 1.0,
            p_value: 1.0,
        }
    }
}

/// Evaluate `c[0] + c[1] x + c[2] x^2 + ...`
fn poly(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

// ============================================================================
// Shapiro-Wilk
// ============================================================================

const SW_C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
const SW_C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
const SW_C3: [f64; 4] = [0.5440, -0.39978, 0.025054, -6.714e-4];
const SW_C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
const SW_C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
const SW_C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
const SW_GAMMA: [f64; 2] = [-2.273, 0.459];

/// Royston's approximation of the Shapiro-Wilk coefficients for the lower
/// half of the order statistics
fn shapiro_coefficients(n: usize) -> Vec<f64> {
    let half = n / 2;

    if n == 3 {
        return vec![std::f64::consts::FRAC_1_SQRT_2];
    }

    let an = n as f64;
    let m: Vec<f64> = (1..=half)
        .map(|i| normal_quantile((i as f64 - 0.375) / (an + 0.25)))
        .collect();

    let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
    let ssumm2 = summ2.sqrt();
    let rsn = 1.0 / an.sqrt();

    let a1 = poly(&SW_C1, rsn) - m[0] / ssumm2;
    let mut a = vec![0.0; half];
    a[0] = a1;

    let (fac, first_scaled) = if n > 5 {
        let a2 = -m[1] / ssumm2 + poly(&SW_C2, rsn);
        a[1] = a2;
        let fac = ((summ2 - 2.0 * m[0].powi(2) - 2.0 * m[1].powi(2))
            / (1.0 - 2.0 * a1.powi(2) - 2.0 * a2.powi(2)))
        .sqrt();
        (fac, 2)
    } else {
        let fac = ((summ2 - 2.0 * m[0].powi(2)) / (1.0 - 2.0 * a1.powi(2))).sqrt();
        (fac, 1)
    };

    for (ai, mi) in a.iter_mut().zip(&m).skip(first_scaled) {
        *ai = -mi / fac;
    }

    a
}

/// Shapiro-Wilk W test for normality
///
/// Samples with fewer than three values, or with zero range, are treated as
/// not rejecting normality.
pub fn shapiro_wilk(sample: &[f64]) -> CheckOutcome {
    let n = sample.len();
    if n < 3 {
        return CheckOutcome::accept();
    }

    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);

    let range = sorted[n - 1] - sorted[0];
    if range <= f64::EPSILON * sorted[n - 1].abs().max(1.0) {
        return CheckOutcome::accept();
    }

    let a = shapiro_coefficients(n);
    let m = mean(&sorted);
    let ss: f64 = sorted.iter().map(|x| (x - m).powi(2)).sum();

    let numerator: f64 = a
        .iter()
        .enumerate()
        .map(|(i, ai)| ai * (sorted[n - 1 - i] - sorted[i]))
        .sum();

    let w = (numerator.powi(2) / ss).min(1.0);

    CheckOutcome {
        statistic: w,
        p_value: shapiro_p_value(w, n),
    }
}

fn shapiro_p_value(w: f64, n: usize) -> f64 {
    let an = n as f64;

    if n == 3 {
        let p = 6.0 / PI * (w.sqrt().asin() - PI / 3.0);
        return p.clamp(0.0, 1.0);
    }

    if w >= 1.0 {
        return 1.0;
    }

    let mut y = (1.0 - w).ln();

    let (m, s) = if n <= 11 {
        let gamma = poly(&SW_GAMMA, an);
        if y >= gamma {
            return 1e-99;
        }
        y = -(gamma - y).ln();
        (poly(&SW_C3, an), poly(&SW_C4, an).exp())
    } else {
        let ln_n = an.ln();
        (poly(&SW_C5, ln_n), poly(&SW_C6, ln_n).exp())
    };

    normal_sf((y - m) / s).clamp(0.0, 1.0)
}

// ============================================================================
// Kolmogorov-Smirnov
// ============================================================================

/// Kolmogorov distribution tail `Q(lambda) = 2 sum (-1)^(j-1) exp(-2 j^2 lambda^2)`
fn kolmogorov_tail(lambda: f64) -> f64 {
    const EPS1: f64 = 1e-3;
    const EPS2: f64 = 1e-8;

    let a2 = -2.0 * lambda * lambda;
    let mut factor = 2.0;
    let mut sum = 0.0;
    let mut previous_term = 0.0;

    for j in 1..=100 {
        let j = f64::from(j);
        let term = factor * (a2 * j * j).exp();
        sum += term;

        if term.abs() <= EPS1 * previous_term || term.abs() <= EPS2 * sum {
            return sum.clamp(0.0, 1.0);
        }

        factor = -factor;
        previous_term = term.abs();
    }

    // Series failed to converge: lambda is tiny and the tail is 1
    1.0
}

/// One-sample Kolmogorov-Smirnov test against a normal distribution with the
/// sample's own mean and standard deviation
pub fn kolmogorov_smirnov(sample: &[f64]) -> CheckOutcome {
    let n = sample.len();
    if n < 3 {
        return CheckOutcome::accept();
    }

    let mu = mean(sample);
    let sigma = std_dev(sample);
    if sigma <= 0.0 || !sigma.is_finite() {
        return CheckOutcome::accept();
    }

    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);

    let nf = n as f64;
    let d = sorted
        .iter()
        .enumerate()
        .map(|(i, x)| {
            let cdf = normal_cdf((x - mu) / sigma);
            let above = (i as f64 + 1.0) / nf - cdf;
            let below = cdf - i as f64 / nf;
            above.max(below)
        })
        .fold(0.0, f64::max);

    let sqrt_n = nf.sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * d;

    CheckOutcome {
        statistic: d,
        p_value: kolmogorov_tail(lambda),
    }
}

/// Normality check: Shapiro-Wilk below `shapiro_max_sample`, KS otherwise
pub fn normality_test(sample: &[f64], shapiro_max_sample: usize) -> CheckOutcome {
    if sample.len() < shapiro_max_sample {
        shapiro_wilk(sample)
    } else {
        kolmogorov_smirnov(sample)
    }
}

// ============================================================================
// Levene
// ============================================================================

/// Levene test for equal variances, centred on group medians
/// (Brown-Forsythe variant)
pub fn levene(groups: &[&[f64]]) -> Result<CheckOutcome, DomainError> {
    let k = groups.len();
    let total: usize = groups.iter().map(|g| g.len()).sum();

    if k < 2 || groups.iter().any(|g| g.is_empty()) || total <= k {
        return Err(DomainError::invalid_data(
            "Levene test requires at least two non-empty groups and more values than groups",
        ));
    }

    let deviations: Vec<Vec<f64>> = groups
        .iter()
        .map(|g| {
            let center = median(g);
            g.iter().map(|x| (x - center).abs()).collect()
        })
        .collect();

    let group_means: Vec<f64> = deviations.iter().map(|z| mean(z)).collect();
    let grand_mean = deviations.iter().flatten().sum::<f64>() / total as f64;

    let between: f64 = deviations
        .iter()
        .zip(&group_means)
        .map(|(z, zm)| z.len() as f64 * (zm - grand_mean).powi(2))
        .sum();

    let within: f64 = deviations
        .iter()
        .zip(&group_means)
        .map(|(z, zm)| z.iter().map(|v| (v - zm).powi(2)).sum::<f64>())
        .sum();

    let df1 = (k - 1) as f64;
    let df2 = (total - k) as f64;

    if within <= 0.0 {
        return Ok(if between <= 0.0 {
            CheckOutcome {
                statistic: 0.0,
                p_value: 1.0,
            }
        } else {
            CheckOutcome {
                statistic: f64::INFINITY,
                p_value: 0.0,
            }
        });
    }

    let statistic = (df2 / df1) * between / within;

    Ok(CheckOutcome {
        statistic,
        p_value: f_sf(statistic, df1, df2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Perfectly normal-shaped sample built from quantiles
    fn normal_quantile_sample(n: usize, mu: f64, sigma: f64) -> Vec<f64> {
        (1..=n)
            .map(|i| mu + sigma * normal_quantile((i as f64 - 0.5) / n as f64))
            .collect()
    }

    /// Strongly right-skewed sample
    fn skewed_sample(n: usize) -> Vec<f64> {
        (0..n).map(|i| (i as f64 / 3.0).exp()).collect()
    }

    mod shapiro_tests {
        use super::*;

        #[test]
        fn test_three_equally_spaced_points() {
            let outcome = shapiro_wilk(&[1.0, 2.0, 3.0]);
            assert!((outcome.statistic - 1.0).abs() < 1e-9);
            assert!((outcome.p_value - 1.0).abs() < 1e-9);
        }

        #[test]
        fn test_coefficients_are_normalised() {
            for n in [4, 5, 10, 25, 49] {
                let a = shapiro_coefficients(n);
                let sum_sq = 2.0 * a.iter().map(|v| v * v).sum::<f64>();
                assert!((sum_sq - 1.0).abs() < 1e-3, "n = {}: {}", n, sum_sq);
                assert!(a.iter().all(|v| *v > 0.0));
            }
        }

        #[test]
        fn test_normal_sample_not_rejected() {
            let outcome = shapiro_wilk(&normal_quantile_sample(30, 10.0, 2.0));
            assert!(outcome.statistic > 0.95);
            assert!(outcome.p_value > 0.5, "p = {}", outcome.p_value);
        }

        #[test]
        fn test_small_normal_sample_not_rejected() {
            let outcome = shapiro_wilk(&normal_quantile_sample(8, 0.0, 1.0));
            assert!(outcome.p_value > 0.3, "p = {}", outcome.p_value);
        }

        #[test]
        fn test_skewed_sample_rejected() {
            let outcome = shapiro_wilk(&skewed_sample(30));
            assert!(outcome.p_value < 0.01, "p = {}", outcome.p_value);
        }

        #[test]
        fn test_degenerate_samples() {
            assert_eq!(shapiro_wilk(&[1.0, 2.0]).p_value, 1.0);
            assert_eq!(shapiro_wilk(&[4.0; 10]).p_value, 1.0);
        }
    }

    mod ks_tests {
        use super::*;

        #[test]
        fn test_normal_sample_not_rejected() {
            let outcome = kolmogorov_smirnov(&normal_quantile_sample(200, 0.75, 0.15));
            assert!(outcome.statistic < 0.05);
            assert!(outcome.p_value > 0.5, "p = {}", outcome.p_value);
        }

        #[test]
        fn test_skewed_sample_rejected() {
            let outcome = kolmogorov_smirnov(&skewed_sample(100));
            assert!(outcome.p_value < 0.01, "p = {}", outcome.p_value);
        }

        #[test]
        fn test_kolmogorov_tail_bounds() {
            assert_eq!(kolmogorov_tail(0.0), 1.0);
            assert!(kolmogorov_tail(3.0) < 1e-6);
            assert!((kolmogorov_tail(1.358) - 0.05).abs() < 1e-3);
        }
    }

    #[test]
    fn test_normality_dispatch() {
        let small = normal_quantile_sample(20, 0.0, 1.0);
        assert_eq!(normality_test(&small, 50), shapiro_wilk(&small));

        let large = normal_quantile_sample(60, 0.0, 1.0);
        assert_eq!(normality_test(&large, 50), kolmogorov_smirnov(&large));
    }

    mod levene_tests {
        use super::*;

        #[test]
        fn test_equal_spread() {
            let a = normal_quantile_sample(40, 0.0, 1.0);
            let b = normal_quantile_sample(40, 5.0, 1.0);
            let outcome = levene(&[&a, &b]).unwrap();
            assert!(outcome.p_value > 0.9, "p = {}", outcome.p_value);
        }

        #[test]
        fn test_unequal_spread() {
            let a = normal_quantile_sample(40, 0.0, 1.0);
            let b = normal_quantile_sample(40, 0.0, 4.0);
            let outcome = levene(&[&a, &b]).unwrap();
            assert!(outcome.p_value < 0.001, "p = {}", outcome.p_value);
        }

        #[test]
        fn test_constant_groups() {
            let outcome = levene(&[&[1.0, 1.0, 1.0], &[2.0, 2.0, 2.0]]).unwrap();
            assert_eq!(outcome.p_value, 1.0);
        }

        #[test]
        fn test_requires_two_groups() {
            assert!(levene(&[&[1.0, 2.0]]).is_err());
        }
    }
}
