//! Distribution functions used by the analyzer
//!
//! Central distributions come from `statrs`; the non-central t CDF is
//! evaluated with the AS 243 series.

use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, StudentsT};
use statrs::function::beta::checked_beta_reg;
use statrs::function::erf::{erfc, erfc_inv};
use statrs::function::gamma::ln_gamma;
use std::f64::consts::{FRAC_2_PI, SQRT_2};

use crate::domain::DomainError;

/// Convergence bound for the non-central t series
const NCT_ERROR_BOUND: f64 = 1e-12;

/// Iteration cap for the non-central t series
const NCT_MAX_ITERATIONS: u32 = 2000;

/// Beyond this non-centrality the series underflows; a normal
/// approximation is used instead
const NCT_LARGE_NONCENTRALITY: f64 = 37.62;

/// Standard normal cumulative distribution function
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal upper tail, `1 - normal_cdf(x)` without cancellation
pub fn normal_sf(x: f64) -> f64 {
    0.5 * erfc(x / SQRT_2)
}

/// Standard normal quantile function
///
/// Returns -inf/+inf at 0/1 and NaN outside [0, 1].
pub fn normal_quantile(p: f64) -> f64 {
    if !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    -SQRT_2 * erfc_inv(2.0 * p)
}

fn students_t(df: f64) -> Result<StudentsT, DomainError> {
    StudentsT::new(0.0, 1.0, df).map_err(|e| {
        DomainError::internal(format!("Invalid t distribution (df = {}): {}", df, e))
    })
}

/// Quantile of the central t distribution
pub fn t_quantile(p: f64, df: f64) -> Result<f64, DomainError> {
    Ok(students_t(df)?.inverse_cdf(p))
}

/// Two-sided p-value of a t statistic
pub fn t_two_sided_p_value(t: f64, df: f64) -> Result<f64, DomainError> {
    if t.is_nan() {
        return Ok(f64::NAN);
    }
    if t.is_infinite() {
        return Ok(0.0);
    }
    let p = 2.0 * students_t(df)?.sf(t.abs());
    Ok(p.clamp(0.0, 1.0))
}

/// Upper tail of the chi-squared distribution
pub fn chi_squared_sf(x: f64, df: f64) -> Result<f64, DomainError> {
    let dist = ChiSquared::new(df).map_err(|e| {
        DomainError::internal(format!("Invalid chi-squared distribution (df = {}): {}", df, e))
    })?;
    Ok(dist.sf(x).clamp(0.0, 1.0))
}

/// Upper tail of the F distribution
pub fn f_sf(x: f64, df1: f64, df2: f64) -> Result<f64, DomainError> {
    let dist = FisherSnedecor::new(df1, df2).map_err(|e| {
        DomainError::internal(format!(
            "Invalid F distribution (df = {}, {}): {}",
            df1, df2, e
        ))
    })?;
    Ok(dist.sf(x).clamp(0.0, 1.0))
}

/// CDF of the non-central t distribution with `df` degrees of freedom and
/// non-centrality `delta`
pub fn noncentral_t_cdf(t: f64, df: f64, delta: f64) -> Result<f64, DomainError> {
    if df.is_nan() || df <= 0.0 || t.is_nan() || delta.is_nan() {
        return Err(DomainError::internal(format!(
            "Invalid non-central t arguments: t = {}, df = {}, delta = {}",
            t, df, delta
        )));
    }

    if t.is_infinite() {
        return Ok(if t > 0.0 { 1.0 } else { 0.0 });
    }

    if delta.abs() > NCT_LARGE_NONCENTRALITY {
        let s = 1.0 / (4.0 * df);
        let z = (t * (1.0 - s) - delta) / (1.0 + t * t * 2.0 * s).sqrt();
        return Ok(normal_cdf(z));
    }

    // F(t; df, delta) = 1 - F(-t; df, -delta)
    if t < 0.0 {
        let upper = nct_cdf_non_negative(-t, df, -delta)?;
        return Ok((1.0 - upper).clamp(0.0, 1.0));
    }

    nct_cdf_non_negative(t, df, delta)
}

fn nct_cdf_non_negative(t: f64, df: f64, delta: f64) -> Result<f64, DomainError> {
    let base = normal_cdf(-delta);

    if t == 0.0 {
        return Ok(base);
    }

    let x = t * t / (t * t + df);
    let lambda = delta * delta;

    let mut p = 0.5 * (-0.5 * lambda).exp();
    let mut q = FRAC_2_PI.sqrt() * p * delta;
    let mut s = 0.5 - p;
    if s < 1e-7 {
        s = -0.5 * (-0.5 * lambda).exp_m1();
    }

    let mut a = 0.5;
    let b = 0.5 * df;
    let rxb = (1.0 - x).powf(b);
    let ln_beta = ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b);

    let mut xodd = checked_beta_reg(a, b, x)
        .map_err(|e| DomainError::internal(format!("Incomplete beta failed: {}", e)))?;
    let mut godd = 2.0 * rxb * (a * x.ln() - ln_beta).exp();
    let mut xeven = if b * x <= f64::EPSILON { b * x } else { 1.0 - rxb };
    let mut geven = b * x * rxb;
    let mut tnc = p * xodd + q * xeven;

    for iteration in 1..=NCT_MAX_ITERATIONS {
        let it = f64::from(iteration);

        a += 1.0;
        xodd -= godd;
        xeven -= geven;
        godd *= x * (a + b - 1.0) / a;
        geven *= x * (a + b - 0.5) / (a + 0.5);
        p *= lambda / (2.0 * it);
        q *= lambda / (2.0 * it + 1.0);
        tnc += p * xodd + q * xeven;
        s -= p;

        if s <= 0.0 && iteration > 1 {
            break;
        }

        let error_bound = 2.0 * s * (xodd - godd);
        if error_bound.abs() < NCT_ERROR_BOUND {
            break;
        }
    }

    Ok((tnc + base).clamp(0.0, 1.0))
}

/// Achieved power of a two-sided two-sample t-test
///
/// Uses the harmonic-mean sample size `2 / (1/n_c + 1/n_t)`, non-centrality
/// `|d| * sqrt(n / 2)` and `df = n_c + n_t - 2`.
pub fn two_sample_power(
    effect_size: f64,
    n_control: usize,
    n_treatment: usize,
    alpha: f64,
) -> Result<f64, DomainError> {
    if effect_size.is_nan() || n_control == 0 || n_treatment == 0 {
        return Ok(f64::NAN);
    }

    let df = (n_control + n_treatment) as f64 - 2.0;
    if df <= 0.0 {
        return Ok(f64::NAN);
    }

    // Perfectly separated arms
    if effect_size.is_infinite() {
        return Ok(1.0);
    }

    let pooled_n = 2.0 / (1.0 / n_control as f64 + 1.0 / n_treatment as f64);
    let noncentrality = effect_size.abs() * (pooled_n / 2.0).sqrt();
    let t_crit = t_quantile(1.0 - alpha / 2.0, df)?;

    let power = 1.0 - noncentral_t_cdf(t_crit, df, noncentrality)?
        + noncentral_t_cdf(-t_crit, df, noncentrality)?;

    Ok(power.clamp(0.0, 1.0))
}

/// Per-arm sample size needed to detect `effect_size` with the given
/// significance level and power: `n = 2 ((z_{1-a/2} + z_{1-b}) / d)^2`
pub fn required_sample_size(alpha: f64, power: f64, effect_size: f64) -> usize {
    let z_alpha = normal_quantile(1.0 - alpha / 2.0);
    let z_beta = normal_quantile(power);
    let n = 2.0 * ((z_alpha + z_beta) / effect_size).powi(2);

    if n.is_finite() && n > 0.0 {
        n.ceil() as usize
    } else {
        0
    }
}
