//! Paired significance testing.
//!
//! Implements the paired two-sided Student's t-test. The p-value comes from
//! the regularized incomplete beta function evaluated with a Lentz-style
//! continued fraction, which is exact enough for the page counts this
//! pipeline sees.

use crate::error::{BenchError, BenchResult};

/// Result of a paired t-test.
#[derive(Debug, Clone)]
pub struct TTestResult {
    /// t statistic of the mean paired difference.
    pub statistic: f64,
    /// Degrees of freedom (n - 1).
    pub df: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Number of pairs.
    pub n: usize,
}

/// Paired two-sided t-test between equal-length observation vectors.
///
/// Degenerate zero-variance differences are handled explicitly: identical
/// inputs give t = 0, p = 1; a constant non-zero difference gives p = 0.
pub fn paired_t_test(a: &[f64], b: &[f64]) -> BenchResult<TTestResult> {
    if a.len() != b.len() {
        return Err(BenchError::Stats {
            message: format!("paired samples differ in length: {} vs {}", a.len(), b.len()),
        });
    }
    let n = a.len();
    if n < 2 {
        return Err(BenchError::Stats {
            message: format!("need at least 2 pairs, got {n}"),
        });
    }

    let diffs: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x - y).collect();
    let mean = diffs.iter().sum::<f64>() / n as f64;
    let var = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    let df = n as f64 - 1.0;

    if var <= f64::EPSILON {
        let (statistic, p_value) = if mean.abs() <= f64::EPSILON {
            (0.0, 1.0)
        } else {
            (f64::INFINITY * mean.signum(), 0.0)
        };
        return Ok(TTestResult {
            statistic,
            df,
            p_value,
            n,
        });
    }

    let statistic = mean / (var / n as f64).sqrt();
    let x = df / (df + statistic * statistic);
    let p_value = regularized_incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0);
    Ok(TTestResult {
        statistic,
        df,
        p_value,
        n,
    })
}

/// Regularized incomplete beta function I_x(a, b).
fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    // The continued fraction converges fastest for x < (a+1)/(a+b+2);
    // otherwise use the symmetry I_x(a,b) = 1 - I_{1-x}(b,a).
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - regularized_incomplete_beta(b, a, 1.0 - x)
    }
}

/// Modified Lentz continued fraction for the incomplete beta function.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const TINY: f64 = 1e-300;
    const EPS: f64 = 1e-14;

    let mut c = 1.0;
    let mut d = 1.0 - (a + b) * x / (a + 1.0);
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut result = d;

    for m in 1..=MAX_ITER {
        let m_f = m as f64;
        // Even step.
        let numerator = m_f * (b - m_f) * x / ((a + 2.0 * m_f - 1.0) * (a + 2.0 * m_f));
        d = 1.0 + numerator * d;
        if d.abs() < TINY {
            d = TINY;
        }
        d = 1.0 / d;
        c = 1.0 + numerator / c;
        if c.abs() < TINY {
            c = TINY;
        }
        result *= d * c;
        // Odd step.
        let numerator =
            -(a + m_f) * (a + b + m_f) * x / ((a + 2.0 * m_f) * (a + 2.0 * m_f + 1.0));
        d = 1.0 + numerator * d;
        if d.abs() < TINY {
            d = TINY;
        }
        d = 1.0 / d;
        c = 1.0 + numerator / c;
        if c.abs() < TINY {
            c = TINY;
        }
        let delta = d * c;
        result *= delta;
        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    result
}

/// Natural log of the gamma function (Lanczos approximation).
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 6] = [
        76.18009172947146,
        -86.50532032941677,
        24.01409824083091,
        -1.231739572450155,
        0.1208650973866179e-2,
        -0.5395239384953e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000000000190015;
    for c in COEFFS {
        y += 1.0;
        series += c / y;
    }
    -tmp + (2.5066282746310005 * series / x).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_samples_not_significant() {
        let a = vec![0.4, 0.6, 0.5, 0.7];
        let result = paired_t_test(&a, &a).unwrap();
        assert_eq!(result.statistic, 0.0);
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn test_constant_shift_is_maximally_significant() {
        let a = vec![0.5, 0.6, 0.7];
        let b = vec![0.4, 0.5, 0.6];
        let result = paired_t_test(&a, &b).unwrap();
        assert!(result.statistic.is_infinite() && result.statistic > 0.0);
        assert_eq!(result.p_value, 0.0);
    }

    #[test]
    fn test_known_value() {
        // Differences [1, 2, 3, 4]: mean 2.5, t = 3.873, df = 3,
        // two-sided p ≈ 0.0305.
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let b = vec![0.0, 0.0, 0.0, 0.0];
        let result = paired_t_test(&a, &b).unwrap();
        assert!((result.statistic - 3.8730).abs() < 1e-3, "t = {}", result.statistic);
        assert_eq!(result.df, 3.0);
        assert!(
            (result.p_value - 0.0305).abs() < 2e-3,
            "p = {}",
            result.p_value
        );
    }

    #[test]
    fn test_antisymmetric_statistic() {
        let a = vec![0.9, 0.8, 0.85, 0.7];
        let b = vec![0.5, 0.6, 0.4, 0.65];
        let ab = paired_t_test(&a, &b).unwrap();
        let ba = paired_t_test(&b, &a).unwrap();
        assert!((ab.statistic + ba.statistic).abs() < 1e-12);
        assert!((ab.p_value - ba.p_value).abs() < 1e-12);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        assert!(paired_t_test(&[1.0], &[1.0, 2.0]).is_err());
        assert!(paired_t_test(&[1.0], &[1.0]).is_err());
    }

    #[test]
    fn test_ln_gamma_matches_factorials() {
        // Γ(5) = 24, Γ(1) = 1.
        assert!((ln_gamma(5.0) - 24.0f64.ln()).abs() < 1e-10);
        assert!(ln_gamma(1.0).abs() < 1e-10);
    }
}
