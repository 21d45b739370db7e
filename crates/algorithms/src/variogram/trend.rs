//! Non-linear least squares fitting of a [`Formula`] to `(x, y)` data
//!
//! Levenberg–Marquardt with forward-difference derivatives. The damping
//! factor starts at 0.001, shrinks tenfold after an improving step and grows
//! tenfold otherwise; fitting stops when it reaches 10⁴ or after 1000 steps.

use geokrig_core::{Error, Result};
use ndarray::{Array1, Array2};

use super::formula::Formula;
use crate::kriging::matrix;

const LAMBDA_START: f64 = 0.001;
const LAMBDA_MAX: f64 = 1e4;
const MAX_ITERATIONS: usize = 1000;
const DERIVATIVE_STEP: f64 = 0.001;

/// Outcome of [`fit_trend`]
#[derive(Debug, Clone, PartialEq)]
pub struct TrendFit {
    /// Coefficients in [`Formula::parameters`] order
    pub params: Vec<f64>,
    /// Σ(ȳ − f(xᵢ))² / Σ(ȳ − yᵢ)², or 0 when the data has no spread
    pub r2: f64,
    /// Sum of squared residuals at `params`
    pub chi_sq: f64,
    pub iterations: usize,
    pub data_count: usize,
}

/// Normal equations of the linearised problem at `params`
struct Normal {
    alpha: Array2<f64>,
    beta: Array1<f64>,
    chi_sq: f64,
}

fn normal_equations(formula: &Formula, data: &[(f64, f64)], params: &[f64]) -> Normal {
    let m = params.len();
    let mut alpha = Array2::zeros((m, m));
    let mut beta = Array1::zeros(m);
    let mut chi_sq = 0.0;

    let mut shifted = params.to_vec();
    let mut dy_da = vec![0.0; m];
    for &(x, y) in data {
        let fx = formula.evaluate(x, params);
        for (i, d) in dy_da.iter_mut().enumerate() {
            shifted[i] = params[i] + DERIVATIVE_STEP;
            *d = (formula.evaluate(x, &shifted) - fx) / DERIVATIVE_STEP;
            shifted[i] = params[i];
        }
        let dy = y - fx;
        for i in 0..m {
            for j in 0..=i {
                alpha[[i, j]] += dy_da[i] * dy_da[j];
            }
            beta[i] += dy * dy_da[i];
        }
        chi_sq += dy * dy;
    }
    for i in 1..m {
        for j in 0..i {
            alpha[[j, i]] = alpha[[i, j]];
        }
    }

    Normal { alpha, beta, chi_sq }
}

/// Fit the coefficients of `formula` to `data`, starting from `initial`.
///
/// A formula without coefficients is accepted as is (only R² is
/// computed). Otherwise at least two data points, and no fewer than the
/// number of coefficients, are required.
pub fn fit_trend(formula: &Formula, data: &[(f64, f64)], initial: &[f64]) -> Result<TrendFit> {
    let m = formula.parameter_count();
    if initial.len() != m {
        return Err(Error::invalid(
            "initial",
            initial.len(),
            format!("formula has {} coefficients", m),
        ));
    }

    let mut params = initial.to_vec();
    let mut iterations = 0;
    let mut chi_sq = data
        .iter()
        .map(|&(x, y)| (y - formula.evaluate(x, &params)).powi(2))
        .sum::<f64>();

    if m > 0 {
        let required = m.max(2);
        if data.len() < required {
            return Err(Error::InsufficientPoints {
                required,
                found: data.len(),
            });
        }

        let mut lambda = LAMBDA_START;
        let mut current = normal_equations(formula, data, &params);
        if !current.chi_sq.is_finite() {
            return Err(Error::Algorithm(format!(
                "'{}' is not finite at its start values",
                formula.source()
            )));
        }

        while iterations < MAX_ITERATIONS && lambda < LAMBDA_MAX {
            iterations += 1;

            let mut damped = current.alpha.clone();
            for i in 0..m {
                damped[[i, i]] = current.alpha[[i, i]] * (1.0 + lambda);
            }

            // A singular step counts as a failed one and raises the damping
            let trial = matrix::solve(&damped, &current.beta).ok().map(|step| {
                params
                    .iter()
                    .zip(step.iter())
                    .map(|(a, da)| a + da)
                    .collect::<Vec<f64>>()
            });

            match trial.map(|t| (normal_equations(formula, data, &t), t)) {
                Some((next, t)) if next.chi_sq < current.chi_sq => {
                    lambda *= 0.1;
                    params = t;
                    current = next;
                }
                _ => lambda *= 10.0,
            }
        }
        chi_sq = current.chi_sq;

        if params.iter().any(|p| !p.is_finite()) {
            return Err(Error::Algorithm(format!(
                "fitting '{}' did not converge",
                formula.source()
            )));
        }
    }

    Ok(TrendFit {
        r2: r_squared(formula, data, &params),
        params,
        chi_sq,
        iterations,
        data_count: data.len(),
    })
}

fn r_squared(formula: &Formula, data: &[(f64, f64)], params: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = data.iter().map(|d| d.1).sum::<f64>() / data.len() as f64;
    let (mut explained, mut total) = (0.0, 0.0);
    for &(x, y) in data {
        explained += (mean - formula.evaluate(x, params)).powi(2);
        total += (mean - y).powi(2);
    }
    if total > 0.0 {
        explained / total
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_exact() {
        let f = Formula::parse("a + b * x").unwrap();
        let data: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 2.0 + 0.5 * i as f64)).collect();
        let fit = fit_trend(&f, &data, &[1.0, 1.0]).unwrap();
        assert_relative_eq!(fit.params[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(fit.params[1], 0.5, epsilon = 1e-6);
        assert_relative_eq!(fit.r2, 1.0, epsilon = 1e-6);
        assert!(fit.chi_sq < 1e-10);
        assert_eq!(fit.data_count, 10);
    }

    #[test]
    fn test_exponential_recovers_range() {
        let f = Formula::parse("n + (s - n) * (1 - exp(-(x / r)))").unwrap();
        // parameters: n, r, s
        let truth = [0.5, 20.0, 10.0];
        let data: Vec<(f64, f64)> = (1..=30)
            .map(|i| {
                let x = i as f64 * 2.0;
                (x, f.evaluate(x, &truth))
            })
            .collect();
        let fit = fit_trend(&f, &data, &[0.0, 30.0, 8.0]).unwrap();
        assert_relative_eq!(fit.params[0], 0.5, epsilon = 0.05);
        assert_relative_eq!(fit.params[1], 20.0, epsilon = 0.1);
        assert_relative_eq!(fit.params[2], 10.0, epsilon = 0.05);
        assert!(fit.r2 > 0.999);
    }

    #[test]
    fn test_no_coefficients() {
        let f = Formula::parse("2 * x").unwrap();
        let fit = fit_trend(&f, &[], &[]).unwrap();
        assert!(fit.params.is_empty());
        assert_eq!(fit.r2, 0.0);
        assert_eq!(fit.iterations, 0);
    }

    #[test]
    fn test_too_few_data() {
        let f = Formula::parse("n + (s - n) * (1 - exp(-(x / r)))").unwrap();
        let data = [(1.0, 1.0), (2.0, 2.0)];
        assert!(matches!(
            fit_trend(&f, &data, &[0.0, 1.0, 1.0]),
            Err(Error::InsufficientPoints { required: 3, found: 2 })
        ));

        let g = Formula::parse("b * x").unwrap();
        assert!(fit_trend(&g, &[(1.0, 1.0)], &[1.0]).is_err());
    }

    #[test]
    fn test_flat_data_r2_zero() {
        let f = Formula::parse("a + b * x").unwrap();
        let data = [(0.0, 3.0), (1.0, 3.0), (2.0, 3.0)];
        let fit = fit_trend(&f, &data, &[1.0, 1.0]).unwrap();
        assert_eq!(fit.r2, 0.0);
        assert_relative_eq!(fit.params[0], 3.0, epsilon = 1e-6);
    }
}
