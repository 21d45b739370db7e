//! Cross-validation of the fit + predict pipeline
//!
//! Held-out points are predicted from a predictor trained on the remaining
//! points. Reported statistics:
//! ```text
//! MSE   = mean (ẑᵢ - zᵢ)²
//! RMSE  = √MSE
//! NRMSE = RMSE / (max z - min z) · 100
//! R²    = SR / (SR + SE) · 100     SR = Σ (ẑᵢ - z̄ₜ)², SE = Σ (ẑᵢ - zᵢ)²
//! ```
//! where `z̄ₜ` is the mean of the training points.

use geokrig_core::{Error, Progress, Result};
use serde::{Deserialize, Serialize};

use super::predictor::Kriging;
use super::variants::KrigingVariant;
use crate::points::SamplePoint;

/// Partitioning scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossValidation {
    #[default]
    None,
    LeaveOneOut,
    TwoFold,
    /// Points are assigned to folds by index modulo `k`
    KFold(usize),
}

impl CrossValidation {
    /// Method from its name (`none`, `loo`, `2-fold`, `k-fold`); `folds`
    /// applies to `k-fold`.
    pub fn from_name(name: &str, folds: usize) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(CrossValidation::None),
            "loo" | "leave-one-out" => Ok(CrossValidation::LeaveOneOut),
            "2-fold" | "two-fold" => Ok(CrossValidation::TwoFold),
            "k-fold" => Ok(CrossValidation::KFold(folds)),
            _ => Err(Error::invalid(
                "cross_validation",
                name,
                "expected none, loo, 2-fold or k-fold",
            )),
        }
    }

    /// Number of folds for `n` points; `None` means leave-one-out.
    ///
    /// Fold counts below 2 or above `n / 2` fall back to leave-one-out.
    fn folds(self, n: usize) -> Option<usize> {
        let k = match self {
            CrossValidation::None | CrossValidation::LeaveOneOut => return None,
            CrossValidation::TwoFold => 2,
            CrossValidation::KFold(k) => k,
        };
        (k >= 2 && 2 * k <= n).then_some(k)
    }
}

/// Leave-one-out outcome at one sample point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Residual {
    pub x: f64,
    pub y: f64,
    pub observed: f64,
    pub predicted: f64,
    /// `observed - predicted`
    pub residual: f64,
}

/// Cross-validation statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossValidationSummary {
    pub method: CrossValidation,
    /// Held-out points that were predicted
    pub samples: usize,
    /// Trainings that failed (too few points, fitting errors)
    pub folds_failed: usize,
    /// Held-out points that could not be predicted
    pub predictions_failed: usize,
    pub mse: f64,
    pub rmse: f64,
    /// RMSE as a percentage of the value range of all points
    pub nrmse: f64,
    /// Percent
    pub r2: f64,
    /// Per-point results, leave-one-out only
    pub residuals: Vec<Residual>,
}

#[derive(Default)]
struct Accumulator {
    samples: usize,
    sum_se: f64,
    sum_sr: f64,
    folds_failed: usize,
    predictions_failed: usize,
    residuals: Vec<Residual>,
}

impl Accumulator {
    fn add(&mut self, observed: f64, predicted: f64, reference_mean: f64) {
        self.samples += 1;
        self.sum_se += (predicted - observed).powi(2);
        self.sum_sr += (predicted - reference_mean).powi(2);
    }

    fn train_failed(&mut self, err: Error) -> Result<()> {
        match err {
            Error::Cancelled => Err(Error::Cancelled),
            err => {
                tracing::debug!("cross-validation training failed: {}", err);
                self.folds_failed += 1;
                Ok(())
            }
        }
    }
}

/// Cross-validate with `train` building a predictor from a training subset.
///
/// Returns `Ok(None)` for [`CrossValidation::None`]. Fails when no held-out
/// point could be predicted. `progress` is told once per held-out point
/// (leave-one-out) or fold.
pub fn cross_validate<V, F>(
    method: CrossValidation,
    points: &[SamplePoint],
    train: F,
    progress: &dyn Progress,
) -> Result<Option<CrossValidationSummary>>
where
    V: KrigingVariant,
    F: Fn(&[SamplePoint]) -> Result<Kriging<V>>,
{
    if method == CrossValidation::None {
        return Ok(None);
    }

    let n = points.len();
    let total: f64 = points.iter().map(|p| p.value).sum();
    let mut acc = Accumulator::default();

    let folds = method.folds(n);
    match folds {
        None => {
            let mut subset = points.to_vec();
            for i in (0..n).rev() {
                if !progress.update(n - 1 - i, n) {
                    return Err(Error::Cancelled);
                }
                let held = subset.remove(i);
                match train(&subset) {
                    Ok(kriging) => match kriging.predict(held.x, held.y) {
                        Some(p) => {
                            acc.add(held.value, p.value, (total - held.value) / (n - 1) as f64);
                            acc.residuals.push(Residual {
                                x: held.x,
                                y: held.y,
                                observed: held.value,
                                predicted: p.value,
                                residual: held.value - p.value,
                            });
                        }
                        None => acc.predictions_failed += 1,
                    },
                    Err(e) => acc.train_failed(e)?,
                }
                subset.insert(i, held);
            }
            acc.residuals.reverse();
        }
        Some(k) => {
            for fold in 0..k {
                if !progress.update(fold, k) {
                    return Err(Error::Cancelled);
                }
                let (held, training): (Vec<(usize, &SamplePoint)>, Vec<(usize, &SamplePoint)>) =
                    points.iter().enumerate().partition(|(i, _)| i % k == fold);
                let training: Vec<SamplePoint> = training.into_iter().map(|(_, p)| *p).collect();
                let mean = training.iter().map(|p| p.value).sum::<f64>() / training.len() as f64;

                match train(&training) {
                    Ok(kriging) => {
                        for (_, p) in held {
                            match kriging.predict(p.x, p.y) {
                                Some(pred) => acc.add(p.value, pred.value, mean),
                                None => acc.predictions_failed += 1,
                            }
                        }
                    }
                    Err(e) => acc.train_failed(e)?,
                }
            }
        }
    }

    if acc.samples == 0 {
        return Err(Error::Algorithm(
            "cross-validation produced no validated samples".into(),
        ));
    }

    let (lo, hi) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.value), hi.max(p.value)));
    let mse = acc.sum_se / acc.samples as f64;
    let rmse = mse.sqrt();
    let range = hi - lo;
    let denom = acc.sum_sr + acc.sum_se;

    let summary = CrossValidationSummary {
        method: match folds {
            None => CrossValidation::LeaveOneOut,
            Some(_) => method,
        },
        samples: acc.samples,
        folds_failed: acc.folds_failed,
        predictions_failed: acc.predictions_failed,
        mse,
        rmse,
        nrmse: if range > 0.0 { rmse / range * 100.0 } else { f64::NAN },
        r2: if denom > 0.0 { acc.sum_sr / denom * 100.0 } else { 100.0 },
        residuals: acc.residuals,
    };

    tracing::info!(
        "cross-validation ({} samples): RMSE {:.6}, R² {:.2}%",
        summary.samples,
        summary.rmse,
        summary.r2
    );
    Ok(Some(summary))
}
