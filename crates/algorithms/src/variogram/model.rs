//! Fitted variogram models

use geokrig_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use super::empirical::EmpiricalVariogram;
use super::formula::Formula;
use super::trend::fit_trend;

/// Predefined model formulas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariogramFamily {
    Linear,
    LinearNoNugget,
    SquareRoot,
    Logarithmic,
    Exponential,
    Gaussian,
    Spherical,
}

impl VariogramFamily {
    pub const ALL: [VariogramFamily; 7] = [
        VariogramFamily::Linear,
        VariogramFamily::LinearNoNugget,
        VariogramFamily::SquareRoot,
        VariogramFamily::Logarithmic,
        VariogramFamily::Exponential,
        VariogramFamily::Gaussian,
        VariogramFamily::Spherical,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VariogramFamily::Linear => "linear",
            VariogramFamily::LinearNoNugget => "linear-no-nugget",
            VariogramFamily::SquareRoot => "square-root",
            VariogramFamily::Logarithmic => "logarithmic",
            VariogramFamily::Exponential => "exponential",
            VariogramFamily::Gaussian => "gaussian",
            VariogramFamily::Spherical => "spherical",
        }
    }

    /// Model formula in `x` (distance), `n` (nugget), `s` (sill), `r` (range)
    pub fn formula(self) -> &'static str {
        match self {
            VariogramFamily::Linear => "a + b * x",
            VariogramFamily::LinearNoNugget => "b * x",
            VariogramFamily::SquareRoot => "a + b * sqrt(x)",
            VariogramFamily::Logarithmic => "a + b * ln(1 + x)",
            VariogramFamily::Exponential => "n + (s - n) * (1 - exp(-(x / r)))",
            VariogramFamily::Gaussian => "n + (s - n) * (1 - exp(-(x / r)^2))",
            VariogramFamily::Spherical => {
                "n + (s - n) * ifelse(x > r, 1, 1.5 * x / r - 0.5 * x^3 / r^3)"
            }
        }
    }
}

impl fmt::Display for VariogramFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VariogramFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "lin" => VariogramFamily::Linear,
            "linear-no-nugget" | "linear0" | "linear_no_nugget" => VariogramFamily::LinearNoNugget,
            "square-root" | "sqrt" | "square_root" => VariogramFamily::SquareRoot,
            "logarithmic" | "log" => VariogramFamily::Logarithmic,
            "exponential" | "exp" => VariogramFamily::Exponential,
            "gaussian" | "gauss" => VariogramFamily::Gaussian,
            "spherical" | "sph" => VariogramFamily::Spherical,
            _ => {
                return Err(Error::invalid(
                    "model",
                    s,
                    format!(
                        "unknown family, expected one of: {}",
                        Self::ALL.map(Self::name).join(", ")
                    ),
                ))
            }
        })
    }
}

/// Formula text for `model`, which is either a formula or a family name,
/// each optionally followed by `; name=value` clauses.
pub fn model_formula(model: &str) -> Cow<'_, str> {
    let (head, clauses) = match model.split_once(';') {
        Some((head, clauses)) => (head, Some(clauses)),
        None => (model, None),
    };
    match (head.parse::<VariogramFamily>(), clauses) {
        (Ok(family), None) => Cow::Borrowed(family.formula()),
        (Ok(family), Some(clauses)) => Cow::Owned(format!("{};{}", family.formula(), clauses)),
        (Err(_), _) => Cow::Borrowed(model),
    }
}

/// A continuous semivariance function of distance.
#[derive(Debug, Clone)]
pub struct VariogramModel {
    formula: Formula,
    params: Vec<f64>,
    r2: f64,
    data_count: usize,
    fitting_range: f64,
}

impl VariogramModel {
    /// Fit `model` (family name or formula) to the classes of `empirical`
    /// up to `fitting_range` (default: the whole table).
    ///
    /// Start values: `r` is half the fitting range, `s` the largest and `n`
    /// the smallest semivariance in range, anything else 1. Numeric clauses
    /// in the formula take precedence.
    pub fn fit(model: &str, empirical: &EmpiricalVariogram, fitting_range: Option<f64>) -> Result<Self> {
        let formula = Formula::parse(&model_formula(model))?;
        let range = match fitting_range {
            Some(r) if r > 0.0 => r,
            _ => empirical.max_distance,
        };
        let data = empirical.fitting_data(range);

        let max_sv = data.iter().map(|d| d.1).reduce(f64::max).unwrap_or(1.0);
        let min_sv = data.iter().map(|d| d.1).reduce(f64::min).unwrap_or(0.0);
        let initial: Vec<f64> = formula
            .parameters()
            .iter()
            .map(|name| {
                formula.seed(name).unwrap_or(match name.as_str() {
                    "r" => 0.5 * range,
                    "s" => max_sv,
                    "n" => min_sv,
                    _ => 1.0,
                })
            })
            .collect();

        let fit = fit_trend(&formula, &data, &initial)?;
        let model = Self {
            formula,
            params: fit.params,
            r2: fit.r2,
            data_count: fit.data_count,
            fitting_range: range,
        };

        tracing::debug!(
            "fitted {} to {} classes (R² {:.2}%, {} iterations)",
            model.describe(),
            model.data_count,
            100.0 * model.r2,
            fit.iterations
        );
        if !model.is_monotonic_non_negative() {
            tracing::warn!(
                "variogram model {} is negative or decreasing within the fitting range",
                model.describe()
            );
        }

        Ok(model)
    }

    /// Model with coefficients taken from the formula's `name=value` clauses,
    /// without fitting.
    pub fn fixed(model: &str) -> Result<Self> {
        let formula = Formula::parse(&model_formula(model))?;
        let params = formula
            .parameters()
            .iter()
            .map(|name| {
                formula.seed(name).ok_or_else(|| {
                    Error::invalid("model", model, format!("no value given for '{}'", name))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Self {
            formula,
            params,
            r2: 0.0,
            data_count: 0,
            fitting_range: 0.0,
        })
    }

    /// Semivariance at `distance`
    pub fn evaluate(&self, distance: f64) -> f64 {
        self.formula.evaluate(distance, &self.params)
    }

    /// Fraction of variance explained over the fitting data
    pub fn r2(&self) -> f64 {
        self.r2
    }

    /// Number of empirical classes the model was fitted to
    pub fn data_count(&self) -> usize {
        self.data_count
    }

    pub fn fitting_range(&self) -> f64 {
        self.fitting_range
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    /// `(name, value)` of every coefficient
    pub fn parameters(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.formula
            .parameters()
            .iter()
            .map(String::as_str)
            .zip(self.params.iter().copied())
    }

    /// Formula text that parses back into this model (see [`fixed`](Self::fixed)).
    pub fn formula_string(&self) -> String {
        self.formula.to_string_with(&self.params)
    }

    /// Formula with the fitted values substituted
    pub fn describe(&self) -> String {
        self.formula.expression_with(&self.params)
    }

    /// Whether the model is non-negative and non-decreasing on
    /// `[0, fitting range]`, sampled at 100 steps.
    pub fn is_monotonic_non_negative(&self) -> bool {
        const STEPS: usize = 100;
        let range = if self.fitting_range > 0.0 {
            self.fitting_range
        } else {
            1.0
        };
        let mut previous = self.evaluate(0.0);
        if !(previous >= 0.0) {
            return false;
        }
        for i in 1..=STEPS {
            let v = self.evaluate(range * i as f64 / STEPS as f64);
            if !(v >= 0.0) || v < previous - 1e-12 * previous.abs().max(1.0) {
                return false;
            }
            previous = v;
        }
        true
    }
}

impl fmt::Display for VariogramModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.formula)?;
        for (name, value) in self.parameters() {
            writeln!(f, "  {} = {}", name, value)?;
        }
        writeln!(f, "R²            : {:.2}%", 100.0 * self.r2)?;
        writeln!(f, "Fitting range : {}", self.fitting_range)?;
        write!(f, "Classes used  : {}", self.data_count)
    }
}
