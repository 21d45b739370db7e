//! Kriging variants
//!
//! The three variants share the semivariance block of the system and differ
//! in the rows appended to it:
//!
//! | Variant   | Edge row | Drift rows                          |
//! |-----------|----------|-------------------------------------|
//! | Simple    | no       | none (known mean)                   |
//! | Ordinary  | yes      | none                                |
//! | Universal | yes      | covariate rasters, x/y coordinates  |

use geokrig_core::{Error, Raster, Resampling, Result};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use std::sync::Arc;

use super::system::{assemble, KrigingSystem, Semivariance};
use crate::points::{mean_value, SamplePoint};

/// Value and error estimate at one location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub value: f64,
    /// `Σ λᵢ γ(x₀, xᵢ)` over the point weights
    pub variance: f64,
}

/// Strategy for building and evaluating kriging systems.
pub trait KrigingVariant: Clone + Send + Sync {
    fn name(&self) -> &'static str;

    /// Fewest points a system of this variant can be solved for
    fn min_points(&self) -> usize;

    /// Prepare for `points` before any system is built.
    fn init(&mut self, _points: &[SamplePoint]) -> Result<()> {
        Ok(())
    }

    /// Whether `point` can take part in a system
    fn accepts(&self, _point: &SamplePoint) -> bool {
        true
    }

    /// Assemble and invert the system for a neighbourhood. `None` if it
    /// cannot be solved.
    fn build_system(&self, points: Vec<SamplePoint>, gamma: &Semivariance) -> Option<KrigingSystem>;

    /// Right-hand side for the query `(x, y)`. `None` if the location
    /// cannot be predicted, e.g. a covariate has no value there.
    fn right_hand_side(
        &self,
        system: &KrigingSystem,
        x: f64,
        y: f64,
        gamma: &Semivariance,
    ) -> Option<Array1<f64>>;

    /// Predicted value from the point weights `lambda`
    fn estimate(&self, system: &KrigingSystem, lambda: ArrayView1<'_, f64>) -> f64 {
        system.weighted_sum(lambda)
    }

    fn predict(
        &self,
        system: &KrigingSystem,
        x: f64,
        y: f64,
        gamma: &Semivariance,
    ) -> Option<Prediction> {
        let rhs = self.right_hand_side(system, x, y, gamma)?;
        let lambda = system.solve(&rhs);
        let n = system.len();
        let variance: f64 = (0..n).map(|i| lambda[i] * rhs[i]).sum();
        let value = self.estimate(system, lambda.view());
        (value.is_finite() && variance.is_finite()).then_some(Prediction { value, variance })
    }
}

fn no_drift(n: usize) -> Array2<f64> {
    Array2::zeros((n, 0))
}

fn with_edge(gamma: Array1<f64>, extra: usize) -> Array1<f64> {
    let n = gamma.len();
    let mut rhs = Array1::zeros(n + 1 + extra);
    rhs.slice_mut(s![..n]).assign(&gamma);
    rhs[n] = 1.0;
    rhs
}

/// Simple kriging around a known mean.
///
/// Without an explicit mean the mean of the points passed to
/// [`init`](KrigingVariant::init) is used.
#[derive(Debug, Clone, Default)]
pub struct SimpleKriging {
    mean: Option<f64>,
    resolved: f64,
}

impl SimpleKriging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mean(mean: f64) -> Self {
        Self {
            mean: Some(mean),
            resolved: mean,
        }
    }

    /// Mean in effect after `init`
    pub fn mean(&self) -> f64 {
        self.resolved
    }
}

impl KrigingVariant for SimpleKriging {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn min_points(&self) -> usize {
        1
    }

    fn init(&mut self, points: &[SamplePoint]) -> Result<()> {
        self.resolved = match self.mean {
            Some(m) => m,
            None => mean_value(points),
        };
        if !self.resolved.is_finite() {
            return Err(Error::invalid("mean", self.resolved, "must be finite"));
        }
        Ok(())
    }

    fn build_system(&self, points: Vec<SamplePoint>, gamma: &Semivariance) -> Option<KrigingSystem> {
        let w = assemble(&points, gamma, false, no_drift(points.len()).view());
        KrigingSystem::new(points, w, Vec::new())
    }

    fn right_hand_side(
        &self,
        system: &KrigingSystem,
        x: f64,
        y: f64,
        gamma: &Semivariance,
    ) -> Option<Array1<f64>> {
        Some(gamma.to_points(x, y, system.points()))
    }

    fn estimate(&self, system: &KrigingSystem, lambda: ArrayView1<'_, f64>) -> f64 {
        self.resolved
            + system
                .points()
                .iter()
                .zip(lambda.iter())
                .map(|(p, l)| l * (p.value - self.resolved))
                .sum::<f64>()
    }
}

/// Ordinary kriging: unknown constant mean, weights sum to one.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrdinaryKriging;

impl KrigingVariant for OrdinaryKriging {
    fn name(&self) -> &'static str {
        "ordinary"
    }

    fn min_points(&self) -> usize {
        1
    }

    fn build_system(&self, points: Vec<SamplePoint>, gamma: &Semivariance) -> Option<KrigingSystem> {
        let w = assemble(&points, gamma, true, no_drift(points.len()).view());
        KrigingSystem::new(points, w, Vec::new())
    }

    fn right_hand_side(
        &self,
        system: &KrigingSystem,
        x: f64,
        y: f64,
        gamma: &Semivariance,
    ) -> Option<Array1<f64>> {
        Some(with_edge(gamma.to_points(x, y, system.points()), 0))
    }
}

/// Universal kriging with external drift.
///
/// Drift terms are the values of each covariate raster, followed by the x
/// and y coordinates when coordinate drift is enabled. A term that is
/// constant over a neighbourhood duplicates the edge row and is left out of
/// that neighbourhood's system.
#[derive(Debug, Clone, Default)]
pub struct UniversalKriging {
    covariates: Vec<Arc<Raster<f64>>>,
    resampling: Resampling,
    coordinates: bool,
}

impl UniversalKriging {
    pub fn new(covariates: Vec<Arc<Raster<f64>>>) -> Self {
        Self {
            covariates,
            ..Default::default()
        }
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    /// Add x and y as drift terms (a linear trend surface).
    pub fn with_coordinates(mut self, enabled: bool) -> Self {
        self.coordinates = enabled;
        self
    }

    pub fn covariate_count(&self) -> usize {
        self.covariates.len()
    }

    /// Number of drift terms before exclusion of constant ones
    pub fn drift_count(&self) -> usize {
        self.covariates.len() + if self.coordinates { 2 } else { 0 }
    }

    /// All drift term values at `(x, y)`
    pub fn drift_at(&self, x: f64, y: f64) -> Option<Vec<f64>> {
        let mut values = Vec::with_capacity(self.drift_count());
        for raster in &self.covariates {
            values.push(raster.sample(x, y, self.resampling)?);
        }
        if self.coordinates {
            values.push(x);
            values.push(y);
        }
        Some(values)
    }
}

fn is_constant(column: ArrayView1<'_, f64>) -> bool {
    let (lo, hi) = column
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    hi - lo <= 1e-10 * lo.abs().max(hi.abs()).max(1.0)
}

impl KrigingVariant for UniversalKriging {
    fn name(&self) -> &'static str {
        "universal"
    }

    fn min_points(&self) -> usize {
        1 + self.drift_count()
    }

    fn init(&mut self, points: &[SamplePoint]) -> Result<()> {
        if self.drift_count() == 0 {
            tracing::debug!("universal kriging without drift terms behaves as ordinary kriging");
        }
        if points.is_empty() {
            return Err(Error::InsufficientPoints {
                required: self.min_points(),
                found: 0,
            });
        }
        Ok(())
    }

    fn accepts(&self, point: &SamplePoint) -> bool {
        self.drift_at(point.x, point.y).is_some()
    }

    fn build_system(&self, points: Vec<SamplePoint>, gamma: &Semivariance) -> Option<KrigingSystem> {
        let n = points.len();
        let t = self.drift_count();
        let mut all = Array2::zeros((n, t));
        for (i, p) in points.iter().enumerate() {
            let values = self.drift_at(p.x, p.y)?;
            all.row_mut(i).assign(&Array1::from(values));
        }

        let active: Vec<usize> = (0..t).filter(|&k| !is_constant(all.column(k))).collect();
        let drift = all.select(Axis(1), &active);

        let w = assemble(&points, gamma, true, drift.view());
        KrigingSystem::new(points, w, active)
    }

    fn right_hand_side(
        &self,
        system: &KrigingSystem,
        x: f64,
        y: f64,
        gamma: &Semivariance,
    ) -> Option<Array1<f64>> {
        let n = system.len();
        let active = system.drift_terms();
        let drift = if active.is_empty() {
            Vec::new()
        } else {
            self.drift_at(x, y)?
        };
        let mut rhs = with_edge(gamma.to_points(x, y, system.points()), active.len());
        for (k, &term) in active.iter().enumerate() {
            rhs[n + 1 + k] = drift[term];
        }
        Some(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variogram::VariogramModel;
    use approx::assert_relative_eq;
    use geokrig_core::GeoTransform;

    fn linear() -> Semivariance {
        Semivariance::new(VariogramModel::fixed("a + b * x; a=0; b=1").unwrap())
    }

    fn five() -> Vec<SamplePoint> {
        vec![
            SamplePoint::new(0.0, 0.0, 1.0),
            SamplePoint::new(10.0, 0.0, 2.0),
            SamplePoint::new(0.0, 10.0, 3.0),
            SamplePoint::new(10.0, 10.0, 4.0),
            SamplePoint::new(5.0, 5.0, 2.5),
        ]
    }

    fn weights<V: KrigingVariant>(v: &V, sys: &KrigingSystem, x: f64, y: f64) -> Array1<f64> {
        sys.solve(&v.right_hand_side(sys, x, y, &linear()).unwrap())
    }

    #[test]
    fn test_ordinary_weights_sum_to_one() {
        let v = OrdinaryKriging;
        let sys = v.build_system(five(), &linear()).unwrap();
        for (x, y) in [(2.0, 3.0), (7.5, 1.0), (20.0, -4.0)] {
            let lambda = weights(&v, &sys, x, y);
            let total: f64 = lambda.iter().take(5).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_ordinary_exact_at_sample() {
        let v = OrdinaryKriging;
        let sys = v.build_system(five(), &linear()).unwrap();
        let p = v.predict(&sys, 5.0, 5.0, &linear()).unwrap();
        assert_relative_eq!(p.value, 2.5, epsilon = 1e-9);
        assert_relative_eq!(p.variance, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_simple_flat_variogram_gives_mean() {
        let flat = Semivariance::new(VariogramModel::fixed("1").unwrap());
        let mut v = SimpleKriging::new();
        v.init(&five()).unwrap();
        assert_relative_eq!(v.mean(), 2.5);
        let sys = v.build_system(five(), &flat).unwrap();
        let p = v.predict(&sys, 1000.0, 1000.0, &flat).unwrap();
        assert_relative_eq!(p.value, 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_simple_exact_at_sample() {
        let mut v = SimpleKriging::with_mean(0.0);
        v.init(&five()).unwrap();
        assert_eq!(v.mean(), 0.0);
        let sys = v.build_system(five(), &linear()).unwrap();
        let p = v.predict(&sys, 10.0, 0.0, &linear()).unwrap();
        assert_relative_eq!(p.value, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_universal_coordinate_drift_reproduces_plane() {
        let locations = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0), (3.0, 6.0), (8.0, 2.0)];
        let pts: Vec<SamplePoint> = locations
            .iter()
            .map(|&(x, y)| SamplePoint::new(x, y, 2.0 + 0.5 * x - 0.25 * y))
            .collect();
        let v = UniversalKriging::default().with_coordinates(true);
        assert_eq!(v.min_points(), 3);
        let sys = v.build_system(pts, &linear()).unwrap();
        assert_eq!(sys.drift_terms(), &[0, 1]);
        let p = v.predict(&sys, 4.0, 7.0, &linear()).unwrap();
        assert_relative_eq!(p.value, 2.0 + 2.0 - 1.75, epsilon = 1e-8);
    }

    #[test]
    fn test_universal_constant_covariate_dropped() {
        let raster = Raster::filled(20, 20, 5.0)
            .with_transform(GeoTransform::new(-2.0, 18.0, 1.0, -1.0));
        let v = UniversalKriging::new(vec![Arc::new(raster)]).with_resampling(Resampling::Bilinear);
        assert!(v.accepts(&SamplePoint::new(5.0, 5.0, 0.0)));
        assert!(!v.accepts(&SamplePoint::new(50.0, 5.0, 0.0)));

        let sys = v.build_system(five(), &linear()).unwrap();
        assert!(sys.drift_terms().is_empty());

        let ok = OrdinaryKriging;
        let ok_sys = ok.build_system(five(), &linear()).unwrap();
        let a = v.predict(&sys, 3.0, 4.0, &linear()).unwrap();
        let b = ok.predict(&ok_sys, 3.0, 4.0, &linear()).unwrap();
        assert_relative_eq!(a.value, b.value, epsilon = 1e-12);
        assert_relative_eq!(a.variance, b.variance, epsilon = 1e-12);
    }

    #[test]
    fn test_universal_query_outside_covariate() {
        let mut data = Array2::zeros((20, 20));
        for ((r, c), v) in data.indexed_iter_mut() {
            *v = (r * 20 + c) as f64;
        }
        let raster =
            Raster::from_array(data).with_transform(GeoTransform::new(-2.0, 18.0, 1.0, -1.0));
        let v = UniversalKriging::new(vec![Arc::new(raster)]).with_resampling(Resampling::Nearest);
        let sys = v.build_system(five(), &linear()).unwrap();
        assert_eq!(sys.drift_terms(), &[0]);
        assert!(v.predict(&sys, 3.0, 4.0, &linear()).is_some());
        assert!(v.predict(&sys, 100.0, 4.0, &linear()).is_none());
    }
}
