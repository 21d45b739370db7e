//! Empirical (experimental) variogram
//!
//! Pairwise half squared differences are binned into equally wide lag
//! classes:
//! ```text
//! γ(h) = (1/2N(h)) Σ [z(xᵢ) - z(xⱼ)]²   for all pairs with |xᵢ-xⱼ| in class h
//! ```
//! A pair at distance `d` belongs to class `⌈d / lag⌉` and the class is
//! represented by its upper edge `class · lag`. Coincident pairs form class 0.
//!
//! Reference:
//! Matheron, G. (1963). Principles of geostatistics. Economic Geology.

use geokrig_core::{Error, Extent, Progress, Result};
use serde::{Deserialize, Serialize};

use crate::points::SamplePoint;
use crate::search::KdTree;

/// Parameters for empirical variogram estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariogramParams {
    /// Number of lag classes (default 100)
    pub lag_classes: usize,
    /// Largest pair distance considered. `None`, or a value beyond the
    /// bounding-box diagonal, means the diagonal.
    pub max_distance: Option<f64>,
    /// Only every `skip`-th point takes part in pairs (default 1 = all)
    pub skip: usize,
}

impl Default for VariogramParams {
    fn default() -> Self {
        Self {
            lag_classes: 100,
            max_distance: None,
            skip: 1,
        }
    }
}

impl VariogramParams {
    /// Classes of width `lag` covering `max_distance`, rounded to the nearest
    /// whole class plus one.
    pub fn from_lag_distance(lag: f64, max_distance: f64, skip: usize) -> Self {
        let lag_classes = if lag > 0.0 && max_distance > 0.0 {
            1 + (0.5 + max_distance / lag) as usize
        } else {
            1
        };
        Self {
            lag_classes,
            max_distance: Some(max_distance),
            skip,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.lag_classes < 1 {
            return Err(Error::invalid("lag_classes", 0, "must be at least 1"));
        }
        if let Some(d) = self.max_distance {
            if !(d > 0.0) || !d.is_finite() {
                return Err(Error::invalid("max_distance", d, "must be positive"));
            }
        }
        Ok(())
    }
}

/// One non-empty lag class
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VariogramClass {
    /// Class index, 1-based for non-coincident pairs
    pub class: usize,
    /// Representative distance `class · lag_width`
    pub distance: f64,
    /// Number of point pairs
    pub count: usize,
    /// Mean semivariance of the class
    pub semivariance: f64,
    /// Semivariance of all pairs in this and every closer class
    pub cumulative: f64,
}

/// Empirical variogram: one row per non-empty lag class, by increasing distance.
#[derive(Debug, Clone, Serialize)]
pub struct EmpiricalVariogram {
    pub classes: Vec<VariogramClass>,
    pub lag_width: f64,
    pub max_distance: f64,
    /// Total pairs binned
    pub pairs: usize,
}

impl EmpiricalVariogram {
    /// Estimate the empirical variogram of `points`.
    ///
    /// The pair loop is O(n²/skip²). `progress` is polled once per outer
    /// point; returning `false` aborts with [`Error::Cancelled`].
    pub fn estimate(
        points: &[SamplePoint],
        params: &VariogramParams,
        progress: &dyn Progress,
    ) -> Result<Self> {
        if params.lag_classes < 1 {
            return Err(Error::invalid("lag_classes", 0, "must be at least 1"));
        }
        if points.len() < 2 {
            return Err(Error::InsufficientPoints {
                required: 2,
                found: points.len(),
            });
        }

        let diagonal = diagonal(points);
        let max_distance = match params.max_distance {
            Some(d) if d > 0.0 && d <= diagonal => d,
            _ => diagonal,
        };
        if !(max_distance > 0.0) {
            return Err(Error::Algorithm(
                "variogram needs points at more than one location".into(),
            ));
        }

        let n_classes = params.lag_classes;
        let lag_width = max_distance / n_classes as f64;
        let skip = params.skip.max(1);

        let mut count = vec![0_usize; n_classes + 1];
        let mut sq_diff = vec![0.0_f64; n_classes + 1];

        let n = points.len();
        let outer = n.saturating_sub(skip).div_ceil(skip);
        for (step, i) in (0..n.saturating_sub(skip)).step_by(skip).enumerate() {
            if !progress.update(step, outer) {
                return Err(Error::Cancelled);
            }
            let pi = &points[i];
            for pj in points[i + skip..].iter().step_by(skip) {
                let d = pi.dist(pj.x, pj.y);
                let class = (d / lag_width).ceil() as usize;
                if class <= n_classes {
                    let dz = pi.value - pj.value;
                    count[class] += 1;
                    sq_diff[class] += dz * dz;
                }
            }
        }

        let mut classes = Vec::new();
        let (mut total_count, mut total_sq) = (0_usize, 0.0_f64);
        for (class, (&c, &s)) in count.iter().zip(&sq_diff).enumerate() {
            if c == 0 {
                continue;
            }
            total_count += c;
            total_sq += s;
            classes.push(VariogramClass {
                class,
                distance: class as f64 * lag_width,
                count: c,
                semivariance: 0.5 * s / c as f64,
                cumulative: 0.5 * total_sq / total_count as f64,
            });
        }

        tracing::debug!(
            "empirical variogram: {} pairs in {} of {} classes, lag {:.6}",
            total_count,
            classes.len(),
            n_classes,
            lag_width
        );

        Ok(Self {
            classes,
            lag_width,
            max_distance,
            pairs: total_count,
        })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Largest semivariance of any class
    pub fn max_semivariance(&self) -> Option<f64> {
        self.classes.iter().map(|c| c.semivariance).reduce(f64::max)
    }

    /// `(distance, semivariance)` of the classes within `fitting_range`
    pub fn fitting_data(&self, fitting_range: f64) -> Vec<(f64, f64)> {
        self.classes
            .iter()
            .filter(|c| c.distance <= fitting_range)
            .map(|c| (c.distance, c.semivariance))
            .collect()
    }
}

/// Diagonal of the bounding box of `points`
pub fn diagonal(points: &[SamplePoint]) -> f64 {
    Extent::from_coords(points.iter().map(|p| (p.x, p.y))).map_or(0.0, |e| e.diagonal())
}

/// How a default lag width is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LagEstimate {
    /// Mean distance from each (skip-sampled) point to its nearest neighbour
    #[default]
    NearestNeighbour,
    /// `0.25 · sqrt(area / n)`
    Density,
}

/// Suggested lag class width for `points`.
///
/// The nearest-neighbour estimate falls back to the density estimate when
/// every sampled point has only coincident neighbours.
pub fn estimate_lag_distance(points: &[SamplePoint], method: LagEstimate, skip: usize) -> f64 {
    if method == LagEstimate::NearestNeighbour && points.len() >= 2 {
        let tree = KdTree::build(points);
        let (mut sum, mut n) = (0.0, 0_usize);
        for p in points.iter().step_by(skip.max(1)) {
            // The nearest hit is the point itself
            if let Some(nb) = tree.k_nearest(p.x, p.y, 2).get(1) {
                if nb.distance_sq > 0.0 {
                    sum += nb.distance_sq.sqrt();
                    n += 1;
                }
            }
        }
        if n > 0 {
            return sum / n as f64;
        }
    }

    let Some(extent) = Extent::from_coords(points.iter().map(|p| (p.x, p.y))) else {
        return 0.0;
    };
    let n = points.len() as f64;
    if extent.area() > 0.0 {
        0.25 * (extent.area() / n).sqrt()
    } else {
        0.25 * extent.diagonal() / n
    }
}
