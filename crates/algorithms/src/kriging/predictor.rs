//! Point predictions from a fitted variogram

use geokrig_core::{Error, Result};

use super::system::{KrigingSystem, Semivariance};
use super::variants::{KrigingVariant, Prediction};
use crate::points::SamplePoint;
use crate::search::{SearchParams, SpatialIndex};

enum Neighbourhood {
    /// One system over every point; `None` if it could not be solved
    Global(Option<KrigingSystem>),
    Local(SpatialIndex),
}

/// A kriging predictor ready to answer queries.
///
/// In global mode the system is built and inverted once; in local mode a
/// fresh system is built from the neighbourhood of every query.
pub struct Kriging<V: KrigingVariant> {
    variant: V,
    gamma: Semivariance,
    search: SearchParams,
    min_points: usize,
    point_count: usize,
    neighbourhood: Neighbourhood,
}

impl<V: KrigingVariant> Kriging<V> {
    /// Prepare `variant` for `points`.
    ///
    /// Points the variant does not accept (for universal kriging: points
    /// without covariate values) are left out. Fails with fewer than two
    /// usable points or when the spatial index cannot be built.
    pub fn new(
        mut variant: V,
        points: &[SamplePoint],
        gamma: Semivariance,
        search: SearchParams,
    ) -> Result<Self> {
        search.validate()?;

        let usable: Vec<SamplePoint> = points.iter().filter(|p| variant.accepts(p)).copied().collect();
        if usable.len() < points.len() {
            tracing::debug!(
                "{} kriging: {} of {} points dropped",
                variant.name(),
                points.len() - usable.len(),
                points.len()
            );
        }
        if usable.len() < 2 {
            return Err(Error::InsufficientPoints {
                required: 2,
                found: usable.len(),
            });
        }
        variant.init(&usable)?;

        let min_points = search.min_points.max(variant.min_points());
        let point_count = usable.len();
        let neighbourhood = if search.is_global() {
            let system = if point_count >= min_points {
                variant.build_system(usable, &gamma)
            } else {
                None
            };
            if system.is_none() {
                tracing::warn!(
                    "{} kriging: global system over {} points cannot be solved",
                    variant.name(),
                    point_count
                );
            }
            Neighbourhood::Global(system)
        } else {
            Neighbourhood::Local(SpatialIndex::build(&usable)?)
        };

        Ok(Self {
            variant,
            gamma,
            search,
            min_points,
            point_count,
            neighbourhood,
        })
    }

    pub fn variant(&self) -> &V {
        &self.variant
    }

    pub fn semivariance(&self) -> &Semivariance {
        &self.gamma
    }

    pub fn search(&self) -> &SearchParams {
        &self.search
    }

    /// Smallest neighbourhood a prediction is made from
    pub fn min_points(&self) -> usize {
        self.min_points
    }

    /// Number of points taking part
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn is_global(&self) -> bool {
        matches!(self.neighbourhood, Neighbourhood::Global(_))
    }

    /// The shared system in global mode
    pub fn global_system(&self) -> Option<&KrigingSystem> {
        match &self.neighbourhood {
            Neighbourhood::Global(system) => system.as_ref(),
            Neighbourhood::Local(_) => None,
        }
    }

    /// System for a query at `(x, y)`; borrowed in global mode.
    fn with_system<R>(&self, x: f64, y: f64, f: impl FnOnce(&KrigingSystem) -> Option<R>) -> Option<R> {
        match &self.neighbourhood {
            Neighbourhood::Global(system) => f(system.as_ref()?),
            Neighbourhood::Local(index) => {
                let neighbours = index.nearest_points(x, y, &self.search);
                if neighbours.len() < self.min_points {
                    return None;
                }
                let points = neighbours.into_iter().map(|nb| nb.point).collect();
                f(&self.variant.build_system(points, &self.gamma)?)
            }
        }
    }

    /// Prediction at `(x, y)`, or `None` when the neighbourhood is too
    /// small, the system is singular or a drift value is missing.
    pub fn predict(&self, x: f64, y: f64) -> Option<Prediction> {
        self.with_system(x, y, |system| self.variant.predict(system, x, y, &self.gamma))
    }

    /// Neighbourhood points with their kriging weights at `(x, y)`
    pub fn weights(&self, x: f64, y: f64) -> Option<Vec<(SamplePoint, f64)>> {
        self.with_system(x, y, |system| {
            let rhs = self.variant.right_hand_side(system, x, y, &self.gamma)?;
            let lambda = system.solve(&rhs);
            Some(
                system
                    .points()
                    .iter()
                    .copied()
                    .zip(lambda.iter().copied())
                    .collect(),
            )
        })
    }
}
