//! Neighbourhood search for local kriging
//!
//! [`SearchParams`] describes how many points, and from how far away, feed
//! each local kriging system. When neither a point limit nor a radius is set
//! the search is *global* and the index is never consulted: every point
//! takes part in one system that is solved once.

mod kdtree;

pub use kdtree::{KdTree, Neighbour};

use geokrig_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::points::SamplePoint;

/// Directional constraint on neighbourhood selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchDirection {
    /// Nearest points regardless of direction
    #[default]
    All,
    /// Nearest points searched separately in each of the four quadrants
    /// around the query; the point limit applies per quadrant.
    Quadrants,
}

/// Neighbourhood selection options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Locations with fewer neighbours are left as no-data (default 4)
    pub min_points: usize,
    /// Maximum neighbours, per quadrant in quadrant mode; 0 means no limit (default 16)
    pub max_points: usize,
    /// Search radius; `None` means unlimited
    pub max_radius: Option<f64>,
    pub direction: SearchDirection,
    /// Optional cap on the total of a quadrant search. `None` keeps up to
    /// four times `max_points`.
    pub max_total: Option<usize>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            min_points: 4,
            max_points: 16,
            max_radius: None,
            direction: SearchDirection::All,
            max_total: None,
        }
    }
}

impl SearchParams {
    /// Parameters selecting every point for every query
    pub fn global() -> Self {
        Self {
            max_points: 0,
            max_radius: None,
            ..Default::default()
        }
    }

    /// Whether all points are used for every query
    pub fn is_global(&self) -> bool {
        self.max_points == 0 && self.max_radius.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(r) = self.max_radius {
            if !(r > 0.0) {
                return Err(Error::invalid("max_radius", r, "must be positive"));
            }
        }
        if self.max_points > 0 && self.min_points > self.max_points {
            return Err(Error::invalid(
                "min_points",
                self.min_points,
                format!("exceeds max_points ({})", self.max_points),
            ));
        }
        if self.max_total == Some(0) {
            return Err(Error::invalid("max_total", 0, "must be at least 1"));
        }
        Ok(())
    }
}

/// Which of the four quadrants around the query `(dx, dy)` falls into.
fn quadrant(dx: f64, dy: f64) -> u8 {
    match (dx >= 0.0, dy >= 0.0) {
        (true, true) => 0,
        (false, true) => 1,
        (false, false) => 2,
        (true, false) => 3,
    }
}

/// Spatial index over a fixed point set.
#[derive(Debug)]
pub struct SpatialIndex {
    tree: KdTree,
}

impl SpatialIndex {
    /// Index `points`. Fails on an empty set or non-finite coordinates.
    pub fn build(points: &[SamplePoint]) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::InsufficientPoints { required: 1, found: 0 });
        }
        if let Some(p) = points.iter().find(|p| !(p.x.is_finite() && p.y.is_finite())) {
            return Err(Error::Algorithm(format!(
                "cannot index point with coordinates ({}, {})",
                p.x, p.y
            )));
        }
        Ok(Self {
            tree: KdTree::build(points),
        })
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Neighbourhood of `(x, y)`.
    ///
    /// In [`SearchDirection::All`] mode the result is sorted by ascending
    /// distance. In quadrant mode the per-quadrant results are concatenated,
    /// each sorted by distance, unless `max_total` caps them, in which case the
    /// nearest `max_total` of the union are returned sorted by distance.
    pub fn nearest_points(&self, x: f64, y: f64, params: &SearchParams) -> Vec<Neighbour> {
        let k = if params.max_points == 0 {
            usize::MAX
        } else {
            params.max_points
        };
        let radius_sq = params.max_radius.map_or(f64::INFINITY, |r| r * r);

        match params.direction {
            SearchDirection::All => self.tree.k_nearest_within(x, y, k, radius_sq, &|_| true),
            SearchDirection::Quadrants => {
                let mut found = Vec::new();
                for q in 0..4 {
                    let in_quadrant = |p: &SamplePoint| quadrant(p.x - x, p.y - y) == q;
                    found.extend(self.tree.k_nearest_within(x, y, k, radius_sq, &in_quadrant));
                }
                if let Some(cap) = params.max_total {
                    if found.len() > cap {
                        found.sort_by(|a, b| {
                            a.distance_sq
                                .partial_cmp(&b.distance_sq)
                                .unwrap_or(std::cmp::Ordering::Equal)
                        });
                        found.truncate(cap);
                    }
                }
                found
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10x10 lattice with unit spacing
    fn lattice() -> Vec<SamplePoint> {
        (0..100)
            .map(|i| SamplePoint::new((i % 10) as f64, (i / 10) as f64, i as f64))
            .collect()
    }

    #[test]
    fn test_build_failures() {
        assert!(SpatialIndex::build(&[]).is_err());
        assert!(SpatialIndex::build(&[SamplePoint::new(f64::NAN, 0.0, 1.0)]).is_err());
    }

    #[test]
    fn test_global_flag() {
        assert!(SearchParams::global().is_global());
        assert!(!SearchParams::default().is_global());
        let radius_only = SearchParams {
            max_points: 0,
            max_radius: Some(3.0),
            ..Default::default()
        };
        assert!(!radius_only.is_global());
    }

    #[test]
    fn test_validate() {
        assert!(SearchParams::default().validate().is_ok());
        let bad = SearchParams {
            min_points: 20,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = SearchParams {
            max_radius: Some(0.0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_all_directions() {
        let index = SpatialIndex::build(&lattice()).unwrap();
        let params = SearchParams {
            max_points: 5,
            ..Default::default()
        };
        let n = index.nearest_points(4.6, 4.4, &params);
        assert_eq!(n.len(), 5);
        assert_eq!(n[0].point.value, 45.0);
        for w in n.windows(2) {
            assert!(w[0].distance_sq <= w[1].distance_sq);
        }
    }

    #[test]
    fn test_radius_limits_neighbourhood() {
        let index = SpatialIndex::build(&lattice()).unwrap();
        let params = SearchParams {
            max_points: 0,
            max_radius: Some(1.0),
            ..Default::default()
        };
        // Centre plus its four axis neighbours
        assert_eq!(index.nearest_points(5.0, 5.0, &params).len(), 5);
    }

    #[test]
    fn test_quadrants_apply_limit_per_quadrant() {
        let index = SpatialIndex::build(&lattice()).unwrap();
        let params = SearchParams {
            max_points: 3,
            direction: SearchDirection::Quadrants,
            ..Default::default()
        };
        let n = index.nearest_points(4.5, 4.5, &params);
        assert_eq!(n.len(), 12);
        for (q, chunk) in n.chunks(3).enumerate() {
            for nb in chunk {
                assert_eq!(quadrant(nb.point.x - 4.5, nb.point.y - 4.5), q as u8);
            }
        }

        let capped = SearchParams {
            max_total: Some(5),
            ..params
        };
        let n = index.nearest_points(4.5, 4.5, &capped);
        assert_eq!(n.len(), 5);
    }

    #[test]
    fn test_quadrants_one_sided_data() {
        // All points east of the query: only two quadrants contribute
        let pts: Vec<SamplePoint> = (0..20)
            .map(|i| SamplePoint::new(10.0 + (i % 4) as f64, (i / 4) as f64 - 2.0, 0.0))
            .collect();
        let index = SpatialIndex::build(&pts).unwrap();
        let params = SearchParams {
            max_points: 4,
            direction: SearchDirection::Quadrants,
            ..Default::default()
        };
        assert_eq!(index.nearest_points(0.0, 0.5, &params).len(), 8);
    }
}
