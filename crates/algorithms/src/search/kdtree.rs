//! 2D k-d tree over sample points
//!
//! One bounded best-k search serves every neighbourhood query of the
//! kriging engine: k nearest, all within a radius, or k nearest within a
//! radius restricted to one quadrant.
//!
//! Reference:
//! Bentley, J.L. (1975). Multidimensional binary search trees used
//! for associative searching. CACM, 18(9).

use crate::points::SamplePoint;

/// A 2D k-d tree for efficient spatial queries on sample points.
#[derive(Debug)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    /// Points in their original order; nodes refer to them by index
    points: Vec<SamplePoint>,
}

#[derive(Debug)]
struct KdNode {
    point_idx: usize,
    /// Split dimension: 0 = x, 1 = y
    split_dim: u8,
    left: Option<usize>,
    right: Option<usize>,
}

/// A point returned by a neighbourhood query
#[derive(Debug, Clone, Copy)]
pub struct Neighbour {
    pub point: SamplePoint,
    pub distance_sq: f64,
    /// Index of the point in the slice the tree was built from
    pub index: usize,
}

/// Bounded search state: up to `k` candidates no farther than `radius_sq`.
struct Search<'a> {
    qx: f64,
    qy: f64,
    k: usize,
    radius_sq: f64,
    accept: &'a dyn Fn(&SamplePoint) -> bool,
    /// Sorted descending by distance; the first entry is the current worst
    best: Vec<(f64, usize)>,
}

impl Search<'_> {
    fn bound(&self) -> f64 {
        if self.best.len() >= self.k {
            self.best[0].0
        } else {
            self.radius_sq
        }
    }

    fn offer(&mut self, dist_sq: f64, idx: usize) {
        if self.best.len() >= self.k {
            if dist_sq >= self.best[0].0 {
                return;
            }
            self.best.remove(0);
        }
        let pos = self
            .best
            .binary_search_by(|probe| {
                probe
                    .0
                    .partial_cmp(&dist_sq)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .reverse()
            })
            .unwrap_or_else(|e| e);
        self.best.insert(pos, (dist_sq, idx));
    }
}

impl KdTree {
    /// Build a k-d tree from sample points.
    ///
    /// Construction is O(n log n) using median-of-coordinate splitting.
    pub fn build(points: &[SamplePoint]) -> Self {
        let mut nodes = Vec::with_capacity(points.len());
        if !points.is_empty() {
            let mut indices: Vec<usize> = (0..points.len()).collect();
            build_recursive(points, &mut indices, 0, &mut nodes);
        }
        Self {
            nodes,
            points: points.to_vec(),
        }
    }

    /// Number of points in the tree.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in build order
    pub fn points(&self) -> &[SamplePoint] {
        &self.points
    }

    /// The k nearest points to (qx, qy), sorted by ascending distance.
    pub fn k_nearest(&self, qx: f64, qy: f64, k: usize) -> Vec<Neighbour> {
        self.k_nearest_within(qx, qy, k, f64::INFINITY, &|_| true)
    }

    /// Up to `k` nearest points with squared distance `<= radius_sq` for which
    /// `accept` holds, sorted by ascending distance.
    pub fn k_nearest_within(
        &self,
        qx: f64,
        qy: f64,
        k: usize,
        radius_sq: f64,
        accept: &dyn Fn(&SamplePoint) -> bool,
    ) -> Vec<Neighbour> {
        if self.nodes.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut search = Search {
            qx,
            qy,
            k,
            radius_sq,
            accept,
            best: Vec::with_capacity(k.min(self.points.len()) + 1),
        };
        self.search_recursive(0, &mut search);

        search
            .best
            .iter()
            .rev()
            .map(|&(distance_sq, index)| Neighbour {
                point: self.points[index],
                distance_sq,
                index,
            })
            .collect()
    }

    fn search_recursive(&self, node_idx: usize, search: &mut Search<'_>) {
        let node = &self.nodes[node_idx];
        let p = &self.points[node.point_idx];

        let dx = search.qx - p.x;
        let dy = search.qy - p.y;
        let dist_sq = dx * dx + dy * dy;

        if dist_sq <= search.bound() && (search.accept)(p) {
            search.offer(dist_sq, node.point_idx);
        }

        let diff = if node.split_dim == 0 { dx } else { dy };
        let (first, second) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(child) = first {
            self.search_recursive(child, search);
        }

        if diff * diff <= search.bound() {
            if let Some(child) = second {
                self.search_recursive(child, search);
            }
        }
    }
}

/// Recursively build the k-d tree.
fn build_recursive(
    points: &[SamplePoint],
    indices: &mut [usize],
    depth: usize,
    nodes: &mut Vec<KdNode>,
) -> usize {
    let split_dim = (depth % 2) as u8;
    let coord = |i: usize| if split_dim == 0 { points[i].x } else { points[i].y };

    indices.sort_by(|&a, &b| {
        coord(a)
            .partial_cmp(&coord(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let median = indices.len() / 2;
    let node_idx = nodes.len();
    nodes.push(KdNode {
        point_idx: indices[median],
        split_dim,
        left: None,
        right: None,
    });

    let (left, rest) = indices.split_at_mut(median);
    let right = &mut rest[1..];

    if !left.is_empty() {
        let child = build_recursive(points, left, depth + 1, nodes);
        nodes[node_idx].left = Some(child);
    }
    if !right.is_empty() {
        let child = build_recursive(points, right, depth + 1, nodes);
        nodes[node_idx].right = Some(child);
    }

    node_idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<SamplePoint> {
        vec![
            SamplePoint::new(2.0, 3.0, 10.0),
            SamplePoint::new(5.0, 4.0, 20.0),
            SamplePoint::new(9.0, 6.0, 30.0),
            SamplePoint::new(4.0, 7.0, 40.0),
            SamplePoint::new(8.0, 1.0, 50.0),
            SamplePoint::new(7.0, 2.0, 60.0),
            SamplePoint::new(1.0, 8.0, 70.0),
            SamplePoint::new(6.0, 5.0, 80.0),
        ]
    }

    fn brute_force(pts: &[SamplePoint], qx: f64, qy: f64) -> Vec<f64> {
        let mut d: Vec<f64> = pts.iter().map(|p| p.dist_sq(qx, qy)).collect();
        d.sort_by(|a, b| a.partial_cmp(b).unwrap());
        d
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::build(&[]);
        assert!(tree.is_empty());
        assert!(tree.k_nearest(0.0, 0.0, 3).is_empty());
    }

    #[test]
    fn test_k_nearest_matches_brute_force() {
        let pts = sample_points();
        let tree = KdTree::build(&pts);

        for qx in 0..10 {
            for qy in 0..10 {
                let (qx, qy) = (qx as f64 + 0.5, qy as f64 + 0.5);
                let results = tree.k_nearest(qx, qy, 3);
                let bf = brute_force(&pts, qx, qy);
                assert_eq!(results.len(), 3);
                for (r, d) in results.iter().zip(&bf) {
                    assert!((r.distance_sq - d).abs() < 1e-10, "({}, {})", qx, qy);
                }
            }
        }
    }

    #[test]
    fn test_k_nearest_more_than_points() {
        let pts = sample_points();
        let tree = KdTree::build(&pts);
        assert_eq!(tree.k_nearest(5.0, 5.0, 100).len(), pts.len());
    }

    #[test]
    fn test_index_refers_to_input() {
        let pts = sample_points();
        let tree = KdTree::build(&pts);
        let r = tree.k_nearest(6.1, 5.1, 1);
        assert_eq!(r[0].index, 7);
        assert_eq!(r[0].point, pts[7]);
    }

    #[test]
    fn test_within_radius() {
        let pts = sample_points();
        let tree = KdTree::build(&pts);

        let results = tree.k_nearest_within(5.0, 5.0, usize::MAX, 4.0, &|_| true);
        let bf_count = pts.iter().filter(|p| p.dist_sq(5.0, 5.0) <= 4.0).count();
        assert_eq!(results.len(), bf_count);
        for w in results.windows(2) {
            assert!(w[0].distance_sq <= w[1].distance_sq);
        }
        assert!(tree.k_nearest_within(5.0, 5.0, usize::MAX, 0.0, &|_| true).len() <= 1);
    }

    #[test]
    fn test_filtered_search() {
        let pts = sample_points();
        let tree = KdTree::build(&pts);
        // Only points to the upper right of (5, 5)
        let accept = |p: &SamplePoint| p.x >= 5.0 && p.y >= 5.0;
        let r = tree.k_nearest_within(5.0, 5.0, 10, f64::INFINITY, &accept);
        let values: Vec<f64> = r.iter().map(|n| n.point.value).collect();
        assert_eq!(values, vec![80.0, 30.0]);

        let r = tree.k_nearest_within(5.0, 5.0, 10, 4.0, &accept);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_large_dataset() {
        let pts: Vec<SamplePoint> = (0..1000)
            .map(|i| {
                let x = ((i * 7 + 13) % 100) as f64;
                let y = ((i * 11 + 37) % 100) as f64;
                SamplePoint::new(x, y, i as f64)
            })
            .collect();
        let tree = KdTree::build(&pts);
        assert_eq!(tree.len(), 1000);

        let r = tree.k_nearest(50.0, 50.0, 16);
        let bf = brute_force(&pts, 50.0, 50.0);
        for (n, d) in r.iter().zip(&bf) {
            assert!((n.distance_sq - d).abs() < 1e-10);
        }
    }
}
