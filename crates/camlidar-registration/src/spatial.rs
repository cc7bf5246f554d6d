//! Nearest-neighbour index over the full lidar cloud.
//!
//! Built once from the cloud and read-only afterwards, so a single index is
//! shared by every scoring call and every refinement worker.

use camlidar_core::{Pt3, Real};
use std::fmt;

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use rayon::prelude::*;

use crate::error::RegistrationError;

/// Batches at least this large are queried on the rayon pool.
const PARALLEL_BATCH: usize = 4096;

/// Closest cloud point to a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index into the indexed cloud.
    pub index: usize,
    /// Euclidean distance to the query.
    pub distance: Real,
}

/// KD-tree over the full lidar cloud.
///
/// The tree has no bucket limit, so clouds where many points share a
/// coordinate (walls and boards aligned with a lidar axis) index fine.
pub struct SpatialIndex {
    kdtree: ImmutableKdTree<Real, 3>,
    points: Vec<Pt3>,
}

impl fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("points", &self.points.len())
            .finish()
    }
}

impl SpatialIndex {
    /// Index `points`. Fails on an empty cloud.
    pub fn new(points: Vec<Pt3>) -> Result<Self, RegistrationError> {
        if points.is_empty() {
            return Err(RegistrationError::EmptyCloud);
        }
        let coords: Vec<[Real; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
        // item values are the positions in `coords`
        let kdtree = ImmutableKdTree::<Real, 3>::new_from_slice(&coords);
        Ok(Self { kdtree, points })
    }

    /// Closest indexed point to `query`.
    #[inline]
    pub fn nearest(&self, query: &Pt3) -> Neighbor {
        let nn = self
            .kdtree
            .nearest_one::<SquaredEuclidean>(&[query.x, query.y, query.z]);
        Neighbor {
            index: nn.item as usize,
            distance: nn.distance.sqrt(),
        }
    }

    /// Closest indexed point for every query, in query order.
    pub fn nearest_batch(&self, queries: &[Pt3]) -> Vec<Neighbor> {
        if queries.len() >= PARALLEL_BATCH {
            queries.par_iter().map(|q| self.nearest(q)).collect()
        } else {
            queries.iter().map(|q| self.nearest(q)).collect()
        }
    }

    /// Indexed point at `index`.
    pub fn point(&self, index: usize) -> &Pt3 {
        &self.points[index]
    }

    pub fn points(&self) -> &[Pt3] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(points: &[Pt3], q: &Pt3) -> Real {
        points
            .iter()
            .map(|p| (p - q).norm())
            .min_by(|a, b| a.total_cmp(b))
            .unwrap()
    }

    #[test]
    fn empty_cloud_is_rejected() {
        assert!(matches!(
            SpatialIndex::new(Vec::new()),
            Err(RegistrationError::EmptyCloud)
        ));
    }

    #[test]
    fn nearest_matches_brute_force() {
        // planar grid plus a few off-plane points
        let mut points = Vec::new();
        for i in 0..20 {
            for j in 0..20 {
                points.push(Pt3::new(i as Real * 0.1, j as Real * 0.1, 0.0));
            }
        }
        points.push(Pt3::new(0.55, 0.55, 0.7));
        points.push(Pt3::new(-1.0, 3.0, -0.2));
        let index = SpatialIndex::new(points.clone()).unwrap();
        assert_eq!(index.len(), points.len());

        let queries = [
            Pt3::new(0.51, 0.49, 0.02),
            Pt3::new(0.55, 0.55, 0.6),
            Pt3::new(-2.0, 4.0, 0.0),
            Pt3::new(1.9, 1.9, -0.3),
        ];
        let batch = index.nearest_batch(&queries);
        for (q, nn) in queries.iter().zip(&batch) {
            let dist = brute_force(&points, q);
            assert!((nn.distance - dist).abs() < 1e-12);
            assert!(((index.point(nn.index) - q).norm() - dist).abs() < 1e-12);
            assert_eq!(*nn, index.nearest(q));
        }
    }

    #[test]
    fn axis_aligned_wall_builds_and_queries() {
        // quantized wall in the lidar y/z plane: every point shares x
        let mut points = Vec::new();
        for i in 0..400 {
            for j in 0..10 {
                points.push(Pt3::new(3.0, i as Real * 0.01 - 2.0, j as Real * 0.01));
            }
        }
        let index = SpatialIndex::new(points.clone()).unwrap();
        assert_eq!(index.len(), 4000);

        let queries = [
            Pt3::new(3.0, 0.0, 0.05),
            Pt3::new(2.9, -1.234, 0.031),
            Pt3::new(3.5, 1.99, 0.2),
            Pt3::new(0.0, 5.0, -1.0),
        ];
        for q in &queries {
            let nn = index.nearest(q);
            assert!((nn.distance - brute_force(&points, q)).abs() < 1e-12);
        }
        assert!(index.nearest(&queries[0]).distance < 1e-9);
    }

    #[test]
    fn exact_hit_has_zero_distance() {
        let points = vec![
            Pt3::new(1.0, 2.0, 3.0),
            Pt3::new(-1.0, 0.0, 4.0),
            Pt3::new(0.0, 0.0, 0.0),
        ];
        let index = SpatialIndex::new(points).unwrap();
        let nn = index.nearest(&Pt3::new(-1.0, 0.0, 4.0));
        assert_eq!(nn.index, 1);
        assert_eq!(nn.distance, 0.0);
    }
}
