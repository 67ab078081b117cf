//! Nearest-neighbour search over point sets.
//!
//! The index is built once and only read afterwards, so batch queries run in
//! parallel with rayon.

use kiddo::SquaredEuclidean;
use nalgebra::Point3;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{DeformError, DeformResult};

/// Result of a nearest-neighbour query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    /// Position of the matched point in the indexed slice.
    pub index: usize,
    /// Euclidean distance to the query.
    pub distance: f64,
}

/// Read-only k-d tree over a slice of points.
///
/// When several indexed points have the same coordinates, which of them a
/// query returns is unspecified.
pub struct SpatialIndex {
    tree: kiddo::KdTree<f64, 3>,
    len: usize,
}

impl SpatialIndex {
    /// Build the index. Point `i` is reported back as index `i`.
    pub fn build(points: &[Point3<f64>]) -> Self {
        let mut tree = kiddo::KdTree::new();
        for (i, p) in points.iter().enumerate() {
            tree.add(&[p.x, p.y, p.z], i as u64);
        }
        Self {
            tree,
            len: points.len(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Closest indexed point, or `None` for an empty index.
    pub fn nearest(&self, query: &Point3<f64>) -> Option<Neighbour> {
        if self.is_empty() {
            return None;
        }
        let found = self
            .tree
            .nearest_one::<SquaredEuclidean>(&[query.x, query.y, query.z]);
        Some(Neighbour {
            index: found.item as usize,
            distance: found.distance.sqrt(),
        })
    }

    /// Closest indexed point for every query, in query order.
    pub fn nearest_all(&self, queries: &[Point3<f64>]) -> Vec<Option<Neighbour>> {
        queries.par_iter().map(|q| self.nearest(q)).collect()
    }

    /// Like [`Self::nearest_all`], but every query must find a point.
    ///
    /// Entry `i` always answers query `i`. Querying an empty index is an
    /// error rather than a shorter result.
    pub fn nearest_each(&self, queries: &[Point3<f64>]) -> DeformResult<Vec<Neighbour>> {
        self.nearest_all(queries)
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                DeformError::degenerate(
                    format!("{} queries against an empty point set", queries.len()),
                    None,
                )
            })
    }
}

/// One-sided distance summary between two point sets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Deviation {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
}

/// Distance from every point of `measured` to its nearest point of
/// `reference`, summarised.
///
/// This is the directed Hausdorff distance (`max`) together with the mean and
/// minimum of the same nearest distances.
pub fn surface_deviation(
    reference: &[Point3<f64>],
    measured: &[Point3<f64>],
) -> DeformResult<Deviation> {
    if reference.is_empty() || measured.is_empty() {
        return Err(DeformError::count_mismatch(
            "surface deviation inputs",
            reference.len().max(1),
            reference.len().min(measured.len()),
        ));
    }

    let index = SpatialIndex::build(reference);
    let distances: Vec<f64> = index
        .nearest_each(measured)?
        .into_iter()
        .map(|n| n.distance)
        .collect();

    let sum: f64 = distances.iter().sum();
    Ok(Deviation {
        mean: sum / distances.len() as f64,
        max: distances.iter().copied().fold(0.0, f64::max),
        min: distances.iter().copied().fold(f64::INFINITY, f64::min),
    })
}
