//! Centerline curves and the per-station rigid transforms between two of them.
//!
//! A [`Centerline`] is an ordered polyline with a unit tangent at every
//! station. A [`CenterlineField`] pairs a source and a target centerline of
//! equal length and stores, for every station, the rotation taking the source
//! tangent onto the target tangent and the translation between the two
//! positions.

use nalgebra::{Matrix3, Point3, Vector3};
use tracing::debug;

use crate::error::{DeformError, DeformResult};

/// Cross products shorter than this are treated as parallel tangents.
const PARALLEL_EPSILON: f64 = 1e-12;

/// An ordered centerline with unit tangents.
#[derive(Debug, Clone)]
pub struct Centerline {
    points: Vec<Point3<f64>>,
    tangents: Vec<Vector3<f64>>,
}

impl Centerline {
    /// Build a centerline from points in curve order.
    ///
    /// Needs at least two points. Fails with `DegenerateGeometry` when two
    /// points used for a tangent coincide.
    pub fn new(points: Vec<Point3<f64>>) -> DeformResult<Self> {
        if points.len() < 2 {
            return Err(DeformError::degenerate(
                format!("centerline needs at least 2 points, got {}", points.len()),
                None,
            ));
        }
        let tangents = compute_tangents(&points)?;
        Ok(Self { points, tangents })
    }

    /// Same stations with tangents averaged over a sliding window.
    pub fn smoothed(&self) -> DeformResult<Self> {
        Ok(Self {
            points: self.points.clone(),
            tangents: smooth_tangents(&self.tangents)?,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    #[inline]
    pub fn tangents(&self) -> &[Vector3<f64>] {
        &self.tangents
    }

    /// First station.
    pub fn inlet(&self) -> Point3<f64> {
        self.points[0]
    }

    /// Last station.
    pub fn outlet(&self) -> Point3<f64> {
        self.points[self.points.len() - 1]
    }

    /// Length of each edge, `points[i]` to `points[i + 1]`.
    pub fn segment_lengths(&self) -> Vec<f64> {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).collect()
    }

    /// Total polyline length.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    /// Nearest station by linear scan. Ties go to the lower index.
    pub fn nearest_station(&self, query: &Point3<f64>) -> (usize, f64) {
        let mut best = (0, f64::INFINITY);
        for (i, p) in self.points.iter().enumerate() {
            let d = (p - query).norm_squared();
            if d < best.1 {
                best = (i, d);
            }
        }
        (best.0, best.1.sqrt())
    }
}

/// Unit tangents: forward difference at the first station, backward at the
/// last, central in between.
pub fn compute_tangents(points: &[Point3<f64>]) -> DeformResult<Vec<Vector3<f64>>> {
    let n = points.len();
    if n < 2 {
        return Err(DeformError::degenerate(
            "tangents need at least 2 points",
            None,
        ));
    }

    (0..n)
        .map(|i| {
            let diff = if i == 0 {
                points[1] - points[0]
            } else if i == n - 1 {
                points[n - 1] - points[n - 2]
            } else {
                points[i + 1] - points[i - 1]
            };
            diff.try_normalize(0.0).ok_or_else(|| {
                DeformError::degenerate(
                    format!("zero-length tangent at station {}", i),
                    Some(i),
                )
            })
        })
        .collect()
}

/// Index range `[lo, hi]` averaged for station `i` of `n`.
///
/// The window spans 2 stations at either end, then 3, 3, 5, 5 and 7 in the
/// interior.
pub fn smoothing_window(i: usize, n: usize) -> (usize, usize) {
    let d = i.min(n - 1 - i);
    match d {
        0 if i == 0 => (0, 1.min(n - 1)),
        0 => (n.saturating_sub(2), n - 1),
        1 | 2 => (i - 1, i + 1),
        3 | 4 => (i - 2, i + 2),
        _ => (i - 3, i + 3),
    }
}

/// Sliding-window average of unit tangents, renormalised.
pub fn smooth_tangents(tangents: &[Vector3<f64>]) -> DeformResult<Vec<Vector3<f64>>> {
    let n = tangents.len();
    (0..n)
        .map(|i| {
            let (lo, hi) = smoothing_window(i, n);
            let sum: Vector3<f64> = tangents[lo..=hi].iter().sum();
            sum.try_normalize(0.0).ok_or_else(|| {
                DeformError::degenerate(
                    format!("smoothed tangent vanishes at station {}", i),
                    Some(i),
                )
            })
        })
        .collect()
}

/// Rotation taking unit vector `a` onto unit vector `b` (Rodrigues).
///
/// Exactly opposed vectors have no defined rotation axis. For them this
/// returns the point inversion `diag(-1, -1, -1)`, which maps `a` to `b` but
/// is not a proper rotation.
pub fn rotation_between(a: &Vector3<f64>, b: &Vector3<f64>) -> Matrix3<f64> {
    if a == b {
        return Matrix3::identity();
    }

    let cross = a.cross(b);
    let dot = a.dot(b);
    let sin_len = cross.norm();
    if sin_len < PARALLEL_EPSILON {
        return if dot > 0.0 {
            Matrix3::identity()
        } else {
            -Matrix3::identity()
        };
    }

    let axis = cross / sin_len;
    let theta = dot.clamp(-1.0, 1.0).acos();
    let (sin, cos) = theta.sin_cos();
    Matrix3::identity() * cos + axis.cross_matrix() * sin + (axis * axis.transpose()) * (1.0 - cos)
}

/// Rigid transform of one centerline station.
#[derive(Debug, Clone)]
pub struct CenterlineStation {
    pub index: usize,
    pub source: Point3<f64>,
    pub target: Point3<f64>,
    pub source_tangent: Vector3<f64>,
    pub target_tangent: Vector3<f64>,
    /// Maps `source_tangent` onto `target_tangent`.
    pub rotation: Matrix3<f64>,
    /// `target - source`.
    pub translation: Vector3<f64>,
}

impl CenterlineStation {
    /// Rotate `p` about the source station.
    #[inline]
    pub fn rotate_about_source(&self, p: &Point3<f64>) -> Point3<f64> {
        self.source + self.rotation * (p - self.source)
    }
}

/// Per-station transforms between a source and a target centerline.
#[derive(Debug, Clone)]
pub struct CenterlineField {
    stations: Vec<CenterlineStation>,
}

impl CenterlineField {
    /// Pair two centerlines station by station.
    ///
    /// With `smooth` set, both tangent sets are smoothed before the rotations
    /// are computed.
    pub fn new(source: &Centerline, target: &Centerline, smooth: bool) -> DeformResult<Self> {
        if source.len() != target.len() {
            return Err(DeformError::count_mismatch(
                "target centerline points",
                source.len(),
                target.len(),
            ));
        }

        let (src_tangents, dst_tangents) = if smooth {
            (
                smooth_tangents(source.tangents())?,
                smooth_tangents(target.tangents())?,
            )
        } else {
            (source.tangents().to_vec(), target.tangents().to_vec())
        };

        let stations: Vec<CenterlineStation> = (0..source.len())
            .map(|i| {
                let src = source.points()[i];
                let dst = target.points()[i];
                CenterlineStation {
                    index: i,
                    source: src,
                    target: dst,
                    source_tangent: src_tangents[i],
                    target_tangent: dst_tangents[i],
                    rotation: rotation_between(&src_tangents[i], &dst_tangents[i]),
                    translation: dst - src,
                }
            })
            .collect();

        debug!(
            stations = stations.len(),
            smooth,
            "Built centerline field"
        );

        Ok(Self { stations })
    }

    #[inline]
    pub fn stations(&self) -> &[CenterlineStation] {
        &self.stations
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&CenterlineStation> {
        self.stations.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Largest station displacement.
    pub fn max_translation(&self) -> f64 {
        self.stations
            .iter()
            .map(|s| s.translation.norm())
            .fold(0.0, f64::max)
    }
}
