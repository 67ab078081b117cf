//! Shape quality measures for triangles and tetrahedra.
//!
//! All ratios equal 1.0 for the regular element and grow as the element
//! degenerates. Degenerate elements (zero area or volume) report
//! `f64::INFINITY`, so "lower is better" comparisons stay total.

use nalgebra::{Point3, Vector3};
use serde::Serialize;

use crate::types::{CellKind, Region, VolumeMesh};

const SQRT_3: f64 = 1.732_050_807_568_877_2;
const SQRT_6: f64 = 2.449_489_742_783_178;

/// A triangle with concrete vertex positions.
///
/// Winding is counter-clockwise when viewed from the side the normal points to.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Unnormalized normal via the right-hand rule.
    #[inline]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0))
    }

    /// Unit normal, or `None` for a degenerate triangle.
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.normal_unnormalized();
        let len_sq = n.norm_squared();
        if len_sq > f64::EPSILON {
            Some(n / len_sq.sqrt())
        } else {
            None
        }
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.normal_unnormalized().norm() * 0.5
    }

    #[inline]
    pub fn centroid(&self) -> Point3<f64> {
        Point3::from((self.v0.coords + self.v1.coords + self.v2.coords) / 3.0)
    }

    /// Lengths `[|v1 - v0|, |v2 - v1|, |v0 - v2|]`.
    #[inline]
    pub fn edge_lengths(&self) -> [f64; 3] {
        [
            (self.v1 - self.v0).norm(),
            (self.v2 - self.v1).norm(),
            (self.v0 - self.v2).norm(),
        ]
    }

    #[inline]
    pub fn perimeter(&self) -> f64 {
        self.edge_lengths().iter().sum()
    }

    /// Radius of the inscribed circle.
    pub fn inradius(&self) -> f64 {
        let perimeter = self.perimeter();
        if perimeter < f64::EPSILON {
            return 0.0;
        }
        2.0 * self.area() / perimeter
    }

    /// Radius of the circumscribed circle, infinite when degenerate.
    pub fn circumradius(&self) -> f64 {
        let area = self.area();
        if area < f64::EPSILON {
            return f64::INFINITY;
        }
        let [a, b, c] = self.edge_lengths();
        a * b * c / (4.0 * area)
    }

    /// Aspect ratio `l_max * perimeter / (4 * sqrt(3) * area)`.
    pub fn aspect_ratio(&self) -> f64 {
        let area = self.area();
        if area < f64::EPSILON {
            return f64::INFINITY;
        }
        let lengths = self.edge_lengths();
        let max = lengths[0].max(lengths[1]).max(lengths[2]);
        max * self.perimeter() / (4.0 * SQRT_3 * area)
    }

    /// Longest over shortest edge.
    pub fn edge_ratio(&self) -> f64 {
        let lengths = self.edge_lengths();
        let min = lengths[0].min(lengths[1]).min(lengths[2]);
        let max = lengths[0].max(lengths[1]).max(lengths[2]);
        if min < f64::EPSILON {
            return f64::INFINITY;
        }
        max / min
    }

    /// Circumradius over twice the inradius.
    pub fn radius_ratio(&self) -> f64 {
        let r = self.inradius();
        if r < f64::EPSILON {
            return f64::INFINITY;
        }
        self.circumradius() / (2.0 * r)
    }

    /// Interior angle at corner `i` (0, 1 or 2), in radians.
    pub fn angle_at(&self, i: usize) -> Option<f64> {
        let (apex, a, b) = match i {
            0 => (self.v0, self.v1, self.v2),
            1 => (self.v1, self.v2, self.v0),
            2 => (self.v2, self.v0, self.v1),
            _ => return None,
        };
        corner_angle(&apex, &a, &b)
    }

    /// All quality measures at once.
    pub fn quality(&self) -> TriangleQuality {
        TriangleQuality {
            area: self.area(),
            aspect_ratio: self.aspect_ratio(),
            edge_ratio: self.edge_ratio(),
            radius_ratio: self.radius_ratio(),
        }
    }
}

/// Angle at `apex` between the directions to `a` and `b`, in radians.
///
/// Returns `None` if either direction has zero length.
pub fn corner_angle(apex: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> Option<f64> {
    let da = a - apex;
    let db = b - apex;
    let denom = da.norm() * db.norm();
    if denom < f64::EPSILON {
        return None;
    }
    Some((da.dot(&db) / denom).clamp(-1.0, 1.0).acos())
}

/// Quality measures of one triangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TriangleQuality {
    pub area: f64,
    pub aspect_ratio: f64,
    pub edge_ratio: f64,
    pub radius_ratio: f64,
}

/// A tetrahedron with concrete vertex positions.
#[derive(Debug, Clone, Copy)]
pub struct Tetrahedron {
    pub v: [Point3<f64>; 4],
}

impl Tetrahedron {
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>, v3: Point3<f64>) -> Self {
        Self {
            v: [v0, v1, v2, v3],
        }
    }

    /// Signed volume, positive when `v3` lies on the normal side of `(v0, v1, v2)`.
    pub fn signed_volume(&self) -> f64 {
        let [p0, p1, p2, p3] = self.v;
        (p1 - p0).cross(&(p2 - p0)).dot(&(p3 - p0)) / 6.0
    }

    #[inline]
    pub fn volume(&self) -> f64 {
        self.signed_volume().abs()
    }

    /// The six edge lengths.
    pub fn edge_lengths(&self) -> [f64; 6] {
        let [p0, p1, p2, p3] = self.v;
        [
            (p1 - p0).norm(),
            (p2 - p1).norm(),
            (p0 - p2).norm(),
            (p3 - p0).norm(),
            (p3 - p1).norm(),
            (p3 - p2).norm(),
        ]
    }

    /// Sum of the four face areas.
    pub fn surface_area(&self) -> f64 {
        let [p0, p1, p2, p3] = self.v;
        Triangle::new(p0, p1, p2).area()
            + Triangle::new(p0, p1, p3).area()
            + Triangle::new(p1, p2, p3).area()
            + Triangle::new(p2, p0, p3).area()
    }

    /// Radius of the inscribed sphere.
    pub fn inradius(&self) -> f64 {
        let area = self.surface_area();
        if area < f64::EPSILON {
            return 0.0;
        }
        3.0 * self.volume() / area
    }

    /// Radius of the circumscribed sphere, infinite when degenerate.
    pub fn circumradius(&self) -> f64 {
        let [p0, p1, p2, p3] = self.v;
        let a = p1 - p0;
        let b = p2 - p0;
        let c = p3 - p0;
        let det = a.dot(&b.cross(&c));
        if det.abs() < f64::EPSILON {
            return f64::INFINITY;
        }
        let numerator =
            b.cross(&c) * a.norm_squared() + c.cross(&a) * b.norm_squared() + a.cross(&b) * c.norm_squared();
        numerator.norm() / (2.0 * det.abs())
    }

    /// Aspect ratio `l_max / (2 * sqrt(6) * inradius)`.
    pub fn aspect_ratio(&self) -> f64 {
        let r = self.inradius();
        if r < f64::EPSILON {
            return f64::INFINITY;
        }
        let max = self.edge_lengths().iter().copied().fold(0.0, f64::max);
        max / (2.0 * SQRT_6 * r)
    }

    /// Longest over shortest edge.
    pub fn edge_ratio(&self) -> f64 {
        let lengths = self.edge_lengths();
        let min = lengths.iter().copied().fold(f64::INFINITY, f64::min);
        let max = lengths.iter().copied().fold(0.0, f64::max);
        if min < f64::EPSILON {
            return f64::INFINITY;
        }
        max / min
    }

    /// Circumradius over three times the inradius.
    pub fn radius_ratio(&self) -> f64 {
        let r = self.inradius();
        if r < f64::EPSILON {
            return f64::INFINITY;
        }
        self.circumradius() / (3.0 * r)
    }

    pub fn quality(&self) -> TetrahedronQuality {
        TetrahedronQuality {
            volume: self.signed_volume(),
            aspect_ratio: self.aspect_ratio(),
            edge_ratio: self.edge_ratio(),
            radius_ratio: self.radius_ratio(),
        }
    }
}

/// Quality measures of one tetrahedron.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TetrahedronQuality {
    pub volume: f64,
    pub aspect_ratio: f64,
    pub edge_ratio: f64,
    pub radius_ratio: f64,
}

/// Running min/mean/max of one measure. Infinite samples are counted as
/// degenerate and kept out of the mean.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricStats {
    pub count: usize,
    pub degenerate: usize,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

impl MetricStats {
    fn from_samples(samples: impl Iterator<Item = f64>) -> Self {
        let mut stats = MetricStats {
            min: f64::INFINITY,
            max: 0.0,
            ..Default::default()
        };
        let mut sum = 0.0;
        let mut finite = 0usize;
        for value in samples {
            stats.count += 1;
            if !value.is_finite() {
                stats.degenerate += 1;
                continue;
            }
            finite += 1;
            sum += value;
            stats.min = stats.min.min(value);
            stats.max = stats.max.max(value);
        }
        if finite == 0 {
            stats.min = 0.0;
        } else {
            stats.mean = sum / finite as f64;
        }
        stats
    }
}

/// Quality summary of a mesh's wall triangles and tetrahedra.
#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub wall_aspect_ratio: MetricStats,
    pub wall_edge_ratio: MetricStats,
    pub wall_radius_ratio: MetricStats,
    pub tetra_aspect_ratio: MetricStats,
    pub tetra_edge_ratio: MetricStats,
    pub tetra_radius_ratio: MetricStats,
    /// Tetrahedra with non-positive signed volume.
    pub inverted_tetrahedra: usize,
}

impl QualityReport {
    /// Measure every wall triangle and tetrahedron of a mesh.
    pub fn from_mesh(mesh: &VolumeMesh) -> Self {
        let walls: Vec<TriangleQuality> = mesh
            .cells_in(Region::Wall)
            .filter_map(|(index, _)| mesh.triangle(index))
            .map(|t| t.quality())
            .collect();

        let tets: Vec<TetrahedronQuality> = mesh
            .cells
            .iter()
            .filter(|c| c.kind == CellKind::Tetrahedron)
            .filter_map(|c| {
                let p = |i: usize| mesh.vertices.get(*c.nodes.get(i)? as usize).map(|v| v.position);
                Some(Tetrahedron::new(p(0)?, p(1)?, p(2)?, p(3)?).quality())
            })
            .collect();

        Self {
            wall_aspect_ratio: MetricStats::from_samples(walls.iter().map(|q| q.aspect_ratio)),
            wall_edge_ratio: MetricStats::from_samples(walls.iter().map(|q| q.edge_ratio)),
            wall_radius_ratio: MetricStats::from_samples(walls.iter().map(|q| q.radius_ratio)),
            tetra_aspect_ratio: MetricStats::from_samples(tets.iter().map(|q| q.aspect_ratio)),
            tetra_edge_ratio: MetricStats::from_samples(tets.iter().map(|q| q.edge_ratio)),
            tetra_radius_ratio: MetricStats::from_samples(tets.iter().map(|q| q.radius_ratio)),
            inverted_tetrahedra: tets.iter().filter(|q| q.volume <= 0.0).count(),
        }
    }
}

impl std::fmt::Display for QualityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rows = [
            ("wall aspect ratio", &self.wall_aspect_ratio),
            ("wall edge ratio", &self.wall_edge_ratio),
            ("wall radius ratio", &self.wall_radius_ratio),
            ("tetra aspect ratio", &self.tetra_aspect_ratio),
            ("tetra edge ratio", &self.tetra_edge_ratio),
            ("tetra radius ratio", &self.tetra_radius_ratio),
        ];
        writeln!(f, "Mesh Quality:")?;
        for (name, stats) in rows {
            if stats.count == 0 {
                continue;
            }
            writeln!(
                f,
                "  {:<20} min {:.3}  mean {:.3}  max {:.3}  ({} elements, {} degenerate)",
                name, stats.min, stats.mean, stats.max, stats.count, stats.degenerate
            )?;
        }
        if self.inverted_tetrahedra > 0 {
            writeln!(f, "  inverted tetrahedra: {}", self.inverted_tetrahedra)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, MeshVariant, physical};
    use approx::assert_relative_eq;

    fn equilateral() -> Triangle {
        Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 3f64.sqrt() / 2.0, 0.0),
        )
    }

    fn regular_tet() -> Tetrahedron {
        Tetrahedron::new(
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
        )
    }

    #[test]
    fn test_equilateral_triangle_is_ideal() {
        let q = equilateral().quality();
        assert_relative_eq!(q.aspect_ratio, 1.0, epsilon = 1e-12);
        assert_relative_eq!(q.edge_ratio, 1.0, epsilon = 1e-12);
        assert_relative_eq!(q.radius_ratio, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_right_triangle_measures() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        assert_relative_eq!(tri.area(), 0.5);
        assert_relative_eq!(tri.edge_ratio(), 2f64.sqrt(), epsilon = 1e-12);
        // Hypotenuse is the circumdiameter.
        assert_relative_eq!(tri.circumradius(), 2f64.sqrt() / 2.0, epsilon = 1e-12);
        let expected = 2f64.sqrt() * (2.0 + 2f64.sqrt()) / (4.0 * SQRT_3 * 0.5);
        assert_relative_eq!(tri.aspect_ratio(), expected, epsilon = 1e-12);
        assert!(tri.aspect_ratio() > 1.0);
    }

    #[test]
    fn test_degenerate_triangle_is_infinite() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        );
        assert!(tri.aspect_ratio().is_infinite());
        assert!(tri.radius_ratio().is_infinite());
        assert!(tri.normal().is_none());
    }

    #[test]
    fn test_angles() {
        let tri = equilateral();
        for i in 0..3 {
            let angle = tri.angle_at(i).expect("valid corner");
            assert_relative_eq!(angle, std::f64::consts::FRAC_PI_3, epsilon = 1e-12);
        }
        assert!(tri.angle_at(3).is_none());

        let apex = Point3::new(0.0, 0.0, 0.0);
        assert!(corner_angle(&apex, &apex, &Point3::new(1.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_regular_tetrahedron_is_ideal() {
        let tet = regular_tet();
        let q = tet.quality();
        assert_relative_eq!(q.aspect_ratio, 1.0, epsilon = 1e-10);
        assert_relative_eq!(q.edge_ratio, 1.0, epsilon = 1e-10);
        assert_relative_eq!(q.radius_ratio, 1.0, epsilon = 1e-10);
        assert_relative_eq!(tet.circumradius(), 3f64.sqrt(), epsilon = 1e-10);
    }

    #[test]
    fn test_tetrahedron_volume_sign() {
        let tet = Tetrahedron::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        );
        assert_relative_eq!(tet.signed_volume(), 1.0 / 6.0, epsilon = 1e-12);

        let flipped = Tetrahedron::new(tet.v[1], tet.v[0], tet.v[2], tet.v[3]);
        assert_relative_eq!(flipped.signed_volume(), -1.0 / 6.0, epsilon = 1e-12);
        assert!(tet.aspect_ratio() > 1.0);
    }

    #[test]
    fn test_flat_tetrahedron_is_infinite() {
        let tet = Tetrahedron::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        );
        assert!(tet.aspect_ratio().is_infinite());
        assert!(tet.circumradius().is_infinite());
    }

    #[test]
    fn test_quality_report() {
        let mut mesh = VolumeMesh::new(MeshVariant::Merged);
        let tri = equilateral();
        for p in [tri.v0, tri.v1, tri.v2, Point3::new(0.5, 0.3, 0.8)] {
            mesh.add_vertex(p);
        }
        mesh.add_cell(Cell::triangle(physical::WALL, [0, 1, 2]));
        mesh.add_cell(Cell::tetrahedron(physical::INTERIOR, [0, 1, 2, 3]));
        mesh.add_cell(Cell::tetrahedron(physical::INTERIOR, [1, 0, 2, 3]));

        let report = QualityReport::from_mesh(&mesh);
        assert_eq!(report.wall_aspect_ratio.count, 1);
        assert_relative_eq!(report.wall_aspect_ratio.mean, 1.0, epsilon = 1e-12);
        assert_eq!(report.tetra_aspect_ratio.count, 2);
        assert_eq!(report.inverted_tetrahedra, 1);

        let text = report.to_string();
        assert!(text.contains("wall aspect ratio"));
        assert!(text.contains("inverted tetrahedra: 1"));
    }
}
