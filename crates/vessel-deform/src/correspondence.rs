//! Correspondence between mesh entities and centerline stations.
//!
//! Wall triangles are matched to their nearest centerline station, and the
//! match is pushed down through each triangle's prism column so that every
//! vertex of the boundary layer knows which stations it should follow.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::centerline::Centerline;
use crate::columns::PrismColumns;
use crate::error::{DeformError, DeformResult};
use crate::quality::Triangle;
use crate::spatial::SpatialIndex;
use crate::tracing_ext::OperationTimer;
use crate::types::VolumeMesh;

/// For every point of `b`, the index of its nearest point in `a`.
///
/// The two sets are expected to sample the same surface, so they must have
/// the same size. Identical inputs give the identity mapping.
pub fn map_surface_nodes(a: &[Point3<f64>], b: &[Point3<f64>]) -> DeformResult<Vec<usize>> {
    if a.len() != b.len() {
        return Err(DeformError::count_mismatch("surface nodes", a.len(), b.len()));
    }

    let index = SpatialIndex::build(a);
    let mapping: Vec<usize> = index
        .nearest_each(b)?
        .into_iter()
        .map(|n| n.index)
        .collect();

    debug!(nodes = mapping.len(), "Mapped surface nodes");
    Ok(mapping)
}

/// Station assigned to one wall triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleStation {
    pub station: usize,
    /// From the triangle centroid to the station.
    pub offset: Vector3<f64>,
}

/// Nearest centerline station of every triangle centroid.
pub fn map_triangles_to_centerline(
    centerline: &Centerline,
    triangles: &[Triangle],
) -> Vec<TriangleStation> {
    let _timer = OperationTimer::new("map_triangles_to_centerline");
    let points = centerline.points();

    triangles
        .par_iter()
        .map(|tri| {
            let centroid = tri.centroid();
            let (station, _) = centerline.nearest_station(&centroid);
            TriangleStation {
                station,
                offset: points[station] - centroid,
            }
        })
        .collect()
}

/// Which candidate won in [`map_node_to_centerline_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionKind {
    /// The nearest station itself.
    Station,
    /// The segment ending at the nearest station.
    PreviousSegment,
    /// The segment starting at the nearest station.
    NextSegment,
}

/// Projection of a surface node onto the centerline polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeProjection {
    /// Centerline edge `edge -> edge + 1` the node is assigned to.
    pub edge: usize,
    /// Nearest station found by the initial scan.
    pub station: usize,
    pub kind: ProjectionKind,
    /// Closest point on the chosen candidate.
    pub foot: Point3<f64>,
    /// Distance from the node to `foot`.
    pub distance: f64,
}

/// Foot of `node` on segment `start -> end` if it falls strictly inside.
fn project_on_segment(
    node: &Point3<f64>,
    start: &Point3<f64>,
    end: &Point3<f64>,
) -> Option<Point3<f64>> {
    let edge = end - start;
    let len_sq = edge.norm_squared();
    if len_sq < f64::EPSILON {
        return None;
    }
    let t = edge.dot(&(node - start)) / len_sq;
    (t > 0.0 && t < 1.0).then(|| start + edge * t)
}

/// Assign a surface node to a centerline edge.
///
/// The nearest station is found by linear scan, then the node is projected
/// onto the segments before and after it. A projection counts only when it
/// lands strictly inside its segment. Among the station and the valid
/// projections the closest wins:
/// - the previous segment assigns edge `station - 1`;
/// - the station itself or the next segment assign edge `station`.
///
/// The first station has no previous segment and the last has no next one.
/// A node that resolves to the last station itself is assigned the last
/// edge, `N - 2`.
pub fn map_node_to_centerline_edge(node: &Point3<f64>, centerline: &Centerline) -> EdgeProjection {
    let points = centerline.points();
    let n = points.len();
    let (station, station_distance) = centerline.nearest_station(node);

    let mut best = EdgeProjection {
        edge: station.min(n - 2),
        station,
        kind: ProjectionKind::Station,
        foot: points[station],
        distance: station_distance,
    };

    if station > 0 {
        if let Some(foot) = project_on_segment(node, &points[station - 1], &points[station]) {
            let distance = (node - foot).norm();
            if distance < best.distance {
                best = EdgeProjection {
                    edge: station - 1,
                    station,
                    kind: ProjectionKind::PreviousSegment,
                    foot,
                    distance,
                };
            }
        }
    }

    if station + 1 < n {
        if let Some(foot) = project_on_segment(node, &points[station], &points[station + 1]) {
            let distance = (node - foot).norm();
            if distance < best.distance {
                best = EdgeProjection {
                    edge: station,
                    station,
                    kind: ProjectionKind::NextSegment,
                    foot,
                    distance,
                };
            }
        }
    }

    best
}

/// Mean distance of surface nodes to the centerline, per centerline edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeRadius {
    pub edge: usize,
    pub samples: usize,
    /// `None` when no node was assigned to the edge.
    pub mean_radius: Option<f64>,
}

/// Average cross-sectional radius of every centerline edge.
///
/// Each node contributes its projection distance to the edge it is assigned
/// to by [`map_node_to_centerline_edge`].
pub fn average_edge_radii(nodes: &[Point3<f64>], centerline: &Centerline) -> Vec<EdgeRadius> {
    let edge_count = centerline.len() - 1;
    let mut sums = vec![0.0; edge_count];
    let mut counts = vec![0usize; edge_count];

    let projections: Vec<EdgeProjection> = nodes
        .par_iter()
        .map(|p| map_node_to_centerline_edge(p, centerline))
        .collect();
    for projection in projections {
        sums[projection.edge] += projection.distance;
        counts[projection.edge] += 1;
    }

    (0..edge_count)
        .map(|edge| EdgeRadius {
            edge,
            samples: counts[edge],
            mean_radius: (counts[edge] > 0).then(|| sums[edge] / counts[edge] as f64),
        })
        .collect()
}

/// Counts from [`propagate_correspondence_to_volume`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PropagationStats {
    pub columns: usize,
    pub cells: usize,
    pub vertices_touched: usize,
    pub entries: usize,
    pub excluded_columns: usize,
}

/// Hand each column's station to every cell of the column and to every
/// vertex of those cells.
///
/// Vertices collect one entry per touching cell, so shared vertices end up
/// with several entries. Existing correspondence is cleared first. A `None`
/// station excludes the column: its vertices receive excluded entries.
///
/// The mesh is left untouched when a cell or column is malformed.
pub fn propagate_correspondence_to_volume(
    mesh: &mut VolumeMesh,
    columns: &PrismColumns,
    stations: &[Option<usize>],
) -> DeformResult<PropagationStats> {
    mesh.check_indices()?;
    columns.check_cells(mesh)?;
    if columns.len() != stations.len() {
        return Err(DeformError::count_mismatch(
            "triangle correspondence entries",
            columns.len(),
            stations.len(),
        ));
    }

    let _timer = OperationTimer::with_context(
        "propagate_correspondence",
        mesh.cell_count(),
        mesh.vertex_count(),
    );

    mesh.clear_correspondence();
    let mut stats = PropagationStats {
        columns: columns.len(),
        ..Default::default()
    };

    for (column, &station) in columns.iter().zip(stations) {
        if station.is_none() {
            stats.excluded_columns += 1;
        }
        for &cell_index in &column.cells {
            let cell = &mut mesh.cells[cell_index];
            cell.station = station;
            stats.cells += 1;
            for &node in &cell.nodes {
                let vertex = &mut mesh.vertices[node as usize];
                if vertex.stations.is_empty() {
                    stats.vertices_touched += 1;
                }
                vertex.stations.push(station);
                stats.entries += 1;
            }
        }
    }

    info!(
        columns = stats.columns,
        vertices = stats.vertices_touched,
        entries = stats.entries,
        "Propagated correspondence to volume"
    );
    Ok(stats)
}

/// Give every vertex with an empty correspondence list its nearest source
/// station. Returns the number of vertices mapped.
///
/// Used for vertices that belong to no prism column, such as the tetrahedral
/// core.
pub fn map_free_vertices_to_centerline(mesh: &mut VolumeMesh, centerline: &Centerline) -> usize {
    let mut mapped = 0;
    for vertex in mesh.vertices.iter_mut().filter(|v| v.stations.is_empty()) {
        let (station, _) = centerline.nearest_station(&vertex.position);
        vertex.stations.push(Some(station));
        mapped += 1;
    }
    if mapped > 0 {
        warn!(
            vertices = mapped,
            "Vertices outside prism columns follow their nearest station"
        );
    }
    mapped
}

/// Station of every column's wall triangle, in column order.
pub fn map_columns_to_centerline(
    mesh: &VolumeMesh,
    columns: &PrismColumns,
    centerline: &Centerline,
) -> DeformResult<Vec<TriangleStation>> {
    let triangles = columns
        .iter()
        .map(|column| {
            mesh.triangle(column.wall())
                .ok_or_else(|| DeformError::topology("wall cell is not a triangle"))
        })
        .collect::<DeformResult<Vec<Triangle>>>()?;
    Ok(map_triangles_to_centerline(centerline, &triangles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::tests::extruded_pair;
    use approx::assert_relative_eq;

    fn straight(n: usize, length: f64) -> Centerline {
        let points = (0..n)
            .map(|i| Point3::new(0.0, 0.0, length * i as f64 / (n - 1) as f64))
            .collect();
        match Centerline::new(points) {
            Ok(c) => c,
            Err(e) => panic!("test centerline: {}", e),
        }
    }

    #[test]
    fn test_map_surface_nodes_identity() {
        let points: Vec<Point3<f64>> = (0..20)
            .map(|i| {
                let a = i as f64 * 0.3;
                Point3::new(a.cos(), a.sin(), i as f64 * 0.1)
            })
            .collect();
        let mapping = map_surface_nodes(&points, &points).expect("equal sizes");
        assert_eq!(mapping, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_map_surface_nodes_permuted() {
        let a = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let b = vec![a[2] + Vector3::new(1e-6, 0.0, 0.0), a[0], a[1]];
        assert_eq!(map_surface_nodes(&a, &b).expect("equal sizes"), vec![2, 0, 1]);
    }

    #[test]
    fn test_map_surface_nodes_count_mismatch() {
        let a = vec![Point3::origin(); 3];
        let b = vec![Point3::origin(); 2];
        assert!(matches!(
            map_surface_nodes(&a, &b),
            Err(DeformError::InputCountMismatch { expected: 3, found: 2, .. })
        ));
    }

    #[test]
    fn test_triangles_to_centerline() {
        let cl = straight(5, 10.0);
        let tri = Triangle::new(
            Point3::new(1.0, 0.0, 4.6),
            Point3::new(1.0, 1.0, 5.2),
            Point3::new(0.0, 1.0, 5.2),
        );
        let result = map_triangles_to_centerline(&cl, &[tri]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].station, 2);
        let expected = Point3::new(0.0, 0.0, 5.0) - tri.centroid();
        assert_relative_eq!(result[0].offset, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_node_projects_on_next_segment() {
        let cl = straight(5, 10.0);
        // Nearest station is 2 (z = 5); the foot lies on 5 -> 7.5.
        let p = map_node_to_centerline_edge(&Point3::new(1.0, 0.0, 5.5), &cl);
        assert_eq!(p.station, 2);
        assert_eq!(p.kind, ProjectionKind::NextSegment);
        assert_eq!(p.edge, 2);
        assert_relative_eq!(p.distance, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_node_projects_on_previous_segment() {
        let cl = straight(5, 10.0);
        let p = map_node_to_centerline_edge(&Point3::new(0.0, 2.0, 4.0), &cl);
        assert_eq!(p.station, 2);
        assert_eq!(p.kind, ProjectionKind::PreviousSegment);
        assert_eq!(p.edge, 1);
        assert_relative_eq!(p.foot, Point3::new(0.0, 0.0, 4.0), epsilon = 1e-12);
    }

    #[test]
    fn test_node_at_ends() {
        let cl = straight(5, 10.0);

        // Beyond the inlet: only the station itself qualifies.
        let p = map_node_to_centerline_edge(&Point3::new(1.0, 0.0, -1.0), &cl);
        assert_eq!(p.kind, ProjectionKind::Station);
        assert_eq!(p.edge, 0);

        // Beyond the outlet: clamped to the last edge.
        let p = map_node_to_centerline_edge(&Point3::new(1.0, 0.0, 11.0), &cl);
        assert_eq!(p.station, 4);
        assert_eq!(p.kind, ProjectionKind::Station);
        assert_eq!(p.edge, 3);

        // Just inside the outlet: previous segment, edge 3.
        let p = map_node_to_centerline_edge(&Point3::new(1.0, 0.0, 9.5), &cl);
        assert_eq!(p.kind, ProjectionKind::PreviousSegment);
        assert_eq!(p.edge, 3);
    }

    #[test]
    fn test_average_edge_radii() {
        let cl = straight(3, 2.0);
        let nodes: Vec<Point3<f64>> = (0..8)
            .map(|i| {
                let a = i as f64 * std::f64::consts::FRAC_PI_4;
                Point3::new(2.0 * a.cos(), 2.0 * a.sin(), 0.5)
            })
            .collect();
        let radii = average_edge_radii(&nodes, &cl);
        assert_eq!(radii.len(), 2);
        assert_eq!(radii[0].samples, 8);
        assert_relative_eq!(radii[0].mean_radius.unwrap_or(0.0), 2.0, epsilon = 1e-12);
        assert_eq!(radii[1].samples, 0);
        assert!(radii[1].mean_radius.is_none());
    }

    #[test]
    fn test_propagation_multiplicity() {
        let mut mesh = extruded_pair(2);
        let columns = PrismColumns::from_layered(&mesh, 2).expect("valid layering");
        let stats = propagate_correspondence_to_volume(&mut mesh, &columns, &[Some(0), Some(3)])
            .expect("one entry per column");

        assert_eq!(stats.columns, 2);
        assert_eq!(stats.cells, 6);
        assert_eq!(stats.entries, 2 * (3 + 6 + 6));

        for column in columns.iter() {
            let expected = mesh.cells[column.wall()].station;
            for &cell in &column.cells {
                assert_eq!(mesh.cells[cell].station, expected);
            }
        }

        // Vertex 1 is on the first column's wall triangle and layer-1 prism only.
        assert_eq!(mesh.vertices[1].stations, vec![Some(0), Some(0)]);
        // Vertex 0 lies on the shared edge, touched by both columns.
        let v0 = &mesh.vertices[0].stations;
        assert_eq!(v0.len(), 4);
        assert_eq!(v0.iter().filter(|s| **s == Some(0)).count(), 2);
        assert_eq!(v0.iter().filter(|s| **s == Some(3)).count(), 2);
        // Middle layer vertices are touched by both layers of a column.
        assert_eq!(mesh.vertices[5].stations, vec![Some(0), Some(0)]);
    }

    #[test]
    fn test_propagation_clears_previous_run() {
        let mut mesh = extruded_pair(1);
        let columns = PrismColumns::from_layered(&mesh, 1).expect("valid layering");
        propagate_correspondence_to_volume(&mut mesh, &columns, &[Some(0), Some(0)])
            .expect("first run");
        propagate_correspondence_to_volume(&mut mesh, &columns, &[Some(1), None])
            .expect("second run");
        assert!(mesh.vertices[1].stations.iter().all(|s| *s == Some(1)));
        assert_eq!(mesh.vertices[3].stations, vec![None, None]);
    }

    #[test]
    fn test_propagation_count_mismatch() {
        let mut mesh = extruded_pair(1);
        let columns = PrismColumns::from_layered(&mesh, 1).expect("valid layering");
        assert!(matches!(
            propagate_correspondence_to_volume(&mut mesh, &columns, &[Some(0)]),
            Err(DeformError::InputCountMismatch { .. })
        ));
    }

    #[test]
    fn test_propagation_rejects_bad_node() {
        let mut mesh = extruded_pair(1);
        let columns = PrismColumns::from_layered(&mesh, 1).expect("valid layering");
        propagate_correspondence_to_volume(&mut mesh, &columns, &[Some(0), Some(0)])
            .expect("first run");
        mesh.cells[2].nodes[5] = 999;
        assert!(matches!(
            propagate_correspondence_to_volume(&mut mesh, &columns, &[Some(1), Some(1)]),
            Err(DeformError::Topology { .. })
        ));
        // The failed run left the first run's entries in place.
        assert!(mesh.vertices.iter().all(|v| !v.stations.is_empty()));
        assert!(mesh.vertices.iter().flat_map(|v| &v.stations).all(|s| *s == Some(0)));
    }

    #[test]
    fn test_propagation_rejects_foreign_columns() {
        let mut mesh = extruded_pair(2);
        let columns = PrismColumns::from_layered(&mesh, 2).expect("valid layering");
        mesh.cells.truncate(3);
        assert!(matches!(
            propagate_correspondence_to_volume(&mut mesh, &columns, &[Some(0), Some(1)]),
            Err(DeformError::Topology { .. })
        ));
    }

    #[test]
    fn test_map_free_vertices() {
        let mut mesh = extruded_pair(1);
        let lone = mesh.add_vertex(Point3::new(0.0, 0.0, 7.4));
        let columns = PrismColumns::from_layered(&mesh, 1).expect("valid layering");
        propagate_correspondence_to_volume(&mut mesh, &columns, &[Some(0), Some(0)])
            .expect("propagate");

        let cl = straight(5, 10.0);
        assert_eq!(map_free_vertices_to_centerline(&mut mesh, &cl), 1);
        assert_eq!(mesh.vertices[lone as usize].stations, vec![Some(3)]);
        assert_eq!(map_free_vertices_to_centerline(&mut mesh, &cl), 0);
    }
}
