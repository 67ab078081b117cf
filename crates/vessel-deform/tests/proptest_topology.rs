//! Property-based tests for correspondence, deformation and edge repair.
//!
//! Run with: cargo test -p vessel-deform -- proptest

use nalgebra::{Point3, Vector3};
use proptest::prelude::*;
use vessel_deform::{
    Cell, Centerline, CenterlineField, DeformationMode, HalfEdgeMesh, MeshVariant, PrismColumns,
    SpatialIndex, SwapParams, VolumeMesh, deform_mesh, map_surface_nodes, physical,
    repair_edges, rotation_between,
};

// =============================================================================
// Strategies
// =============================================================================

/// A vector with every component in `-range..range`.
fn arb_vector(range: f64) -> impl Strategy<Value = Vector3<f64>> {
    prop::array::uniform3(-range..range).prop_map(|[x, y, z]| Vector3::new(x, y, z))
}

/// A centerline that advances at least 0.5 along z per step, so consecutive
/// points never coincide.
fn arb_centerline(min_points: usize, max_points: usize) -> impl Strategy<Value = Centerline> {
    prop::collection::vec(
        (-1.0..1.0f64, -1.0..1.0f64, 0.5..2.0f64),
        min_points..=max_points,
    )
    .prop_map(|steps| {
        let mut p = Point3::origin();
        let points = steps
            .into_iter()
            .map(|(dx, dy, dz)| {
                p += Vector3::new(dx, dy, dz);
                p
            })
            .collect();
        Centerline::new(points).expect("non-degenerate steps")
    })
}

/// Grid dimensions and per-vertex jitter for [`layered_grid`].
fn arb_grid() -> impl Strategy<Value = (usize, usize, Vec<(f64, f64)>)> {
    (2..6usize, 2..6usize).prop_flat_map(|(nx, ny)| {
        let jitter = prop::collection::vec((-0.15..0.15f64, -0.15..0.15f64), (nx + 1) * (ny + 1));
        (Just(nx), Just(ny), jitter)
    })
}

// =============================================================================
// Fixtures
// =============================================================================

/// An `nx` by `ny` jittered grid in the z = 0 plane, two triangles per cell,
/// extruded by `layers` prisms towards -z. Jitter below 0.15 keeps every
/// triangle counter-clockwise.
fn layered_grid(nx: usize, ny: usize, jitter: &[(f64, f64)], layers: usize) -> VolumeMesh {
    let per_layer = (nx + 1) * (ny + 1);
    let index = |i: usize, j: usize| (i * (ny + 1) + j) as u32;

    let mut mesh = VolumeMesh::new(MeshVariant::PrismLayer);
    for k in 0..=layers {
        for i in 0..=nx {
            for j in 0..=ny {
                let (dx, dy) = jitter[i * (ny + 1) + j];
                mesh.add_vertex(Point3::new(
                    i as f64 + dx,
                    j as f64 + dy,
                    -(k as f64) * 0.1,
                ));
            }
        }
    }

    let mut faces = Vec::new();
    for i in 0..nx {
        for j in 0..ny {
            let (a, b, c, d) = (index(i, j), index(i + 1, j), index(i + 1, j + 1), index(i, j + 1));
            faces.push([a, b, c]);
            faces.push([a, c, d]);
        }
    }
    for &f in &faces {
        mesh.add_cell(Cell::triangle(physical::WALL, f));
    }
    for &f in &faces {
        for k in 0..layers {
            let lo = (k * per_layer) as u32;
            let hi = ((k + 1) * per_layer) as u32;
            mesh.add_cell(Cell::prism(
                1000,
                [f[0] + lo, f[1] + lo, f[2] + lo, f[0] + hi, f[1] + hi, f[2] + hi],
            ));
        }
    }
    mesh
}

fn point_cloud(mesh: &VolumeMesh, stations: &[usize]) -> VolumeMesh {
    let mut cloud = mesh.clone();
    for (v, &s) in cloud.vertices.iter_mut().zip(stations.iter().cycle()) {
        v.stations = vec![Some(s)];
    }
    cloud
}

// =============================================================================
// Property Tests: Correspondence
// =============================================================================

proptest! {
    /// The k-d tree finds a point as close as a linear scan does.
    #[test]
    fn proptest_spatial_index_matches_brute_force(
        points in prop::collection::vec(arb_vector(50.0), 1..200),
        queries in prop::collection::vec(arb_vector(60.0), 1..20),
    ) {
        let points: Vec<Point3<f64>> = points.into_iter().map(Point3::from).collect();
        let index = SpatialIndex::build(&points);
        for q in queries.into_iter().map(Point3::from) {
            let best = points
                .iter()
                .map(|p| (p - q).norm())
                .fold(f64::INFINITY, f64::min);
            let found = index.nearest(&q).expect("non-empty index");
            prop_assert!((found.distance - best).abs() < 1e-9);
            prop_assert!(((points[found.index] - q).norm() - best).abs() < 1e-9);
        }
    }

    /// Matching a shuffled copy of a point set recovers the shuffle.
    #[test]
    fn proptest_surface_map_recovers_permutation(
        (nx, ny, jitter) in arb_grid(),
        seed in any::<u64>(),
    ) {
        let mesh = layered_grid(nx, ny, &jitter, 0);
        let a = mesh.positions();
        let mut perm: Vec<usize> = (0..a.len()).collect();
        // Deterministic shuffle from the seed.
        let mut state = seed | 1;
        for i in (1..perm.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            perm.swap(i, (state % (i as u64 + 1)) as usize);
        }
        let b: Vec<_> = perm.iter().map(|&i| a[i]).collect();

        prop_assert_eq!(map_surface_nodes(&a, &b).expect("same size"), perm);
    }
}

// =============================================================================
// Property Tests: Deformation
// =============================================================================

proptest! {
    /// Tangent rotations are orthonormal with determinant +1 and map `a`
    /// onto the direction of `b`.
    #[test]
    fn proptest_rotation_is_orthonormal(a in arb_vector(5.0), b in arb_vector(5.0)) {
        prop_assume!(a.norm() > 1e-3 && b.norm() > 1e-3);
        let (a, b) = (a.normalize(), b.normalize());
        prop_assume!(a.dot(&b) > -0.999);

        let r = rotation_between(&a, &b);
        prop_assert!((r.transpose() * r - nalgebra::Matrix3::identity()).norm() < 1e-9);
        prop_assert!((r.determinant() - 1.0).abs() < 1e-9);
        prop_assert!((r * a - b).norm() < 1e-9);
    }

    /// Deforming onto the source centerline itself moves nothing.
    #[test]
    fn proptest_identity_deformation(
        (nx, ny, jitter) in arb_grid(),
        source in arb_centerline(3, 8),
        mode in prop_oneof![
            Just(DeformationMode::Translation),
            Just(DeformationMode::Rotation),
            Just(DeformationMode::Rigid),
        ],
    ) {
        let field = CenterlineField::new(&source, &source, true).expect("field");
        let stations: Vec<usize> = (0..source.len()).collect();
        let mut mesh = point_cloud(&layered_grid(nx, ny, &jitter, 1), &stations);
        let before = mesh.positions();

        deform_mesh(&mut mesh, &field, mode).expect("deform");
        for (a, b) in before.iter().zip(mesh.positions()) {
            prop_assert!((b - a).norm() < 1e-9);
        }
    }

    /// Translation moves every vertex by its station's displacement.
    #[test]
    fn proptest_translation_is_exact(
        (nx, ny, jitter) in arb_grid(),
        source in arb_centerline(3, 8),
        shift in arb_vector(10.0),
    ) {
        let target = Centerline::new(source.points().iter().map(|p| p + shift).collect())
            .expect("shifted centerline");
        let field = CenterlineField::new(&source, &target, true).expect("field");
        let stations: Vec<usize> = (0..source.len()).collect();
        let mut mesh = point_cloud(&layered_grid(nx, ny, &jitter, 1), &stations);
        let before = mesh.positions();

        let stats = deform_mesh(&mut mesh, &field, DeformationMode::Translation).expect("deform");
        prop_assert_eq!(stats.vertices_moved, mesh.vertex_count());
        for (a, b) in before.iter().zip(mesh.positions()) {
            prop_assert!(((b - a) - shift).norm() < 1e-9);
        }
    }

    /// Rotation keeps each vertex's distance to its source station.
    #[test]
    fn proptest_rotation_preserves_station_distance(
        (nx, ny, jitter) in arb_grid(),
        source in arb_centerline(3, 8),
        target in arb_centerline(3, 8),
        smooth in any::<bool>(),
    ) {
        let n = source.len().min(target.len());
        let source = Centerline::new(source.points()[..n].to_vec()).expect("prefix");
        let target = Centerline::new(target.points()[..n].to_vec()).expect("prefix");
        let field = CenterlineField::new(&source, &target, smooth).expect("field");
        let stations: Vec<usize> = (0..n).collect();
        let mut mesh = point_cloud(&layered_grid(nx, ny, &jitter, 1), &stations);
        let before = mesh.positions();

        deform_mesh(&mut mesh, &field, DeformationMode::Rotation).expect("deform");
        for ((a, b), s) in before.iter().zip(mesh.positions()).zip(stations.iter().cycle()) {
            let centre = field.stations()[*s].source;
            prop_assert!(((a - centre).norm() - (b - centre).norm()).abs() < 1e-9);
        }
    }
}

// =============================================================================
// Property Tests: Topology and Edge Repair
// =============================================================================

proptest! {
    /// Every interior edge of the grid pairs, and only the outline is open.
    #[test]
    fn proptest_grid_topology((nx, ny, jitter) in arb_grid()) {
        let mesh = layered_grid(nx, ny, &jitter, 1);
        let columns = PrismColumns::from_layered(&mesh, 1).expect("valid layering");
        let topology = HalfEdgeMesh::from_mesh(&mesh, &columns).expect("valid surface");

        prop_assert_eq!(topology.face_count(), 2 * nx * ny);
        prop_assert_eq!(topology.boundary_count(), 2 * (nx + ny));
        for (e, edge) in topology.edges().iter().enumerate() {
            if let Some(pair) = edge.pair {
                prop_assert_eq!(topology.edges()[pair].pair, Some(e));
                prop_assert_eq!(topology.edges()[pair].start, edge.end);
            }
        }
    }

    /// Repair keeps the surface consistent, the columns stacked and every
    /// wall triangle facing +z.
    #[test]
    fn proptest_repair_keeps_columns(
        (nx, ny, jitter) in arb_grid(),
        layers in 1..4usize,
        threshold in 90.5..110.0f64,
    ) {
        let mut mesh = layered_grid(nx, ny, &jitter, layers);
        let cell_count = mesh.cell_count();
        let columns = PrismColumns::from_layered(&mesh, layers).expect("valid layering");
        let params = SwapParams::default().with_threshold(threshold).with_rounds(3);

        let reports = repair_edges(&mut mesh, &columns, &params).expect("repair");
        for report in &reports {
            prop_assert_eq!(report.skipped, 0);
            prop_assert_eq!(
                report.flipped + report.quality_rejected + report.existing_edge,
                report.flagged
            );
        }

        prop_assert_eq!(mesh.cell_count(), cell_count);
        let columns = PrismColumns::from_layered(&mesh, layers).expect("columns survive");
        HalfEdgeMesh::from_mesh(&mesh, &columns).expect("surface survives");
        for column in columns.iter() {
            let normal = mesh
                .triangle(column.wall())
                .expect("wall triangle")
                .normal_unnormalized();
            prop_assert!(normal.z > 0.0);
        }
    }
}
