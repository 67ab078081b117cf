//! End-to-end tests on a synthetic vessel.
//!
//! The vessel is a straight tube along +z: an 8-sided wall, two prism layers
//! extruded inwards and a tetrahedral core fanned from the axis.
//!
//! Run with: cargo test -p vessel-deform --test integration_tests

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use std::path::Path;
use tempfile::TempDir;
use vessel_deform::{
    Cell, CellKind, Centerline, DeformError, DeformParams, DeformPipeline, DeformationMode,
    HalfEdgeMesh, MeshVariant, PipelineConfig, PrismColumns, Region, SwapParams, VolumeMesh, io,
    map_columns_to_centerline, merge_inner_volume, physical,
};

// =============================================================================
// Fixtures
// =============================================================================

const SIDES: u32 = 8;
const RINGS: u32 = 5;
const LAYERS: u32 = 2;
const RING_SPACING: f64 = 2.5;
const LAYER_THICKNESS: f64 = 0.1;

fn ring_point(layer: u32, ring: u32, side: u32) -> Point3<f64> {
    let radius = 1.0 - layer as f64 * LAYER_THICKNESS;
    let theta = side as f64 * std::f64::consts::TAU / SIDES as f64;
    Point3::new(
        radius * theta.cos(),
        radius * theta.sin(),
        ring as f64 * RING_SPACING,
    )
}

/// Wall faces of one layer as `(ring, side)` grid triangles.
fn grid_faces(index: impl Fn(u32, u32) -> u32) -> Vec<[u32; 3]> {
    let mut faces = Vec::new();
    for ring in 0..RINGS - 1 {
        for side in 0..SIDES {
            let next = (side + 1) % SIDES;
            let a = index(ring, side);
            let b = index(ring, next);
            let c = index(ring + 1, next);
            let d = index(ring + 1, side);
            faces.push([a, b, c]);
            faces.push([a, c, d]);
        }
    }
    faces
}

fn prism_index(layer: u32, ring: u32, side: u32) -> u32 {
    layer * RINGS * SIDES + ring * SIDES + side
}

/// Wall plus prism layers, columns written consecutively.
fn create_prism_tube() -> VolumeMesh {
    let mut mesh = VolumeMesh::new(MeshVariant::PrismLayer);
    for layer in 0..=LAYERS {
        for ring in 0..RINGS {
            for side in 0..SIDES {
                mesh.add_vertex(ring_point(layer, ring, side));
            }
        }
    }

    let faces = grid_faces(|ring, side| prism_index(0, ring, side));
    for &f in &faces {
        mesh.add_cell(Cell::triangle(physical::WALL, f));
    }
    let layer_offset = RINGS * SIDES;
    for &f in &faces {
        for k in 0..LAYERS {
            let lo = k * layer_offset;
            let hi = (k + 1) * layer_offset;
            mesh.add_cell(Cell::prism(
                1000,
                [f[0] + lo, f[1] + lo, f[2] + lo, f[0] + hi, f[1] + hi, f[2] + hi],
            ));
        }
    }
    mesh
}

/// Core meshed inside the innermost prism surface: the interface triangles,
/// one axis node per ring, a tetrahedron per interface triangle and inlet and
/// outlet fans.
fn create_core() -> VolumeMesh {
    let mut core = VolumeMesh::new(MeshVariant::InnerVolume);
    for ring in 0..RINGS {
        for side in 0..SIDES {
            core.add_vertex(ring_point(LAYERS, ring, side));
        }
    }
    let axis = |ring: u32| RINGS * SIDES + ring;
    for ring in 0..RINGS {
        core.add_vertex(Point3::new(0.0, 0.0, ring as f64 * RING_SPACING));
    }

    let faces = grid_faces(|ring, side| ring * SIDES + side);
    for &f in &faces {
        core.add_cell(Cell::triangle(physical::WALL, f));
    }
    for (i, &f) in faces.iter().enumerate() {
        let ring = (i as u32 / 2) / SIDES;
        // Wall faces wind outwards; swap two nodes so the axis lies on the
        // positive side.
        core.add_cell(Cell::tetrahedron(physical::INTERIOR, [f[0], f[2], f[1], axis(ring)]));
    }
    for side in 0..SIDES {
        let next = (side + 1) % SIDES;
        core.add_cell(Cell::triangle(physical::INLET, [next, side, axis(0)]));
        let top = (RINGS - 1) * SIDES;
        core.add_cell(Cell::triangle(
            physical::OUTLET,
            [top + side, top + next, axis(RINGS - 1)],
        ));
    }
    core
}

fn create_merged_tube() -> VolumeMesh {
    let prism = create_prism_tube();
    let columns = PrismColumns::from_layered(&prism, LAYERS as usize).expect("valid layering");
    merge_inner_volume(&prism, &columns, &create_core())
        .expect("merge")
        .mesh
}

fn axis_centerline(offset: Vector3<f64>) -> Centerline {
    let points = (0..RINGS)
        .map(|ring| Point3::new(0.0, 0.0, ring as f64 * RING_SPACING) + offset)
        .collect();
    Centerline::new(points).expect("valid centerline")
}

fn wall_stations(mesh: &VolumeMesh, source: &Centerline) -> Vec<Option<usize>> {
    let columns = PrismColumns::from_layered(mesh, LAYERS as usize).expect("valid layering");
    map_columns_to_centerline(mesh, &columns, source)
        .expect("stations")
        .into_iter()
        .map(|t| Some(t.station))
        .collect()
}

// =============================================================================
// Merge
// =============================================================================

#[test]
fn test_merge_tube() {
    let mesh = create_merged_tube();
    let wall_faces = (2 * SIDES * (RINGS - 1)) as usize;

    assert_eq!(mesh.variant, MeshVariant::Merged);
    assert_eq!(mesh.vertex_count(), ((LAYERS + 1) * RINGS * SIDES + RINGS) as usize);
    assert_eq!(mesh.count_in(Region::Wall), wall_faces);
    assert_eq!(mesh.count_in(Region::PrismLayer), wall_faces * LAYERS as usize);
    assert_eq!(mesh.count_in(Region::Volume), wall_faces);
    assert_eq!(mesh.count_in(Region::Inlet), SIDES as usize);
    assert_eq!(mesh.count_in(Region::Outlet), SIDES as usize);
    mesh.check_indices().expect("valid indices");

    // Tetrahedra sit on the innermost prism layer.
    let innermost_start = LAYERS * RINGS * SIDES;
    let innermost_end = innermost_start + RINGS * SIDES;
    for cell in mesh.cells.iter().filter(|c| c.kind == CellKind::Tetrahedron) {
        for &node in &cell.nodes[0..3] {
            assert!((innermost_start..innermost_end).contains(&node));
        }
    }
}

// =============================================================================
// Full pipeline
// =============================================================================

#[test]
fn test_pipeline_translates_tube() {
    let mut mesh = create_merged_tube();
    let before = mesh.positions();
    let shift = Vector3::new(0.0, 0.0, 5.0);
    let source = axis_centerline(Vector3::zeros());
    let target = axis_centerline(shift);
    let stations = wall_stations(&mesh, &source);

    let result = DeformPipeline::new(PipelineConfig::new(LAYERS as usize))
        .run(&mut mesh, &source, &target, &stations)
        .expect("pipeline");

    assert_eq!(result.columns, stations.len());
    assert_eq!(result.stations, RINGS as usize);
    assert_eq!(result.free_vertices, RINGS as usize);
    assert_eq!(result.deformation.vertices_moved, mesh.vertex_count());
    assert_eq!(result.total_flipped(), 0);
    assert!(result.swaps.is_empty());
    assert_eq!(result.quality.inverted_tetrahedra, 0);

    for (a, b) in before.iter().zip(mesh.positions()) {
        assert_relative_eq!(b.x, a.x, epsilon = 1e-9);
        assert_relative_eq!(b.y, a.y, epsilon = 1e-9);
        assert_relative_eq!(b.z, a.z + 5.0, epsilon = 1e-9);
    }
}

#[test]
fn test_rigid_straight_tube_matches_translation() {
    let shift = Vector3::new(1.0, -2.0, 3.0);
    let source = axis_centerline(Vector3::zeros());
    let target = axis_centerline(shift);

    let mut translated = create_merged_tube();
    let mut rigid = translated.clone();
    let stations = wall_stations(&translated, &source);

    DeformPipeline::new(PipelineConfig::new(LAYERS as usize))
        .run(&mut translated, &source, &target, &stations)
        .expect("translation");
    let config = PipelineConfig::new(LAYERS as usize)
        .with_deform(DeformParams::default().with_mode(DeformationMode::Rigid));
    DeformPipeline::new(config)
        .run(&mut rigid, &source, &target, &stations)
        .expect("rigid");

    for (a, b) in translated.positions().iter().zip(rigid.positions()) {
        assert_relative_eq!(*a, b, epsilon = 1e-9);
    }
}

#[test]
fn test_excluded_columns_stay_in_place() {
    let mut mesh = create_prism_tube();
    let before = mesh.positions();
    let source = axis_centerline(Vector3::zeros());
    let target = axis_centerline(Vector3::new(0.0, 0.0, 1.0));
    let stations = vec![None; wall_stations(&mesh, &source).len()];

    let config = PipelineConfig::new(LAYERS as usize).with_swap(SwapParams::default().with_rounds(0));
    let result = DeformPipeline::new(config)
        .run(&mut mesh, &source, &target, &stations)
        .expect("pipeline");

    assert_eq!(result.propagation.excluded_columns, stations.len());
    assert_eq!(result.deformation.vertices_excluded, mesh.vertex_count());
    assert_eq!(before, mesh.positions());
}

#[test]
fn test_free_vertices_without_mapping_fail() {
    let mut mesh = create_merged_tube();
    let source = axis_centerline(Vector3::zeros());
    let stations = wall_stations(&mesh, &source);

    let config = PipelineConfig::new(LAYERS as usize)
        .with_deform(DeformParams::default().with_free_vertices(false));
    let err = DeformPipeline::new(config)
        .run(&mut mesh, &source, &source, &stations)
        .expect_err("axis nodes have no station");
    assert!(matches!(err, DeformError::IndexOutOfDomain { .. }));
}

#[test]
fn test_mismatched_centerlines() {
    let mut mesh = create_prism_tube();
    let source = axis_centerline(Vector3::zeros());
    let target = Centerline::new(source.points()[..3].to_vec()).expect("valid centerline");
    let stations = wall_stations(&mesh, &source);

    let err = DeformPipeline::new(PipelineConfig::new(LAYERS as usize))
        .run(&mut mesh, &source, &target, &stations)
        .expect_err("station counts differ");
    assert!(matches!(err, DeformError::InputCountMismatch { .. }));
}

// =============================================================================
// Edge repair on the tube
// =============================================================================

#[test]
fn test_tube_topology() {
    let mesh = create_prism_tube();
    let columns = PrismColumns::from_layered(&mesh, LAYERS as usize).expect("valid layering");
    let topology = HalfEdgeMesh::from_mesh(&mesh, &columns).expect("valid surface");

    let faces = (2 * SIDES * (RINGS - 1)) as usize;
    assert_eq!(topology.face_count(), faces);
    assert_eq!(topology.edge_count(), 3 * faces);
    // Open ends: one ring of unpaired edges at each end.
    assert_eq!(topology.boundary_count(), (2 * SIDES) as usize);
}

#[test]
fn test_sheared_tube_is_repaired() {
    // Twisting every other ring turns the quads into skewed ones whose
    // diagonals face obtuse angles.
    let mut mesh = create_prism_tube();
    let twist = std::f64::consts::TAU / SIDES as f64 * 0.45;
    for layer in 0..=LAYERS {
        for ring in (1..RINGS).step_by(2) {
            for side in 0..SIDES {
                let v = &mut mesh.vertices[prism_index(layer, ring, side) as usize];
                let (s, c) = twist.sin_cos();
                let p = v.position;
                v.position = Point3::new(c * p.x - s * p.y, s * p.x + c * p.y, p.z);
            }
        }
    }

    let columns = PrismColumns::from_layered(&mesh, LAYERS as usize).expect("valid layering");
    let params = SwapParams::default().with_threshold(95.0).with_rounds(3);
    let before = vessel_deform::QualityReport::from_mesh(&mesh);
    let reports = vessel_deform::repair_edges(&mut mesh, &columns, &params).expect("repair");

    assert!(reports.iter().map(|r| r.flipped).sum::<usize>() > 0);
    for report in &reports {
        assert_eq!(report.skipped, 0);
    }

    // Columns still stack, and the surface is still a valid half-edge mesh.
    let columns = PrismColumns::from_layered(&mesh, LAYERS as usize).expect("columns survive");
    HalfEdgeMesh::from_mesh(&mesh, &columns).expect("surface survives");
    let after = vessel_deform::QualityReport::from_mesh(&mesh);
    assert!(after.wall_aspect_ratio.max <= before.wall_aspect_ratio.max + 1e-12);
}

// =============================================================================
// Files
// =============================================================================

#[test]
fn test_merged_msh_round_trip() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("tube.msh");
    let mesh = create_merged_tube();
    mesh.save(&path).expect("save");

    let loaded = VolumeMesh::load(&path, MeshVariant::Merged).expect("load");
    assert_eq!(loaded.vertex_count(), mesh.vertex_count());
    assert_eq!(loaded.cell_count(), mesh.cell_count());
    for (a, b) in mesh.cells.iter().zip(&loaded.cells) {
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.nodes, b.nodes);
        assert_eq!(a.physical_id, b.physical_id);
    }
    for (a, b) in mesh.positions().iter().zip(loaded.positions()) {
        assert_relative_eq!(*a, b, epsilon = 1e-9);
    }
}

#[test]
fn test_correspondence_table_round_trip() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("table.ply");
    let mesh = create_prism_tube();
    let columns = PrismColumns::from_layered(&mesh, LAYERS as usize).expect("valid layering");
    let source = axis_centerline(Vector3::zeros());
    let mut stations = wall_stations(&mesh, &source);
    stations[3] = None;

    io::save_correspondence_table(&mesh, &columns, &stations, &path).expect("save");
    let table = io::load_correspondence_table(&path).expect("load");

    assert_eq!(table.stations, stations);
    assert_eq!(table.faces.len(), columns.len());
    assert_eq!(table.points.len(), (RINGS * SIDES) as usize);
}

fn write_inputs(dir: &Path) -> PipelineConfig {
    let mesh_path = dir.join("tube.msh");
    let source_path = dir.join("source.txt");
    let target_path = dir.join("target.txt");
    let table_path = dir.join("table.ply");

    let mesh = create_merged_tube();
    let source = axis_centerline(Vector3::zeros());
    let target = axis_centerline(Vector3::new(0.0, 0.0, 5.0));
    let columns = PrismColumns::from_layered(&mesh, LAYERS as usize).expect("valid layering");

    mesh.save(&mesh_path).expect("save mesh");
    io::save_centerline(source.points(), &source_path).expect("save source");
    io::save_centerline(target.points(), &target_path).expect("save target");
    io::save_correspondence_table(&mesh, &columns, &wall_stations(&mesh, &source), &table_path)
        .expect("save table");

    let mut config = PipelineConfig::new(LAYERS as usize);
    config.paths.mesh = Some(mesh_path);
    config.paths.source_centerline = Some(source_path);
    config.paths.target_centerline = Some(target_path);
    config.paths.table = Some(table_path);
    config.paths.output = Some(dir.join("deformed.msh"));
    config
}

#[test]
fn test_run_from_config_file() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_inputs(dir.path());
    let config_path = dir.path().join("pipeline.toml");
    config.save(&config_path).expect("save config");

    let loaded = PipelineConfig::load(&config_path).expect("load config");
    assert_eq!(loaded, config);

    let (mesh, result) = DeformPipeline::new(loaded).run_paths().expect("run");
    assert_eq!(result.deformation.vertices_moved, mesh.vertex_count());

    let written = VolumeMesh::load(dir.path().join("deformed.msh"), MeshVariant::Merged)
        .expect("output written");
    let (min, max) = written.bounds().expect("non-empty");
    assert_relative_eq!(min.z, 5.0, epsilon = 1e-9);
    assert_relative_eq!(max.z, 5.0 + (RINGS - 1) as f64 * RING_SPACING, epsilon = 1e-9);
}

#[test]
fn test_json_config_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("pipeline.json");
    let config = PipelineConfig::new(4)
        .with_deform(DeformParams::default().with_mode(DeformationMode::Rotation))
        .with_swap(SwapParams::conservative());
    config.save(&path).expect("save");
    assert_eq!(PipelineConfig::load(&path).expect("load"), config);
}

#[test]
fn test_config_errors() {
    let dir = TempDir::new().expect("temp dir");

    let missing = PipelineConfig::load(dir.path().join("missing.toml"));
    assert!(matches!(missing, Err(DeformError::IoRead { .. })));

    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "layers = \"three\"\n").expect("write");
    assert!(matches!(
        PipelineConfig::load(&bad),
        Err(DeformError::ParseError { .. })
    ));

    let yaml = dir.path().join("pipeline.yaml");
    std::fs::write(&yaml, "layers: 3\n").expect("write");
    assert!(matches!(
        PipelineConfig::load(&yaml),
        Err(DeformError::UnsupportedFormat { .. })
    ));

    let mut incomplete = PipelineConfig::new(2);
    incomplete.paths.mesh = Some(dir.path().join("tube.msh"));
    assert!(matches!(
        DeformPipeline::new(incomplete).run_paths(),
        Err(DeformError::InvalidConfig { .. })
    ));
}
