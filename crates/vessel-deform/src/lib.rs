//! Centerline-driven deformation of vascular volume meshes.
//!
//! A vessel is described by its wall surface, a few layers of prisms extruded
//! inward from that wall, and optionally a tetrahedral core. Given the vessel's
//! centerline before and after a change of shape, this crate moves every mesh
//! vertex with the centerline station it belongs to and then repairs wall
//! triangles that became badly obtuse, keeping the prism columns beneath them
//! consistent.
//!
//! # Features
//!
//! - **Correspondence**: nearest-neighbour maps between surfaces, wall triangles
//!   and centerline stations, propagated down each prism column
//! - **Deformation**: translation, rotation or rigid motion per station, blended
//!   across vertices shared by several columns
//! - **Edge repair**: half-edge topology of the wall with angle-based swap
//!   flagging and prism-column propagation of every flip
//! - **Quality**: aspect, edge and radius ratios of triangles and tetrahedra
//! - **File I/O**: Gmsh 2.2 ASCII meshes, centerline text files, PLY
//!   correspondence tables and STL surfaces
//!
//! # Quick Start
//!
//! ```no_run
//! use vessel_deform::{DeformPipeline, MeshVariant, PipelineConfig, VolumeMesh, io};
//! use std::path::Path;
//!
//! let mut mesh = VolumeMesh::load("vessel.msh", MeshVariant::PrismLayer).unwrap();
//! let source = io::load_centerline(Path::new("source.txt")).unwrap();
//! let target = io::load_centerline(Path::new("target.txt")).unwrap();
//! let table = io::load_correspondence_table(Path::new("correspondence.ply")).unwrap();
//!
//! let config = PipelineConfig::new(3);
//! let result = DeformPipeline::new(config)
//!     .run(&mut mesh, &source, &target, &table.stations)
//!     .unwrap();
//! println!("Moved {} vertices", result.deformation.vertices_moved);
//!
//! mesh.save("deformed.msh").unwrap();
//! ```
//!
//! # Step by Step
//!
//! ```no_run
//! use vessel_deform::{
//!     CenterlineField, DeformationEngine, MeshVariant, PrismColumns, SwapParams, VolumeMesh,
//!     io, map_columns_to_centerline, propagate_correspondence_to_volume, repair_edges,
//! };
//! use std::path::Path;
//!
//! let mut mesh = VolumeMesh::load("vessel.msh", MeshVariant::PrismLayer).unwrap();
//! let source = io::load_centerline(Path::new("source.txt")).unwrap();
//! let target = io::load_centerline(Path::new("target.txt")).unwrap();
//!
//! let columns = PrismColumns::from_layered(&mesh, 3).unwrap();
//! let stations: Vec<_> = map_columns_to_centerline(&mesh, &columns, &source)
//!     .unwrap()
//!     .into_iter()
//!     .map(|t| Some(t.station))
//!     .collect();
//! propagate_correspondence_to_volume(&mut mesh, &columns, &stations).unwrap();
//!
//! let field = CenterlineField::new(&source, &target, true).unwrap();
//! let mut engine = DeformationEngine::new();
//! engine.reset(&mesh);
//! engine.accumulate_translation(&mesh, &field).unwrap();
//! engine.apply(&mut mesh).unwrap();
//!
//! repair_edges(&mut mesh, &columns, &SwapParams::default()).unwrap();
//! ```
//!
//! # Error Handling
//!
//! Fallible operations return `DeformResult<T>`, which is
//! `Result<T, DeformError>`. Every error carries a stable code and a recovery
//! suggestion.
//!
//! ```
//! use vessel_deform::{DeformError, MeshVariant, VolumeMesh};
//!
//! match VolumeMesh::load("missing.msh", MeshVariant::PrismLayer) {
//!     Ok(_) => println!("Loaded"),
//!     Err(DeformError::IoRead { path, .. }) => println!("Cannot read {:?}", path),
//!     Err(e) => println!("[{}] {}", e.code(), e),
//! }
//! ```
//!
//! # Supported Formats
//!
//! | Format | Extension | Load | Save | Notes |
//! |--------|-----------|------|------|-------|
//! | Gmsh   | `.msh`    | ✓    | ✓    | 2.x ASCII, triangles, prisms, tetrahedra |
//! | STL    | `.stl`    | points | ✓  | Wall surfaces only |
//! | PLY    | `.ply`    | ✓    | ✓    | Correspondence tables |
//! | Text   | `.txt`    | ✓    | ✓    | Centerlines, one `x y z` per line |

pub mod centerline;
pub mod columns;
pub mod correspondence;
pub mod deform;
mod error;
pub mod halfedge;
pub mod io;
pub mod merge;
pub mod pipeline;
pub mod quality;
pub mod spatial;
pub mod swap;
pub mod tracing_ext;
mod types;

pub use error::{DeformError, DeformResult, ErrorCode, MeshLocation, RecoverySuggestion};
pub use types::{
    Cell, CellKind, MeshVariant, MeshVertex, PhysicalName, Region, VolumeMesh, physical,
};

pub use centerline::{Centerline, CenterlineField, CenterlineStation, rotation_between};
pub use columns::{PrismColumn, PrismColumns};
pub use correspondence::{
    EdgeProjection, EdgeRadius, ProjectionKind, PropagationStats, TriangleStation,
    average_edge_radii, map_columns_to_centerline, map_free_vertices_to_centerline,
    map_node_to_centerline_edge, map_surface_nodes, map_triangles_to_centerline,
    propagate_correspondence_to_volume,
};
pub use deform::{DeformStats, DeformationEngine, DeformationMode, deform_mesh};
pub use halfedge::{HalfEdge, HalfEdgeMesh, SwapOutcome, WallFace};
pub use io::{MeshFormat, load_mesh, save_mesh};
pub use merge::{MergeResult, MergeStats, merge_inner_volume};
pub use pipeline::{DeformParams, DeformPipeline, PipelineConfig, PipelinePaths, PipelineResult};
pub use quality::{QualityReport, Tetrahedron, Triangle};
pub use spatial::{Deviation, SpatialIndex, surface_deviation};
pub use swap::{
    PrismMismatchPolicy, SwapParams, SwapReport, execute_all_with_prism_columns, repair_edges,
    swap_with_prism_column,
};
