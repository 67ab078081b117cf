//! Merge a separately meshed tetrahedral core into the prism-layer mesh.
//!
//! The core is generated inside the innermost prism surface, so its wall
//! nodes coincide with the innermost prism nodes. Those are matched by nearest
//! neighbour and shared; every other core node is appended.

use hashbrown::{HashMap, HashSet};
use serde::Serialize;
use tracing::info;

use crate::columns::PrismColumns;
use crate::correspondence::map_surface_nodes;
use crate::error::{DeformError, DeformResult, MeshLocation};
use crate::tracing_ext::OperationTimer;
use crate::types::{Cell, CellKind, MeshVariant, Region, VolumeMesh, physical};

/// Result of [`merge_inner_volume`].
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub mesh: VolumeMesh,
    pub stats: MergeStats,
}

/// Counts from a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Core nodes matched to innermost prism nodes.
    pub shared_nodes: usize,
    pub appended_nodes: usize,
    pub tetrahedra: usize,
    pub cap_faces: usize,
    /// Interface triangles, auxiliary cells and cells with no role.
    pub dropped_cells: usize,
}

fn is_interface(region: Option<Region>) -> bool {
    matches!(region, Some(Region::Wall | Region::InnerWall))
}

/// Combine a prism-layer mesh with the core meshed inside its innermost
/// surface.
///
/// Tetrahedra are renumbered and tagged [`physical::INTERIOR`]. Inlet and
/// outlet faces of the core are kept. Interface triangles and auxiliary cells
/// are dropped. Fails with `InputCountMismatch` if the core's interface does
/// not have as many nodes as the innermost prism surface, and with a topology
/// error if two interface nodes match the same innermost node.
pub fn merge_inner_volume(
    prism_mesh: &VolumeMesh,
    columns: &PrismColumns,
    inner: &VolumeMesh,
) -> DeformResult<MergeResult> {
    prism_mesh.check_indices()?;
    columns.check_cells(prism_mesh)?;
    inner.check_indices()?;
    let _timer = OperationTimer::with_context(
        "merge_inner_volume",
        prism_mesh.cell_count() + inner.cell_count(),
        prism_mesh.vertex_count() + inner.vertex_count(),
    );

    let innermost = columns.innermost_vertices(prism_mesh);
    let mut seen = HashSet::new();
    let interface: Vec<u32> = inner
        .cells
        .iter()
        .filter(|c| is_interface(inner.region(c)))
        .flat_map(|c| c.nodes.iter().copied())
        .filter(|v| seen.insert(*v))
        .collect();

    if interface.len() != innermost.len() {
        return Err(DeformError::count_mismatch(
            "core interface nodes",
            innermost.len(),
            interface.len(),
        ));
    }

    let innermost_points: Vec<_> = innermost
        .iter()
        .map(|&v| prism_mesh.vertices[v as usize].position)
        .collect();
    let interface_points: Vec<_> = interface
        .iter()
        .map(|&v| inner.vertices[v as usize].position)
        .collect();
    let nearest = map_surface_nodes(&innermost_points, &interface_points)?;
    let mut claimed: HashMap<usize, u32> = HashMap::with_capacity(nearest.len());
    for (&core, &i) in interface.iter().zip(&nearest) {
        if let Some(first) = claimed.insert(i, core) {
            return Err(DeformError::topology_at(
                format!(
                    "core nodes {} and {} both match innermost prism node {}",
                    first, core, innermost[i]
                ),
                MeshLocation::Vertex {
                    index: innermost[i] as usize,
                },
            ));
        }
    }

    let mut merged = prism_mesh.clone();
    merged.variant = MeshVariant::Merged;
    merged.clear_correspondence();

    let mut remap: HashMap<u32, u32> = interface
        .iter()
        .zip(&nearest)
        .map(|(&core, &i)| (core, innermost[i]))
        .collect();
    let mut stats = MergeStats {
        shared_nodes: claimed.len(),
        ..Default::default()
    };

    for (v, vertex) in inner.vertices.iter().enumerate() {
        let v = v as u32;
        if !remap.contains_key(&v) {
            remap.insert(v, merged.add_vertex(vertex.position));
            stats.appended_nodes += 1;
        }
    }

    for cell in &inner.cells {
        let keep = match (cell.kind, inner.region(cell)) {
            (CellKind::Tetrahedron, _) => {
                stats.tetrahedra += 1;
                true
            }
            (_, Some(Region::Inlet | Region::Outlet)) => {
                stats.cap_faces += 1;
                true
            }
            _ => false,
        };
        if !keep {
            stats.dropped_cells += 1;
            continue;
        }

        let nodes = cell.nodes.iter().map(|n| remap[n]).collect();
        let physical_id = if cell.kind == CellKind::Tetrahedron {
            physical::INTERIOR
        } else {
            cell.physical_id
        };
        let mut merged_cell = Cell::new(cell.kind, physical_id, cell.entity_id, nodes);
        merged_cell.aux_tag = cell.aux_tag;
        merged.add_cell(merged_cell);
    }

    for name in &inner.physical_names {
        if !merged.physical_names.iter().any(|n| n.id == name.id) {
            merged.physical_names.push(name.clone());
        }
    }

    info!(
        shared = stats.shared_nodes,
        appended = stats.appended_nodes,
        tetrahedra = stats.tetrahedra,
        dropped = stats.dropped_cells,
        "Merged inner volume"
    );
    Ok(MergeResult {
        mesh: merged,
        stats,
    })
}
