//! Prism columns: the stack of boundary-layer prisms beneath each wall triangle.
//!
//! Layer extrusion writes the prisms of one wall triangle consecutively, from
//! the wall inwards, and writes the columns in wall-triangle order. Each prism
//! stores its base face in `nodes[0..3]` and the face above in `nodes[3..6]`,
//! so layer `k + 1` sits on the top face of layer `k`.

use hashbrown::HashSet;
use tracing::debug;

use crate::error::{DeformError, DeformResult, MeshLocation};
use crate::types::{Region, VolumeMesh};

/// One wall triangle and the prisms beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrismColumn {
    /// Cell positions: the wall triangle first, then layers 1..=L.
    pub cells: Vec<usize>,
}

impl PrismColumn {
    /// Cell position of the wall triangle.
    #[inline]
    pub fn wall(&self) -> usize {
        self.cells[0]
    }

    /// Cell positions of the prisms, outer to inner.
    #[inline]
    pub fn prisms(&self) -> &[usize] {
        &self.cells[1..]
    }

    /// Cell position of the innermost prism, if the column has any.
    #[inline]
    pub fn innermost(&self) -> Option<usize> {
        self.prisms().last().copied()
    }
}

/// All prism columns of a mesh, one per wall triangle.
#[derive(Debug, Clone)]
pub struct PrismColumns {
    columns: Vec<PrismColumn>,
    layers: usize,
}

fn sorted3(nodes: &[u32]) -> [u32; 3] {
    let mut face = [nodes[0], nodes[1], nodes[2]];
    face.sort_unstable();
    face
}

impl PrismColumns {
    /// Group wall triangles and prisms into columns of `layers` prisms each.
    ///
    /// Fails with a topology error when a cell is malformed, when the prism
    /// count is not `layers * wall triangles`, or when a prism does not sit on
    /// the face below it.
    pub fn from_layered(mesh: &VolumeMesh, layers: usize) -> DeformResult<Self> {
        mesh.check_indices()?;
        let walls: Vec<usize> = mesh.cells_in(Region::Wall).map(|(i, _)| i).collect();
        let prisms: Vec<usize> = mesh.cells_in(Region::PrismLayer).map(|(i, _)| i).collect();

        if prisms.len() != walls.len() * layers {
            return Err(DeformError::topology(format!(
                "{} prisms cannot form {} columns of {} layers",
                prisms.len(),
                walls.len(),
                layers
            )));
        }

        let mut columns = Vec::with_capacity(walls.len());
        for (i, &wall) in walls.iter().enumerate() {
            let mut cells = Vec::with_capacity(layers + 1);
            cells.push(wall);
            cells.extend_from_slice(&prisms[i * layers..(i + 1) * layers]);

            let mut below = sorted3(&mesh.cells[wall].nodes);
            for &prism in &cells[1..] {
                let nodes = &mesh.cells[prism].nodes;
                if sorted3(&nodes[0..3]) != below {
                    return Err(DeformError::topology_at(
                        format!("prism does not sit on the face below it in column {}", i),
                        MeshLocation::Cell { index: prism },
                    ));
                }
                below = sorted3(&nodes[3..6]);
            }

            columns.push(PrismColumn { cells });
        }

        debug!(
            columns = columns.len(),
            layers,
            "Built prism columns"
        );

        Ok(Self { columns, layers })
    }

    /// Number of prism layers per column.
    #[inline]
    pub fn layers(&self) -> usize {
        self.layers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&PrismColumn> {
        self.columns.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrismColumn> {
        self.columns.iter()
    }

    /// Check that every cell of every column exists in `mesh`.
    ///
    /// Columns are built from one mesh and may be handed a different one.
    pub fn check_cells(&self, mesh: &VolumeMesh) -> DeformResult<()> {
        let cell_count = mesh.cell_count();
        for column in &self.columns {
            if let Some(&bad) = column.cells.iter().find(|&&c| c >= cell_count) {
                return Err(DeformError::topology_at(
                    format!("column refers to cell {} but the mesh has {} cells", bad, cell_count),
                    MeshLocation::Cell { index: bad },
                ));
            }
        }
        Ok(())
    }

    /// Innermost surface, one face per column, in the wall triangles' winding.
    ///
    /// With zero layers this is the wall surface itself. Columns whose cells
    /// are missing from `mesh` are skipped; see [`Self::check_cells`].
    pub fn innermost_faces(&self, mesh: &VolumeMesh) -> Vec<[u32; 3]> {
        self.columns
            .iter()
            .filter_map(|column| {
                let nodes = &mesh.cells.get(column.innermost().unwrap_or(column.wall()))?.nodes;
                match nodes.len() {
                    6.. => Some([nodes[3], nodes[4], nodes[5]]),
                    3.. => Some([nodes[0], nodes[1], nodes[2]]),
                    _ => None,
                }
            })
            .collect()
    }

    /// Distinct vertices of the innermost surface, in first-seen order.
    pub fn innermost_vertices(&self, mesh: &VolumeMesh) -> Vec<u32> {
        let mut seen = HashSet::new();
        self.innermost_faces(mesh)
            .into_iter()
            .flatten()
            .filter(|v| seen.insert(*v))
            .collect()
    }
}
