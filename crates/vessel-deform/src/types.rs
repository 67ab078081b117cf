//! Core mesh data types.
//!
//! A [`VolumeMesh`] is a flat list of vertices and cells in the element-list
//! form used by Gmsh. Which cells count as wall, inlet, outlet or volume is
//! decided by the mesh's [`MeshVariant`] rather than by separate mesh types.

use nalgebra::{Point3, Vector3};

use crate::error::{DeformError, DeformResult, MeshLocation};
use crate::quality::Triangle;

/// Physical group ids carried in the element list.
pub mod physical {
    /// Vessel wall triangles.
    pub const WALL: u32 = 10;
    /// Inlet cap faces.
    pub const INLET: u32 = 11;
    /// Outlet cap faces.
    pub const OUTLET: u32 = 12;
    /// Interface between prism layers and a separately meshed core.
    pub const INNER_WALL: u32 = 90;
    /// Helper faces that are discarded when meshes are merged.
    pub const AUXILIARY: u32 = 99;
    /// Interior volume cells.
    pub const INTERIOR: u32 = 100;
}

/// Element type codes of the element-list format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    Triangle = 2,
    Quadrilateral = 3,
    Tetrahedron = 4,
    Prism = 6,
}

impl CellKind {
    /// Parse an element type code.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            2 => Some(CellKind::Triangle),
            3 => Some(CellKind::Quadrilateral),
            4 => Some(CellKind::Tetrahedron),
            6 => Some(CellKind::Prism),
            _ => None,
        }
    }

    /// Element type code.
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Number of corner nodes.
    #[inline]
    pub fn node_count(self) -> usize {
        match self {
            CellKind::Triangle => 3,
            CellKind::Quadrilateral => 4,
            CellKind::Tetrahedron => 4,
            CellKind::Prism => 6,
        }
    }

    /// Topological dimension of the element.
    #[inline]
    pub fn dimension(self) -> u32 {
        match self {
            CellKind::Triangle | CellKind::Quadrilateral => 2,
            CellKind::Tetrahedron | CellKind::Prism => 3,
        }
    }
}

/// A mesh vertex.
#[derive(Debug, Clone)]
pub struct MeshVertex {
    /// Current position.
    pub position: Point3<f64>,

    /// Centerline stations this vertex follows, one entry per prism column cell
    /// that touches it. Duplicates are intentional. `None` marks an entry that
    /// is excluded from deformation.
    pub stations: Vec<Option<usize>>,
}

impl MeshVertex {
    /// Create a vertex with no correspondence.
    #[inline]
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            stations: Vec::new(),
        }
    }

    /// Create a vertex from raw coordinates.
    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }
}

/// A cell of the element list.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub kind: CellKind,
    /// Tag count field of the element line, kept for round trips.
    pub aux_tag: u32,
    pub physical_id: u32,
    pub entity_id: u32,
    /// 0-based vertex ids. For prisms, `nodes[0..3]` is the base face and
    /// `nodes[i + 3]` sits above `nodes[i]`.
    pub nodes: Vec<u32>,
    /// Centerline station assigned through the cell's prism column.
    pub station: Option<usize>,
}

impl Cell {
    /// Create a cell with the default tag count of two.
    pub fn new(kind: CellKind, physical_id: u32, entity_id: u32, nodes: Vec<u32>) -> Self {
        Self {
            kind,
            aux_tag: 2,
            physical_id,
            entity_id,
            nodes,
            station: None,
        }
    }

    /// Convenience constructor for a triangle.
    pub fn triangle(physical_id: u32, nodes: [u32; 3]) -> Self {
        Self::new(CellKind::Triangle, physical_id, physical_id, nodes.to_vec())
    }

    /// Convenience constructor for a prism.
    pub fn prism(physical_id: u32, nodes: [u32; 6]) -> Self {
        Self::new(CellKind::Prism, physical_id, physical_id, nodes.to_vec())
    }

    /// Convenience constructor for a tetrahedron.
    pub fn tetrahedron(physical_id: u32, nodes: [u32; 4]) -> Self {
        Self::new(CellKind::Tetrahedron, physical_id, physical_id, nodes.to_vec())
    }

    /// First three nodes as a triangle index triple.
    pub fn triangle_nodes(&self) -> Option<[u32; 3]> {
        match self.nodes.as_slice() {
            [a, b, c, ..] => Some([*a, *b, *c]),
            _ => None,
        }
    }
}

/// Semantic role of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Wall,
    InnerWall,
    Inlet,
    Outlet,
    Auxiliary,
    PrismLayer,
    Volume,
}

/// Which mesh a [`VolumeMesh`] represents.
///
/// The variants differ only in how physical ids map to regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeshVariant {
    /// Wall surface plus prism boundary layers, as produced by layer extrusion.
    #[default]
    PrismLayer,
    /// Tetrahedral core meshed inside the innermost prism surface. Its wall
    /// triangles are the interface with the prism layers.
    InnerVolume,
    /// Prism layers and core combined into one mesh.
    Merged,
}

impl MeshVariant {
    /// Classify a cell. Returns `None` for cells with no known role.
    pub fn classify(self, cell: &Cell) -> Option<Region> {
        match (cell.kind, cell.physical_id) {
            (CellKind::Prism, _) => Some(Region::PrismLayer),
            (CellKind::Tetrahedron, _) => Some(Region::Volume),
            (_, physical::AUXILIARY) => Some(Region::Auxiliary),
            (_, physical::INLET) => Some(Region::Inlet),
            (_, physical::OUTLET) => Some(Region::Outlet),
            (CellKind::Triangle, physical::WALL) => match self {
                MeshVariant::InnerVolume => Some(Region::InnerWall),
                MeshVariant::PrismLayer | MeshVariant::Merged => Some(Region::Wall),
            },
            (CellKind::Triangle, physical::INNER_WALL) => Some(Region::InnerWall),
            _ => None,
        }
    }
}

/// A named physical group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalName {
    pub dimension: u32,
    pub id: u32,
    pub name: String,
}

/// A volume mesh in element-list form.
#[derive(Debug, Clone, Default)]
pub struct VolumeMesh {
    pub vertices: Vec<MeshVertex>,
    pub cells: Vec<Cell>,
    pub physical_names: Vec<PhysicalName>,
    pub variant: MeshVariant,
}

impl VolumeMesh {
    /// Create an empty mesh of the given variant.
    pub fn new(variant: MeshVariant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(variant: MeshVariant, vertex_count: usize, cell_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            cells: Vec::with_capacity(cell_count),
            physical_names: Vec::new(),
            variant,
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.cells.is_empty()
    }

    /// Append a vertex and return its id.
    pub fn add_vertex(&mut self, position: Point3<f64>) -> u32 {
        self.vertices.push(MeshVertex::new(position));
        (self.vertices.len() - 1) as u32
    }

    /// Append a cell and return its position in the cell list.
    pub fn add_cell(&mut self, cell: Cell) -> usize {
        self.cells.push(cell);
        self.cells.len() - 1
    }

    /// Copy of all vertex positions, indexed by vertex id.
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    /// Region of a cell under this mesh's variant.
    #[inline]
    pub fn region(&self, cell: &Cell) -> Option<Region> {
        self.variant.classify(cell)
    }

    /// Cells in a region, with their positions in the cell list.
    pub fn cells_in(&self, region: Region) -> impl Iterator<Item = (usize, &Cell)> + '_ {
        let variant = self.variant;
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, c)| variant.classify(c) == Some(region))
    }

    /// Number of cells in a region.
    pub fn count_in(&self, region: Region) -> usize {
        self.cells_in(region).count()
    }

    /// Triangle geometry of a cell's first three nodes.
    pub fn triangle(&self, cell_index: usize) -> Option<Triangle> {
        let [a, b, c] = self.cells.get(cell_index)?.triangle_nodes()?;
        Some(Triangle::new(
            self.vertices.get(a as usize)?.position,
            self.vertices.get(b as usize)?.position,
            self.vertices.get(c as usize)?.position,
        ))
    }

    /// Drop every correspondence entry from vertices and cells.
    pub fn clear_correspondence(&mut self) {
        for vertex in &mut self.vertices {
            vertex.stations.clear();
        }
        for cell in &mut self.cells {
            cell.station = None;
        }
    }

    /// Check that every cell has the right node count and only references
    /// existing vertices.
    pub fn check_indices(&self) -> DeformResult<()> {
        let vertex_count = self.vertices.len();
        for (index, cell) in self.cells.iter().enumerate() {
            if cell.nodes.len() != cell.kind.node_count() {
                return Err(DeformError::topology_at(
                    format!(
                        "{:?} cell has {} nodes, expected {}",
                        cell.kind,
                        cell.nodes.len(),
                        cell.kind.node_count()
                    ),
                    MeshLocation::Cell { index },
                ));
            }
            if let Some(&bad) = cell.nodes.iter().find(|&&n| n as usize >= vertex_count) {
                return Err(DeformError::topology_at(
                    format!(
                        "cell references vertex {} but the mesh has {} vertices",
                        bad, vertex_count
                    ),
                    MeshLocation::Cell { index },
                ));
            }
        }
        Ok(())
    }

    /// Axis-aligned bounding box, or `None` for a mesh without vertices.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.vertices.first()?.position;
        let (mut min, mut max) = (first, first);
        for vertex in &self.vertices[1..] {
            let p = &vertex.position;
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        Some((min, max))
    }

    /// Translate every vertex.
    pub fn translate(&mut self, offset: Vector3<f64>) {
        for vertex in &mut self.vertices {
            vertex.position += offset;
        }
    }
}
