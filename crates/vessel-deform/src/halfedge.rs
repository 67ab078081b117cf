//! Arena half-edge structure over the wall triangles.
//!
//! Every wall triangle owns three half-edges stored in one `Vec`. All links
//! (`next`, `prev`, `pair`) are indices into that arena. Face `i` is the wall
//! triangle of prism column `i`, so a flip here can be mirrored through the
//! column's prisms.
//!
//! Half-edge `h` of a face starts at the face vertex in the same slot:
//! `faces[f].half_edges[i]` runs from `faces[f].vertices[i]` to
//! `faces[f].vertices[(i + 1) % 3]`.

use hashbrown::HashMap;
use nalgebra::Point3;
use serde::Serialize;
use tracing::{debug, trace};

use crate::columns::PrismColumns;
use crate::error::{DeformError, DeformResult, MeshLocation};
use crate::quality::corner_angle;
use crate::types::VolumeMesh;

/// Default opposite-angle threshold above which an edge is flagged.
pub const DEFAULT_ANGLE_THRESHOLD_DEG: f64 = 100.0;

/// One directed edge of a wall triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfEdge {
    pub start: u32,
    pub end: u32,
    pub face: usize,
    pub next: usize,
    pub prev: usize,
    /// Opposite half-edge across the shared edge, `None` on a boundary.
    pub pair: Option<usize>,
    pub swap_flag: bool,
}

/// A wall triangle in the half-edge arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallFace {
    /// Cell position of the wall triangle in the volume mesh.
    pub cell: usize,
    pub vertices: [u32; 3],
    pub half_edges: [usize; 3],
}

/// Result of attempting a flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapOutcome {
    Flipped,
    /// The flip would not improve both triangles.
    QualityRejected,
    /// The new diagonal already exists elsewhere in the surface.
    ExistingEdge,
}

/// The two triangles around an interior edge.
///
/// The edge runs `n1 -> n2` in `face1`, whose third vertex is `n3`. Its pair
/// runs `n2 -> n1` in `face2`, whose third vertex is `n4`. A flip replaces the
/// diagonal `n1 n2` by `n3 n4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipQuad {
    pub edge: usize,
    pub pair: usize,
    pub n1: u32,
    pub n2: u32,
    pub n3: u32,
    pub n4: u32,
    pub face1: usize,
    pub face2: usize,
}

/// Half-edge connectivity of a triangle surface.
#[derive(Debug, Clone, Default)]
pub struct HalfEdgeMesh {
    edges: Vec<HalfEdge>,
    faces: Vec<WallFace>,
    /// Half-edges leaving each vertex.
    outgoing: HashMap<u32, Vec<usize>>,
}

impl HalfEdgeMesh {
    /// Create three half-edges per triangle with cyclic `next`/`prev`, and
    /// register each on its start vertex. No pairing is done.
    pub fn build(triangles: impl IntoIterator<Item = (usize, [u32; 3])>) -> Self {
        let mut mesh = Self::default();
        for (cell, vertices) in triangles {
            let face = mesh.faces.len();
            let base = mesh.edges.len();
            for i in 0..3 {
                let start = vertices[i];
                mesh.edges.push(HalfEdge {
                    start,
                    end: vertices[(i + 1) % 3],
                    face,
                    next: base + (i + 1) % 3,
                    prev: base + (i + 2) % 3,
                    pair: None,
                    swap_flag: false,
                });
                mesh.outgoing.entry(start).or_default().push(base + i);
            }
            mesh.faces.push(WallFace {
                cell,
                vertices,
                half_edges: [base, base + 1, base + 2],
            });
        }
        mesh
    }

    /// Build, pair and verify the wall surface of a layered mesh.
    ///
    /// Face `i` is the wall triangle of column `i`.
    pub fn from_mesh(mesh: &VolumeMesh, columns: &PrismColumns) -> DeformResult<Self> {
        mesh.check_indices()?;
        columns.check_cells(mesh)?;
        let triangles = columns
            .iter()
            .map(|column| {
                let wall = column.wall();
                mesh.cells[wall]
                    .triangle_nodes()
                    .map(|nodes| (wall, nodes))
                    .ok_or_else(|| {
                        DeformError::topology_at(
                            "wall cell is not a triangle",
                            MeshLocation::Cell { index: wall },
                        )
                    })
            })
            .collect::<DeformResult<Vec<_>>>()?;

        let mut topology = Self::build(triangles);
        let pairs = topology.pair_edges()?;
        debug!(
            faces = topology.face_count(),
            half_edges = topology.edge_count(),
            pairs,
            boundary = topology.boundary_count(),
            "Built half-edge topology"
        );
        Ok(topology)
    }

    /// Match every half-edge with its reverse and check the invariants.
    ///
    /// Returns the number of pairs formed. An edge used twice in the same
    /// direction, or by more than two triangles, is a topology error.
    pub fn pair_edges(&mut self) -> DeformResult<usize> {
        let mut pairs = 0;
        for e in 0..self.edges.len() {
            if self.edges[e].pair.is_some() {
                continue;
            }
            let HalfEdge { start, end, .. } = self.edges[e];
            let mut candidates = self
                .outgoing
                .get(&end)
                .into_iter()
                .flatten()
                .copied()
                .filter(|&h| self.edges[h].end == start);

            let Some(found) = candidates.next() else {
                continue;
            };
            if candidates.next().is_some() || self.edges[found].pair.is_some() {
                return Err(DeformError::topology_at(
                    "edge shared by more than two triangles",
                    MeshLocation::HalfEdge { start, end },
                ));
            }
            self.edges[e].pair = Some(found);
            self.edges[found].pair = Some(e);
            pairs += 1;
        }
        self.verify()?;
        Ok(pairs)
    }

    /// Check pairing symmetry and the per-face 3-cycles.
    pub fn verify(&self) -> DeformResult<()> {
        for (e, edge) in self.edges.iter().enumerate() {
            let location = MeshLocation::HalfEdge {
                start: edge.start,
                end: edge.end,
            };
            if let Some(p) = edge.pair {
                let pair = self.edges.get(p).ok_or_else(|| {
                    DeformError::topology_at("pair index out of range", location.clone())
                })?;
                if pair.pair != Some(e) || pair.start != edge.end || pair.end != edge.start {
                    return Err(DeformError::topology_at(
                        "pair is not symmetric",
                        location,
                    ));
                }
            }
            let next = edge.next;
            if self.edges[self.edges[next].next].next != e
                || self.edges[next].prev != e
                || self.edges[next].start != edge.end
                || self.edges[next].face != edge.face
            {
                return Err(DeformError::topology_at(
                    "face half-edges do not form a 3-cycle",
                    location,
                ));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn edges(&self) -> &[HalfEdge] {
        &self.edges
    }

    #[inline]
    pub fn faces(&self) -> &[WallFace] {
        &self.faces
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Half-edges without a pair.
    pub fn boundary_count(&self) -> usize {
        self.edges.iter().filter(|e| e.pair.is_none()).count()
    }

    /// Half-edges leaving vertex `v`.
    pub fn outgoing(&self, v: u32) -> &[usize] {
        self.outgoing.get(&v).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Half-edge from `a` to `b`, if the surface has one.
    pub fn find_edge(&self, a: u32, b: u32) -> Option<usize> {
        self.outgoing(a).iter().copied().find(|&h| self.edges[h].end == b)
    }

    /// The quad around an interior half-edge.
    pub fn flip_quad(&self, e: usize) -> DeformResult<FlipQuad> {
        let edge = self
            .edges
            .get(e)
            .ok_or_else(|| DeformError::topology(format!("half-edge {} does not exist", e)))?;
        let pair = edge.pair.ok_or_else(|| {
            DeformError::topology_at(
                "boundary edge cannot be flipped",
                MeshLocation::HalfEdge {
                    start: edge.start,
                    end: edge.end,
                },
            )
        })?;
        Ok(FlipQuad {
            edge: e,
            pair,
            n1: edge.start,
            n2: edge.end,
            n3: self.edges[edge.next].end,
            n4: self.edges[self.edges[pair].next].end,
            face1: edge.face,
            face2: self.edges[pair].face,
        })
    }

    /// Angles opposite an interior edge in its two triangles, in degrees.
    ///
    /// `None` for boundary edges or when a triangle is degenerate.
    pub fn opposite_angles(
        &self,
        e: usize,
        positions: &[Point3<f64>],
    ) -> Option<(f64, f64)> {
        let quad = self.flip_quad(e).ok()?;
        let p = |v: u32| positions.get(v as usize);
        let (p1, p2) = (p(quad.n1)?, p(quad.n2)?);
        let first = corner_angle(p(quad.n3)?, p1, p2)?;
        let second = corner_angle(p(quad.n4)?, p1, p2)?;
        Some((first.to_degrees(), second.to_degrees()))
    }

    /// Flag every interior edge whose opposite angles both exceed
    /// `threshold_deg`. Both halves of a flagged edge are flagged.
    ///
    /// Returns the number of edges (pairs) flagged.
    pub fn flag_swaps(&mut self, positions: &[Point3<f64>], threshold_deg: f64) -> usize {
        let mut flagged = 0;
        for e in 0..self.edges.len() {
            let Some(pair) = self.edges[e].pair else {
                continue;
            };
            if pair < e {
                continue;
            }
            let Some((first, second)) = self.opposite_angles(e, positions) else {
                continue;
            };
            if first > threshold_deg && second > threshold_deg {
                self.edges[e].swap_flag = true;
                self.edges[pair].swap_flag = true;
                flagged += 1;
                trace!(
                    start = self.edges[e].start,
                    end = self.edges[e].end,
                    first,
                    second,
                    "Flagged edge for swap"
                );
            }
        }
        debug!(flagged, threshold_deg, "Flagged edges for swap");
        flagged
    }

    /// Flagged edges, one half-edge per pair, in arena order.
    pub fn flagged(&self) -> Vec<usize> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(e, edge)| edge.swap_flag && edge.pair.is_some_and(|p| p > *e))
            .map(|(e, _)| e)
            .collect()
    }

    /// Flip an interior edge in place.
    ///
    /// The two triangles keep their face slots and their winding. Returns
    /// [`SwapOutcome::ExistingEdge`] without touching anything if the new
    /// diagonal is already an edge of the surface.
    pub fn swap(&mut self, e: usize) -> DeformResult<SwapOutcome> {
        let quad = self.flip_quad(e)?;
        let FlipQuad { n1, n2, n3, n4, face1, face2, pair, .. } = quad;

        if n3 == n4 || self.find_edge(n3, n4).is_some() || self.find_edge(n4, n3).is_some() {
            return Ok(SwapOutcome::ExistingEdge);
        }

        let e2 = self.edges[e].next; // n2 -> n3
        let e3 = self.edges[e].prev; // n3 -> n1
        let e5 = self.edges[pair].next; // n1 -> n4
        let e6 = self.edges[pair].prev; // n4 -> n2

        // face1 becomes (n3, n4, n2): e, e6, e2
        self.relink(e, n3, n4, face1, e6, e2);
        self.relink(e6, n4, n2, face1, e2, e);
        self.relink(e2, n2, n3, face1, e, e6);
        // face2 becomes (n4, n3, n1): pair, e3, e5
        self.relink(pair, n4, n3, face2, e3, e5);
        self.relink(e3, n3, n1, face2, e5, pair);
        self.relink(e5, n1, n4, face2, pair, e3);

        self.faces[face1].vertices = [n3, n4, n2];
        self.faces[face1].half_edges = [e, e6, e2];
        self.faces[face2].vertices = [n4, n3, n1];
        self.faces[face2].half_edges = [pair, e3, e5];

        self.move_outgoing(e, n1, n3);
        self.move_outgoing(pair, n2, n4);

        self.edges[e].swap_flag = false;
        self.edges[pair].swap_flag = false;

        trace!(n1, n2, n3, n4, "Flipped edge");
        Ok(SwapOutcome::Flipped)
    }

    fn relink(&mut self, h: usize, start: u32, end: u32, face: usize, next: usize, prev: usize) {
        let edge = &mut self.edges[h];
        edge.start = start;
        edge.end = end;
        edge.face = face;
        edge.next = next;
        edge.prev = prev;
    }

    fn move_outgoing(&mut self, h: usize, from: u32, to: u32) {
        if let Some(list) = self.outgoing.get_mut(&from) {
            list.retain(|&x| x != h);
        }
        self.outgoing.entry(to).or_default().push(h);
    }

    /// Flip every flagged edge once, in arena order, without a quality gate.
    ///
    /// Later flips see the adjacency left by earlier ones. Returns the number
    /// of edges flipped.
    pub fn execute_all(&mut self) -> DeformResult<usize> {
        let mut flipped = 0;
        for e in self.flagged() {
            if !self.edges[e].swap_flag {
                continue;
            }
            if self.swap(e)? == SwapOutcome::Flipped {
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}
