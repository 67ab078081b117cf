//! Quality-gated edge swaps carried through the prism layers.
//!
//! A wall flip replaces the diagonal `n1 n2` of two wall triangles by `n3 n4`.
//! The face of the flipped half-edge keeps `n2` and gives up `n1`; its
//! neighbour keeps `n1` and gives up `n2`. Every prism below repeats that
//! exchange one layer deeper, following the kept and dropped nodes up the
//! stacking direction, so each column stays a valid stack.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::columns::PrismColumns;
use crate::error::{DeformError, DeformResult, MeshLocation};
use crate::halfedge::{DEFAULT_ANGLE_THRESHOLD_DEG, FlipQuad, HalfEdgeMesh, SwapOutcome};
use crate::quality::Triangle;
use crate::tracing_ext::OperationTimer;
use crate::types::VolumeMesh;

/// What to do when the prisms beneath a flipped edge do not line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrismMismatchPolicy {
    /// Leave the edge as is, log it and continue the pass.
    #[default]
    Skip,
    /// Stop the pass and return the error.
    Abort,
}

/// Parameters for edge repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapParams {
    /// Both angles opposite an edge must exceed this to flag it.
    /// Default: 100 degrees
    pub angle_threshold_deg: f64,

    /// Number of Build, FlagSwaps, ExecuteAll rounds.
    /// Default: 1
    pub rounds: usize,

    /// Reaction to a prism column that does not match its neighbour.
    /// Default: skip
    pub on_prism_mismatch: PrismMismatchPolicy,

    /// Only flip when both resulting triangles have a lower aspect ratio.
    /// Default: true
    pub require_quality_gain: bool,
}

impl Default for SwapParams {
    fn default() -> Self {
        Self {
            angle_threshold_deg: DEFAULT_ANGLE_THRESHOLD_DEG,
            rounds: 1,
            on_prism_mismatch: PrismMismatchPolicy::Skip,
            require_quality_gain: true,
        }
    }
}

impl SwapParams {
    /// Flag only very obtuse edges, one round.
    pub fn conservative() -> Self {
        Self {
            angle_threshold_deg: 120.0,
            rounds: 1,
            ..Default::default()
        }
    }

    /// Flag mildly obtuse edges and repeat three times.
    pub fn aggressive() -> Self {
        Self {
            angle_threshold_deg: 95.0,
            rounds: 3,
            ..Default::default()
        }
    }

    pub fn with_threshold(mut self, degrees: f64) -> Self {
        self.angle_threshold_deg = degrees;
        self
    }

    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn with_policy(mut self, policy: PrismMismatchPolicy) -> Self {
        self.on_prism_mismatch = policy;
        self
    }

    pub fn with_quality_gate(mut self, enabled: bool) -> Self {
        self.require_quality_gain = enabled;
        self
    }

    pub fn validate(&self) -> DeformResult<()> {
        if !(0.0..180.0).contains(&self.angle_threshold_deg) {
            return Err(DeformError::invalid_config(format!(
                "angle threshold {} is outside [0, 180)",
                self.angle_threshold_deg
            )));
        }
        Ok(())
    }
}

/// Counts from one ExecuteAll pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SwapReport {
    pub round: usize,
    pub flagged: usize,
    pub flipped: usize,
    pub quality_rejected: usize,
    pub existing_edge: usize,
    /// Edges left alone because their prism columns did not match.
    pub skipped: usize,
    pub errors: Vec<String>,
}

fn triangle(mesh: &VolumeMesh, [a, b, c]: [u32; 3]) -> Option<Triangle> {
    let p = |v: u32| mesh.vertices.get(v as usize).map(|v| v.position);
    Some(Triangle::new(p(a)?, p(b)?, p(c)?))
}

/// Whether flipping improves the aspect ratio of both triangles.
pub fn flip_improves_quality(mesh: &VolumeMesh, quad: &FlipQuad) -> bool {
    let FlipQuad { n1, n2, n3, n4, .. } = *quad;
    let (Some(old1), Some(old2), Some(new1), Some(new2)) = (
        triangle(mesh, [n1, n2, n3]),
        triangle(mesh, [n2, n1, n4]),
        triangle(mesh, [n3, n4, n2]),
        triangle(mesh, [n4, n3, n1]),
    ) else {
        return false;
    };
    new1.aspect_ratio() < old1.aspect_ratio() && new2.aspect_ratio() < old2.aspect_ratio()
}

/// Replacement node lists for one level of the two columns.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LevelRewrite {
    cell_a: usize,
    nodes_a: Vec<u32>,
    cell_b: usize,
    nodes_b: Vec<u32>,
}

fn position_of(base: &[u32], node: u32) -> Option<usize> {
    base.iter().position(|&n| n == node)
}

/// Work out the exchange for one level. `keep` stays in cell A and leaves
/// cell B, `lose` leaves A and stays in B. Returns the rewrite and, for
/// prisms, the nodes above `keep` and `lose`.
fn plan_level(
    mesh: &VolumeMesh,
    cell_a: usize,
    cell_b: usize,
    keep: u32,
    lose: u32,
) -> DeformResult<(LevelRewrite, Option<(u32, u32)>)> {
    let (Some(a), Some(b)) = (mesh.cells.get(cell_a), mesh.cells.get(cell_b)) else {
        return Err(DeformError::topology(format!(
            "column cells {} and {} are not in the mesh",
            cell_a, cell_b
        )));
    };
    let (a, b) = (&a.nodes, &b.nodes);
    let mismatch = |details: &str| {
        DeformError::topology_at(
            format!("{} (cells {} and {})", details, cell_a, cell_b),
            MeshLocation::Cell { index: cell_a },
        )
    };

    if a.len() != b.len() || !(a.len() == 3 || a.len() == 6) {
        return Err(mismatch("neighbouring cells are not a triangle or prism pair"));
    }
    let prism = a.len() == 6;
    let shared = a.iter().filter(|n| b.contains(n)).count();
    let expected = if prism { 4 } else { 2 };
    if shared != expected {
        return Err(mismatch(&format!("cells share {} corner nodes", shared)));
    }

    let (ka, da, kb, db) = match (
        position_of(&a[..3], keep),
        position_of(&a[..3], lose),
        position_of(&b[..3], keep),
        position_of(&b[..3], lose),
    ) {
        (Some(ka), Some(da), Some(kb), Some(db)) => (ka, da, kb, db),
        _ => return Err(mismatch("shared edge is missing from a base face")),
    };
    let pa = 3 - ka - da;
    let pb = 3 - kb - db;

    let mut nodes_a = a.clone();
    let mut nodes_b = b.clone();
    nodes_a[da] = b[pb];
    nodes_b[kb] = a[pa];

    let above = if prism {
        if a[ka + 3] != b[kb + 3] || a[da + 3] != b[db + 3] {
            return Err(mismatch("shared quad face is not stacked on the shared edge"));
        }
        nodes_a[da + 3] = b[pb + 3];
        nodes_b[kb + 3] = a[pa + 3];
        Some((a[ka + 3], a[da + 3]))
    } else {
        None
    };

    Ok((
        LevelRewrite {
            cell_a,
            nodes_a,
            cell_b,
            nodes_b,
        },
        above,
    ))
}

/// Validate every level of the two columns and collect the rewrites.
fn plan_columns(
    mesh: &VolumeMesh,
    columns: &PrismColumns,
    quad: &FlipQuad,
) -> DeformResult<Vec<LevelRewrite>> {
    let (Some(col_a), Some(col_b)) = (columns.get(quad.face1), columns.get(quad.face2)) else {
        return Err(DeformError::topology(format!(
            "faces {} and {} have no prism column",
            quad.face1, quad.face2
        )));
    };
    if col_a.cells.len() != col_b.cells.len() {
        return Err(DeformError::topology("columns differ in depth"));
    }

    let mut rewrites = Vec::with_capacity(col_a.cells.len());
    let (mut keep, mut lose) = (quad.n2, quad.n1);
    for (&cell_a, &cell_b) in col_a.cells.iter().zip(&col_b.cells) {
        let (rewrite, above) = plan_level(mesh, cell_a, cell_b, keep, lose)?;
        rewrites.push(rewrite);
        if let Some((k, l)) = above {
            keep = k;
            lose = l;
        }
    }
    Ok(rewrites)
}

/// Flip one wall edge and carry the flip through both prism columns.
///
/// Nothing is changed unless the quality gate (when enabled) accepts the flip,
/// every layer lines up and the new diagonal is not already an edge. A layer
/// mismatch is returned as a `Topology` error.
pub fn swap_with_prism_column(
    topology: &mut HalfEdgeMesh,
    mesh: &mut VolumeMesh,
    columns: &PrismColumns,
    edge: usize,
    require_quality_gain: bool,
) -> DeformResult<SwapOutcome> {
    let quad = topology.flip_quad(edge)?;
    if require_quality_gain && !flip_improves_quality(mesh, &quad) {
        return Ok(SwapOutcome::QualityRejected);
    }

    let rewrites = plan_columns(mesh, columns, &quad)?;
    let outcome = topology.swap(edge)?;
    if outcome == SwapOutcome::Flipped {
        for rewrite in rewrites {
            mesh.cells[rewrite.cell_a].nodes = rewrite.nodes_a;
            mesh.cells[rewrite.cell_b].nodes = rewrite.nodes_b;
        }
    }
    Ok(outcome)
}

/// One pass over the flagged edges, in list order.
///
/// Each flagged pair is attempted once. Flipped edges lose their flags,
/// rejected ones keep them.
pub fn execute_all_with_prism_columns(
    topology: &mut HalfEdgeMesh,
    mesh: &mut VolumeMesh,
    columns: &PrismColumns,
    params: &SwapParams,
) -> DeformResult<SwapReport> {
    let flagged = topology.flagged();
    let mut report = SwapReport {
        flagged: flagged.len(),
        ..Default::default()
    };

    for edge in flagged {
        match swap_with_prism_column(topology, mesh, columns, edge, params.require_quality_gain) {
            Ok(SwapOutcome::Flipped) => report.flipped += 1,
            Ok(SwapOutcome::QualityRejected) => report.quality_rejected += 1,
            Ok(SwapOutcome::ExistingEdge) => report.existing_edge += 1,
            Err(err @ DeformError::Topology { .. })
                if params.on_prism_mismatch == PrismMismatchPolicy::Skip =>
            {
                warn!(edge, error = %err, "Skipping swap");
                report.skipped += 1;
                report.errors.push(err.to_string());
            }
            Err(err) => return Err(err),
        }
    }
    Ok(report)
}

/// Run `params.rounds` rounds of Build, FlagSwaps and ExecuteAll.
///
/// Stops early once a round flags nothing. Returns one report per round run.
pub fn repair_edges(
    mesh: &mut VolumeMesh,
    columns: &PrismColumns,
    params: &SwapParams,
) -> DeformResult<Vec<SwapReport>> {
    params.validate()?;
    let _timer = OperationTimer::with_context("edge_swap", mesh.cell_count(), mesh.vertex_count());

    let mut reports = Vec::with_capacity(params.rounds);
    for round in 1..=params.rounds {
        let mut topology = HalfEdgeMesh::from_mesh(mesh, columns)?;
        let positions = mesh.positions();
        if topology.flag_swaps(&positions, params.angle_threshold_deg) == 0 {
            debug!(round, "No edges flagged");
            break;
        }
        let mut report = execute_all_with_prism_columns(&mut topology, mesh, columns, params)?;
        report.round = round;
        info!(
            round,
            flagged = report.flagged,
            flipped = report.flipped,
            rejected = report.quality_rejected,
            skipped = report.skipped,
            "Edge swap pass"
        );
        reports.push(report);
    }
    Ok(reports)
}
