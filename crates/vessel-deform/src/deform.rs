//! Per-vertex deformation from centerline station transforms.
//!
//! Every vertex carries a list of stations (see
//! [`propagate_correspondence_to_volume`](crate::propagate_correspondence_to_volume)).
//! For each listed station the engine computes where that station's transform
//! would move the vertex, and the vertex's new position is the average of those
//! candidates. Vertices shared by columns mapped to neighbouring stations are
//! thereby blended, which keeps seams smooth.
//!
//! A pass is always `reset`, one `accumulate_*`, then `apply`. The engine
//! tracks where it is in that sequence and rejects calls out of order.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::centerline::{CenterlineField, CenterlineStation};
use crate::error::{DeformError, DeformResult};
use crate::tracing_ext::OperationTimer;
use crate::types::VolumeMesh;

/// How a station moves the vertices that follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeformationMode {
    /// Shift by the station's translation.
    #[default]
    Translation,
    /// Rotate about the source station by the tangent rotation.
    Rotation,
    /// Rotate about the source station, then carry the station to its target.
    Rigid,
}

impl DeformationMode {
    /// Candidate position of `p` under station `s`.
    #[inline]
    fn candidate(self, s: &CenterlineStation, p: &nalgebra::Point3<f64>) -> Vector3<f64> {
        match self {
            DeformationMode::Translation => p.coords + s.translation,
            DeformationMode::Rotation => s.rotate_about_source(p).coords,
            DeformationMode::Rigid => s.rotate_about_source(p).coords + s.translation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassState {
    Idle,
    Reset,
    Accumulated(DeformationMode),
}

/// Summary of an applied deformation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DeformStats {
    pub mode: DeformationMode,
    pub vertices_moved: usize,
    /// Vertices whose entries were all excluded and kept their position.
    pub vertices_excluded: usize,
    pub max_displacement: f64,
    pub mean_displacement: f64,
}

/// Accumulates candidate positions and applies their average.
#[derive(Debug)]
pub struct DeformationEngine {
    sums: Vec<Vector3<f64>>,
    counts: Vec<usize>,
    state: PassState,
}

impl Default for DeformationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DeformationEngine {
    pub fn new() -> Self {
        Self {
            sums: Vec::new(),
            counts: Vec::new(),
            state: PassState::Idle,
        }
    }

    /// Mode of the accumulation waiting to be applied, if any.
    pub fn pending_mode(&self) -> Option<DeformationMode> {
        match self.state {
            PassState::Accumulated(mode) => Some(mode),
            _ => None,
        }
    }

    /// Zero every vertex accumulator.
    pub fn reset(&mut self, mesh: &VolumeMesh) {
        let n = mesh.vertex_count();
        self.sums.clear();
        self.sums.resize(n, Vector3::zeros());
        self.counts.clear();
        self.counts.resize(n, 0);
        self.state = PassState::Reset;
    }

    /// Accumulate rotations about each source station.
    pub fn accumulate_rotation(
        &mut self,
        mesh: &VolumeMesh,
        field: &CenterlineField,
    ) -> DeformResult<()> {
        self.accumulate(mesh, field, DeformationMode::Rotation)
    }

    /// Accumulate translations by each station's displacement.
    pub fn accumulate_translation(
        &mut self,
        mesh: &VolumeMesh,
        field: &CenterlineField,
    ) -> DeformResult<()> {
        self.accumulate(mesh, field, DeformationMode::Translation)
    }

    /// Accumulate candidate positions under `mode`.
    ///
    /// Excluded entries are skipped. A station index beyond the field is an
    /// `IndexOutOfDomain` error and leaves the accumulators untouched.
    pub fn accumulate(
        &mut self,
        mesh: &VolumeMesh,
        field: &CenterlineField,
        mode: DeformationMode,
    ) -> DeformResult<()> {
        match self.state {
            PassState::Reset => {}
            PassState::Idle => {
                return Err(DeformError::sequence("accumulate called before reset"));
            }
            PassState::Accumulated(previous) => {
                return Err(DeformError::sequence(format!(
                    "{:?} accumulation already pending, {:?} requested",
                    previous, mode
                )));
            }
        }
        if self.sums.len() != mesh.vertex_count() {
            return Err(DeformError::sequence(
                "mesh changed size since the accumulators were reset",
            ));
        }

        for (vi, vertex) in mesh.vertices.iter().enumerate() {
            if let Some(bad) = vertex.stations.iter().flatten().find(|&&s| s >= field.len()) {
                return Err(DeformError::out_of_domain(
                    vi,
                    format!(
                        "station {} is outside a centerline of {} stations",
                        bad,
                        field.len()
                    ),
                ));
            }
        }

        let stations = field.stations();
        for (vi, vertex) in mesh.vertices.iter().enumerate() {
            for &station in vertex.stations.iter().flatten() {
                self.sums[vi] += mode.candidate(&stations[station], &vertex.position);
                self.counts[vi] += 1;
            }
        }

        self.state = PassState::Accumulated(mode);
        debug!(mode = ?mode, vertices = mesh.vertex_count(), "Accumulated candidates");
        Ok(())
    }

    /// Move every vertex to the average of its candidates.
    ///
    /// Fails with `IndexOutOfDomain`, before moving anything, if a vertex has
    /// an empty correspondence list. Vertices whose entries are all excluded
    /// stay where they are.
    pub fn apply(&mut self, mesh: &mut VolumeMesh) -> DeformResult<DeformStats> {
        let mode = self
            .pending_mode()
            .ok_or_else(|| DeformError::sequence("apply called without a pending accumulation"))?;
        if self.sums.len() != mesh.vertex_count() {
            return Err(DeformError::sequence(
                "mesh changed size since the accumulators were reset",
            ));
        }

        if let Some(vi) = mesh.vertices.iter().position(|v| v.stations.is_empty()) {
            return Err(DeformError::out_of_domain(vi, "empty correspondence list"));
        }

        let _timer = OperationTimer::with_context("apply_deformation", mesh.cell_count(), mesh.vertex_count());
        let mut stats = DeformStats {
            mode,
            ..Default::default()
        };
        let mut total = 0.0;

        for (vi, vertex) in mesh.vertices.iter_mut().enumerate() {
            let count = self.counts[vi];
            if count == 0 {
                stats.vertices_excluded += 1;
                continue;
            }
            let target = self.sums[vi] / count as f64;
            let displacement = (target - vertex.position.coords).norm();
            vertex.position.coords = target;

            stats.vertices_moved += 1;
            total += displacement;
            stats.max_displacement = stats.max_displacement.max(displacement);
        }

        if stats.vertices_moved > 0 {
            stats.mean_displacement = total / stats.vertices_moved as f64;
        }
        if stats.vertices_excluded > 0 {
            warn!(
                vertices = stats.vertices_excluded,
                "Vertices excluded from deformation"
            );
        }

        self.state = PassState::Idle;
        info!(
            mode = ?mode,
            moved = stats.vertices_moved,
            max_displacement = format!("{:.4}", stats.max_displacement),
            "Applied deformation"
        );
        Ok(stats)
    }
}

/// Run one full reset, accumulate, apply pass.
pub fn deform_mesh(
    mesh: &mut VolumeMesh,
    field: &CenterlineField,
    mode: DeformationMode,
) -> DeformResult<DeformStats> {
    let mut engine = DeformationEngine::new();
    engine.reset(mesh);
    engine.accumulate(mesh, field, mode)?;
    engine.apply(mesh)
}
