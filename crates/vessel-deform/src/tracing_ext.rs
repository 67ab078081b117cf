//! Tracing helpers for deformation and repair passes.
//!
//! Initialize a subscriber in the application to see these events:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//! // RUST_LOG=vessel_deform=debug for per-stage counts
//! // RUST_LOG=vessel_deform::timing=info for pass timing
//! ```
//!
//! # Log Levels
//!
//! - **INFO**: pass summaries and timing
//! - **DEBUG**: per-stage counts
//! - **WARN**: skipped swaps, vertices excluded from deformation
//! - **TRACE**: per-element detail

use nalgebra::Point3;
use std::time::Instant;
use tracing::span::EnteredSpan;
use tracing::{Span, debug, info};

use crate::types::{Region, VolumeMesh};

/// A timer that logs the duration of a pass when dropped.
///
/// The timer's span stays entered until the drop, so events logged during
/// the pass carry the operation name and mesh size.
///
/// ```rust,ignore
/// use vessel_deform::tracing_ext::OperationTimer;
///
/// fn pass() {
///     let _timer = OperationTimer::new("edge_swap");
///     // ...
/// } // logs elapsed_ms here
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: EnteredSpan,
}

impl OperationTimer {
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("vessel_operation", operation = name);
        debug!(target: "vessel_deform::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span: span.entered(),
        }
    }

    /// Create a timer that also records the mesh size.
    pub fn with_context(name: &'static str, cell_count: usize, vertex_count: usize) -> Self {
        let span = tracing::info_span!(
            "vessel_operation",
            operation = name,
            cells = cell_count,
            vertices = vertex_count
        );
        debug!(
            target: "vessel_deform::timing",
            operation = name,
            cells = cell_count,
            vertices = vertex_count,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span: span.entered(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "vessel_deform::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Operation completed"
        );
    }
}

/// Log vertex, cell and region counts at debug level.
pub fn log_mesh_stats(mesh: &VolumeMesh, context: &str) {
    let (min, max) = mesh
        .bounds()
        .unwrap_or((Point3::origin(), Point3::origin()));
    let dims = max - min;

    debug!(
        target: "vessel_deform::mesh_state",
        context = context,
        variant = ?mesh.variant,
        vertices = mesh.vertex_count(),
        cells = mesh.cell_count(),
        wall = mesh.count_in(Region::Wall),
        prisms = mesh.count_in(Region::PrismLayer),
        tetrahedra = mesh.count_in(Region::Volume),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}
