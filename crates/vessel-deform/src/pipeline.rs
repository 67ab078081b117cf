//! Configuration and the end-to-end deformation pipeline.
//!
//! One run performs, in order:
//!
//! 1. group the wall triangles and prisms into columns
//! 2. pair the source and target centerlines station by station
//! 3. hand each column's station to its cells and vertices
//! 4. optionally give leftover vertices their nearest station
//! 5. Reset, Accumulate and Apply the deformation
//! 6. repair obtuse wall edges, `swap.rounds` times
//!
//! # Example TOML
//!
//! ```toml
//! layers = 3
//!
//! [deform]
//! mode = "translation"
//! smooth_tangents = true
//!
//! [swap]
//! angle_threshold_deg = 100.0
//! rounds = 2
//! on_prism_mismatch = "skip"
//!
//! [paths]
//! mesh = "vessel.msh"
//! source_centerline = "source.txt"
//! target_centerline = "target.txt"
//! table = "correspondence.ply"
//! output = "deformed.msh"
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::centerline::{Centerline, CenterlineField};
use crate::columns::PrismColumns;
use crate::correspondence::{
    PropagationStats, map_free_vertices_to_centerline, propagate_correspondence_to_volume,
};
use crate::deform::{DeformStats, DeformationEngine, DeformationMode};
use crate::error::{DeformError, DeformResult};
use crate::io;
use crate::quality::QualityReport;
use crate::swap::{SwapParams, SwapReport, repair_edges};
use crate::tracing_ext::log_mesh_stats;
use crate::types::{MeshVariant, VolumeMesh};

/// Parameters for the deformation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeformParams {
    /// How stations move their vertices.
    /// Default: translation
    pub mode: DeformationMode,

    /// Smooth both tangent sets before computing station rotations.
    /// Default: true
    pub smooth_tangents: bool,

    /// Give vertices outside every prism column their nearest source station.
    /// Without this, such vertices make Apply fail.
    /// Default: true
    pub map_free_vertices: bool,
}

impl Default for DeformParams {
    fn default() -> Self {
        Self {
            mode: DeformationMode::Translation,
            smooth_tangents: true,
            map_free_vertices: true,
        }
    }
}

impl DeformParams {
    pub fn with_mode(mut self, mode: DeformationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_smoothing(mut self, enabled: bool) -> Self {
        self.smooth_tangents = enabled;
        self
    }

    pub fn with_free_vertices(mut self, enabled: bool) -> Self {
        self.map_free_vertices = enabled;
        self
    }
}

/// Input and output files of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelinePaths {
    pub mesh: Option<PathBuf>,
    pub source_centerline: Option<PathBuf>,
    pub target_centerline: Option<PathBuf>,
    pub table: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// A serializable pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Optional name for this run.
    #[serde(default)]
    pub name: Option<String>,
    /// Prism layers per wall triangle.
    pub layers: usize,
    #[serde(default)]
    pub deform: DeformParams,
    #[serde(default)]
    pub swap: SwapParams,
    #[serde(default)]
    pub paths: PipelinePaths,
}

impl PipelineConfig {
    pub fn new(layers: usize) -> Self {
        Self {
            name: None,
            layers,
            deform: DeformParams::default(),
            swap: SwapParams::default(),
            paths: PipelinePaths::default(),
        }
    }

    pub fn with_deform(mut self, deform: DeformParams) -> Self {
        self.deform = deform;
        self
    }

    pub fn with_swap(mut self, swap: SwapParams) -> Self {
        self.swap = swap;
        self
    }

    pub fn from_toml(toml_str: &str) -> DeformResult<Self> {
        toml::from_str(toml_str).map_err(|e| DeformError::invalid_config(e.to_string()))
    }

    pub fn to_toml(&self) -> DeformResult<String> {
        toml::to_string_pretty(self).map_err(|e| DeformError::invalid_config(e.to_string()))
    }

    pub fn from_json(json_str: &str) -> DeformResult<Self> {
        serde_json::from_str(json_str).map_err(|e| DeformError::invalid_config(e.to_string()))
    }

    pub fn to_json(&self) -> DeformResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| DeformError::invalid_config(e.to_string()))
    }

    /// Load from a `.toml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> DeformResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| DeformError::io_read(path, e))?;
        let config = match extension(path).as_deref() {
            Some("toml") => toml::from_str(&contents)
                .map_err(|e| DeformError::parse_error(path, e.to_string()))?,
            Some("json") => serde_json::from_str(&contents).map_err(|e| {
                DeformError::parse_error_at(path, e.line(), e.to_string())
            })?,
            other => return Err(DeformError::unsupported_format(other.map(String::from))),
        };
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save as `.toml` or `.json`, by extension.
    pub fn save(&self, path: impl AsRef<Path>) -> DeformResult<()> {
        let path = path.as_ref();
        let contents = match extension(path).as_deref() {
            Some("toml") => self.to_toml()?,
            Some("json") => self.to_json()?,
            other => return Err(DeformError::unsupported_format(other.map(String::from))),
        };
        std::fs::write(path, contents).map_err(|e| DeformError::io_write(path, e))
    }

    pub fn validate(&self) -> DeformResult<()> {
        self.swap.validate()
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Statistics of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub columns: usize,
    pub stations: usize,
    pub propagation: PropagationStats,
    /// Vertices that received their nearest station.
    pub free_vertices: usize,
    pub deformation: DeformStats,
    pub swaps: Vec<SwapReport>,
    pub quality: QualityReport,
    pub elapsed_ms: f64,
}

impl PipelineResult {
    /// Edges flipped over all swap rounds.
    pub fn total_flipped(&self) -> usize {
        self.swaps.iter().map(|r| r.flipped).sum()
    }
}

/// Runs correspondence, deformation and edge repair on one mesh.
#[derive(Debug, Clone)]
pub struct DeformPipeline {
    config: PipelineConfig,
}

impl DeformPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Deform `mesh` from `source` to `target` using one station per wall
    /// triangle.
    pub fn run(
        &self,
        mesh: &mut VolumeMesh,
        source: &Centerline,
        target: &Centerline,
        triangle_stations: &[Option<usize>],
    ) -> DeformResult<PipelineResult> {
        let start = Instant::now();
        let config = &self.config;
        config.validate()?;
        log_mesh_stats(mesh, "before deformation");

        let columns = PrismColumns::from_layered(mesh, config.layers)?;
        let field = CenterlineField::new(source, target, config.deform.smooth_tangents)?;
        let propagation = propagate_correspondence_to_volume(mesh, &columns, triangle_stations)?;

        let free_vertices = if config.deform.map_free_vertices {
            map_free_vertices_to_centerline(mesh, source)
        } else {
            0
        };

        let mut engine = DeformationEngine::new();
        engine.reset(mesh);
        engine.accumulate(mesh, &field, config.deform.mode)?;
        let deformation = engine.apply(mesh)?;

        let swaps = if config.swap.rounds > 0 {
            repair_edges(mesh, &columns, &config.swap)?
        } else {
            Vec::new()
        };

        log_mesh_stats(mesh, "after deformation");
        let result = PipelineResult {
            columns: columns.len(),
            stations: field.len(),
            propagation,
            free_vertices,
            deformation,
            swaps,
            quality: QualityReport::from_mesh(mesh),
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        info!(
            columns = result.columns,
            moved = result.deformation.vertices_moved,
            flipped = result.total_flipped(),
            "Pipeline finished"
        );
        Ok(result)
    }

    /// Load every input named in `config.paths`, run, and save the output if
    /// one is named.
    pub fn run_paths(&self) -> DeformResult<(VolumeMesh, PipelineResult)> {
        let paths = &self.config.paths;
        let require = |p: &Option<PathBuf>, what: &str| {
            p.clone()
                .ok_or_else(|| DeformError::invalid_config(format!("paths.{} is not set", what)))
        };
        let mesh_path = require(&paths.mesh, "mesh")?;
        let source = io::load_centerline(&require(&paths.source_centerline, "source_centerline")?)?;
        let target = io::load_centerline(&require(&paths.target_centerline, "target_centerline")?)?;
        let table = io::load_correspondence_table(&require(&paths.table, "table")?)?;

        let mut mesh = io::load_mesh(&mesh_path, MeshVariant::PrismLayer)?;
        let result = self.run(&mut mesh, &source, &target, &table.stations)?;
        if let Some(output) = &paths.output {
            io::save_mesh(&mesh, output)?;
        }
        Ok((mesh, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::tests::extruded_pair;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    fn line(offset: Vector3<f64>) -> Centerline {
        let points = (0..3)
            .map(|i| Point3::new(0.5, 0.5, -(i as f64)) + offset)
            .collect();
        Centerline::new(points).expect("valid centerline")
    }

    #[test]
    fn test_default_params() {
        let config = PipelineConfig::new(3);
        assert_eq!(config.deform.mode, DeformationMode::Translation);
        assert!(config.deform.smooth_tangents);
        assert!(config.deform.map_free_vertices);
        assert_eq!(config.swap.rounds, 1);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PipelineConfig::new(2)
            .with_deform(DeformParams::default().with_mode(DeformationMode::Rigid))
            .with_swap(SwapParams::aggressive());
        let text = config.to_toml().expect("serialize");
        assert_eq!(PipelineConfig::from_toml(&text).expect("parse"), config);
    }

    #[test]
    fn test_partial_toml() {
        let config = PipelineConfig::from_toml(
            "layers = 4\n[deform]\nmode = \"rotation\"\n[swap]\nrounds = 0\n",
        )
        .expect("parse");
        assert_eq!(config.layers, 4);
        assert_eq!(config.deform.mode, DeformationMode::Rotation);
        assert!(config.deform.smooth_tangents);
        assert_eq!(config.swap.rounds, 0);
        assert_eq!(config.swap.angle_threshold_deg, 100.0);
    }

    #[test]
    fn test_missing_layers_is_invalid() {
        assert!(matches!(
            PipelineConfig::from_toml("[deform]\nmode = \"rigid\"\n"),
            Err(DeformError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_run_translates_layers() {
        let mut mesh = extruded_pair(2);
        let before = mesh.positions();
        let shift = Vector3::new(0.0, 0.0, 5.0);
        let result = DeformPipeline::new(PipelineConfig::new(2))
            .run(&mut mesh, &line(Vector3::zeros()), &line(shift), &[Some(0), Some(1)])
            .expect("run");

        assert_eq!(result.columns, 2);
        assert_eq!(result.free_vertices, 0);
        assert_eq!(result.deformation.vertices_moved, 12);
        assert!(result.swaps.is_empty());
        for (a, b) in before.iter().zip(mesh.positions()) {
            assert_relative_eq!(a + shift, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_run_rejects_short_table() {
        let mut mesh = extruded_pair(1);
        let err = DeformPipeline::new(PipelineConfig::new(1))
            .run(&mut mesh, &line(Vector3::zeros()), &line(Vector3::zeros()), &[Some(0)])
            .expect_err("one station for two columns");
        assert!(matches!(err, DeformError::InputCountMismatch { .. }));
    }

    #[test]
    fn test_run_rejects_malformed_prism() {
        let mut mesh = extruded_pair(1);
        mesh.cells[2].nodes.pop();
        let before = mesh.positions();
        let err = DeformPipeline::new(PipelineConfig::new(1))
            .run(&mut mesh, &line(Vector3::zeros()), &line(Vector3::zeros()), &[Some(0), Some(1)])
            .expect_err("five-node prism");
        assert!(matches!(err, DeformError::Topology { .. }));
        assert_eq!(mesh.positions(), before);
    }
}
