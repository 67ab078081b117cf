//! vessel merge command - join a tetrahedral core to the prism layers.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use vessel_deform::{MergeStats, MeshVariant, PrismColumns, VolumeMesh, merge_inner_volume};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct MergeOutput {
    input: String,
    core: String,
    output: String,
    vertices: usize,
    cells: usize,
    stats: MergeStats,
}

pub fn run(input: &Path, core: &Path, layers: usize, output_path: &Path, cli: &Cli) -> Result<()> {
    let prism = VolumeMesh::load(input, MeshVariant::PrismLayer)
        .with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let inner = VolumeMesh::load(core, MeshVariant::InnerVolume)
        .with_context(|| format!("Failed to load core from {:?}", core))?;
    let columns = PrismColumns::from_layered(&prism, layers)
        .with_context(|| format!("Mesh does not have {} prism layers", layers))?;

    let merged = merge_inner_volume(&prism, &columns, &inner).context("Merge failed")?;
    merged
        .mesh
        .save(output_path)
        .with_context(|| format!("Failed to save mesh to {:?}", output_path))?;

    let result = MergeOutput {
        input: input.display().to_string(),
        core: core.display().to_string(),
        output: output_path.display().to_string(),
        vertices: merged.mesh.vertex_count(),
        cells: merged.mesh.cell_count(),
        stats: merged.stats,
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&result, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                output::success(
                    &format!("Merged mesh saved to {}", output_path.display()),
                    cli.format,
                    cli.quiet,
                );
                let s = &result.stats;
                println!("  {}: {}", "Shared nodes".cyan(), s.shared_nodes);
                println!("  {}: {}", "Appended nodes".cyan(), s.appended_nodes);
                println!("  {}: {}", "Tetrahedra".cyan(), s.tetrahedra);
                println!("  {}: {}", "Cap faces".cyan(), s.cap_faces);
                println!("  {}: {}", "Dropped cells".cyan(), s.dropped_cells);
            }
        }
    }

    Ok(())
}
