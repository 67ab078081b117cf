//! vessel swap command - repair obtuse wall edges.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use vessel_deform::{
    MeshVariant, PrismColumns, PrismMismatchPolicy, QualityReport, SwapParams, SwapReport,
    VolumeMesh, repair_edges,
};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct SwapResult {
    input: String,
    output: String,
    rounds: Vec<SwapReport>,
    flipped: usize,
    max_aspect_before: f64,
    max_aspect_after: f64,
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    input: &Path,
    layers: usize,
    output_path: &Path,
    threshold: Option<f64>,
    rounds: Option<usize>,
    on_mismatch: Option<PrismMismatchPolicy>,
    quality_gate: bool,
    cli: &Cli,
) -> Result<()> {
    let mut mesh = VolumeMesh::load(input, MeshVariant::PrismLayer)
        .with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let columns = PrismColumns::from_layered(&mesh, layers)
        .with_context(|| format!("Mesh does not have {} prism layers", layers))?;

    let mut params = SwapParams::default().with_quality_gate(quality_gate);
    if let Some(t) = threshold {
        params = params.with_threshold(t);
    }
    if let Some(r) = rounds {
        params = params.with_rounds(r);
    }
    if let Some(p) = on_mismatch {
        params = params.with_policy(p);
    }

    let before = QualityReport::from_mesh(&mesh);
    let reports = repair_edges(&mut mesh, &columns, &params).context("Edge repair failed")?;
    let after = QualityReport::from_mesh(&mesh);

    mesh.save(output_path)
        .with_context(|| format!("Failed to save mesh to {:?}", output_path))?;

    let result = SwapResult {
        input: input.display().to_string(),
        output: output_path.display().to_string(),
        flipped: reports.iter().map(|r| r.flipped).sum(),
        rounds: reports,
        max_aspect_before: before.wall_aspect_ratio.max,
        max_aspect_after: after.wall_aspect_ratio.max,
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&result, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                output::success(
                    &format!("Repaired mesh saved to {}", output_path.display()),
                    cli.format,
                    cli.quiet,
                );
                if result.rounds.is_empty() {
                    println!("  No edges exceeded {:.1}°", params.angle_threshold_deg);
                }
                for report in &result.rounds {
                    println!(
                        "  {} {}: {} flagged, {} flipped, {} rejected, {} existing, {} skipped",
                        "Round".cyan(),
                        report.round,
                        report.flagged,
                        report.flipped,
                        report.quality_rejected,
                        report.existing_edge,
                        report.skipped
                    );
                    for error in &report.errors {
                        println!("    {}: {}", "Skipped".yellow(), error);
                    }
                }
                println!(
                    "  {}: {:.3} → {:.3}",
                    "Max wall aspect ratio".cyan(),
                    result.max_aspect_before,
                    result.max_aspect_after
                );
            }
        }
    }

    Ok(())
}
