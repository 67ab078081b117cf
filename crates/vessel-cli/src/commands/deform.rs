//! vessel deform command - move a mesh onto a new centerline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use vessel_deform::{DeformPipeline, DeformationMode, PipelineConfig};

use crate::{Cli, OutputFormat, output};

const DEFAULT_LAYERS: usize = 3;

/// Command-line overrides on top of an optional configuration file.
pub struct DeformArgs {
    pub input: Option<PathBuf>,
    pub source: Option<PathBuf>,
    pub target: Option<PathBuf>,
    pub table: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub layers: Option<usize>,
    pub mode: Option<DeformationMode>,
    pub rounds: Option<usize>,
}

fn build_config(args: DeformArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => PipelineConfig::new(args.layers.unwrap_or(DEFAULT_LAYERS)),
    };

    if let Some(layers) = args.layers {
        config.layers = layers;
    }
    if let Some(mode) = args.mode {
        config.deform.mode = mode;
    }
    if let Some(rounds) = args.rounds {
        config.swap.rounds = rounds;
    }

    let paths = &mut config.paths;
    let overrides = [
        (&mut paths.mesh, args.input),
        (&mut paths.source_centerline, args.source),
        (&mut paths.target_centerline, args.target),
        (&mut paths.table, args.table),
        (&mut paths.output, args.output),
    ];
    for (slot, value) in overrides {
        if value.is_some() {
            *slot = value;
        }
    }
    Ok(config)
}

pub fn run(args: DeformArgs, cli: &Cli) -> Result<()> {
    let config = build_config(args)?;
    if config.paths.output.is_none() {
        output::warning(
            "no output path given; the deformed mesh will not be saved",
            cli.format,
            cli.quiet,
        );
    }

    output::info(
        &format!(
            "Deforming with {:?} mode, {} layers, {} repair round(s)...",
            config.deform.mode, config.layers, config.swap.rounds
        ),
        cli.format,
        cli.quiet,
    );

    let output_path = config.paths.output.clone();
    let (mesh, result) = DeformPipeline::new(config)
        .run_paths()
        .context("Deformation failed")?;

    match cli.format {
        OutputFormat::Json => {
            output::print(&result, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                if let Some(path) = &output_path {
                    output::success(
                        &format!("Deformed mesh saved to {}", path.display()),
                        cli.format,
                        cli.quiet,
                    );
                }
                println!(
                    "  {}: {} ({} stations)",
                    "Columns".cyan(),
                    result.columns,
                    result.stations
                );
                println!(
                    "  {}: {} of {}",
                    "Vertices moved".cyan(),
                    result.deformation.vertices_moved,
                    mesh.vertex_count()
                );
                if result.free_vertices > 0 {
                    println!(
                        "  {}: {}",
                        "Mapped to nearest station".cyan(),
                        result.free_vertices
                    );
                }
                if result.deformation.vertices_excluded > 0 {
                    println!(
                        "  {}: {}",
                        "Excluded".yellow(),
                        result.deformation.vertices_excluded
                    );
                }
                println!(
                    "  {}: max {:.4}, mean {:.4}",
                    "Displacement".cyan(),
                    result.deformation.max_displacement,
                    result.deformation.mean_displacement
                );
                for report in &result.swaps {
                    println!(
                        "  {} {}: {} flagged, {} flipped, {} rejected, {} skipped",
                        "Swap round".cyan(),
                        report.round,
                        report.flagged,
                        report.flipped,
                        report.quality_rejected,
                        report.skipped
                    );
                }
                print!("{}", result.quality);
                println!("  {}: {:.1} ms", "Time".cyan(), result.elapsed_ms);
            }
        }
    }

    Ok(())
}
