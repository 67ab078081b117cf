//! vessel correspond command - write the wall-to-centerline side table.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use vessel_deform::{MeshVariant, PrismColumns, VolumeMesh, io, map_columns_to_centerline};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct CorrespondResult {
    input: String,
    output: String,
    wall_triangles: usize,
    stations: usize,
    /// Stations that received at least one triangle.
    stations_used: usize,
    max_offset: f64,
}

pub fn run(
    input: &Path,
    centerline_path: &Path,
    layers: usize,
    output_path: &Path,
    cli: &Cli,
) -> Result<()> {
    let mesh = VolumeMesh::load(input, MeshVariant::PrismLayer)
        .with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let centerline = io::load_centerline(centerline_path)
        .with_context(|| format!("Failed to load centerline from {:?}", centerline_path))?;
    let columns = PrismColumns::from_layered(&mesh, layers)
        .with_context(|| format!("Mesh does not have {} prism layers", layers))?;

    let mapped = map_columns_to_centerline(&mesh, &columns, &centerline)?;
    let stations: Vec<Option<usize>> = mapped.iter().map(|t| Some(t.station)).collect();
    io::save_correspondence_table(&mesh, &columns, &stations, output_path)
        .with_context(|| format!("Failed to save table to {:?}", output_path))?;

    let mut used = vec![false; centerline.len()];
    for t in &mapped {
        used[t.station] = true;
    }
    let result = CorrespondResult {
        input: input.display().to_string(),
        output: output_path.display().to_string(),
        wall_triangles: mapped.len(),
        stations: centerline.len(),
        stations_used: used.iter().filter(|&&u| u).count(),
        max_offset: mapped.iter().map(|t| t.offset.norm()).fold(0.0, f64::max),
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&result, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                output::success(
                    &format!("Correspondence table saved to {}", output_path.display()),
                    cli.format,
                    cli.quiet,
                );
                println!("  {}: {}", "Wall triangles".cyan(), result.wall_triangles);
                println!(
                    "  {}: {} of {}",
                    "Stations used".cyan(),
                    result.stations_used,
                    result.stations
                );
                println!(
                    "  {}: {:.4}",
                    "Max centroid distance".cyan(),
                    result.max_offset
                );
            }
        }
    }

    Ok(())
}
