//! vessel deviation command - compare two STL surfaces.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use vessel_deform::{Deviation, io, surface_deviation};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct DeviationResult {
    reference: String,
    measured: String,
    reference_points: usize,
    measured_points: usize,
    deviation: Deviation,
}

pub fn run(reference: &Path, measured: &Path, cli: &Cli) -> Result<()> {
    let reference_points = io::load_stl_points(reference)
        .with_context(|| format!("Failed to load surface from {:?}", reference))?;
    let measured_points = io::load_stl_points(measured)
        .with_context(|| format!("Failed to load surface from {:?}", measured))?;

    let deviation = surface_deviation(&reference_points, &measured_points)?;
    let result = DeviationResult {
        reference: reference.display().to_string(),
        measured: measured.display().to_string(),
        reference_points: reference_points.len(),
        measured_points: measured_points.len(),
        deviation,
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&result, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Surface Deviation".bold().underline());
                println!("  {}: {}", "Reference points".cyan(), result.reference_points);
                println!("  {}: {}", "Measured points".cyan(), result.measured_points);
                println!("  {}: {:.6}", "Mean".cyan(), deviation.mean);
                println!("  {}: {:.6}", "Max".cyan(), deviation.max);
                println!("  {}: {:.6}", "Min".cyan(), deviation.min);
            }
        }
    }

    Ok(())
}
