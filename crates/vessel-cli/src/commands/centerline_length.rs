//! vessel centerline-length command - edge and total lengths of centerlines.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use vessel_deform::io;

use crate::{Cli, OutputFormat, output};

#[derive(Debug, Serialize)]
struct CenterlineLength {
    path: String,
    segments: Vec<f64>,
    total: f64,
}

fn measure(path: &Path) -> Result<CenterlineLength> {
    let centerline = io::load_centerline(path)
        .with_context(|| format!("Failed to load centerline from {:?}", path))?;
    Ok(CenterlineLength {
        path: path.display().to_string(),
        segments: centerline.segment_lengths(),
        total: centerline.length(),
    })
}

fn cell(lengths: &CenterlineLength, i: usize) -> String {
    lengths
        .segments
        .get(i)
        .map(|l| format!("{:>12.4}", l))
        .unwrap_or_else(|| format!("{:>12}", "-"))
}

pub fn run(centerline: &Path, compare: Option<&Path>, cli: &Cli) -> Result<()> {
    let mut results = vec![measure(centerline)?];
    if let Some(other) = compare {
        results.push(measure(other)?);
    }

    match cli.format {
        OutputFormat::Json => {
            output::print(&results, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Centerline Length".bold().underline());
                for (i, r) in results.iter().enumerate() {
                    println!(
                        "  {} {}: {} ({} edges)",
                        "Curve".cyan(),
                        i + 1,
                        r.path,
                        r.segments.len()
                    );
                }
                let rows = results.iter().map(|r| r.segments.len()).max().unwrap_or(0);
                for i in 0..rows {
                    let cells: Vec<String> = results.iter().map(|r| cell(r, i)).collect();
                    println!("  {} {:>4}:{}", "Edge".cyan(), i, cells.concat());
                }
                let totals: Vec<String> = results
                    .iter()
                    .map(|r| format!("{:>12.4}", r.total))
                    .collect();
                println!("  {}:{}", "Total".green().bold(), totals.concat());
            }
        }
    }

    Ok(())
}
