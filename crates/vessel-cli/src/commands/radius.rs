//! vessel radius command - average wall radius per centerline edge.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use colored::Colorize;
use serde::Serialize;
use vessel_deform::{EdgeRadius, MeshVariant, Region, VolumeMesh, average_edge_radii, io};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct RadiusResult {
    input: String,
    wall_nodes: usize,
    edges: Vec<EdgeRadius>,
}

pub fn run(input: &Path, centerline_path: &Path, cli: &Cli) -> Result<()> {
    let mesh = VolumeMesh::load(input, MeshVariant::PrismLayer)
        .with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let centerline = io::load_centerline(centerline_path)
        .with_context(|| format!("Failed to load centerline from {:?}", centerline_path))?;

    let mut seen = vec![false; mesh.vertex_count()];
    let nodes: Vec<_> = mesh
        .cells_in(Region::Wall)
        .flat_map(|(_, c)| c.nodes.iter().copied())
        .filter(|&v| !std::mem::replace(&mut seen[v as usize], true))
        .map(|v| mesh.vertices[v as usize].position)
        .collect();
    ensure!(!nodes.is_empty(), "{:?} has no wall triangles", input);

    let result = RadiusResult {
        input: input.display().to_string(),
        wall_nodes: nodes.len(),
        edges: average_edge_radii(&nodes, &centerline),
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&result, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Radius per Centerline Edge".bold().underline());
                println!("  {} wall nodes", result.wall_nodes);
                for edge in &result.edges {
                    match edge.mean_radius {
                        Some(r) => println!(
                            "  {} {:>4}: {:.4} ({} nodes)",
                            "Edge".cyan(),
                            edge.edge,
                            r,
                            edge.samples
                        ),
                        None => println!("  {} {:>4}: {}", "Edge".cyan(), edge.edge, "-".dimmed()),
                    }
                }
            }
        }
    }

    Ok(())
}
