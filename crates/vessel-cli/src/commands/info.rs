//! vessel info command - display mesh statistics and quality.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use vessel_deform::{MeshVariant, PrismColumns, QualityReport, Region, VolumeMesh};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct RegionCounts {
    wall: usize,
    inner_wall: usize,
    inlet: usize,
    outlet: usize,
    auxiliary: usize,
    prism_layer: usize,
    volume: usize,
    unclassified: usize,
}

#[derive(Serialize)]
struct BoundsInfo {
    min: [f64; 3],
    max: [f64; 3],
    dimensions: [f64; 3],
}

#[derive(Serialize)]
struct MeshInfo {
    path: String,
    vertices: usize,
    cells: usize,
    regions: RegionCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    columns: Option<usize>,
    quality: QualityReport,
}

pub fn run(input: &Path, layers: Option<usize>, cli: &Cli) -> Result<()> {
    let mesh = VolumeMesh::load(input, MeshVariant::PrismLayer)
        .with_context(|| format!("Failed to load mesh from {:?}", input))?;

    let columns = match layers {
        Some(l) => Some(
            PrismColumns::from_layered(&mesh, l)
                .with_context(|| format!("Mesh does not have {} prism layers", l))?
                .len(),
        ),
        None => None,
    };

    let regions = RegionCounts {
        wall: mesh.count_in(Region::Wall),
        inner_wall: mesh.count_in(Region::InnerWall),
        inlet: mesh.count_in(Region::Inlet),
        outlet: mesh.count_in(Region::Outlet),
        auxiliary: mesh.count_in(Region::Auxiliary),
        prism_layer: mesh.count_in(Region::PrismLayer),
        volume: mesh.count_in(Region::Volume),
        unclassified: mesh.cells.iter().filter(|c| mesh.region(c).is_none()).count(),
    };
    let bounds = mesh.bounds().map(|(min, max)| {
        let dims = max - min;
        BoundsInfo {
            min: [min.x, min.y, min.z],
            max: [max.x, max.y, max.z],
            dimensions: [dims.x, dims.y, dims.z],
        }
    });

    let info = MeshInfo {
        path: input.display().to_string(),
        vertices: mesh.vertex_count(),
        cells: mesh.cell_count(),
        regions,
        bounds,
        columns,
        quality: QualityReport::from_mesh(&mesh),
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&info, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Mesh Information".bold().underline());
                println!("  {}: {}", "File".cyan(), input.display());
                println!("  {}: {}", "Vertices".cyan(), info.vertices);
                println!("  {}: {}", "Cells".cyan(), info.cells);

                let r = &info.regions;
                for (name, count) in [
                    ("Wall triangles", r.wall),
                    ("Inner wall triangles", r.inner_wall),
                    ("Inlet faces", r.inlet),
                    ("Outlet faces", r.outlet),
                    ("Auxiliary cells", r.auxiliary),
                    ("Prisms", r.prism_layer),
                    ("Tetrahedra", r.volume),
                    ("Unclassified", r.unclassified),
                ] {
                    if count > 0 {
                        println!("  {}: {}", name.cyan(), count);
                    }
                }
                if let Some(c) = info.columns {
                    println!("  {}: {}", "Prism columns".cyan(), c);
                }
                if let Some(ref b) = info.bounds {
                    println!(
                        "  {}: {:.2} x {:.2} x {:.2}",
                        "Dimensions".cyan(),
                        b.dimensions[0],
                        b.dimensions[1],
                        b.dimensions[2]
                    );
                }
                println!();
                print!("{}", info.quality);
            }
        }
    }

    Ok(())
}
