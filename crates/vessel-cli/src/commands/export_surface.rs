//! vessel export-surface command - write a prism-layer surface as STL.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use vessel_deform::{MeshVariant, PrismColumns, VolumeMesh, io};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct ExportResult {
    input: String,
    output: String,
    surface: &'static str,
    triangles: usize,
}

pub fn run(input: &Path, layers: usize, output_path: &Path, innermost: bool, cli: &Cli) -> Result<()> {
    let mesh = VolumeMesh::load(input, MeshVariant::PrismLayer)
        .with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let columns = PrismColumns::from_layered(&mesh, layers)
        .with_context(|| format!("Mesh does not have {} prism layers", layers))?;

    let surface = if innermost {
        io::save_innermost_stl(&mesh, &columns, output_path)
            .with_context(|| format!("Failed to save surface to {:?}", output_path))?;
        "innermost"
    } else {
        io::save_wall_stl(&mesh, &columns, output_path)
            .with_context(|| format!("Failed to save surface to {:?}", output_path))?;
        "wall"
    };

    let result = ExportResult {
        input: input.display().to_string(),
        output: output_path.display().to_string(),
        surface,
        triangles: columns.len(),
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => output::success(
            &format!(
                "Saved {} {} triangles to {}",
                result.triangles,
                surface,
                output_path.display()
            ),
            cli.format,
            cli.quiet,
        ),
    }

    Ok(())
}
