//! vessel: command-line interface for vascular mesh deformation.
//!
//! Deforms prism-layer vessel meshes onto a new centerline, repairs wall
//! edges, and prepares or inspects the files around that workflow.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=vessel_deform=info` - Pass summaries
//! - `RUST_LOG=vessel_deform=debug` - Per-stage counts
//! - `RUST_LOG=vessel_deform::timing=debug` - Performance timing
//! - `RUST_LOG=debug` - All debug output
//!
//! # Example
//!
//! ```bash
//! # Write the correspondence table, then deform
//! vessel correspond vessel.msh --centerline source.txt --layers 3 -o corr.ply
//! vessel deform vessel.msh --source source.txt --target target.txt --table corr.ply -o out.msh
//!
//! # Same run from a configuration file
//! vessel deform --config pipeline.toml
//!
//! # Compare source and target centerline lengths
//! vessel centerline-length source.txt --compare target.txt
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vessel_deform::{DeformationMode, PrismMismatchPolicy};

mod commands;
mod output;

use commands::{
    centerline_length, correspond, deform, deviation, export_surface, info, merge, radius, swap,
};

/// vessel - Deform vascular volume meshes along their centerline.
#[derive(Parser)]
#[command(name = "vessel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

/// How stations move their vertices.
#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Shift by the station displacement
    Translation,
    /// Rotate about the source station
    Rotation,
    /// Rotate, then shift
    Rigid,
}

impl From<ModeArg> for DeformationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Translation => DeformationMode::Translation,
            ModeArg::Rotation => DeformationMode::Rotation,
            ModeArg::Rigid => DeformationMode::Rigid,
        }
    }
}

/// What to do when a prism column does not match its neighbour.
#[derive(Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    /// Leave the edge and continue
    Skip,
    /// Stop with an error
    Abort,
}

impl From<PolicyArg> for PrismMismatchPolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::Skip => PrismMismatchPolicy::Skip,
            PolicyArg::Abort => PrismMismatchPolicy::Abort,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Deform a mesh from a source to a target centerline
    Deform {
        /// Input mesh file (.msh); taken from the configuration if omitted
        input: Option<PathBuf>,

        /// Source centerline
        #[arg(long)]
        source: Option<PathBuf>,

        /// Target centerline
        #[arg(long)]
        target: Option<PathBuf>,

        /// Correspondence table (.ply)
        #[arg(long)]
        table: Option<PathBuf>,

        /// Output mesh file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pipeline configuration (.toml or .json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Prism layers per wall triangle
        #[arg(long)]
        layers: Option<usize>,

        /// Deformation mode
        #[arg(long)]
        mode: Option<ModeArg>,

        /// Edge repair rounds after deforming
        #[arg(long, conflicts_with = "no_swap")]
        rounds: Option<usize>,

        /// Skip edge repair
        #[arg(long)]
        no_swap: bool,
    },

    /// Map wall triangles to centerline stations and write the table
    Correspond {
        /// Input mesh file (.msh)
        input: PathBuf,

        /// Centerline the stations refer to
        #[arg(long)]
        centerline: PathBuf,

        /// Prism layers per wall triangle
        #[arg(long, default_value = "3")]
        layers: usize,

        /// Output table (.ply)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Repair obtuse wall edges and their prism columns
    Swap {
        /// Input mesh file (.msh)
        input: PathBuf,

        /// Prism layers per wall triangle
        #[arg(long, default_value = "3")]
        layers: usize,

        /// Output mesh file
        #[arg(short, long)]
        output: PathBuf,

        /// Flag edges whose opposite angles both exceed this (degrees)
        #[arg(long)]
        threshold: Option<f64>,

        /// Number of repair rounds
        #[arg(long)]
        rounds: Option<usize>,

        /// Reaction to mismatched prism columns
        #[arg(long)]
        on_mismatch: Option<PolicyArg>,

        /// Flip even when triangle quality does not improve
        #[arg(long)]
        no_quality_gate: bool,
    },

    /// Display mesh statistics and quality
    Info {
        /// Input mesh file (.msh)
        input: PathBuf,

        /// Prism layers per wall triangle, to report columns
        #[arg(long)]
        layers: Option<usize>,
    },

    /// Average vessel radius along each centerline edge
    Radius {
        /// Input mesh file (.msh)
        input: PathBuf,

        /// Centerline
        #[arg(long)]
        centerline: PathBuf,
    },

    /// Write the wall or innermost prism surface as STL
    ExportSurface {
        /// Input mesh file (.msh)
        input: PathBuf,

        /// Prism layers per wall triangle
        #[arg(long, default_value = "3")]
        layers: usize,

        /// Output file (.stl)
        #[arg(short, long)]
        output: PathBuf,

        /// Export the innermost prism surface instead of the wall
        #[arg(long)]
        innermost: bool,
    },

    /// Merge a tetrahedral core into a prism-layer mesh
    Merge {
        /// Prism-layer mesh (.msh)
        input: PathBuf,

        /// Core meshed inside the innermost prism surface (.msh)
        #[arg(long)]
        core: PathBuf,

        /// Prism layers per wall triangle
        #[arg(long, default_value = "3")]
        layers: usize,

        /// Output mesh file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Edge lengths and total length of a centerline
    CenterlineLength {
        /// Centerline
        centerline: PathBuf,

        /// Second centerline, reported alongside the first
        #[arg(long)]
        compare: Option<PathBuf>,
    },

    /// Distance from one STL surface to another
    Deviation {
        /// Reference surface (.stl)
        reference: PathBuf,

        /// Measured surface (.stl)
        measured: PathBuf,
    },
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "vessel_deform=info,vessel=info",
            2 => "vessel_deform=debug,vessel=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Deform {
            input,
            source,
            target,
            table,
            output,
            config,
            layers,
            mode,
            rounds,
            no_swap,
        } => deform::run(
            deform::DeformArgs {
                input: input.clone(),
                source: source.clone(),
                target: target.clone(),
                table: table.clone(),
                output: output.clone(),
                config: config.clone(),
                layers: *layers,
                mode: mode.map(Into::into),
                rounds: if *no_swap { Some(0) } else { *rounds },
            },
            &cli,
        ),
        Commands::Correspond {
            input,
            centerline,
            layers,
            output,
        } => correspond::run(input, centerline, *layers, output, &cli),
        Commands::Swap {
            input,
            layers,
            output,
            threshold,
            rounds,
            on_mismatch,
            no_quality_gate,
        } => swap::run(
            input,
            *layers,
            output,
            *threshold,
            *rounds,
            on_mismatch.map(Into::into),
            !*no_quality_gate,
            &cli,
        ),
        Commands::Info { input, layers } => info::run(input, *layers, &cli),
        Commands::Radius { input, centerline } => radius::run(input, centerline, &cli),
        Commands::ExportSurface {
            input,
            layers,
            output,
            innermost,
        } => export_surface::run(input, *layers, output, *innermost, &cli),
        Commands::Merge {
            input,
            core,
            layers,
            output,
        } => merge::run(input, core, *layers, output, &cli),
        Commands::CenterlineLength {
            centerline,
            compare,
        } => centerline_length::run(centerline, compare.as_deref(), &cli),
        Commands::Deviation {
            reference,
            measured,
        } => deviation::run(reference, measured, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(deform_err) = e.downcast_ref::<vessel_deform::DeformError>() {
                eprintln!("{}: {}", "Error".red().bold(), deform_err);
                eprintln!("  {}: {}", "Code".cyan(), deform_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    deform_err.recovery_suggestion()
                );
                if let Some(location) = deform_err.location() {
                    eprintln!("  {}: {}", "Location".yellow(), location);
                }
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
