//! Shared output helpers for text and JSON modes.

use colored::Colorize;
use serde::Serialize;

use crate::OutputFormat;

/// Print a serializable result.
///
/// JSON mode prints the value pretty-printed. Text mode prints the same
/// document, for commands that have no dedicated text layout.
pub fn print<T: Serialize>(value: &T, format: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match serde_json::to_string_pretty(value) {
        Ok(json) => match format {
            OutputFormat::Json | OutputFormat::Text => println!("{}", json),
        },
        Err(e) => eprintln!("{}: cannot serialize result: {}", "Error".red().bold(), e),
    }
}

/// Print a success line. Silent in JSON mode.
pub fn success(message: &str, format: OutputFormat, quiet: bool) {
    if quiet || matches!(format, OutputFormat::Json) {
        return;
    }
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a progress line to stderr. Silent in JSON mode.
pub fn info(message: &str, format: OutputFormat, quiet: bool) {
    if quiet || matches!(format, OutputFormat::Json) {
        return;
    }
    eprintln!("{} {}", "→".blue(), message);
}

/// Print a warning line to stderr. Silent in JSON mode.
pub fn warning(message: &str, format: OutputFormat, quiet: bool) {
    if quiet || matches!(format, OutputFormat::Json) {
        return;
    }
    eprintln!("{}: {}", "Warning".yellow().bold(), message);
}
