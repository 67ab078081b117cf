//! Error types for deformation and repair passes with rich diagnostics.
//!
//! Every error carries:
//! - A machine-readable code for programmatic handling
//! - Context about where it happened (vertex, cell, half-edge, station, file)
//! - A recovery suggestion
//! - Terminal rendering through miette
//!
//! # Error Codes
//!
//! Codes have the format `VMD-XXXX`:
//! - `VMD-1xxx`: I/O errors (reading, writing, parsing)
//! - `VMD-2xxx`: Input validation errors (counts, geometry, configuration)
//! - `VMD-3xxx`: Topology errors (half-edge pairing, prism columns)
//! - `VMD-4xxx`: Deformation errors (correspondence domain, pass ordering)
//!
//! # Example
//!
//! ```rust,ignore
//! use vessel_deform::{DeformError, ErrorCode};
//!
//! let err = DeformError::count_mismatch("surface nodes", 120, 118);
//! assert_eq!(err.code(), ErrorCode::InputCountMismatch);
//! println!("{}", err.recovery_suggestion());
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for deformation operations.
pub type DeformResult<T> = Result<T, DeformError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // I/O errors (1xxx)
    /// VMD-1001: Failed to read file
    IoRead = 1001,
    /// VMD-1002: Failed to write file
    IoWrite = 1002,
    /// VMD-1003: Failed to parse file
    ParseError = 1003,
    /// VMD-1004: Unsupported file format
    UnsupportedFormat = 1004,

    // Input validation errors (2xxx)
    /// VMD-2001: Paired inputs have different sizes
    InputCountMismatch = 2001,
    /// VMD-2002: Zero-length tangent or edge vector
    DegenerateGeometry = 2002,
    /// VMD-2003: Configuration value out of range
    InvalidConfig = 2003,

    // Topology errors (3xxx)
    /// VMD-3001: Half-edge or prism column invariant violated
    Topology = 3001,

    // Deformation errors (4xxx)
    /// VMD-4001: Correspondence index outside the centerline, or empty list
    IndexOutOfDomain = 4001,
    /// VMD-4002: Reset/Accumulate/Apply called out of order
    SequenceViolation = 4002,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `VMD-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "VMD-1001",
            ErrorCode::IoWrite => "VMD-1002",
            ErrorCode::ParseError => "VMD-1003",
            ErrorCode::UnsupportedFormat => "VMD-1004",
            ErrorCode::InputCountMismatch => "VMD-2001",
            ErrorCode::DegenerateGeometry => "VMD-2002",
            ErrorCode::InvalidConfig => "VMD-2003",
            ErrorCode::Topology => "VMD-3001",
            ErrorCode::IndexOutOfDomain => "VMD-4001",
            ErrorCode::SequenceViolation => "VMD-4002",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions attached to errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Check the input files.
    CheckInput { checks: Vec<String> },
    /// Regenerate an artifact that no longer matches the mesh.
    Regenerate { artifact: String },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// Follow the documented call order.
    FollowSequence { sequence: String },
    /// Use a different file format.
    UseDifferentFormat { suggested: Vec<String> },
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::CheckInput { checks } => {
                write!(f, "Check the input for: {}", checks.join(", "))
            }
            RecoverySuggestion::Regenerate { artifact } => {
                write!(f, "Regenerate the {} from the current mesh", artifact)
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::FollowSequence { sequence } => {
                write!(f, "Call the passes in order: {}", sequence)
            }
            RecoverySuggestion::UseDifferentFormat { suggested } => {
                write!(f, "Try using a different format: {}", suggested.join(", "))
            }
            RecoverySuggestion::None => write!(f, "No automatic recovery available"),
        }
    }
}

/// Location information for errors.
#[derive(Debug, Clone)]
pub enum MeshLocation {
    /// A mesh vertex (0-based id).
    Vertex { index: usize },
    /// A mesh cell (0-based position in the cell list).
    Cell { index: usize },
    /// A half-edge between two vertices.
    HalfEdge { start: u32, end: u32 },
    /// A centerline station.
    Station { index: usize },
    /// A position in a file.
    File { path: PathBuf, line: Option<usize> },
}

impl std::fmt::Display for MeshLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeshLocation::Vertex { index } => write!(f, "vertex {}", index),
            MeshLocation::Cell { index } => write!(f, "cell {}", index),
            MeshLocation::HalfEdge { start, end } => {
                write!(f, "half-edge {} -> {}", start, end)
            }
            MeshLocation::Station { index } => write!(f, "centerline station {}", index),
            MeshLocation::File { path, line } => match line {
                Some(l) => write!(f, "{}:{}", path.display(), l),
                None => write!(f, "{}", path.display()),
            },
        }
    }
}

/// Errors raised by the correspondence, deformation and repair passes.
#[derive(Debug, Error, Diagnostic)]
pub enum DeformError {
    /// Error reading from a file.
    #[error("failed to read {path}")]
    #[diagnostic(
        code(vmd::io::read),
        help("Check that the file exists and is readable. Try: ls -la {}", path.display())
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write {path}")]
    #[diagnostic(code(vmd::io::write), help("Check that the directory exists and is writable"))]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed file content.
    #[error("failed to parse {path}: {details}")]
    #[diagnostic(
        code(vmd::parse::error),
        help("The file may be truncated or written by an incompatible exporter.")
    )]
    ParseError {
        path: PathBuf,
        line: Option<usize>,
        details: String,
    },

    /// Unsupported file extension.
    #[error("unsupported file format: {extension:?}")]
    #[diagnostic(
        code(vmd::format::unsupported),
        help("Volume meshes: .msh (Gmsh 2.2 ASCII). Surfaces: .stl. Side tables: .ply")
    )]
    UnsupportedFormat { extension: Option<String> },

    /// Two point sets that must pair up have different sizes.
    #[error("{what}: expected {expected} entries, found {found}")]
    #[diagnostic(
        code(vmd::input::count_mismatch),
        help("Both inputs must describe the same set of points or elements.")
    )]
    InputCountMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    /// A tangent or edge vector has zero length.
    #[error("degenerate geometry: {details}")]
    #[diagnostic(
        code(vmd::input::degenerate),
        help("Remove duplicated consecutive points from the centerline.")
    )]
    DegenerateGeometry {
        details: String,
        station: Option<usize>,
    },

    /// Configuration value out of range.
    #[error("invalid configuration: {details}")]
    #[diagnostic(code(vmd::input::config))]
    InvalidConfig { details: String },

    /// Half-edge pairing or prism column invariant violated.
    #[error("topology error: {details}")]
    #[diagnostic(
        code(vmd::topology),
        help("The wall surface must be a consistently oriented manifold with one prism column per triangle.")
    )]
    Topology {
        details: String,
        location: Option<MeshLocation>,
    },

    /// A vertex cannot be deformed because its correspondence is unusable.
    #[error("vertex {vertex}: {details}")]
    #[diagnostic(
        code(vmd::deform::domain),
        help("Propagate the surface correspondence to the volume before applying a deformation.")
    )]
    IndexOutOfDomain { vertex: usize, details: String },

    /// Deformation passes were called out of order.
    #[error("deformation sequence violated: {details}")]
    #[diagnostic(code(vmd::deform::sequence))]
    SequenceViolation { details: String },
}

impl DeformError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            DeformError::IoRead { .. } => ErrorCode::IoRead,
            DeformError::IoWrite { .. } => ErrorCode::IoWrite,
            DeformError::ParseError { .. } => ErrorCode::ParseError,
            DeformError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            DeformError::InputCountMismatch { .. } => ErrorCode::InputCountMismatch,
            DeformError::DegenerateGeometry { .. } => ErrorCode::DegenerateGeometry,
            DeformError::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            DeformError::Topology { .. } => ErrorCode::Topology,
            DeformError::IndexOutOfDomain { .. } => ErrorCode::IndexOutOfDomain,
            DeformError::SequenceViolation { .. } => ErrorCode::SequenceViolation,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            DeformError::IoRead { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["file exists".into(), "file permissions".into()],
            },
            DeformError::IoWrite { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            DeformError::ParseError { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["file is complete".into(), "section markers".into()],
            },
            DeformError::UnsupportedFormat { .. } => RecoverySuggestion::UseDifferentFormat {
                suggested: vec!["msh".into(), "stl".into(), "ply".into()],
            },
            DeformError::InputCountMismatch { .. } => RecoverySuggestion::Regenerate {
                artifact: "paired input".into(),
            },
            DeformError::DegenerateGeometry { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["duplicate centerline points".into()],
            },
            DeformError::InvalidConfig { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![("config".into(), "see `vessel deform --help`".into())],
            },
            DeformError::Topology { .. } => RecoverySuggestion::CheckInput {
                checks: vec![
                    "wall triangle orientation".into(),
                    "prism layer count".into(),
                ],
            },
            DeformError::IndexOutOfDomain { .. } => RecoverySuggestion::Regenerate {
                artifact: "surface correspondence table".into(),
            },
            DeformError::SequenceViolation { .. } => RecoverySuggestion::FollowSequence {
                sequence: "reset -> accumulate -> apply".into(),
            },
        }
    }

    /// Returns location information if available.
    pub fn location(&self) -> Option<MeshLocation> {
        match self {
            DeformError::IoRead { path, .. } | DeformError::IoWrite { path, .. } => {
                Some(MeshLocation::File {
                    path: path.clone(),
                    line: None,
                })
            }
            DeformError::ParseError { path, line, .. } => Some(MeshLocation::File {
                path: path.clone(),
                line: *line,
            }),
            DeformError::DegenerateGeometry {
                station: Some(index),
                ..
            } => Some(MeshLocation::Station { index: *index }),
            DeformError::Topology { location, .. } => location.clone(),
            DeformError::IndexOutOfDomain { vertex, .. } => {
                Some(MeshLocation::Vertex { index: *vertex })
            }
            _ => None,
        }
    }

    // Constructor helpers

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeformError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeformError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a ParseError without a line number.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        DeformError::ParseError {
            path: path.into(),
            line: None,
            details: details.into(),
        }
    }

    /// Create a ParseError pointing at a 1-based line.
    pub fn parse_error_at(
        path: impl Into<PathBuf>,
        line: usize,
        details: impl Into<String>,
    ) -> Self {
        DeformError::ParseError {
            path: path.into(),
            line: Some(line),
            details: details.into(),
        }
    }

    /// Create an InputCountMismatch error.
    pub fn count_mismatch(what: impl Into<String>, expected: usize, found: usize) -> Self {
        DeformError::InputCountMismatch {
            what: what.into(),
            expected,
            found,
        }
    }

    /// Create a DegenerateGeometry error.
    pub fn degenerate(details: impl Into<String>, station: Option<usize>) -> Self {
        DeformError::DegenerateGeometry {
            details: details.into(),
            station,
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(details: impl Into<String>) -> Self {
        DeformError::InvalidConfig {
            details: details.into(),
        }
    }

    /// Create a Topology error.
    pub fn topology(details: impl Into<String>) -> Self {
        DeformError::Topology {
            details: details.into(),
            location: None,
        }
    }

    /// Create a Topology error with a location.
    pub fn topology_at(details: impl Into<String>, location: MeshLocation) -> Self {
        DeformError::Topology {
            details: details.into(),
            location: Some(location),
        }
    }

    /// Create an IndexOutOfDomain error.
    pub fn out_of_domain(vertex: usize, details: impl Into<String>) -> Self {
        DeformError::IndexOutOfDomain {
            vertex,
            details: details.into(),
        }
    }

    /// Create a SequenceViolation error.
    pub fn sequence(details: impl Into<String>) -> Self {
        DeformError::SequenceViolation {
            details: details.into(),
        }
    }

    /// Create an UnsupportedFormat error.
    pub fn unsupported_format(extension: Option<String>) -> Self {
        DeformError::UnsupportedFormat { extension }
    }
}
