//! Error types for the archive crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when reading, extracting or building Big File archives.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] bigfile_common::Error),

    /// Metadata snapshot (de)serialization error.
    #[error("metadata snapshot error: {0}")]
    Json(#[from] serde_json::Error),

    /// Header does not start with the container magic.
    #[error("invalid magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 4], actual: Vec<u8> },

    /// Structurally invalid container.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Input path lacks the container extension.
    #[error("invalid extension for {path}: expected .{expected}")]
    InvalidExtension {
        path: PathBuf,
        expected: &'static str,
    },

    /// Cross-references inside the archive do not resolve.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// No metadata snapshot where a build expects one.
    #[error("metadata snapshot not found: {0}")]
    MissingMetadata(PathBuf),

    /// Refusing to replace an existing output.
    #[error("output already exists: {0}")]
    OutputExists(PathBuf),
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
