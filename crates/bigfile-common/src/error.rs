//! Error types for bigfile-common.

use thiserror::Error;

/// Common error type for bigfile operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A read or a schema field reached past the end of the supplied bytes.
    #[error("{context} out of range: needed bytes up to {end} but only {available} available")]
    OutOfRange {
        context: String,
        end: usize,
        available: usize,
    },

    /// Chunk size must be non-zero.
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    /// A record did not contain the requested field.
    #[error("missing field: {0}")]
    MissingField(String),

    /// A record field held a different value type than requested.
    #[error("field {field} is not {expected}")]
    FieldType {
        field: String,
        expected: &'static str,
    },

    /// A value could not be encoded into its declared field.
    #[error("cannot encode field {field}: {reason}")]
    Encoding { field: String, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hex decoding error.
    #[error("hex error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
