//! Bigfile - Big File game archive extraction and rebuilding library.
//!
//! This crate provides a unified interface to the Bigfile crates.
//!
//! # Crates
//!
//! - [`bigfile_common`] - Chunked cache, binary reading, byte-mapping schemas
//! - [`bigfile_archive`] - Container parsing, extraction and rebuilding
//!
//! # Example
//!
//! ```no_run
//! use bigfile::prelude::*;
//!
//! let report = extract("Game.bf", "out", &ExtractOptions::default())?;
//! println!("extracted {} files", report.files_extracted);
//!
//! // Later, after dropping replacements into out/rebuilt-files/
//! build("Game.bf", "out", "Game.new.bf", &BuildOptions::default())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use bigfile_archive as archive;
pub use bigfile_common as common;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use bigfile_archive::{
        build, extract, ArchiveHeader, ArchiveMetadataSnapshot, BigArchive, BuildOptions,
        ExtractOptions, ReconstructedDirectory, ReconstructedFile, VariantSignature,
    };
    pub use bigfile_common::{ChunkedCache, Endian, DEFAULT_CHUNK_SIZE};
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
