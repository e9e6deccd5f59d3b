//! Big File container reader, extractor and builder.
//!
//! A Big File is a `BIG\0`-tagged game archive: a fixed 68-byte header,
//! an offset table, file and directory metadata tables sized to the
//! offset table capacity, then a data region of size-prefixed payloads.
//! This crate supports:
//!
//! - Header and table parsing in either byte order
//! - Directory tree reconstruction from parent-linked records
//! - Idempotent extraction with a JSON metadata snapshot
//! - Rebuilding a container with replaced files and recomputed offsets
//!
//! All reads go through a [`bigfile_common::ChunkedCache`], so archives of
//! several gigabytes are processed with one chunk resident at a time.
//!
//! # Example
//!
//! ```no_run
//! use bigfile_archive::BigArchive;
//! use bigfile_common::{Endian, DEFAULT_CHUNK_SIZE};
//!
//! let mut archive = BigArchive::open("Game.bf", Endian::Little, DEFAULT_CHUNK_SIZE)?;
//! let tree = archive.directory_tree("")?;
//!
//! for file in archive.reconstruct_files(&tree)? {
//!     println!("{}: {} bytes", file.path(), file.size);
//! }
//! # Ok::<(), bigfile_archive::Error>(())
//! ```

mod archive;
mod build;
mod error;
mod extract;
pub mod header;
mod snapshot;
pub mod tables;
mod tree;

#[cfg(test)]
mod fixture;

pub use archive::{BigArchive, ReconstructedFile};
pub use build::{
    build, plan_offsets, remap_directories, select_directories, BuildOptions, BuildReport,
    REBUILT_DIR,
};
pub use error::{Error, Result};
pub use extract::{
    extract, extract_with_progress, ExtractOptions, ExtractReport, CONTAINER_EXTENSION,
    EXTRACTED_DIR,
};
pub use header::{ArchiveHeader, VariantSignature, HEADER_SIZE, MAGIC};
pub use snapshot::{ArchiveMetadataSnapshot, METADATA_FILE_NAME};
pub use tables::{ArchiveTables, DirectoryMetadataEntry, FileMetadataEntry, OffsetEntry, NO_INDEX};
pub use tree::{build_tree, link_files, ReconstructedDirectory};
