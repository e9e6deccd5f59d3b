//! The metadata snapshot written next to an extraction.
//!
//! The snapshot holds everything a rebuild needs without re-parsing the
//! original container: the raw and parsed header, all three tables and the
//! reconstructed directory structure.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use bigfile_common::Endian;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::archive::BigArchive;
use crate::header::ArchiveHeader;
use crate::tables::{DirectoryMetadataEntry, FileMetadataEntry, OffsetEntry};
use crate::tree::ReconstructedDirectory;
use crate::{Error, Result};

/// File name of the snapshot inside an extraction directory.
pub const METADATA_FILE_NAME: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadataSnapshot {
    pub include_empty_dirs: bool,
    pub little_endian: bool,
    /// The original 68 header bytes, hex encoded.
    pub raw_header: String,
    pub header: ArchiveHeader,
    /// The offset table to full capacity.
    pub offsets: Vec<OffsetEntry>,
    pub directories: Vec<DirectoryMetadataEntry>,
    pub files: Vec<FileMetadataEntry>,
    pub structures: Vec<ReconstructedDirectory>,
}

impl ArchiveMetadataSnapshot {
    /// Capture the state of an opened archive.
    pub fn capture(
        archive: &BigArchive,
        structures: Vec<ReconstructedDirectory>,
        include_empty_dirs: bool,
    ) -> Self {
        let tables = archive.tables();
        Self {
            include_empty_dirs,
            little_endian: archive.endian().is_little(),
            raw_header: hex::encode(archive.raw_header()),
            header: archive.header().clone(),
            offsets: tables.offsets.clone(),
            directories: tables.directories.clone(),
            files: tables.files[..archive.file_count()].to_vec(),
            structures,
        }
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        Endian::from_little(self.little_endian)
    }

    /// Decode the raw header bytes.
    pub fn raw_header_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.raw_header)
            .map_err(|e| Error::InvalidFormat(format!("raw header is not hex: {e}")))
    }

    /// Load a snapshot from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::MissingMetadata(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Write the snapshot to `path`.
    ///
    /// An existing file is kept unless `overwrite` is set. Returns whether
    /// the snapshot was written.
    pub fn save<P: AsRef<Path>>(&self, path: P, overwrite: bool) -> Result<bool> {
        let path = path.as_ref();
        if path.exists() && !overwrite {
            info!(path = %path.display(), "keeping existing metadata snapshot");
            return Ok(false);
        }

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!(path = %path.display(), "wrote metadata snapshot");
        Ok(true)
    }
}
