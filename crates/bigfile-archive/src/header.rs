//! Container header parsing.
//!
//! The header is a fixed 68-byte block. Only its counts, the offset table
//! location and the offset table capacity are understood; the metadata
//! tables are never pointed at directly but located by formula from those.

use std::fmt;
use std::str::FromStr;

use bigfile_common::mapping::{read_record, Field, FieldKind, Schema};
use bigfile_common::{ChunkedCache, Endian};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::tables::{METADATA_ENTRY_SIZE, OFFSET_ENTRY_SIZE};
use crate::{Error, Result};

/// Magic literal at the start of every container.
pub const MAGIC: [u8; 4] = *b"BIG\0";

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 68;

const FILE_COUNT: Field = Field::new("fileCount", 8, FieldKind::UInt);
const DIRECTORY_COUNT: Field = Field::new("directoryCount", 12, FieldKind::UInt);
const FILE_COUNT_2: Field = Field::new("fileCount2", 44, FieldKind::UInt);
const DIRECTORY_COUNT_2: Field = Field::new("directoryCount2", 48, FieldKind::UInt);

/// Field layout of the header.
pub const HEADER_SCHEMA: Schema = Schema::new(&[
    Field::str("magic", 0, 4),
    Field::new("formatVersion", 4, FieldKind::UInt),
    FILE_COUNT,
    DIRECTORY_COUNT,
    Field::new("unknown16", 16, FieldKind::UInt),
    Field::new("unknown20", 20, FieldKind::UInt),
    Field::new("unknown24", 24, FieldKind::UInt),
    Field::new("unknown28", 28, FieldKind::UInt),
    Field::new("offsetTableMaxLength", 32, FieldKind::UInt),
    Field::new("unknown36", 36, FieldKind::UInt),
    Field::new("initialKey", 40, FieldKind::UInt),
    FILE_COUNT_2,
    DIRECTORY_COUNT_2,
    Field::new("offsetTableOffset", 52, FieldKind::UInt),
    Field::new("unknown56", 56, FieldKind::UInt),
    Field::new("unknown60", 60, FieldKind::UInt),
    Field::new("offsetTableMaxLengthMinusOne", 64, FieldKind::UInt),
]);

/// Parsed container header plus the derived metadata table offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveHeader {
    pub magic: String,
    pub format_version: u32,
    pub file_count: u32,
    pub directory_count: u32,
    pub unknown16: u32,
    pub unknown20: u32,
    pub unknown24: u32,
    pub unknown28: u32,
    /// Offset table capacity; at least the real file count.
    pub offset_table_max_length: u32,
    pub unknown36: u32,
    pub initial_key: u32,
    pub file_count2: u32,
    pub directory_count2: u32,
    pub offset_table_offset: u32,
    pub unknown56: u32,
    pub unknown60: u32,
    pub offset_table_max_length_minus_one: u32,
    /// `offsetTableOffset + offsetTableMaxLength * 8`
    pub file_metadata_offset: u64,
    /// `fileMetadataOffset + offsetTableMaxLength * 84`
    pub directory_metadata_offset: u64,
}

impl ArchiveHeader {
    /// Decode a header from its raw bytes.
    ///
    /// Fails with [`Error::InvalidMagic`] before looking at any other field.
    pub fn parse(raw: &[u8], endian: Endian) -> Result<Self> {
        if raw.len() < HEADER_SIZE {
            return Err(Error::InvalidFormat(format!(
                "header truncated: {} of {HEADER_SIZE} bytes",
                raw.len()
            )));
        }
        if raw[..4] != MAGIC {
            return Err(Error::InvalidMagic {
                expected: MAGIC,
                actual: raw[..4].to_vec(),
            });
        }

        let record = read_record(raw, &HEADER_SCHEMA, endian)?;
        let u = |name: &str| record.uint(name).map(|v| v as u32);

        let offset_table_offset = u("offsetTableOffset")?;
        let offset_table_max_length = u("offsetTableMaxLength")?;
        let (file_metadata_offset, directory_metadata_offset) =
            derived_offsets(offset_table_offset, offset_table_max_length);

        Ok(Self {
            magic: record.str("magic")?.to_string(),
            format_version: u("formatVersion")?,
            file_count: u("fileCount")?,
            directory_count: u("directoryCount")?,
            unknown16: u("unknown16")?,
            unknown20: u("unknown20")?,
            unknown24: u("unknown24")?,
            unknown28: u("unknown28")?,
            offset_table_max_length,
            unknown36: u("unknown36")?,
            initial_key: u("initialKey")?,
            file_count2: u("fileCount2")?,
            directory_count2: u("directoryCount2")?,
            offset_table_offset,
            unknown56: u("unknown56")?,
            unknown60: u("unknown60")?,
            offset_table_max_length_minus_one: u("offsetTableMaxLengthMinusOne")?,
            file_metadata_offset,
            directory_metadata_offset,
        })
    }

    /// First byte past the directory metadata table.
    #[inline]
    pub fn tables_end(&self) -> u64 {
        self.directory_metadata_offset + u64::from(self.offset_table_max_length) * METADATA_ENTRY_SIZE
    }

    /// Find the first known distribution variant matching this header's file count.
    pub fn classify<'a>(&self, known: &'a [VariantSignature]) -> Option<&'a VariantSignature> {
        known.iter().find(|v| v.file_count == self.file_count)
    }
}

/// Compute `(fileMetadataOffset, directoryMetadataOffset)` from the offset
/// table location and capacity.
#[inline]
pub fn derived_offsets(offset_table_offset: u32, offset_table_max_length: u32) -> (u64, u64) {
    let capacity = u64::from(offset_table_max_length);
    let file_metadata_offset = u64::from(offset_table_offset) + capacity * OFFSET_ENTRY_SIZE;
    let directory_metadata_offset = file_metadata_offset + capacity * METADATA_ENTRY_SIZE;
    (file_metadata_offset, directory_metadata_offset)
}

/// Read and validate the header at the start of the cache.
///
/// Returns the parsed header and its raw bytes.
pub fn read_header(cache: &mut ChunkedCache, endian: Endian) -> Result<(ArchiveHeader, Vec<u8>)> {
    let raw = cache.read_range(0, HEADER_SIZE as u64)?;
    let header = ArchiveHeader::parse(&raw, endian)?;

    if header.file_count != header.file_count2 {
        warn!(
            primary = header.file_count,
            duplicate = header.file_count2,
            "header file counts disagree"
        );
    }
    if header.directory_count != header.directory_count2 {
        warn!(
            primary = header.directory_count,
            duplicate = header.directory_count2,
            "header directory counts disagree"
        );
    }
    if header.offset_table_max_length_minus_one != header.offset_table_max_length.wrapping_sub(1) {
        warn!(
            capacity = header.offset_table_max_length,
            stored = header.offset_table_max_length_minus_one,
            "offset table capacity minus one does not match capacity"
        );
    }

    info!(
        version = header.format_version,
        files = header.file_count,
        directories = header.directory_count,
        capacity = header.offset_table_max_length,
        offset_table = header.offset_table_offset,
        file_metadata = header.file_metadata_offset,
        directory_metadata = header.directory_metadata_offset,
        "parsed header"
    );

    Ok((header, raw))
}

/// Overwrite the file and directory counts (primary and duplicate) in a raw
/// header, leaving every other byte untouched.
pub fn patch_counts(raw: &mut [u8], file_count: u32, directory_count: u32, endian: Endian) -> Result<()> {
    if raw.len() < HEADER_SIZE {
        return Err(Error::InvalidFormat(format!(
            "header truncated: {} of {HEADER_SIZE} bytes",
            raw.len()
        )));
    }

    for (field, value) in [
        (FILE_COUNT, file_count),
        (FILE_COUNT_2, file_count),
        (DIRECTORY_COUNT, directory_count),
        (DIRECTORY_COUNT_2, directory_count),
    ] {
        raw[field.position..field.end()].copy_from_slice(&endian.u32_bytes(value));
    }
    Ok(())
}

/// A known distribution of the container, recognised by its file count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSignature {
    pub name: String,
    pub file_count: u32,
}

impl fmt::Display for VariantSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} files)", self.name, self.file_count)
    }
}

impl FromStr for VariantSignature {
    type Err = String;

    /// Parse `NAME=FILE_COUNT`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (name, count) = s
            .rsplit_once('=')
            .ok_or_else(|| format!("expected NAME=FILE_COUNT, got {s:?}"))?;
        let file_count = count
            .trim()
            .parse()
            .map_err(|e| format!("invalid file count {count:?}: {e}"))?;
        Ok(Self {
            name: name.trim().to_string(),
            file_count,
        })
    }
}
