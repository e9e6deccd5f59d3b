//! Offset table and metadata tables.
//!
//! All three tables are fixed-stride arrays. The offset table is read to its
//! full capacity; the metadata tables are read to the header's counts,
//! clamped to the offset table length when the header overstates them.

use bigfile_common::mapping::{self, read_table, Field, Record, Schema, Value};
use bigfile_common::{ChunkedCache, Endian};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::header::ArchiveHeader;
use crate::Result;

/// Width of the null-padded name fields.
pub const NAME_LENGTH: usize = 64;

/// Index value meaning "no entry".
pub const NO_INDEX: i32 = -1;

pub const OFFSET_SCHEMA: Schema = Schema::new(&[
    Field::uint("dataOffset", 0, 4),
    Field::uint("key", 4, 4),
]);

pub const FILE_METADATA_SCHEMA: Schema = Schema::new(&[
    Field::uint("fileSize", 0, 4),
    Field::int("nextIndex", 4, 4),
    Field::int("previousIndex", 8, 4),
    Field::int("directoryIndex", 12, 4),
    Field::uint("unixTimestamp", 16, 4),
    Field::str("filename", 20, NAME_LENGTH),
]);

pub const DIRECTORY_METADATA_SCHEMA: Schema = Schema::new(&[
    Field::int("firstFileIndex", 0, 4),
    Field::int("firstSubdirIndex", 4, 4),
    Field::int("nextIndex", 8, 4),
    Field::int("previousIndex", 12, 4),
    Field::int("parentIndex", 16, 4),
    Field::str("dirname", 20, NAME_LENGTH),
]);

/// Stride of an offset table row.
pub const OFFSET_ENTRY_SIZE: u64 = OFFSET_SCHEMA.byte_len() as u64;

/// Stride of a file or directory metadata row.
pub const METADATA_ENTRY_SIZE: u64 = FILE_METADATA_SCHEMA.byte_len() as u64;

/// A typed row of one of the archive tables.
pub trait TableEntry: Sized {
    /// Table name used in log messages.
    const TABLE: &'static str;
    const SCHEMA: Schema;

    fn from_record(record: &Record) -> Result<Self>;
    fn to_record(&self) -> Record;
}

/// One offset table slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetEntry {
    /// Points at the 4-byte size prefix that precedes the file bytes.
    pub data_offset: u32,
    pub key: u32,
}

impl OffsetEntry {
    /// Offset of the first payload byte, past the size prefix.
    #[inline]
    pub fn payload_offset(&self) -> u64 {
        u64::from(self.data_offset) + 4
    }
}

impl TableEntry for OffsetEntry {
    const TABLE: &'static str = "offset";
    const SCHEMA: Schema = OFFSET_SCHEMA;

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            data_offset: record.uint("dataOffset")? as u32,
            key: record.uint("key")? as u32,
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("dataOffset", Value::UInt(self.data_offset.into()))
            .with("key", Value::UInt(self.key.into()))
    }
}

/// One file metadata row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadataEntry {
    pub file_size: u32,
    pub next_index: i32,
    pub previous_index: i32,
    pub directory_index: i32,
    pub unix_timestamp: u32,
    pub filename: String,
}

impl TableEntry for FileMetadataEntry {
    const TABLE: &'static str = "file metadata";
    const SCHEMA: Schema = FILE_METADATA_SCHEMA;

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            file_size: record.uint("fileSize")? as u32,
            next_index: record.int("nextIndex")? as i32,
            previous_index: record.int("previousIndex")? as i32,
            directory_index: record.int("directoryIndex")? as i32,
            unix_timestamp: record.uint("unixTimestamp")? as u32,
            filename: record.str("filename")?.to_string(),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("fileSize", Value::UInt(self.file_size.into()))
            .with("nextIndex", Value::Int(self.next_index.into()))
            .with("previousIndex", Value::Int(self.previous_index.into()))
            .with("directoryIndex", Value::Int(self.directory_index.into()))
            .with("unixTimestamp", Value::UInt(self.unix_timestamp.into()))
            .with("filename", Value::Str(self.filename.clone()))
    }
}

/// One directory metadata row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryMetadataEntry {
    pub first_file_index: i32,
    pub first_subdir_index: i32,
    pub next_index: i32,
    pub previous_index: i32,
    /// [`NO_INDEX`] for the root.
    pub parent_index: i32,
    pub dirname: String,
}

impl DirectoryMetadataEntry {
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent_index == NO_INDEX
    }
}

impl TableEntry for DirectoryMetadataEntry {
    const TABLE: &'static str = "directory metadata";
    const SCHEMA: Schema = DIRECTORY_METADATA_SCHEMA;

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            first_file_index: record.int("firstFileIndex")? as i32,
            first_subdir_index: record.int("firstSubdirIndex")? as i32,
            next_index: record.int("nextIndex")? as i32,
            previous_index: record.int("previousIndex")? as i32,
            parent_index: record.int("parentIndex")? as i32,
            dirname: record.str("dirname")?.to_string(),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("firstFileIndex", Value::Int(self.first_file_index.into()))
            .with("firstSubdirIndex", Value::Int(self.first_subdir_index.into()))
            .with("nextIndex", Value::Int(self.next_index.into()))
            .with("previousIndex", Value::Int(self.previous_index.into()))
            .with("parentIndex", Value::Int(self.parent_index.into()))
            .with("dirname", Value::Str(self.dirname.clone()))
    }
}

/// The three tables of one archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveTables {
    /// Full capacity, including unused slots.
    pub offsets: Vec<OffsetEntry>,
    pub files: Vec<FileMetadataEntry>,
    pub directories: Vec<DirectoryMetadataEntry>,
}

/// Read `count` rows of `T` starting at `offset`.
///
/// A table cut short by the end of the archive yields fewer rows.
pub fn read_entries<T: TableEntry>(
    cache: &mut ChunkedCache,
    offset: u64,
    count: usize,
    endian: Endian,
) -> Result<Vec<T>> {
    let stride = T::SCHEMA.byte_len();
    let bytes = cache.read_range(offset, (stride * count) as u64)?;

    let rows = bytes.len() / stride;
    if rows < count {
        warn!(
            table = T::TABLE,
            expected = count,
            available = rows,
            "table truncated by end of archive"
        );
    }

    let entries = read_table(&bytes, &T::SCHEMA, stride, endian)?
        .iter()
        .map(T::from_record)
        .collect::<Result<Vec<_>>>()?;
    debug!(table = T::TABLE, offset, rows = entries.len(), "read table");
    Ok(entries)
}

/// Encode `entries` into a table of `capacity` rows; unused rows are zero.
pub fn encode_entries<T: TableEntry>(
    entries: &[T],
    capacity: usize,
    endian: Endian,
) -> Result<Vec<u8>> {
    let records: Vec<Record> = entries.iter().map(T::to_record).collect();
    let stride = T::SCHEMA.byte_len();
    Ok(mapping::encode_table(&records, &T::SCHEMA, stride, capacity, endian)?)
}

/// Read the offset table to the header's capacity.
pub fn read_offset_table(
    cache: &mut ChunkedCache,
    header: &ArchiveHeader,
    endian: Endian,
) -> Result<Vec<OffsetEntry>> {
    read_entries(
        cache,
        u64::from(header.offset_table_offset),
        header.offset_table_max_length as usize,
        endian,
    )
}

/// Read the file metadata table, at most `offset_rows` rows.
pub fn read_file_table(
    cache: &mut ChunkedCache,
    header: &ArchiveHeader,
    offset_rows: usize,
    endian: Endian,
) -> Result<Vec<FileMetadataEntry>> {
    let count = clamp_count(FileMetadataEntry::TABLE, header.file_count, offset_rows);
    read_entries(cache, header.file_metadata_offset, count, endian)
}

/// Read the directory metadata table, at most `offset_rows` rows.
pub fn read_directory_table(
    cache: &mut ChunkedCache,
    header: &ArchiveHeader,
    offset_rows: usize,
    endian: Endian,
) -> Result<Vec<DirectoryMetadataEntry>> {
    let count = clamp_count(
        DirectoryMetadataEntry::TABLE,
        header.directory_count,
        offset_rows,
    );
    read_entries(cache, header.directory_metadata_offset, count, endian)
}

/// Read all three tables.
pub fn read_tables(
    cache: &mut ChunkedCache,
    header: &ArchiveHeader,
    endian: Endian,
) -> Result<ArchiveTables> {
    let offsets = read_offset_table(cache, header, endian)?;
    let files = read_file_table(cache, header, offsets.len(), endian)?;
    let directories = read_directory_table(cache, header, offsets.len(), endian)?;

    Ok(ArchiveTables {
        offsets,
        files,
        directories,
    })
}

fn clamp_count(table: &'static str, claimed: u32, limit: usize) -> usize {
    let claimed = claimed as usize;
    if claimed > limit {
        warn!(
            table,
            claimed, limit, "header count exceeds offset table length, clamping"
        );
        limit
    } else {
        claimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{FixtureArchive, FixtureDir, FixtureFile};
    use crate::header::read_header;
    use bigfile_common::Bytes;

    fn cache_for(bytes: Vec<u8>) -> ChunkedCache {
        ChunkedCache::open_buffer(vec![Bytes::from(bytes)], 64).unwrap()
    }

    fn sample(endian: Endian) -> FixtureArchive {
        FixtureArchive::new(endian)
            .capacity(6)
            .dir(FixtureDir::root("root"))
            .dir(FixtureDir::new("Bin", 0))
            .file(FixtureFile::new(1, "a.txt", b"hello"))
            .file(FixtureFile::new(0, "b.txt", b"world!"))
    }

    #[test]
    fn test_entry_strides() {
        assert_eq!(OFFSET_ENTRY_SIZE, 8);
        assert_eq!(METADATA_ENTRY_SIZE, 84);
        assert_eq!(DIRECTORY_METADATA_SCHEMA.byte_len(), 84);
    }

    #[test]
    fn test_read_tables() {
        for endian in [Endian::Little, Endian::Big] {
            let mut cache = cache_for(sample(endian).build());
            let (header, _) = read_header(&mut cache, endian).unwrap();
            let tables = read_tables(&mut cache, &header, endian).unwrap();

            assert_eq!(tables.offsets.len(), 6);
            assert_eq!(tables.offsets[2], OffsetEntry::default());
            assert_eq!(tables.files.len(), 2);
            assert_eq!(tables.files[0].filename, "a.txt");
            assert_eq!(tables.files[0].file_size, 5);
            assert_eq!(tables.files[1].directory_index, 0);
            assert_eq!(tables.directories.len(), 2);
            assert!(tables.directories[0].is_root());
            assert_eq!(tables.directories[1].dirname, "Bin");
            assert_eq!(tables.directories[1].parent_index, 0);

            let payload = cache
                .read_range(tables.offsets[1].payload_offset(), 6)
                .unwrap();
            assert_eq!(payload, b"world!");
        }
    }

    #[test]
    fn test_overstated_file_count_is_clamped() {
        let mut bytes = sample(Endian::Little).build();
        // fileCount @8 claims more files than the offset table can hold.
        bytes[8..12].copy_from_slice(&100u32.to_le_bytes());

        let mut cache = cache_for(bytes);
        let (header, _) = read_header(&mut cache, Endian::Little).unwrap();
        let tables = read_tables(&mut cache, &header, Endian::Little).unwrap();

        assert_eq!(header.file_count, 100);
        assert_eq!(tables.files.len(), 6);
    }

    #[test]
    fn test_truncated_table_yields_fewer_rows() {
        let bytes = sample(Endian::Little).build();
        let mut cache = cache_for(bytes[..68 + 8 * 3 + 4].to_vec());
        let (header, _) = read_header(&mut cache, Endian::Little).unwrap();

        let offsets = read_offset_table(&mut cache, &header, Endian::Little).unwrap();
        assert_eq!(offsets.len(), 3);
    }

    #[test]
    fn test_encode_entries_matches_original_bytes() {
        let bytes = sample(Endian::Big).build();
        let mut cache = cache_for(bytes.clone());
        let (header, _) = read_header(&mut cache, Endian::Big).unwrap();
        let tables = read_tables(&mut cache, &header, Endian::Big).unwrap();

        let start = header.directory_metadata_offset as usize;
        let encoded = encode_entries(&tables.directories, 6, Endian::Big).unwrap();
        assert_eq!(encoded, &bytes[start..start + 6 * 84]);
    }
}
