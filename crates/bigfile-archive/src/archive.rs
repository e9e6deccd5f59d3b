//! An opened archive: header, tables and the file/directory join.

use std::io::Write;
use std::path::Path;

use bigfile_common::{ChunkedCache, Endian};
use tracing::{info, warn};

use crate::header::{read_header, ArchiveHeader};
use crate::tables::{read_tables, ArchiveTables};
use crate::tree::{build_tree, link_files, ReconstructedDirectory};
use crate::{Error, Result};

/// A file joined from its offset slot, metadata row and owning directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconstructedFile {
    pub index: usize,
    pub name: String,
    pub size: u32,
    /// Offset of the 4-byte size prefix.
    pub data_offset: u32,
    /// Offset of the first payload byte (`data_offset + 4`).
    pub payload_offset: u64,
    pub key: u32,
    pub unix_timestamp: u32,
    pub directory_index: usize,
    pub directory_name: String,
    pub directory_path: String,
    /// File contents, when requested.
    pub data: Option<Vec<u8>>,
}

impl ReconstructedFile {
    /// Full `/`-separated path of the file.
    pub fn path(&self) -> String {
        format!("{}{}", self.directory_path, self.name)
    }
}

/// A Big File archive opened through a [`ChunkedCache`].
///
/// The header and all three tables are read eagerly; file contents are
/// fetched on demand so that only one chunk is resident at a time.
pub struct BigArchive {
    cache: ChunkedCache,
    endian: Endian,
    header: ArchiveHeader,
    raw_header: Vec<u8>,
    tables: ArchiveTables,
}

impl BigArchive {
    /// Open an archive file.
    pub fn open<P: AsRef<Path>>(path: P, endian: Endian, chunk_size: u64) -> Result<Self> {
        let cache = ChunkedCache::open(path, chunk_size)?;
        Self::from_cache(cache, endian)
    }

    /// Parse an archive from an already opened cache.
    pub fn from_cache(mut cache: ChunkedCache, endian: Endian) -> Result<Self> {
        let (header, raw_header) = read_header(&mut cache, endian)?;
        let tables = read_tables(&mut cache, &header, endian)?;

        info!(
            offsets = tables.offsets.len(),
            files = tables.files.len(),
            directories = tables.directories.len(),
            "read archive tables"
        );

        Ok(Self {
            cache,
            endian,
            header,
            raw_header,
            tables,
        })
    }

    #[inline]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    #[inline]
    pub fn raw_header(&self) -> &[u8] {
        &self.raw_header
    }

    #[inline]
    pub fn tables(&self) -> &ArchiveTables {
        &self.tables
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Number of files that have both a metadata row and an offset slot.
    #[inline]
    pub fn file_count(&self) -> usize {
        self.tables.files.len().min(self.tables.offsets.len())
    }

    /// Build the directory tree rooted at `root` and link every file into it.
    pub fn directory_tree(&self, root: &str) -> Result<Vec<ReconstructedDirectory>> {
        let mut tree = build_tree(&self.tables.directories, root)?;
        link_files(&mut tree, &self.tables.files[..self.file_count()])?;
        Ok(tree)
    }

    /// Join offsets, file metadata and directories into one record per file.
    pub fn reconstruct_files(&self, tree: &[ReconstructedDirectory]) -> Result<Vec<ReconstructedFile>> {
        self.tables
            .offsets
            .iter()
            .zip(&self.tables.files)
            .enumerate()
            .map(|(index, (offset, meta))| {
                let directory_index = usize::try_from(meta.directory_index)
                    .ok()
                    .filter(|&d| d < tree.len())
                    .ok_or_else(|| {
                        Error::CorruptArchive(format!(
                            "file {index} references directory {}",
                            meta.directory_index
                        ))
                    })?;
                let dir = &tree[directory_index];

                Ok(ReconstructedFile {
                    index,
                    name: meta.filename.clone(),
                    size: meta.file_size,
                    data_offset: offset.data_offset,
                    payload_offset: offset.payload_offset(),
                    key: offset.key,
                    unix_timestamp: meta.unix_timestamp,
                    directory_index,
                    directory_name: dir.name.clone(),
                    directory_path: dir.path.clone(),
                    data: None,
                })
            })
            .collect()
    }

    /// Read a file's payload.
    ///
    /// The stored size prefix is checked against the metadata size; a
    /// mismatch is logged and the metadata size wins.
    pub fn read_file(&mut self, file: &ReconstructedFile) -> Result<Vec<u8>> {
        let mut data = self
            .cache
            .read_range(u64::from(file.data_offset), 4 + u64::from(file.size))?;
        if data.len() < 4 + file.size as usize {
            return Err(Error::CorruptArchive(format!(
                "file {} ({}) truncated: {} of {} bytes at offset {}",
                file.index,
                file.name,
                data.len().saturating_sub(4),
                file.size,
                file.payload_offset
            )));
        }

        let prefix = self.endian.read_uint(&data[..4], 4) as u32;
        if prefix != file.size {
            warn!(
                file = %file.path(),
                prefix,
                size = file.size,
                "size prefix disagrees with file metadata"
            );
        }

        data.drain(..4);
        Ok(data)
    }

    /// Fill `file.data` with its payload.
    pub fn load_file(&mut self, file: &mut ReconstructedFile) -> Result<()> {
        file.data = Some(self.read_file(file)?);
        Ok(())
    }

    /// Stream `length` raw bytes from `offset` into `writer`.
    pub fn copy_range_to<W: Write>(&mut self, offset: u64, length: u64, writer: &mut W) -> Result<u64> {
        Ok(self.cache.copy_range_to(offset, length, writer)?)
    }

    /// Release the underlying file handle.
    pub fn close(self) {
        self.cache.close();
    }
}

impl std::fmt::Debug for BigArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigArchive")
            .field("endian", &self.endian)
            .field("files", &self.tables.files.len())
            .field("directories", &self.tables.directories.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{FixtureArchive, FixtureDir, FixtureFile};
    use bigfile_common::Bytes;

    fn open(bytes: Vec<u8>, endian: Endian, chunk: u64) -> BigArchive {
        let cache = ChunkedCache::open_buffer(vec![Bytes::from(bytes)], chunk).unwrap();
        BigArchive::from_cache(cache, endian).unwrap()
    }

    fn sample(endian: Endian) -> Vec<u8> {
        FixtureArchive::new(endian)
            .capacity(4)
            .dir(FixtureDir::root("root"))
            .dir(FixtureDir::new("Bin", 0))
            .dir(FixtureDir::new("Sound", 1))
            .file(FixtureFile::new(2, "jump.wav", b"RIFF....WAVE"))
            .file(FixtureFile::new(0, "readme.txt", b"hi"))
            .build()
    }

    #[test]
    fn test_reconstruct_and_read() {
        let mut archive = open(sample(Endian::Little), Endian::Little, 32);
        let tree = archive.directory_tree("root").unwrap();
        let files = archive.reconstruct_files(&tree).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path(), "root/Bin/Sound/jump.wav");
        assert_eq!(files[0].payload_offset, u64::from(files[0].data_offset) + 4);
        assert_eq!(files[1].path(), "root/readme.txt");
        assert_eq!(tree[2].file_indexes, vec![0]);

        let mut file = files[0].clone();
        archive.load_file(&mut file).unwrap();
        assert_eq!(file.data.as_deref(), Some(&b"RIFF....WAVE"[..]));
        assert_eq!(archive.read_file(&files[1]).unwrap(), b"hi");
    }

    #[test]
    fn test_big_endian_archive() {
        let mut archive = open(sample(Endian::Big), Endian::Big, 7);
        let tree = archive.directory_tree("").unwrap();
        let files = archive.reconstruct_files(&tree).unwrap();

        assert_eq!(files[0].path(), "Bin/Sound/jump.wav");
        assert_eq!(archive.read_file(&files[0]).unwrap(), b"RIFF....WAVE");
    }

    #[test]
    fn test_truncated_payload() {
        let mut bytes = sample(Endian::Little);
        bytes.truncate(bytes.len() - 1);
        let mut archive = open(bytes, Endian::Little, 32);
        let tree = archive.directory_tree("").unwrap();
        let files = archive.reconstruct_files(&tree).unwrap();

        assert!(matches!(
            archive.read_file(&files[1]),
            Err(Error::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_bad_magic_stops_before_tables() {
        let mut bytes = sample(Endian::Little);
        bytes[0] = b'X';
        let cache = ChunkedCache::open_buffer(vec![Bytes::from(bytes)], 32).unwrap();

        let err = BigArchive::from_cache(cache, Endian::Little).unwrap_err();
        assert!(matches!(err, Error::InvalidMagic { .. }));
    }
}
