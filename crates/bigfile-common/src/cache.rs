//! Chunked random-access cache over large files or in-memory blocks.
//!
//! Archives can reach several gigabytes, so the cache keeps exactly one
//! chunk resident and pages chunks in while serving byte ranges. A range
//! that crosses chunk boundaries is served one chunk swap at a time, so no
//! more than one chunk (plus the caller's output) is ever held in memory.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::pointer::PointerTranslator;
use crate::{Error, Result};

/// Default chunk size for file-backed caches (512 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 512 * 1024 * 1024;

enum Backing {
    File { file: File, path: PathBuf },
    Blocks(Vec<Bytes>),
}

/// A single-chunk-resident cache serving arbitrary byte ranges.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use bigfile_common::ChunkedCache;
///
/// let blocks = vec![Bytes::from_static(b"hello "), Bytes::from_static(b"world")];
/// let mut cache = ChunkedCache::open_buffer(blocks, 4)?;
///
/// assert_eq!(cache.read_range(4, 4)?, b"o wo");
/// assert!(cache.read_range(11, 1)?.is_empty());
/// # Ok::<(), bigfile_common::Error>(())
/// ```
pub struct ChunkedCache {
    backing: Backing,
    translator: PointerTranslator,
    len: u64,
    chunk: Vec<u8>,
    chunk_index: u64,
    loads: u64,
}

impl ChunkedCache {
    /// Open a file and load its first chunk.
    pub fn open<P: AsRef<Path>>(path: P, chunk_size: u64) -> Result<Self> {
        let translator = translator(chunk_size)?;
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        let mut cache = Self {
            backing: Backing::File {
                file,
                path: path.to_path_buf(),
            },
            translator,
            len,
            chunk: Vec::new(),
            chunk_index: 0,
            loads: 0,
        };
        cache.load_chunk(0)?;
        Ok(cache)
    }

    /// Serve reads from pre-supplied blocks treated as one contiguous stream.
    pub fn open_buffer(blocks: Vec<Bytes>, chunk_size: u64) -> Result<Self> {
        let translator = translator(chunk_size)?;
        let len = blocks.iter().map(|b| b.len() as u64).sum();

        let mut cache = Self {
            backing: Backing::Blocks(blocks),
            translator,
            len,
            chunk: Vec::new(),
            chunk_index: 0,
            loads: 0,
        };
        cache.load_chunk(0)?;
        Ok(cache)
    }

    /// Point the cache at another file, resetting it to chunk 0.
    ///
    /// The chunk size is kept.
    pub fn repoint<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path)?;
        self.len = file.metadata()?.len();
        self.backing = Backing::File {
            file,
            path: path.to_path_buf(),
        };
        self.load_chunk(0)
    }

    /// Total length of the backing stream in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the backing stream is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Configured chunk size in bytes.
    #[inline]
    pub fn chunk_size(&self) -> u64 {
        self.translator.chunk_size()
    }

    /// Index of the resident chunk.
    #[inline]
    pub fn resident_chunk(&self) -> u64 {
        self.chunk_index
    }

    /// Number of chunk loads performed so far, including the initial one.
    #[inline]
    pub fn chunk_loads(&self) -> u64 {
        self.loads
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File { path, .. } => Some(path),
            Backing::Blocks(_) => None,
        }
    }

    /// Read `length` bytes starting at `offset`.
    ///
    /// A range reaching past the end of the stream is cut short; a range
    /// starting at or past the end yields an empty vector.
    pub fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let available = self.len.saturating_sub(offset).min(length);
        let mut out = Vec::with_capacity(available as usize);
        self.for_each_slice(offset, length, |slice| {
            out.extend_from_slice(slice);
            Ok(())
        })?;
        Ok(out)
    }

    /// Stream `length` bytes starting at `offset` into `writer`.
    ///
    /// Returns the number of bytes written, which is short if the range
    /// reaches past the end of the stream.
    pub fn copy_range_to<W: Write>(
        &mut self,
        offset: u64,
        length: u64,
        writer: &mut W,
    ) -> Result<u64> {
        let mut written = 0u64;
        self.for_each_slice(offset, length, |slice| {
            writer.write_all(slice)?;
            written += slice.len() as u64;
            Ok(())
        })?;
        Ok(written)
    }

    /// Release the backing file handle.
    pub fn close(self) {
        if let Some(path) = self.path() {
            debug!(path = %path.display(), loads = self.loads, "closing chunked cache");
        }
    }

    fn for_each_slice<F>(&mut self, offset: u64, length: u64, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        if offset >= self.len {
            return Ok(());
        }
        let end = offset.saturating_add(length).min(self.len);

        let mut current = offset;
        while current < end {
            let ptr = self.translator.decompose(current);
            if ptr.chunk != self.chunk_index {
                self.load_chunk(ptr.chunk)?;
            }

            let start = ptr.offset as usize;
            let in_chunk = self.chunk.len().saturating_sub(start) as u64;
            if in_chunk == 0 {
                // Backing stream shrank underneath us.
                break;
            }
            let take = in_chunk.min(end - current) as usize;
            visit(&self.chunk[start..start + take])?;
            current += take as u64;
        }
        Ok(())
    }

    fn load_chunk(&mut self, index: u64) -> Result<()> {
        let start = self.translator.chunk_start(index);
        let end = start.saturating_add(self.translator.chunk_size()).min(self.len);
        let size = end.saturating_sub(start) as usize;

        self.chunk.clear();
        self.chunk.resize(size, 0);

        match &mut self.backing {
            Backing::File { file, .. } => {
                file.seek(SeekFrom::Start(start))?;
                file.read_exact(&mut self.chunk)?;
            }
            Backing::Blocks(blocks) => copy_from_blocks(blocks, start, &mut self.chunk),
        }

        self.chunk_index = index;
        self.loads += 1;
        debug!(chunk = index, start, size, "loaded chunk");
        Ok(())
    }
}

impl std::fmt::Debug for ChunkedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedCache")
            .field("path", &self.path())
            .field("len", &self.len)
            .field("chunk_size", &self.chunk_size())
            .field("resident_chunk", &self.chunk_index)
            .finish()
    }
}

fn translator(chunk_size: u64) -> Result<PointerTranslator> {
    NonZeroU64::new(chunk_size)
        .map(PointerTranslator::new)
        .ok_or(Error::InvalidChunkSize(chunk_size))
}

/// Fill `out` with the bytes of the concatenated `blocks` starting at `start`.
fn copy_from_blocks(blocks: &[Bytes], start: u64, out: &mut [u8]) {
    let end = start + out.len() as u64;
    let mut base = 0u64;

    for block in blocks {
        let block_end = base + block.len() as u64;
        if block_end > start && base < end {
            let from = start.max(base);
            let to = end.min(block_end);
            let src = &block[(from - base) as usize..(to - base) as usize];
            let dst = (from - start) as usize;
            out[dst..dst + src.len()].copy_from_slice(src);
        }
        if block_end >= end {
            break;
        }
        base = block_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn temp_file(data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_within_chunk() {
        let data = pattern(100);
        let file = temp_file(&data);
        let mut cache = ChunkedCache::open(file.path(), 64).unwrap();

        assert_eq!(cache.len(), 100);
        assert_eq!(cache.read_range(10, 20).unwrap(), &data[10..30]);
        assert_eq!(cache.chunk_loads(), 1);
    }

    #[test]
    fn test_read_across_chunks() {
        let data = pattern(1000);
        let file = temp_file(&data);
        let mut cache = ChunkedCache::open(file.path(), 16).unwrap();

        let got = cache.read_range(5, 900).unwrap();
        assert_eq!(got, &data[5..905]);
        assert!(cache.chunk_loads() > 50);
        assert_eq!(cache.resident_chunk(), 904 / 16);
    }

    #[test]
    fn test_read_past_end() {
        let data = pattern(50);
        let file = temp_file(&data);
        let mut cache = ChunkedCache::open(file.path(), 16).unwrap();

        assert!(cache.read_range(50, 4).unwrap().is_empty());
        assert!(cache.read_range(500, 4).unwrap().is_empty());
        assert_eq!(cache.read_range(46, 10).unwrap(), &data[46..]);
    }

    #[test]
    fn test_empty_file() {
        let file = temp_file(&[]);
        let mut cache = ChunkedCache::open(file.path(), 16).unwrap();

        assert!(cache.is_empty());
        assert!(cache.read_range(0, 4).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ChunkedCache::open(dir.path().join("missing.bf"), 16);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let result = ChunkedCache::open_buffer(vec![Bytes::from_static(b"abc")], 0);
        assert!(matches!(result, Err(Error::InvalidChunkSize(0))));
    }

    #[test]
    fn test_buffer_mode_across_blocks() {
        let blocks = vec![
            Bytes::from_static(b"abc"),
            Bytes::new(),
            Bytes::from_static(b"defgh"),
            Bytes::from_static(b"ij"),
        ];
        let mut cache = ChunkedCache::open_buffer(blocks, 4).unwrap();

        assert_eq!(cache.len(), 10);
        assert!(cache.path().is_none());
        assert_eq!(cache.read_range(0, 10).unwrap(), b"abcdefghij");
        assert_eq!(cache.read_range(2, 6).unwrap(), b"cdefgh");
        assert_eq!(cache.read_range(9, 5).unwrap(), b"j");
    }

    #[test]
    fn test_copy_range_to_writer() {
        let data = pattern(300);
        let file = temp_file(&data);
        let mut cache = ChunkedCache::open(file.path(), 32).unwrap();

        let mut out = Vec::new();
        let written = cache.copy_range_to(100, 150, &mut out).unwrap();
        assert_eq!(written, 150);
        assert_eq!(out, &data[100..250]);
    }

    #[test]
    fn test_repoint_resets_state() {
        let first = temp_file(&pattern(100));
        let second_data = b"second file".to_vec();
        let second = temp_file(&second_data);

        let mut cache = ChunkedCache::open(first.path(), 8).unwrap();
        cache.read_range(90, 5).unwrap();
        assert_ne!(cache.resident_chunk(), 0);

        cache.repoint(second.path()).unwrap();
        assert_eq!(cache.len(), second_data.len() as u64);
        assert_eq!(cache.resident_chunk(), 0);
        assert_eq!(cache.path(), Some(second.path()));
        assert_eq!(cache.read_range(0, 100).unwrap(), second_data);
    }

    proptest! {
        #[test]
        fn prop_range_fidelity(
            len in 1usize..2048,
            chunk in 1u64..128,
            offset in 0u64..2100,
            length in 0u64..2100,
        ) {
            let data = pattern(len);
            let file = temp_file(&data);
            let mut cache = ChunkedCache::open(file.path(), chunk).unwrap();

            let first = cache.read_range(offset, length).unwrap();
            let second = cache.read_range(offset, length).unwrap();

            let start = (offset as usize).min(len);
            let end = (offset.saturating_add(length) as usize).min(len);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(&first[..], &data[start..end]);
        }
    }
}
