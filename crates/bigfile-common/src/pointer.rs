//! Absolute pointer <-> chunk-relative pointer translation.

use std::num::NonZeroU64;

/// A position expressed relative to a fixed-size chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkPointer {
    /// Index of the chunk holding the byte.
    pub chunk: u64,
    /// Offset of the byte within that chunk.
    pub offset: u64,
}

/// Converts absolute byte offsets into `(chunk, offset)` pairs and back.
///
/// # Example
///
/// ```
/// use std::num::NonZeroU64;
/// use bigfile_common::PointerTranslator;
///
/// let translator = PointerTranslator::new(NonZeroU64::new(16).unwrap());
/// let ptr = translator.decompose(37);
/// assert_eq!((ptr.chunk, ptr.offset), (2, 5));
/// assert_eq!(translator.compose(ptr), 37);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerTranslator {
    chunk_size: NonZeroU64,
}

impl PointerTranslator {
    /// Create a translator for the given chunk size.
    #[inline]
    pub const fn new(chunk_size: NonZeroU64) -> Self {
        Self { chunk_size }
    }

    /// The chunk size in bytes.
    #[inline]
    pub const fn chunk_size(&self) -> u64 {
        self.chunk_size.get()
    }

    /// Split an absolute pointer into chunk index and in-chunk offset.
    #[inline]
    pub const fn decompose(&self, ptr: u64) -> ChunkPointer {
        let size = self.chunk_size.get();
        ChunkPointer {
            chunk: ptr / size,
            offset: ptr % size,
        }
    }

    /// Rebuild the absolute pointer from a chunk-relative one.
    #[inline]
    pub const fn compose(&self, ptr: ChunkPointer) -> u64 {
        ptr.chunk * self.chunk_size.get() + ptr.offset
    }

    /// Absolute offset of the first byte of `chunk`.
    #[inline]
    pub const fn chunk_start(&self, chunk: u64) -> u64 {
        chunk * self.chunk_size.get()
    }
}
