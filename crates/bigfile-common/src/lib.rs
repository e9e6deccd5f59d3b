//! Common utilities for bigfile.
//!
//! This crate provides the low-level primitives the archive engine is built on:
//!
//! - [`PointerTranslator`] - Absolute offset <-> (chunk, offset) arithmetic
//! - [`ChunkedCache`] - Bounded-memory random access over huge files or in-memory blocks
//! - [`BinaryReader`] - Endian-aware reading from byte slices
//! - [`mapping`] - Declarative schemas turning raw bytes into typed records

mod cache;
mod error;
mod pointer;
mod reader;

pub mod mapping;

pub use cache::{ChunkedCache, DEFAULT_CHUNK_SIZE};
pub use error::{Error, Result};
pub use mapping::{Field, FieldKind, Record, Schema, Value};
pub use pointer::{ChunkPointer, PointerTranslator};
pub use reader::{decode_fixed_str, BinaryReader, Endian};

/// Re-export bytes for buffer-mode callers.
pub use bytes::Bytes;
