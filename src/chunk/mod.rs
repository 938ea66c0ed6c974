//! Generic reader and writer for size-prefixed, four-character-tagged chunk trees.
//!
//! # Layout
//! ```text
//! chunk   := tag:[u8; 4] length:u32le payload:[u8; length]
//! payload := raw primitives | chunk*
//! ```
//!
//! The file itself is treated as a root pseudo-chunk without a header whose
//! length is `file size - 8`. Payloads written by [`ChunkWriter`] are padded
//! with zeros to a multiple of four bytes and the padding is part of the
//! declared length.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

pub mod parser_utils;
mod reader;
mod writer;

pub use reader::{ChunkReader, ChunkStream};
pub use writer::ChunkWriter;

/// Largest declared chunk length accepted by the reader and produced by the writer.
pub const MAX_CHUNK_SIZE: usize = 2_147_483_647 - 8;

/// Size of a chunk header (tag + length).
pub const HEADER_SIZE: usize = 8;

/// A four-character chunk tag such as `HEDR` or `SEGM`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Tag(*bytes)
    }

    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:?})", self.as_str())
    }
}

/// Errors raised while framing or decoding chunks.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chunk '{tag}' at 0x{offset:X} declares {size} bytes (limit {MAX_CHUNK_SIZE})")]
    Overflow { tag: Tag, offset: usize, size: usize },
    #[error("truncated {what} in chunk '{tag}' at 0x{offset:X}: {detail}")]
    Truncated {
        tag: Tag,
        offset: usize,
        what: &'static str,
        detail: String,
    },
}
