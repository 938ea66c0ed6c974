use std::cell::Cell;

use glam::{Quat, Vec2, Vec3};
use tracing::trace;
use winnow::Parser;
use winnow::binary::{le_f32, le_i8, le_i16, le_i32, le_u8, le_u16, le_u32};
use winnow::combinator::repeat;

use super::parser_utils::{
    WResult, parse_chunk_header, parse_null_terminated_string, parse_quat, parse_vec2, parse_vec3,
};
use super::{ChunkError, HEADER_SIZE, MAX_CHUNK_SIZE, Tag};

/// Tag reported for the headerless root pseudo-chunk.
const ROOT_TAG: Tag = Tag::new(b"FILE");

/// An in-memory byte buffer with a single shared cursor.
///
/// Every [`ChunkReader`] opened on the stream moves the same cursor. Readers
/// nest by mutable borrow, so only the innermost scope can read at a time.
pub struct ChunkStream<'a> {
    data: &'a [u8],
    cursor: Cell<usize>,
}

impl<'a> ChunkStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            cursor: Cell::new(0),
        }
    }

    /// Open the root pseudo-chunk spanning the whole buffer.
    pub fn root(&self) -> Result<ChunkReader<'a, '_>, ChunkError> {
        let len = self.data.len();
        if len.saturating_sub(HEADER_SIZE) > MAX_CHUNK_SIZE {
            return Err(ChunkError::Overflow {
                tag: ROOT_TAG,
                offset: 0,
                size: len - HEADER_SIZE,
            });
        }
        self.cursor.set(0);
        Ok(ChunkReader {
            stream: self,
            tag: ROOT_TAG,
            start: 0,
            payload_start: 0,
            end: len,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A scoped view over one chunk.
///
/// Dropping the reader moves the stream cursor to the end of the chunk no
/// matter how much of the payload was consumed, so a parent always resumes
/// at the next sibling even after a partial or over-long read of a child.
pub struct ChunkReader<'a, 's> {
    stream: &'s ChunkStream<'a>,
    tag: Tag,
    start: usize,
    payload_start: usize,
    end: usize,
}

impl<'a, 's> ChunkReader<'a, 's> {
    fn enter(
        stream: &'s ChunkStream<'a>,
        tag: Tag,
        start: usize,
        size: u32,
    ) -> Result<Self, ChunkError> {
        let size = size as usize;
        if size > MAX_CHUNK_SIZE {
            return Err(ChunkError::Overflow {
                tag,
                offset: start,
                size,
            });
        }
        let end = start + size + HEADER_SIZE;
        trace!("begin {tag} of size {size} at 0x{start:X}");
        Ok(Self {
            stream,
            tag,
            start,
            payload_start: start + HEADER_SIZE,
            end,
        })
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Offset of the chunk header (0 for the root).
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Declared payload length. The root reports `file size - 8`.
    pub fn size(&self) -> usize {
        (self.end - self.start).saturating_sub(HEADER_SIZE)
    }

    pub fn position(&self) -> usize {
        self.stream.cursor.get()
    }

    pub fn bytes_remaining(&self) -> usize {
        self.end.saturating_sub(self.position())
    }

    /// True when at least a chunk header's worth of bytes remains.
    pub fn could_have_child(&self) -> bool {
        self.bytes_remaining() >= HEADER_SIZE
    }

    /// Look at the next four bytes without consuming them.
    pub fn peek_next_header(&self) -> Option<Tag> {
        let pos = self.position();
        let bytes = self.stream.data.get(pos..pos + 4)?;
        if pos + 4 > self.end {
            return None;
        }
        let mut tag = [0u8; 4];
        tag.copy_from_slice(bytes);
        Some(Tag(tag))
    }

    /// Open the chunk that starts at the current position.
    pub fn read_child(&mut self) -> Result<ChunkReader<'a, '_>, ChunkError> {
        let start = self.position();
        let (tag, size) = self.parse("chunk header", parse_chunk_header)?;
        ChunkReader::enter(self.stream, tag, start, size)
    }

    pub fn skip_bytes(&mut self, count: usize) {
        self.stream.cursor.set(self.position() + count);
    }

    /// Move the cursor to `offset` bytes past the start of the payload.
    pub fn seek_payload(&mut self, offset: usize) {
        self.stream.cursor.set(self.payload_start + offset);
    }

    /// Advance one byte at a time until the next four bytes read `tag`.
    ///
    /// Returns false if the chunk ran out of room for a header first.
    pub fn skip_until(&mut self, tag: Tag) -> bool {
        while self.could_have_child() {
            if self.peek_next_header() == Some(tag) {
                return true;
            }
            self.skip_bytes(1);
        }
        false
    }

    /// The payload bytes not yet consumed.
    pub fn remaining_payload(&self) -> &'a [u8] {
        let data = self.stream.data;
        let end = self.end.min(data.len());
        &data[self.position().min(end)..end]
    }

    /// Run a winnow parser over the rest of this chunk's payload, advancing
    /// the cursor by whatever it consumed.
    pub fn parse<T>(
        &mut self,
        what: &'static str,
        parser: impl FnOnce(&mut &'a [u8]) -> WResult<T>,
    ) -> Result<T, ChunkError> {
        let offset = self.position();
        let mut input = self.remaining_payload();
        let available = input.len();
        let value = parser(&mut input).map_err(|e| ChunkError::Truncated {
            tag: self.tag,
            offset,
            what,
            detail: format!("{e}"),
        })?;
        self.stream.cursor.set(offset + (available - input.len()));
        Ok(value)
    }

    pub fn read_u8(&mut self) -> Result<u8, ChunkError> {
        self.parse("u8", |i| le_u8.parse_next(i))
    }

    pub fn read_i8(&mut self) -> Result<i8, ChunkError> {
        self.parse("i8", |i| le_i8.parse_next(i))
    }

    pub fn read_u16(&mut self) -> Result<u16, ChunkError> {
        self.parse("u16", |i| le_u16.parse_next(i))
    }

    pub fn read_i16(&mut self) -> Result<i16, ChunkError> {
        self.parse("i16", |i| le_i16.parse_next(i))
    }

    pub fn read_u32(&mut self) -> Result<u32, ChunkError> {
        self.parse("u32", |i| le_u32.parse_next(i))
    }

    pub fn read_i32(&mut self) -> Result<i32, ChunkError> {
        self.parse("i32", |i| le_i32.parse_next(i))
    }

    pub fn read_f32(&mut self) -> Result<f32, ChunkError> {
        self.parse("f32", |i| le_f32.parse_next(i))
    }

    pub fn read_u16_array(&mut self, count: usize) -> Result<Vec<u16>, ChunkError> {
        self.parse("u16 array", |i| repeat(count, le_u16).parse_next(i))
    }

    pub fn read_u32_array(&mut self, count: usize) -> Result<Vec<u32>, ChunkError> {
        self.parse("u32 array", |i| repeat(count, le_u32).parse_next(i))
    }

    pub fn read_f32_array(&mut self, count: usize) -> Result<Vec<f32>, ChunkError> {
        self.parse("f32 array", |i| repeat(count, le_f32).parse_next(i))
    }

    pub fn read_string(&mut self) -> Result<String, ChunkError> {
        self.parse("string", parse_null_terminated_string)
    }

    pub fn read_vec2(&mut self) -> Result<Vec2, ChunkError> {
        self.parse("vec2", parse_vec2)
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, ChunkError> {
        self.parse("vec3", parse_vec3)
    }

    pub fn read_quat(&mut self) -> Result<Quat, ChunkError> {
        self.parse("quaternion", parse_quat)
    }

    pub fn read_vec2_array(&mut self, count: usize) -> Result<Vec<Vec2>, ChunkError> {
        self.parse("vec2 array", |i| repeat(count, parse_vec2).parse_next(i))
    }

    pub fn read_vec3_array(&mut self, count: usize) -> Result<Vec<Vec3>, ChunkError> {
        self.parse("vec3 array", |i| repeat(count, parse_vec3).parse_next(i))
    }
}

impl Drop for ChunkReader<'_, '_> {
    fn drop(&mut self) {
        trace!("end {} at 0x{:X}", self.tag, self.end);
        self.stream.cursor.set(self.end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = tag.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_root_spans_file() {
        let data = chunk(b"HEDR", &[1, 2, 3, 4]);
        let stream = ChunkStream::new(&data);
        let root = stream.root().unwrap();
        assert_eq!(root.end(), data.len());
        assert_eq!(root.size(), data.len() - 8);
        assert_eq!(root.peek_next_header(), Some(Tag::new(b"HEDR")));
    }

    #[test]
    fn test_child_exit_resyncs_after_partial_read() {
        let mut payload = chunk(b"AAAA", &[1, 0, 0, 0, 2, 0, 0, 0]);
        payload.extend(chunk(b"BBBB", &[7, 0, 0, 0]));
        let data = chunk(b"HEDR", &payload);
        let stream = ChunkStream::new(&data);
        let mut root = stream.root().unwrap();
        let mut hedr = root.read_child().unwrap();
        {
            let mut a = hedr.read_child().unwrap();
            assert_eq!(a.tag(), Tag::new(b"AAAA"));
            // Only read half of the payload.
            assert_eq!(a.read_u32().unwrap(), 1);
        }
        let mut b = hedr.read_child().unwrap();
        assert_eq!(b.tag(), Tag::new(b"BBBB"));
        assert_eq!(b.read_u32().unwrap(), 7);
    }

    #[test]
    fn test_reads_are_bounded_by_chunk() {
        let mut payload = chunk(b"AAAA", &[1, 0]);
        payload.extend(chunk(b"BBBB", &[0; 4]));
        let data = chunk(b"HEDR", &payload);
        let stream = ChunkStream::new(&data);
        let mut root = stream.root().unwrap();
        let mut hedr = root.read_child().unwrap();
        let mut a = hedr.read_child().unwrap();
        assert!(matches!(
            a.read_u32(),
            Err(ChunkError::Truncated { what: "u32", .. })
        ));
    }

    #[test]
    fn test_overflowing_length_is_fatal() {
        let mut data = b"HEDR".to_vec();
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        let stream = ChunkStream::new(&data);
        let mut root = stream.root().unwrap();
        assert!(matches!(
            root.read_child(),
            Err(ChunkError::Overflow { .. })
        ));
    }

    #[test]
    fn test_skip_until_walks_bytes() {
        let mut data = vec![0u8, 1, 2];
        data.extend(chunk(b"SMNA", &[0; 8]));
        let stream = ChunkStream::new(&data);
        let mut root = stream.root().unwrap();
        assert!(root.skip_until(Tag::new(b"SMNA")));
        assert_eq!(root.position(), 3);
        assert!(!root.skip_until(Tag::new(b"NONE")));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let data = chunk(b"NAME", b"abc\0");
        let stream = ChunkStream::new(&data);
        let mut root = stream.root().unwrap();
        assert_eq!(root.peek_next_header(), Some(Tag::new(b"NAME")));
        assert_eq!(root.position(), 0);
        let mut name = root.read_child().unwrap();
        assert_eq!(name.read_string().unwrap(), "abc");
        assert!(!name.could_have_child());
    }
}
