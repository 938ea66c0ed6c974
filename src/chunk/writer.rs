use glam::{Quat, Vec2, Vec3};

use super::{ChunkError, HEADER_SIZE, MAX_CHUNK_SIZE, Tag};

/// Appends one chunk to a byte buffer.
///
/// Writers only exist inside [`ChunkWriter::write_root`] and
/// [`ChunkWriter::child`] closures. When the closure returns the payload is
/// zero-padded to four bytes and the length placeholder is back-patched, so
/// the parent's payload grows by the child's full size, header included.
pub struct ChunkWriter<'w> {
    buf: &'w mut Vec<u8>,
    tag: Tag,
    header_pos: usize,
}

impl<'w> ChunkWriter<'w> {
    fn begin(buf: &'w mut Vec<u8>, tag: Tag) -> Self {
        let header_pos = buf.len();
        buf.extend_from_slice(&tag.0);
        buf.extend_from_slice(&[0u8; 4]);
        Self {
            buf,
            tag,
            header_pos,
        }
    }

    /// Pad, back-patch the length and return the chunk's total size.
    fn finish(self) -> Result<usize, ChunkError> {
        let padding = (4 - self.size() % 4) % 4;
        self.buf.resize(self.buf.len() + padding, 0);

        let size = self.size();
        if size > MAX_CHUNK_SIZE {
            return Err(ChunkError::Overflow {
                tag: self.tag,
                offset: self.header_pos,
                size,
            });
        }
        let len_pos = self.header_pos + 4;
        self.buf[len_pos..len_pos + 4].copy_from_slice(&(size as u32).to_le_bytes());
        Ok(size + HEADER_SIZE)
    }

    /// Write a top-level chunk to `buf` and return its total size.
    pub fn write_root<E, F>(buf: &'w mut Vec<u8>, tag: Tag, f: F) -> Result<usize, E>
    where
        F: FnOnce(&mut ChunkWriter<'_>) -> Result<(), E>,
        E: From<ChunkError>,
    {
        let mut root = ChunkWriter::begin(buf, tag);
        f(&mut root)?;
        Ok(root.finish()?)
    }

    /// Write a nested chunk.
    pub fn child<E, F>(&mut self, tag: Tag, f: F) -> Result<(), E>
    where
        F: FnOnce(&mut ChunkWriter<'_>) -> Result<(), E>,
        E: From<ChunkError>,
    {
        let mut child = ChunkWriter::begin(&mut *self.buf, tag);
        f(&mut child)?;
        child.finish()?;
        Ok(())
    }

    /// Write a nested chunk whose body cannot fail.
    pub fn leaf(&mut self, tag: Tag, f: impl FnOnce(&mut ChunkWriter<'_>)) -> Result<(), ChunkError> {
        self.child(tag, |w| {
            f(w);
            Ok(())
        })
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Payload bytes written so far, nested chunk headers included.
    pub fn size(&self) -> usize {
        self.buf.len() - self.header_pos - HEADER_SIZE
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u16s(&mut self, values: &[u16]) {
        values.iter().for_each(|v| self.write_u16(*v));
    }

    pub fn write_u32s(&mut self, values: &[u32]) {
        values.iter().for_each(|v| self.write_u32(*v));
    }

    pub fn write_f32s(&mut self, values: &[f32]) {
        values.iter().for_each(|v| self.write_f32(*v));
    }

    /// Write `value` followed by a NUL terminator.
    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
        self.write_u8(0);
    }

    pub fn write_vec2(&mut self, value: Vec2) {
        self.write_f32s(&value.to_array());
    }

    pub fn write_vec3(&mut self, value: Vec3) {
        self.write_f32s(&value.to_array());
    }

    /// Quaternions are written as `x, y, z, w`.
    pub fn write_quat(&mut self, value: Quat) {
        self.write_f32s(&value.to_array());
    }
}
