//! Shared winnow-based parsers for the primitive values stored inside chunks.

use glam::{Quat, Vec2, Vec3};
use winnow::Parser;
use winnow::binary::{le_f32, le_u8, le_u32};
use winnow::error::ContextError;
use winnow::token::{take, take_till};

use super::Tag;

/// Common result type for winnow parsers.
pub type WResult<T> = Result<T, winnow::error::ErrMode<ContextError>>;

/// Parse a chunk header: tag followed by the little-endian payload length.
pub fn parse_chunk_header(input: &mut &[u8]) -> WResult<(Tag, u32)> {
    let tag: &[u8] = take(4usize).parse_next(input)?;
    let size = le_u32.parse_next(input)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(tag);
    Ok((Tag(bytes), size))
}

pub fn parse_vec2(input: &mut &[u8]) -> WResult<Vec2> {
    let x = le_f32.parse_next(input)?;
    let y = le_f32.parse_next(input)?;
    Ok(Vec2::new(x, y))
}

pub fn parse_vec3(input: &mut &[u8]) -> WResult<Vec3> {
    let x = le_f32.parse_next(input)?;
    let y = le_f32.parse_next(input)?;
    let z = le_f32.parse_next(input)?;
    Ok(Vec3::new(x, y, z))
}

/// Quaternions are stored as `x, y, z, w`.
pub fn parse_quat(input: &mut &[u8]) -> WResult<Quat> {
    let x = le_f32.parse_next(input)?;
    let y = le_f32.parse_next(input)?;
    let z = le_f32.parse_next(input)?;
    let w = le_f32.parse_next(input)?;
    Ok(Quat::from_xyzw(x, y, z, w))
}

/// Read a NUL-terminated string and consume the terminator.
pub fn parse_null_terminated_string(input: &mut &[u8]) -> WResult<String> {
    let bytes: &[u8] = take_till(0.., 0u8).parse_next(input)?;
    le_u8.parse_next(input)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}
