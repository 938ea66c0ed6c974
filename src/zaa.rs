//! Decompression of munged `.zaa` / `.zaabin` animation banks.
//!
//! A bank holds several animations that share one compressed data chunk:
//!
//! ```text
//! SMNA  fixed header, animation count at +20
//! MINA  per animation: flags:u32 pad:u32 crc:u32 frames:u16 bones:u16
//! TNJA  per animation, per bone:
//!         crc:u32 rotation_offsets:[u32; 4] translation_offsets:[u32; 3]
//!         biases:[f32; 3] multiplier:f32
//! TADA  compressed component streams addressed by the offsets above
//! ```
//!
//! The `SMNA` length field is always zero in practice, so sections are
//! located by scanning rather than by walking the chunk tree.

use std::collections::BTreeMap;
use std::path::Path;

use glam::{Quat, Vec3};
use thiserror::Error;
use tracing::debug;
use winnow::Parser;
use winnow::binary::{le_f32, le_u16, le_u32};
use winnow::combinator::repeat;

use crate::chunk::parser_utils::WResult;
use crate::chunk::{ChunkError, ChunkReader, ChunkStream, Tag};
use crate::error::IResult;

const SMNA: Tag = Tag::new(b"SMNA");
const MINA: Tag = Tag::new(b"MINA");
const TNJA: Tag = Tag::new(b"TNJA");
const TADA: Tag = Tag::new(b"TADA");

/// Offset of the animation count from the start of the `SMNA` header.
const SMNA_COUNT_OFFSET: usize = 20;

/// Rotations are stored as 12-bit signed fractions.
const ROTATION_MULTIPLIER: f32 = 1.0 / 2047.0;

/// Control byte: the next sample is an absolute i16.
const CONTROL_RESET: i8 = -0x7f;
/// Control byte: hold the current value for the next u8 frames.
const CONTROL_HOLD: i8 = -0x80;

#[derive(Debug, Error)]
pub enum ZaaError {
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error("no {0} section found")]
    MissingSection(&'static str),
}

/// A sparse frame to value map for one animated scalar.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Curve {
    keys: BTreeMap<u16, f32>,
}

impl Curve {
    pub fn keys(&self) -> &BTreeMap<u16, f32> {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Value keyed exactly at `frame`.
    pub fn get(&self, frame: u16) -> Option<f32> {
        self.keys.get(&frame).copied()
    }

    /// Value of the last key at or before `frame`.
    pub fn sample(&self, frame: u16) -> Option<f32> {
        self.keys.range(..=frame).next_back().map(|(_, v)| *v)
    }

    /// One value per frame, holding each key until the next one. Frames
    /// before the first key are zero.
    pub fn to_dense(&self, frames: u16) -> Vec<f32> {
        let mut current = 0.0;
        (0..frames)
            .map(|frame| {
                if let Some(value) = self.get(frame) {
                    current = value;
                }
                current
            })
            .collect()
    }
}

/// Component curves for one bone: rotation `x, y, z, w` and translation
/// `x, y, z`.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZaaBoneCurves {
    pub crc: u32,
    pub rotation: [Curve; 4],
    pub translation: [Curve; 3],
}

impl ZaaBoneCurves {
    /// Rotation at `frame`, with missing components taken from identity.
    pub fn sample_rotation(&self, frame: u16) -> Quat {
        let [x, y, z, w] = &self.rotation;
        Quat::from_xyzw(
            x.sample(frame).unwrap_or(0.0),
            y.sample(frame).unwrap_or(0.0),
            z.sample(frame).unwrap_or(0.0),
            w.sample(frame).unwrap_or(1.0),
        )
    }

    pub fn sample_translation(&self, frame: u16) -> Vec3 {
        let [x, y, z] = &self.translation;
        Vec3::new(
            x.sample(frame).unwrap_or(0.0),
            y.sample(frame).unwrap_or(0.0),
            z.sample(frame).unwrap_or(0.0),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZaaAnimation {
    pub crc: u32,
    pub num_frames: u16,
    pub num_bones: u16,
    pub translation_flags: u32,
    /// Bones in file order.
    pub bones: Vec<ZaaBoneCurves>,
}

impl ZaaAnimation {
    pub fn bone(&self, crc: u32) -> Option<&ZaaBoneCurves> {
        self.bones.iter().find(|b| b.crc == crc)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZaaAnimationSet {
    pub animations: Vec<ZaaAnimation>,
}

impl ZaaAnimationSet {
    pub fn animation(&self, crc: u32) -> Option<&ZaaAnimation> {
        self.animations.iter().find(|a| a.crc == crc)
    }
}

struct AnimHeader {
    translation_flags: u32,
    crc: u32,
    num_frames: u16,
    num_bones: u16,
}

struct BoneParams {
    crc: u32,
    /// Rotation offsets followed by translation offsets.
    offsets: [u32; 7],
    biases: [f32; 3],
    multiplier: f32,
}

fn parse_anim_header(input: &mut &[u8]) -> WResult<AnimHeader> {
    let (translation_flags, _, crc, num_frames, num_bones) =
        (le_u32, le_u32, le_u32, le_u16, le_u16).parse_next(input)?;
    Ok(AnimHeader {
        translation_flags,
        crc,
        num_frames,
        num_bones,
    })
}

fn parse_bone_params(input: &mut &[u8]) -> WResult<BoneParams> {
    let crc = le_u32.parse_next(input)?;
    let mut offsets = [0u32; 7];
    for offset in &mut offsets {
        *offset = le_u32.parse_next(input)?;
    }
    let (bx, by, bz, multiplier) = (le_f32, le_f32, le_f32, le_f32).parse_next(input)?;
    Ok(BoneParams {
        crc,
        offsets,
        biases: [bx, by, bz],
        multiplier,
    })
}

/// Decompress every animation in a bank.
pub fn decompress(data: &[u8]) -> Result<ZaaAnimationSet, ZaaError> {
    let stream = ChunkStream::new(data);
    let mut root = stream.root()?;

    if !root.skip_until(SMNA) {
        return Err(ZaaError::MissingSection("SMNA"));
    }
    root.skip_bytes(SMNA_COUNT_OFFSET);
    let num_anims = root.read_u16()? as usize;
    root.skip_bytes(2);
    debug!("bank contains {num_anims} animations");

    if !root.skip_until(MINA) {
        return Err(ZaaError::MissingSection("MINA"));
    }
    let headers: Vec<AnimHeader> = {
        let mut mina = root.read_child()?;
        mina.parse("MINA entries", |input| {
            repeat(num_anims, parse_anim_header).parse_next(input)
        })?
    };

    if !root.skip_until(TNJA) {
        return Err(ZaaError::MissingSection("TNJA"));
    }
    let params: Vec<Vec<BoneParams>> = {
        let mut tnja = root.read_child()?;
        headers
            .iter()
            .map(|header| {
                tnja.parse("TNJA entries", |input| {
                    repeat(header.num_bones as usize, parse_bone_params).parse_next(input)
                })
            })
            .collect::<Result<_, _>>()?
    };

    if !root.skip_until(TADA) {
        return Err(ZaaError::MissingSection("TADA"));
    }
    let mut tada = root.read_child()?;
    let animations = headers
        .into_iter()
        .zip(params)
        .map(|(header, bones)| decompress_animation(&mut tada, header, bones))
        .collect::<Result<_, _>>()?;

    Ok(ZaaAnimationSet { animations })
}

fn decompress_animation(
    tada: &mut ChunkReader<'_, '_>,
    header: AnimHeader,
    bones: Vec<BoneParams>,
) -> Result<ZaaAnimation, ChunkError> {
    debug!(
        "anim {:#x}: {} frames, {} bones",
        header.crc, header.num_frames, header.num_bones
    );

    let bones = bones
        .iter()
        .map(|params| -> Result<ZaaBoneCurves, ChunkError> {
            let mut curves = ZaaBoneCurves {
                crc: params.crc,
                ..Default::default()
            };
            for (component, offset) in params.offsets.iter().enumerate() {
                let (multiplier, bias) = if component < 4 {
                    (ROTATION_MULTIPLIER, 0.0)
                } else {
                    (params.multiplier, params.biases[component - 4])
                };

                tada.seek_payload(*offset as usize);
                let curve = decompress_curve(tada, header.num_frames, multiplier, bias)?;
                tada.seek_payload(0);

                match component {
                    0..4 => curves.rotation[component] = curve,
                    _ => curves.translation[component - 4] = curve,
                }
            }
            Ok(curves)
        })
        .collect::<Result<_, _>>()?;

    Ok(ZaaAnimation {
        crc: header.crc,
        num_frames: header.num_frames,
        num_bones: header.num_bones,
        translation_flags: header.translation_flags,
        bones,
    })
}

/// Decode one component stream starting at the reader's cursor.
fn decompress_curve(
    tada: &mut ChunkReader<'_, '_>,
    frames: u16,
    multiplier: f32,
    bias: f32,
) -> Result<Curve, ChunkError> {
    let frames = frames as usize;
    let mut keys = BTreeMap::new();
    let mut accumulator = 0.0f32;

    let mut frame = 0usize;
    while frame < frames {
        accumulator = bias + multiplier * tada.read_i16()? as f32;
        keys.insert(frame as u16, accumulator);
        frame += 1;

        while frame < frames {
            match tada.read_i8()? {
                CONTROL_RESET => break,
                CONTROL_HOLD => frame += tada.read_u8()? as usize,
                delta => {
                    // The bias only applies to absolute samples.
                    accumulator += multiplier * delta as f32;
                    keys.insert(frame as u16, accumulator);
                    frame += 1;
                }
            }
        }
    }

    if frames > 0 {
        keys.insert((frames - 1) as u16, accumulator);
    }
    Ok(Curve { keys })
}

/// Read and decompress a bank from disk.
pub fn read_zaa_file(path: impl AsRef<Path>) -> IResult<ZaaAnimationSet> {
    let data = std::fs::read(path)?;
    Ok(decompress(&data)?)
}

/// Animation names from the text of a `.anims` file: every double-quoted
/// string, in order. An unterminated trailing quote is ignored.
pub fn parse_anims_file(text: &str) -> Vec<String> {
    let parts: Vec<&str> = text.split('"').collect();
    parts[..parts.len().saturating_sub(1)]
        .iter()
        .skip(1)
        .step_by(2)
        .map(|s| s.to_string())
        .collect()
}

/// Names from the `.anims` file next to a `.zaabin`, or nothing if there
/// is no such file.
pub fn read_anims_file(zaabin_path: impl AsRef<Path>) -> IResult<Vec<String>> {
    let path = zaabin_path.as_ref().with_extension("anims");
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(parse_anims_file(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// The name in `names` whose CRC is `crc`, or `crc` in hex.
pub fn anim_name(crc: u32, names: &[String]) -> String {
    names
        .iter()
        .find(|name| crate::crc::to_crc(name) == crc)
        .cloned()
        .unwrap_or_else(|| format!("{crc:#x}"))
}
