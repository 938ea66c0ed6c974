//! The `.msh` chunk grammar.
//!
//! # Layout
//! ```text
//! HEDR
//! ├── MSH2
//! │   ├── SINF { NAME, FRAM, BBOX }
//! │   ├── MATL count:u32 MATD*  { NAME, DATA, ATRB, TX0D..TX3D }
//! │   └── MODL*                 { MTYP, MNDX, NAME, PRNT, FLGS, TRAN, GEOM, SWCI }
//! │       └── GEOM { SEGM*, ENVL }
//! │           └── SEGM { MATI, POSL, WGHT, NRML, CLRL, UV0L, NDXL, NDXT, STRP, SHDW }
//! ├── SKL2
//! ├── BLN2
//! ├── ANM2 { CYCL, KFR3 }
//! └── CL1L
//! ```

use std::path::Path;

use bon::Builder;
use glam::Vec4;
use thiserror::Error;

use crate::chunk::ChunkError;
use crate::error::IResult;
use crate::models::{Scene, SegmentError};

mod read;
pub mod strips;
mod write;

pub use read::read_scene;
pub use write::save_scene;

pub mod tags {
    use crate::chunk::Tag;

    pub const HEDR: Tag = Tag::new(b"HEDR");
    pub const MSH2: Tag = Tag::new(b"MSH2");
    pub const SINF: Tag = Tag::new(b"SINF");
    pub const NAME: Tag = Tag::new(b"NAME");
    pub const FRAM: Tag = Tag::new(b"FRAM");
    pub const BBOX: Tag = Tag::new(b"BBOX");
    pub const MATL: Tag = Tag::new(b"MATL");
    pub const MATD: Tag = Tag::new(b"MATD");
    pub const DATA: Tag = Tag::new(b"DATA");
    pub const ATRB: Tag = Tag::new(b"ATRB");
    pub const TX0D: Tag = Tag::new(b"TX0D");
    pub const TX1D: Tag = Tag::new(b"TX1D");
    pub const TX2D: Tag = Tag::new(b"TX2D");
    pub const TX3D: Tag = Tag::new(b"TX3D");
    pub const MODL: Tag = Tag::new(b"MODL");
    pub const MTYP: Tag = Tag::new(b"MTYP");
    pub const MNDX: Tag = Tag::new(b"MNDX");
    pub const PRNT: Tag = Tag::new(b"PRNT");
    pub const FLGS: Tag = Tag::new(b"FLGS");
    pub const TRAN: Tag = Tag::new(b"TRAN");
    pub const GEOM: Tag = Tag::new(b"GEOM");
    pub const SEGM: Tag = Tag::new(b"SEGM");
    pub const ENVL: Tag = Tag::new(b"ENVL");
    pub const CLTH: Tag = Tag::new(b"CLTH");
    pub const SWCI: Tag = Tag::new(b"SWCI");
    pub const MATI: Tag = Tag::new(b"MATI");
    pub const POSL: Tag = Tag::new(b"POSL");
    pub const NRML: Tag = Tag::new(b"NRML");
    pub const CLRL: Tag = Tag::new(b"CLRL");
    pub const UV0L: Tag = Tag::new(b"UV0L");
    pub const NDXL: Tag = Tag::new(b"NDXL");
    pub const NDXT: Tag = Tag::new(b"NDXT");
    pub const STRP: Tag = Tag::new(b"STRP");
    pub const WGHT: Tag = Tag::new(b"WGHT");
    pub const SHDW: Tag = Tag::new(b"SHDW");
    pub const SKL2: Tag = Tag::new(b"SKL2");
    pub const BLN2: Tag = Tag::new(b"BLN2");
    pub const ANM2: Tag = Tag::new(b"ANM2");
    pub const CYCL: Tag = Tag::new(b"CYCL");
    pub const KFR3: Tag = Tag::new(b"KFR3");
    pub const CL1L: Tag = Tag::new(b"CL1L");
}

/// Errors produced while reading or writing `.msh` data.
#[derive(Debug, Error)]
pub enum MshError {
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error("no HEDR chunk found")]
    MissingHeader,
    #[error("segment material index {index} out of range ({count} materials)")]
    MaterialIndexOutOfRange { index: u32, count: usize },
    #[error("segment {segment} of model '{model}' uses unknown material '{material}'")]
    UnknownMaterial {
        model: String,
        segment: usize,
        material: String,
    },
    #[error("segment {segment} of model '{model}': {source}")]
    Segment {
        model: String,
        segment: usize,
        #[source]
        source: SegmentError,
    },
    #[error("model '{model}' skins to bone {bone}, which is not a model in the scene")]
    UnknownBone { model: String, bone: u32 },
    #[error("model '{model}' has bone '{bone}' in its bone map, which is not a model in the scene")]
    UnknownBoneName { model: String, bone: String },
}

/// Options controlling [`save_scene`].
#[derive(Debug, Clone, Default, Builder)]
pub struct SaveOptions {
    /// Build real triangle strips, quadratic in the triangle count. When
    /// false every triangle becomes its own strip.
    #[builder(default)]
    pub generate_triangle_strips: bool,
}

/// Pack an RGBA color as `A R G B` bytes in a little-endian u32.
pub fn pack_color(color: Vec4) -> u32 {
    let channel = |c: f32| (c * 255.0 + 0.5).clamp(0.0, 255.0) as u32;
    (channel(color.x) << 16) | (channel(color.y) << 8) | channel(color.z) | (channel(color.w) << 24)
}

pub fn unpack_color(color: u32) -> Vec4 {
    let channel = |shift: u32| ((color >> shift) & 0xFF) as f32 / 255.0;
    Vec4::new(channel(16), channel(8), channel(0), channel(24))
}

/// Read and parse a `.msh` file.
pub fn read_scene_file(path: impl AsRef<Path>) -> IResult<Scene> {
    let data = std::fs::read(path)?;
    Ok(read_scene(&data)?)
}

/// Serialize `scene` and write it to `path`.
///
/// The data goes to a temporary sibling file first, which is then renamed
/// over `path`, so a failed save never leaves a truncated file behind.
pub fn save_scene_file(
    path: impl AsRef<Path>,
    scene: &Scene,
    options: &SaveOptions,
) -> IResult<()> {
    let path = path.as_ref();
    let data = save_scene(scene, options)?;
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);
    std::fs::write(tmp, &data)?;
    std::fs::rename(tmp, path)?;
    Ok(())
}

/// True if `data` starts with a `HEDR` chunk.
pub fn is_msh(data: &[u8]) -> bool {
    data.get(..4) == Some(&tags::HEDR.0[..])
}
