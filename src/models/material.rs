//! Materials (`MATD` chunks).

use bitflags::bitflags;
use bon::Builder;
use glam::Vec3;

bitflags! {
    /// Render flags stored in the first byte of `ATRB`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct MaterialFlags: u8 {
        const UNLIT = 1;
        const GLOW = 2;
        const BLENDED_TRANSPARENCY = 4;
        const DOUBLESIDED = 8;
        const HARDEDGED_TRANSPARENCY = 16;
        const PERPIXEL = 32;
        const ADDITIVE_TRANSPARENCY = 64;
        const SPECULAR = 128;
    }
}

/// Shader selection from the second byte of `ATRB`, together with the two
/// trailing data bytes whose meaning depends on the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Rendertype {
    Normal { detail_tiling: [u8; 2] },
    Scrolling { speed_u: u8, speed_v: u8 },
    Envmapped { detail_tiling: [u8; 2] },
    Animated { frames: u8, fps: u8 },
    /// Refraction ignores the data bytes and always writes zeros.
    Refraction,
    Blink { min_brightness: u8, speed: u8 },
    NormalmappedTiled { tiling_u: u8, tiling_v: u8 },
    NormalmappedEnvmapped { detail_tiling: [u8; 2] },
    Normalmapped { detail_tiling: [u8; 2] },
    NormalmappedTiledEnvmapped { tiling_u: u8, tiling_v: u8 },
    /// A shader id without a typed representation, kept verbatim.
    Other { id: u8, data: [u8; 2] },
}

impl Default for Rendertype {
    fn default() -> Self {
        Rendertype::Normal {
            detail_tiling: [0, 0],
        }
    }
}

impl Rendertype {
    pub const NORMAL: u8 = 0;
    pub const SCROLLING: u8 = 3;
    pub const ENVMAPPED: u8 = 6;
    pub const ANIMATED: u8 = 7;
    pub const REFRACTION: u8 = 22;
    pub const NORMALMAPPED_TILED: u8 = 24;
    pub const BLINK: u8 = 25;
    pub const NORMALMAPPED_ENVMAPPED: u8 = 26;
    pub const NORMALMAPPED: u8 = 27;
    pub const NORMALMAPPED_TILED_ENVMAP: u8 = 29;

    /// Build from the raw `ATRB` shader id and data bytes.
    pub fn from_raw(id: u8, data: [u8; 2]) -> Self {
        let [a, b] = data;
        match id {
            Self::NORMAL => Rendertype::Normal {
                detail_tiling: data,
            },
            Self::SCROLLING => Rendertype::Scrolling {
                speed_u: a,
                speed_v: b,
            },
            Self::ENVMAPPED => Rendertype::Envmapped {
                detail_tiling: data,
            },
            Self::ANIMATED => Rendertype::Animated { frames: a, fps: b },
            Self::REFRACTION => Rendertype::Refraction,
            Self::BLINK => Rendertype::Blink {
                min_brightness: a,
                speed: b,
            },
            Self::NORMALMAPPED_TILED => Rendertype::NormalmappedTiled {
                tiling_u: a,
                tiling_v: b,
            },
            Self::NORMALMAPPED_ENVMAPPED => Rendertype::NormalmappedEnvmapped {
                detail_tiling: data,
            },
            Self::NORMALMAPPED => Rendertype::Normalmapped {
                detail_tiling: data,
            },
            Self::NORMALMAPPED_TILED_ENVMAP => Rendertype::NormalmappedTiledEnvmapped {
                tiling_u: a,
                tiling_v: b,
            },
            id => Rendertype::Other { id, data },
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Rendertype::Normal { .. } => Self::NORMAL,
            Rendertype::Scrolling { .. } => Self::SCROLLING,
            Rendertype::Envmapped { .. } => Self::ENVMAPPED,
            Rendertype::Animated { .. } => Self::ANIMATED,
            Rendertype::Refraction => Self::REFRACTION,
            Rendertype::Blink { .. } => Self::BLINK,
            Rendertype::NormalmappedTiled { .. } => Self::NORMALMAPPED_TILED,
            Rendertype::NormalmappedEnvmapped { .. } => Self::NORMALMAPPED_ENVMAPPED,
            Rendertype::Normalmapped { .. } => Self::NORMALMAPPED,
            Rendertype::NormalmappedTiledEnvmapped { .. } => Self::NORMALMAPPED_TILED_ENVMAP,
            Rendertype::Other { id, .. } => *id,
        }
    }

    /// The two `ATRB` data bytes.
    pub fn data(&self) -> [u8; 2] {
        match *self {
            Rendertype::Normal { detail_tiling }
            | Rendertype::Envmapped { detail_tiling }
            | Rendertype::NormalmappedEnvmapped { detail_tiling }
            | Rendertype::Normalmapped { detail_tiling } => detail_tiling,
            Rendertype::Scrolling { speed_u, speed_v } => [speed_u, speed_v],
            Rendertype::Animated { frames, fps } => [frames, fps],
            Rendertype::Refraction => [0, 0],
            Rendertype::Blink {
                min_brightness,
                speed,
            } => [min_brightness, speed],
            Rendertype::NormalmappedTiled { tiling_u, tiling_v }
            | Rendertype::NormalmappedTiledEnvmapped { tiling_u, tiling_v } => {
                [tiling_u, tiling_v]
            }
            Rendertype::Other { data, .. } => data,
        }
    }

    pub fn is_normalmapped(&self) -> bool {
        matches!(
            self,
            Rendertype::NormalmappedTiled { .. }
                | Rendertype::NormalmappedEnvmapped { .. }
                | Rendertype::Normalmapped { .. }
                | Rendertype::NormalmappedTiledEnvmapped { .. }
        )
    }
}

/// A named material.
///
/// Texture slot meaning depends on the rendertype: slot 0 is the diffuse
/// map, slot 1 the normal map (normal-mapped shaders) or distortion map
/// (refraction), slot 2 the detail map and slot 3 the environment map.
#[derive(Debug, Clone, PartialEq, Builder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    #[builder(into)]
    pub name: String,
    #[builder(default = Vec3::ONE)]
    pub specular_color: Vec3,
    #[builder(default)]
    pub rendertype: Rendertype,
    #[builder(default)]
    pub flags: MaterialFlags,
    #[builder(default)]
    pub textures: [String; 4],
}

impl Material {
    /// Plain white material used when a scene has none.
    pub fn default_white(name: impl Into<String>) -> Self {
        let mut material = Material::builder().name(name).build();
        material.textures[0] = "white.tga".to_string();
        material
    }

    pub fn diffuse_map(&self) -> &str {
        &self.textures[0]
    }

    pub fn normal_map(&self) -> Option<&str> {
        self.rendertype
            .is_normalmapped()
            .then_some(self.textures[1].as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn distortion_map(&self) -> Option<&str> {
        matches!(self.rendertype, Rendertype::Refraction)
            .then_some(self.textures[1].as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn detail_map(&self) -> Option<&str> {
        Some(self.textures[2].as_str()).filter(|t| !t.is_empty())
    }

    pub fn environment_map(&self) -> Option<&str> {
        Some(self.textures[3].as_str()).filter(|t| !t.is_empty())
    }

    /// Number of `TXnD` chunks to write: slot 0 is always written, later
    /// slots only up to the last non-empty one.
    pub fn texture_slots_in_use(&self) -> usize {
        self.textures
            .iter()
            .rposition(|t| !t.is_empty())
            .map_or(1, |last| last + 1)
    }
}
