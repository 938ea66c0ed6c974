//! Scene graph nodes (`MODL` chunks).

use std::fmt;

use bon::Builder;
use glam::{Mat4, Quat, Vec3};

use crate::models::geometry::GeometrySegment;
use crate::recognized::Recognized;

/// `MTYP` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum ModelType {
    Null = 0,
    Skin = 1,
    Cloth = 2,
    Bone = 3,
    Static = 4,
    ShadowVolume = 6,
}

impl ModelType {
    pub fn from_raw(raw: u32) -> Recognized<ModelType, u32> {
        match raw {
            0 => ModelType::Null.into(),
            1 => ModelType::Skin.into(),
            2 => ModelType::Cloth.into(),
            3 => ModelType::Bone.into(),
            4 => ModelType::Static.into(),
            6 => ModelType::ShadowVolume.into(),
            other => Recognized::Unknown(other),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelType::Null => "null",
            ModelType::Skin => "skin",
            ModelType::Cloth => "cloth",
            ModelType::Bone => "bone",
            ModelType::Static => "static",
            ModelType::ShadowVolume => "shadowvolume",
        };
        f.write_str(name)
    }
}

impl Recognized<ModelType, u32> {
    /// The on-disk `MTYP` value.
    pub fn raw(&self) -> u32 {
        match self {
            Recognized::Known(t) => *t as u32,
            Recognized::Unknown(raw) => *raw,
        }
    }
}

/// `SWCI` shape values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum CollisionShape {
    Sphere = 0,
    Ellipsoid = 1,
    Cylinder = 2,
    Mesh = 3,
    Box = 4,
}

impl CollisionShape {
    pub fn from_raw(raw: u32) -> Recognized<CollisionShape, u32> {
        match raw {
            0 => CollisionShape::Sphere.into(),
            1 => CollisionShape::Ellipsoid.into(),
            2 => CollisionShape::Cylinder.into(),
            3 => CollisionShape::Mesh.into(),
            4 => CollisionShape::Box.into(),
            other => Recognized::Unknown(other),
        }
    }
}

impl Recognized<CollisionShape, u32> {
    /// The on-disk `SWCI` shape value.
    pub fn raw(&self) -> u32 {
        match self {
            Recognized::Known(s) => *s as u32,
            Recognized::Unknown(raw) => *raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollisionPrimitive {
    pub shape: Recognized<CollisionShape, u32>,
    pub radius: f32,
    pub height: f32,
    pub length: f32,
}

/// Local transform relative to the parent. Scale is not stored.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelTransform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for ModelTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl ModelTransform {
    /// Translation applied after rotation.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.translation)
    }
}

/// A node in the scene hierarchy. Parents are referenced by name; an empty
/// parent marks a root.
#[derive(Debug, Clone, PartialEq, Builder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Model {
    #[builder(into)]
    pub name: String,
    #[builder(into, default)]
    pub parent: String,
    #[builder(default = ModelType::Null.into())]
    pub model_type: Recognized<ModelType, u32>,
    #[builder(default)]
    pub hidden: bool,
    #[builder(default)]
    pub transform: ModelTransform,
    /// Vertex-group index to bone model name.
    #[builder(default)]
    pub bone_map: Vec<String>,
    #[builder(default)]
    pub geometry: Vec<GeometrySegment>,
    pub collision: Option<CollisionPrimitive>,
}

impl Model {
    pub fn is_root(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn has_geometry(&self) -> bool {
        !self.geometry.is_empty()
    }

    pub fn model_type(&self) -> Option<ModelType> {
        self.model_type.known().copied()
    }
}
