//! In-memory scene model shared by the `.msh` reader and writer.

pub mod animation;
pub mod geometry;
/// Hierarchy fixups, transforms and bounds.
pub mod graph;
pub mod material;
pub mod model;
pub mod scene;

pub use animation::{Animation, BoneFrames, RotationFrame, TranslationFrame};
pub use geometry::{GeometrySegment, HalfEdge, Primitives, SegmentError, ShadowGeometry, VertexWeight};
pub use material::{Material, MaterialFlags, Rendertype};
pub use model::{CollisionPrimitive, CollisionShape, Model, ModelTransform, ModelType};
pub use scene::{Scene, SceneAabb};
