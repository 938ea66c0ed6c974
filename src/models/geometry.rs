//! Geometry segments (`SEGM` chunks) and their primitive data.
//!
//! A segment carries parallel per-vertex attribute arrays and exactly one
//! primitive representation. Index values are 16-bit on disk and the top
//! bit of each index is reserved for the strip-start flag, so a segment may
//! address at most [`MAX_VERTICES`] vertices.

use glam::{Vec2, Vec3, Vec4};
use itertools::Itertools;
use thiserror::Error;
use variantly::Variantly;

use crate::msh::strips;

/// Largest vertex count addressable by a single segment.
pub const MAX_VERTICES: usize = 0x8000;

/// Largest index value a segment may reference.
pub const MAX_INDEX: u16 = 0x7FFF;

/// Reasons a segment cannot be written as-is.
#[derive(Debug, Error, PartialEq)]
pub enum SegmentError {
    #[error("segment has no positions")]
    NoPositions,
    #[error("segment has no primitive data")]
    NoPrimitives,
    #[error("segment has {count} vertices (limit {MAX_VERTICES})")]
    TooManyVertices { count: usize },
    #[error("segment references vertex {index} (limit {MAX_INDEX})")]
    IndexOutOfRange { index: u16 },
    #[error("segment has {count} {attribute} for {positions} positions")]
    AttributeLengthMismatch {
        attribute: &'static str,
        count: usize,
        positions: usize,
    },
}

/// One skinning influence on a vertex.
///
/// `bone` is the position of the bone model in [`crate::models::Scene::models`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexWeight {
    pub weight: f32,
    pub bone: u32,
}

/// Shadow volume geometry stored as half-edges.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShadowGeometry {
    pub positions: Vec<Vec3>,
    pub edges: Vec<HalfEdge>,
}

/// A shadow half-edge: `(vertex, next edge, twin edge, unused)`.
/// Missing links hold [`HalfEdge::NONE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HalfEdge {
    pub vertex: u16,
    pub next: u16,
    pub twin: u16,
    pub unused: u16,
}

impl HalfEdge {
    pub const NONE: u16 = 0xFFFF;
}

impl ShadowGeometry {
    /// Rebuild polygons by walking each unvisited half-edge's `next` chain
    /// back to where it started.
    pub fn faces(&self) -> Vec<Vec<u16>> {
        let mut visited = vec![false; self.edges.len()];
        let mut faces = Vec::new();

        for start in 0..self.edges.len() {
            if visited[start] {
                continue;
            }
            let mut face = Vec::new();
            let mut current = start;
            // A well-formed loop never visits more edges than exist.
            while face.len() < self.edges.len() {
                visited[current] = true;
                let edge = self.edges[current];
                face.push(edge.vertex);
                let next = edge.next as usize;
                if next == start || next >= self.edges.len() {
                    break;
                }
                current = next;
            }
            faces.push(face);
        }
        faces
    }
}

/// The primitive data of a segment.
#[derive(Debug, Clone, PartialEq, Default, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Primitives {
    #[default]
    Empty,
    /// N-gons, triangulated as fans when needed.
    Polygons(Vec<Vec<u16>>),
    Triangles(Vec<[u16; 3]>),
    /// Triangle strips with alternating winding.
    Strips(Vec<Vec<u16>>),
    Shadow(ShadowGeometry),
}

impl Primitives {
    /// Triangles for the surface primitives, in winding order.
    pub fn to_triangles(&self) -> Vec<[u16; 3]> {
        match self {
            Primitives::Empty | Primitives::Shadow(_) => Vec::new(),
            Primitives::Polygons(polygons) => polygons
                .iter()
                .flat_map(|polygon| triangulate_polygon(polygon))
                .collect(),
            Primitives::Triangles(triangles) => triangles.clone(),
            Primitives::Strips(strips) => strips::strips_to_triangles(strips),
        }
    }

    fn indices(&self) -> Box<dyn Iterator<Item = u16> + '_> {
        match self {
            Primitives::Empty => Box::new(std::iter::empty()),
            Primitives::Polygons(p) | Primitives::Strips(p) => Box::new(p.iter().flatten().copied()),
            Primitives::Triangles(t) => Box::new(t.iter().flatten().copied()),
            Primitives::Shadow(s) => Box::new(s.edges.iter().map(|e| e.vertex)),
        }
    }

    fn has_data(&self) -> bool {
        match self {
            Primitives::Empty => false,
            Primitives::Polygons(p) | Primitives::Strips(p) => p.iter().any(|x| !x.is_empty()),
            Primitives::Triangles(t) => !t.is_empty(),
            Primitives::Shadow(s) => !s.positions.is_empty() || !s.edges.is_empty(),
        }
    }
}

/// Fan-triangulate one polygon.
pub fn triangulate_polygon(polygon: &[u16]) -> Vec<[u16; 3]> {
    match polygon {
        [first, rest @ ..] if rest.len() >= 2 => rest
            .iter()
            .tuple_windows()
            .map(|(b, c)| [*first, *b, *c])
            .collect(),
        _ => Vec::new(),
    }
}

/// A run of geometry sharing one material.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeometrySegment {
    pub material_name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// RGBA in `0.0..=1.0`.
    pub colors: Option<Vec<Vec4>>,
    pub texcoords: Vec<Vec2>,
    /// Up to four influences per vertex.
    pub weights: Option<Vec<Vec<VertexWeight>>>,
    pub primitives: Primitives,
}

impl GeometrySegment {
    /// Segments without positions or primitives are dropped before writing.
    /// Shadow segments carry their own positions.
    pub fn is_writable(&self) -> bool {
        match &self.primitives {
            Primitives::Shadow(_) => self.primitives.has_data(),
            other => !self.positions.is_empty() && other.has_data(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        match &self.primitives {
            Primitives::Shadow(shadow) => shadow.positions.len(),
            _ => self.positions.len(),
        }
    }

    /// Check everything the writer relies on.
    pub fn validate(&self) -> Result<(), SegmentError> {
        if !self.primitives.is_shadow() && self.positions.is_empty() {
            return Err(SegmentError::NoPositions);
        }
        if !self.primitives.has_data() {
            return Err(SegmentError::NoPrimitives);
        }
        let count = self.vertex_count();
        if count > MAX_VERTICES {
            return Err(SegmentError::TooManyVertices { count });
        }
        if let Some(index) = self.primitives.indices().find(|i| *i > MAX_INDEX) {
            return Err(SegmentError::IndexOutOfRange { index });
        }

        let positions = self.positions.len();
        let check = |attribute: &'static str, count: usize| {
            if count != 0 && count != positions {
                Err(SegmentError::AttributeLengthMismatch {
                    attribute,
                    count,
                    positions,
                })
            } else {
                Ok(())
            }
        };
        check("normals", self.normals.len())?;
        check("texcoords", self.texcoords.len())?;
        check("colors", self.colors.as_ref().map_or(0, Vec::len))?;
        check("weights", self.weights.as_ref().map_or(0, Vec::len))?;
        Ok(())
    }

    /// Triangles of this segment, converted from whatever representation it holds.
    pub fn triangles(&self) -> Vec<[u16; 3]> {
        self.primitives.to_triangles()
    }
}
