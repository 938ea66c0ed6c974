use glam::Vec3;

use crate::models::animation::Animation;
use crate::models::material::Material;
use crate::models::model::Model;

/// A whole `.msh` file.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scene {
    pub name: String,
    /// Materials in insertion order; names are unique.
    pub materials: Vec<Material>,
    /// Models in file order. `MNDX` is the position plus one.
    pub models: Vec<Model>,
    pub animation: Option<Animation>,
    /// Bone name hashes from `SKL2`.
    pub skeleton: Vec<u32>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn material_index(&self, name: &str) -> Option<usize> {
        self.materials.iter().position(|m| m.name == name)
    }

    /// Add a material, replacing any existing one with the same name in place.
    pub fn insert_material(&mut self, material: Material) {
        match self.material_index(&material.name) {
            Some(index) => self.materials[index] = material,
            None => self.materials.push(material),
        }
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn model_index(&self, name: &str) -> Option<usize> {
        self.models.iter().position(|m| m.name == name)
    }
}

/// Axis-aligned bounds. A fresh box starts inverted so the first point
/// integrated sets both corners.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SceneAabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for SceneAabb {
    fn default() -> Self {
        Self {
            min: Vec3::splat(3.402_823_5e38),
            max: Vec3::splat(-3.402_823_5e38),
        }
    }
}

impl SceneAabb {
    pub fn integrate(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_material_replaces_by_name() {
        let mut scene = Scene::new("s");
        scene.insert_material(Material::builder().name("a").build());
        scene.insert_material(Material::builder().name("b").build());
        scene.insert_material(
            Material::builder()
                .name("a")
                .specular_color(Vec3::ZERO)
                .build(),
        );
        assert_eq!(scene.materials.len(), 2);
        assert_eq!(scene.material_index("a"), Some(0));
        assert_eq!(scene.material("a").unwrap().specular_color, Vec3::ZERO);
    }

    #[test]
    fn test_aabb() {
        let mut aabb = SceneAabb::default();
        assert!(aabb.is_empty());
        aabb.integrate(Vec3::new(-1.0, 0.0, 2.0));
        aabb.integrate(Vec3::new(1.0, 4.0, 0.0));
        assert!(!aabb.is_empty());
        assert_eq!(aabb.center(), Vec3::new(0.0, 2.0, 1.0));
        assert_eq!(aabb.half_extents(), Vec3::new(1.0, 2.0, 1.0));
    }
}
