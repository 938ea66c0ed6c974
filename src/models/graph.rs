use std::collections::{HashMap, HashSet};

use bon::Builder;
use glam::{Mat4, Vec2, Vec3};
use tracing::{debug, warn};

use crate::models::geometry::{GeometrySegment, Primitives};
use crate::models::model::{Model, ModelType};
use crate::models::scene::{Scene, SceneAabb};

/// Name given to the root synthesized by [`reparent_model_roots`].
pub const SCENE_ROOT_NAME: &str = "SceneRoot";

/// Options for [`prepare_scene`].
#[derive(Debug, Clone, Default, Builder)]
pub struct PrepareOptions {
    /// The scene only carries a skeleton; give the root placeholder geometry
    /// so the engine accepts the file.
    #[builder(default)]
    pub skeleton_only: bool,
}

/// Apply the fixups needed before a scene can be saved.
pub fn prepare_scene(scene: &mut Scene, options: &PrepareOptions) {
    sort_by_parent(scene);
    prune_invalid_segments(scene);
    reparent_model_roots(scene);
    remove_unused_materials(scene);

    if options.skeleton_only
        && let Some(root) = scene.models.first_mut()
        && matches!(root.model_type(), Some(ModelType::Null | ModelType::Bone))
    {
        inject_dummy_data(root);
    }
}

/// Rearrange `scene.models` into `order` (new position -> old position) and
/// fix up weight bone references to match.
fn reorder_models(scene: &mut Scene, order: &[usize]) {
    let mut old_to_new = vec![0u32; scene.models.len()];
    for (new, old) in order.iter().enumerate() {
        old_to_new[*old] = new as u32;
    }

    let mut slots: Vec<Option<Model>> = std::mem::take(&mut scene.models)
        .into_iter()
        .map(Some)
        .collect();
    scene.models = order.iter().filter_map(|old| slots[*old].take()).collect();

    remap_weight_bones(scene, |bone| old_to_new.get(bone as usize).copied());
}

fn remap_weight_bones(scene: &mut Scene, remap: impl Fn(u32) -> Option<u32>) {
    let weights = scene
        .models
        .iter_mut()
        .flat_map(|m| m.geometry.iter_mut())
        .filter_map(|s| s.weights.as_mut())
        .flatten()
        .flatten();
    for weight in weights {
        if let Some(bone) = remap(weight.bone) {
            weight.bone = bone;
        }
    }
}

/// Order models so every model comes after its parent (pre-order from the
/// roots, siblings in their original order). Models whose parent does not
/// exist are kept and moved to the end.
pub fn sort_by_parent(scene: &mut Scene) {
    let models = &scene.models;
    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, model) in models.iter().enumerate() {
        if !model.is_root() {
            children.entry(model.parent.as_str()).or_default().push(index);
        }
    }

    let mut visited = vec![false; models.len()];
    let mut order = Vec::with_capacity(models.len());
    let mut stack: Vec<usize> = models
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, m)| m.is_root())
        .map(|(index, _)| index)
        .collect();

    while let Some(index) = stack.pop() {
        if std::mem::replace(&mut visited[index], true) {
            continue;
        }
        order.push(index);
        if let Some(kids) = children.get(models[index].name.as_str()) {
            stack.extend(kids.iter().rev().filter(|k| !visited[**k]));
        }
    }

    for (index, model) in models.iter().enumerate() {
        if !visited[index] {
            warn!(
                "model '{}' has unreachable parent '{}'",
                model.name, model.parent
            );
            order.push(index);
        }
    }

    reorder_models(scene, &order);
}

/// If there is more than one root, parent all roots to a new NULL model
/// inserted at the front. Returns the new root's name.
pub fn reparent_model_roots(scene: &mut Scene) -> Option<String> {
    let roots: Vec<usize> = scene
        .models
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_root())
        .map(|(index, _)| index)
        .collect();
    if roots.len() <= 1 {
        return None;
    }

    let taken: HashSet<&str> = scene.models.iter().map(|m| m.name.as_str()).collect();
    let name = if !taken.contains(SCENE_ROOT_NAME) {
        SCENE_ROOT_NAME.to_string()
    } else {
        (0..=scene.models.len())
            .map(|i| format!("{SCENE_ROOT_NAME}{i}"))
            .find(|candidate| !taken.contains(candidate.as_str()))?
    };
    debug!("parenting {} roots under '{name}'", roots.len());

    for index in roots {
        scene.models[index].parent = name.clone();
    }
    scene.models.insert(
        0,
        Model::builder()
            .name(name.clone())
            .model_type(ModelType::Null.into())
            .build(),
    );
    remap_weight_bones(scene, |bone| Some(bone + 1));
    Some(name)
}

/// Compose local transforms from the root down to `model`.
pub fn model_world_matrix(model: &Model, models: &[Model]) -> Mat4 {
    let mut matrix = model.transform.matrix();
    let mut current = model;
    // Bounded walk so a parent cycle cannot loop forever.
    for _ in 0..models.len() {
        if current.is_root() {
            break;
        }
        let Some(parent) = models.iter().find(|m| m.name == current.parent) else {
            break;
        };
        matrix = parent.transform.matrix() * matrix;
        current = parent;
    }
    matrix
}

/// World-space bounds over every visible model's segment positions.
pub fn scene_aabb(scene: &Scene) -> SceneAabb {
    let mut aabb = SceneAabb::default();
    for model in scene
        .models
        .iter()
        .filter(|m| !m.hidden && m.has_geometry())
    {
        let matrix = model_world_matrix(model, &scene.models);
        model
            .geometry
            .iter()
            .flat_map(|segment| segment.positions.iter())
            .for_each(|p| aabb.integrate(matrix.transform_point3(*p)));
    }
    aabb
}

/// Drop segments that have no positions or no primitives.
pub fn prune_invalid_segments(scene: &mut Scene) {
    for model in &mut scene.models {
        let before = model.geometry.len();
        model.geometry.retain(GeometrySegment::is_writable);
        if model.geometry.len() != before {
            debug!(
                "dropped {} empty segments from '{}'",
                before - model.geometry.len(),
                model.name
            );
        }
    }
}

/// Drop materials no segment refers to. Order of the survivors is kept.
pub fn remove_unused_materials(scene: &mut Scene) {
    let used: HashSet<&str> = scene
        .models
        .iter()
        .flat_map(|m| m.geometry.iter())
        .map(|s| s.material_name.as_str())
        .collect();
    scene.materials.retain(|m| used.contains(m.name.as_str()));
}

/// Replace a model's geometry with a hidden, single-triangle placeholder.
pub fn inject_dummy_data(model: &mut Model) {
    let segment = GeometrySegment {
        positions: vec![
            Vec3::new(0.0, 0.1, 0.0),
            Vec3::new(0.1, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 0.1),
        ],
        normals: vec![Vec3::Y, Vec3::X, Vec3::Z],
        texcoords: vec![
            Vec2::new(0.1, 0.1),
            Vec2::new(0.2, 0.2),
            Vec2::new(0.3, 0.3),
        ],
        primitives: Primitives::Triangles(vec![[0, 1, 2]]),
        ..Default::default()
    };
    model.geometry = vec![segment];
    model.hidden = true;
    model.model_type = ModelType::Static.into();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::geometry::VertexWeight;
    use crate::models::material::Material;
    use glam::Quat;

    fn model(name: &str, parent: &str) -> Model {
        Model::builder().name(name).parent(parent).build()
    }

    fn names(scene: &Scene) -> Vec<&str> {
        scene.models.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn test_sort_by_parent_pre_order() {
        let mut scene = Scene::new("s");
        scene.models = vec![
            model("child_b", "root"),
            model("grandchild", "child_a"),
            model("root", ""),
            model("child_a", "root"),
        ];
        sort_by_parent(&mut scene);
        assert_eq!(names(&scene), vec!["root", "child_b", "child_a", "grandchild"]);
    }

    #[test]
    fn test_sort_keeps_orphans_and_remaps_weights() {
        let mut scene = Scene::new("s");
        let mut skinned = model("mesh", "bone");
        skinned.geometry = vec![GeometrySegment {
            weights: Some(vec![vec![VertexWeight {
                weight: 1.0,
                bone: 2,
            }]]),
            ..Default::default()
        }];
        scene.models = vec![skinned, model("orphan", "missing"), model("bone", "")];
        sort_by_parent(&mut scene);

        assert_eq!(names(&scene), vec!["bone", "mesh", "orphan"]);
        let weights = scene.models[1].geometry[0].weights.as_ref().unwrap();
        assert_eq!(weights[0][0].bone, 0);
    }

    #[test]
    fn test_reparent_roots() {
        let mut scene = Scene::new("s");
        scene.models = vec![model("a", ""), model("SceneRoot", "a"), model("b", "")];
        let root = reparent_model_roots(&mut scene).unwrap();
        assert_eq!(root, "SceneRoot0");
        assert_eq!(scene.models[0].name, "SceneRoot0");
        assert_eq!(scene.models[1].parent, "SceneRoot0");
        assert_eq!(scene.models[3].parent, "SceneRoot0");
        assert_eq!(scene.models[2].parent, "a");

        let mut single = Scene::new("s");
        single.models = vec![model("a", "")];
        assert_eq!(reparent_model_roots(&mut single), None);
        assert_eq!(single.models.len(), 1);
    }

    #[test]
    fn test_world_matrix_composes_root_to_leaf() {
        let mut root = model("root", "");
        root.transform.rotation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let mut child = model("child", "root");
        child.transform.translation = Vec3::X;
        let models = vec![root, child];

        let p = model_world_matrix(&models[1], &models).transform_point3(Vec3::ZERO);
        assert!((p - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_aabb_skips_hidden_models() {
        let mut scene = Scene::new("s");
        let mut visible = model("visible", "");
        visible.transform.translation = Vec3::new(10.0, 0.0, 0.0);
        visible.geometry = vec![GeometrySegment {
            positions: vec![Vec3::ZERO, Vec3::ONE],
            ..Default::default()
        }];
        let mut hidden = model("hidden", "");
        hidden.hidden = true;
        hidden.geometry = vec![GeometrySegment {
            positions: vec![Vec3::splat(100.0)],
            ..Default::default()
        }];
        scene.models = vec![visible, hidden];

        let aabb = scene_aabb(&scene);
        assert_eq!(aabb.min, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(11.0, 1.0, 1.0));
    }

    #[test]
    fn test_prepare_scene_prunes() {
        let mut scene = Scene::new("s");
        scene.materials = vec![
            Material::builder().name("used").build(),
            Material::builder().name("unused").build(),
        ];
        let mut mesh = model("mesh", "");
        mesh.geometry = vec![
            GeometrySegment {
                material_name: "used".into(),
                positions: vec![Vec3::ZERO; 3],
                primitives: Primitives::Triangles(vec![[0, 1, 2]]),
                ..Default::default()
            },
            GeometrySegment {
                material_name: "unused".into(),
                ..Default::default()
            },
        ];
        scene.models = vec![mesh, model("other_root", "")];

        prepare_scene(&mut scene, &PrepareOptions::default());
        assert_eq!(scene.models[0].name, SCENE_ROOT_NAME);
        assert_eq!(scene.models[1].geometry.len(), 1);
        assert_eq!(scene.materials.len(), 1);
        assert_eq!(scene.materials[0].name, "used");
    }

    #[test]
    fn test_skeleton_only_injects_dummy() {
        let mut scene = Scene::new("s");
        scene.models = vec![model("root", ""), model("bone", "root")];
        prepare_scene(&mut scene, &PrepareOptions::builder().skeleton_only(true).build());

        let root = &scene.models[0];
        assert!(root.hidden);
        assert_eq!(root.model_type(), Some(ModelType::Static));
        assert_eq!(root.geometry[0].triangles(), vec![[0, 1, 2]]);
    }
}
