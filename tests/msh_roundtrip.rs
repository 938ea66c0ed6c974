use glam::{Quat, Vec2, Vec3, Vec4};

use swbfmsh::crc::to_crc;
use swbfmsh::models::graph::{PrepareOptions, SCENE_ROOT_NAME, prepare_scene};
use swbfmsh::models::{
    Animation, BoneFrames, CollisionPrimitive, CollisionShape, GeometrySegment, HalfEdge, Material,
    Model, ModelTransform, ModelType, Primitives, RotationFrame, Scene, ShadowGeometry,
    TranslationFrame, VertexWeight,
};
use swbfmsh::msh::{SaveOptions, read_scene, read_scene_file, save_scene, save_scene_file};

fn triangle_segment(material: &str) -> GeometrySegment {
    GeometrySegment {
        material_name: material.to_string(),
        positions: vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ],
        normals: vec![Vec3::Z; 3],
        texcoords: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
        primitives: Primitives::Triangles(vec![[0, 1, 2]]),
        ..Default::default()
    }
}

fn triangle_scene() -> Scene {
    let mut scene = Scene::new("tri");
    scene.materials.push(
        Material::builder()
            .name("tri_mat")
            .textures(["tri.tga".to_string(), String::new(), String::new(), String::new()])
            .build(),
    );
    scene.models.push(
        Model::builder()
            .name("tri")
            .model_type(ModelType::Static.into())
            .transform(ModelTransform {
                translation: Vec3::new(1.0, 2.0, 3.0),
                rotation: Quat::IDENTITY,
            })
            .geometry(vec![triangle_segment("tri_mat")])
            .build(),
    );
    scene
}

/// Payload of the first chunk tagged `tag`, found by scanning.
fn find_chunk<'a>(data: &'a [u8], tag: &[u8; 4]) -> &'a [u8] {
    let pos = data
        .windows(4)
        .position(|w| w == tag)
        .unwrap_or_else(|| panic!("no {} chunk", String::from_utf8_lossy(tag)));
    let len = u32::from_le_bytes(data[pos + 4..pos + 8].try_into().unwrap()) as usize;
    &data[pos + 8..pos + 8 + len]
}

#[test]
fn single_triangle_scene() {
    let scene = triangle_scene();
    let data = save_scene(&scene, &SaveOptions::default()).unwrap();

    let ndxt = find_chunk(&data, b"NDXT");
    assert_eq!(u32::from_le_bytes(ndxt[..4].try_into().unwrap()), 1);
    let strp = find_chunk(&data, b"STRP");
    assert_eq!(u32::from_le_bytes(strp[..4].try_into().unwrap()), 3);

    let read = read_scene(&data).unwrap();
    assert_eq!(read.name, "tri");
    assert_eq!(read.materials.len(), 1);
    assert_eq!(read.materials[0].name, "tri_mat");
    assert_eq!(read.materials[0].diffuse_map(), "tri.tga");

    assert_eq!(read.models.len(), 1);
    let model = &read.models[0];
    assert_eq!(model.name, "tri");
    assert_eq!(model.model_type(), Some(ModelType::Static));
    assert_eq!(model.transform.translation, Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(model.geometry, scene.models[0].geometry);
}

#[test]
fn chunk_lengths_are_consistent() {
    let data = save_scene(&triangle_scene(), &SaveOptions::default()).unwrap();
    assert_eq!(&data[..4], b"HEDR");
    let hedr_len = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
    assert_eq!(hedr_len + 8, data.len());
    assert_eq!(hedr_len % 4, 0);
}

#[test]
fn strips_only_segment_round_trips() {
    let mut scene = triangle_scene();
    scene.models[0].geometry[0].primitives = Primitives::Strips(vec![vec![0, 1, 2]]);
    let data = save_scene(&scene, &SaveOptions::default()).unwrap();
    assert!(!data.windows(4).any(|w| w == b"NDXT"));

    let read = read_scene(&data).unwrap();
    assert_eq!(
        read.models[0].geometry[0].primitives,
        Primitives::Strips(vec![vec![0, 1, 2]])
    );
}

#[test]
fn polygons_are_preferred_on_read() {
    let mut scene = triangle_scene();
    let segment = &mut scene.models[0].geometry[0];
    segment.positions.push(Vec3::ONE);
    segment.normals.push(Vec3::Z);
    segment.texcoords.push(Vec2::ONE);
    segment.primitives = Primitives::Polygons(vec![vec![0, 1, 3, 2]]);

    let read = read_scene(&save_scene(&scene, &SaveOptions::default()).unwrap()).unwrap();
    let segment = &read.models[0].geometry[0];
    assert_eq!(segment.primitives, Primitives::Polygons(vec![vec![0, 1, 3, 2]]));
    assert_eq!(segment.triangles(), vec![[0, 1, 3], [0, 3, 2]]);
}

#[test]
fn colors_collision_and_hidden_round_trip() {
    let mut scene = triangle_scene();
    let model = &mut scene.models[0];
    model.hidden = true;
    model.collision = Some(CollisionPrimitive {
        shape: CollisionShape::Cylinder.into(),
        radius: 0.5,
        height: 2.0,
        length: 0.0,
    });
    model.geometry[0].colors = Some(vec![
        Vec4::new(1.0, 0.0, 0.0, 1.0),
        Vec4::ONE,
        Vec4::new(0.0, 0.0, 1.0, 0.0),
    ]);

    let read = read_scene(&save_scene(&scene, &SaveOptions::default()).unwrap()).unwrap();
    assert_eq!(read.models[0], scene.models[0]);
}

#[test]
fn unknown_collision_shape_is_preserved() {
    let mut scene = triangle_scene();
    scene.models[0].collision = Some(CollisionPrimitive {
        shape: swbfmsh::recognized::Recognized::Unknown(7),
        radius: 1.0,
        height: 1.0,
        length: 1.0,
    });

    let read = read_scene(&save_scene(&scene, &SaveOptions::default()).unwrap()).unwrap();
    assert_eq!(read.models[0].collision, scene.models[0].collision);
}

#[test]
fn shadow_geometry_round_trips() {
    let mut scene = triangle_scene();
    let edge = |vertex, next| HalfEdge {
        vertex,
        next,
        twin: HalfEdge::NONE,
        unused: HalfEdge::NONE,
    };
    let shadow = ShadowGeometry {
        positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
        edges: vec![edge(0, 1), edge(1, 2), edge(2, 0)],
    };
    scene.models.push(
        Model::builder()
            .name("tri_shadow")
            .parent("tri")
            .geometry(vec![GeometrySegment {
                material_name: "tri_mat".to_string(),
                primitives: Primitives::Shadow(shadow.clone()),
                ..Default::default()
            }])
            .build(),
    );

    let data = save_scene(&scene, &SaveOptions::default()).unwrap();
    let read = read_scene(&data).unwrap();
    let segment = &read.model("tri_shadow").unwrap().geometry[0];
    assert_eq!(segment.material_name, "tri_mat");
    assert!(segment.positions.is_empty());
    let Primitives::Shadow(read_shadow) = &segment.primitives else {
        panic!("expected shadow geometry, got {:?}", segment.primitives);
    };
    assert_eq!(read_shadow, &shadow);
    assert_eq!(read_shadow.faces(), vec![vec![0, 1, 2]]);
}

fn skinned_scene() -> Scene {
    let mut scene = Scene::new("skinned");
    scene.materials.push(Material::default_white("skin_mat"));
    scene.models.push(Model::builder().name("root").build());
    for bone in ["bone_a", "bone_b", "bone_c", "bone_d", "bone_e"] {
        scene.models.push(
            Model::builder()
                .name(bone)
                .parent("root")
                .model_type(ModelType::Bone.into())
                .build(),
        );
    }

    let mut segment = triangle_segment("skin_mat");
    segment.weights = Some(vec![
        vec![
            VertexWeight {
                weight: 0.5,
                bone: 1,
            },
            VertexWeight {
                weight: 0.5,
                bone: 2,
            },
        ],
        vec![VertexWeight {
            weight: 1.0,
            bone: 2,
        }],
        (1..=5)
            .map(|bone| VertexWeight { weight: 0.2, bone })
            .collect(),
    ]);
    scene.models.push(
        Model::builder()
            .name("skin")
            .parent("root")
            .model_type(ModelType::Skin.into())
            .bone_map(vec!["bone_b".to_string(), "bone_a".to_string()])
            .geometry(vec![segment])
            .build(),
    );
    scene
}

#[test]
fn weights_resolve_to_model_positions() {
    let scene = skinned_scene();
    let read = read_scene(&save_scene(&scene, &SaveOptions::default()).unwrap()).unwrap();

    let skin = read.model("skin").unwrap();
    assert_eq!(
        &skin.bone_map[..2],
        &["bone_b".to_string(), "bone_a".to_string()]
    );
    let weights = skin.geometry[0].weights.as_ref().unwrap();

    assert_eq!(
        weights[0],
        vec![
            VertexWeight {
                weight: 0.5,
                bone: 1
            },
            VertexWeight {
                weight: 0.5,
                bone: 2
            },
        ]
    );
    assert_eq!(
        weights[1],
        vec![VertexWeight {
            weight: 1.0,
            bone: 2
        }]
    );

    // Five equal influences are cut to four and renormalized.
    assert_eq!(weights[2].len(), 4);
    for weight in &weights[2] {
        assert!((weight.weight - 0.25).abs() < 1e-5);
        assert_eq!(
            read.models[weight.bone as usize].model_type(),
            Some(ModelType::Bone)
        );
    }
}

#[test]
fn prepare_merges_roots_and_keeps_weights() {
    let mut scene = skinned_scene();
    scene.models.push(Model::builder().name("second_root").build());
    prepare_scene(&mut scene, &PrepareOptions::default());

    assert_eq!(scene.models[0].name, SCENE_ROOT_NAME);
    let skin = scene.model("skin").unwrap();
    let first = &skin.geometry[0].weights.as_ref().unwrap()[0][0];
    assert_eq!(scene.models[first.bone as usize].name, "bone_a");

    let read = read_scene(&save_scene(&scene, &SaveOptions::default()).unwrap()).unwrap();
    assert_eq!(read.models.len(), scene.models.len());
    let skin = read.model("skin").unwrap();
    let first = &skin.geometry[0].weights.as_ref().unwrap()[0][0];
    assert_eq!(read.models[first.bone as usize].name, "bone_a");
}

#[test]
fn animation_round_trips() {
    let mut scene = triangle_scene();
    let mut animation = Animation {
        name: "wave".to_string(),
        framerate: 30.0,
        start_index: 0,
        end_index: 9,
        ..Default::default()
    };
    let bone = animation.bone_mut(to_crc("tri"));
    bone.translations = vec![
        TranslationFrame {
            index: 0,
            translation: Vec3::ZERO,
        },
        TranslationFrame {
            index: 9,
            translation: Vec3::Y,
        },
    ];
    bone.rotations = vec![RotationFrame {
        index: 0,
        rotation: Quat::IDENTITY,
    }];
    scene.animation = Some(animation.clone());

    let read = read_scene(&save_scene(&scene, &SaveOptions::default()).unwrap()).unwrap();
    assert_eq!(read.animation, Some(animation));
    assert_eq!(read.skeleton, vec![to_crc("tri")]);
    let frames: &BoneFrames = read.animation.as_ref().unwrap().bone(to_crc("TRI")).unwrap();
    assert_eq!(frames.translations.len(), 2);
}

#[test]
fn file_helpers_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tri.msh");
    let scene = triangle_scene();

    save_scene_file(&path, &scene, &SaveOptions::default()).unwrap();
    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("tri.msh")]);

    let read = read_scene_file(&path).unwrap();
    assert_eq!(read.models[0].geometry, scene.models[0].geometry);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_scene_file(dir.path().join("missing.msh")).unwrap_err();
    assert!(matches!(err.kind, swbfmsh::error::ErrorKind::IoError(_)));
}
