use glam::{Quat, Vec3};
use itertools::Itertools;
use tracing::{debug, warn};

use crate::chunk::{ChunkError, ChunkWriter};
use crate::models::graph::scene_aabb;
use crate::models::{
    Animation, GeometrySegment, Material, Model, Primitives, Scene, VertexWeight,
};

use super::{MshError, SaveOptions, pack_color, strips, tags};

/// Framerate written to `SINF` when the scene has no animation.
const DEFAULT_FRAMERATE: f32 = 29.97003;

const TEXTURE_TAGS: [crate::chunk::Tag; 4] = [tags::TX0D, tags::TX1D, tags::TX2D, tags::TX3D];

/// Serialize a scene to `.msh` bytes.
///
/// Segments that are empty are skipped; other invalid segments are an
/// error. Call [`crate::models::graph::prepare_scene`] first to get a scene
/// into the shape the engine expects.
pub fn save_scene(scene: &Scene, options: &SaveOptions) -> Result<Vec<u8>, MshError> {
    let mut buf = Vec::new();
    ChunkWriter::write_root(&mut buf, tags::HEDR, |hedr| write_hedr(hedr, scene, options))?;
    Ok(buf)
}

fn write_hedr(
    hedr: &mut ChunkWriter<'_>,
    scene: &Scene,
    options: &SaveOptions,
) -> Result<(), MshError> {
    hedr.child(tags::MSH2, |msh2| write_msh2(msh2, scene, options))?;
    if let Some(animation) = &scene.animation {
        write_animation(hedr, animation)?;
    }
    hedr.leaf(tags::CL1L, |_| {})?;
    Ok(())
}

fn write_msh2(
    msh2: &mut ChunkWriter<'_>,
    scene: &Scene,
    options: &SaveOptions,
) -> Result<(), MshError> {
    msh2.child(tags::SINF, |sinf| write_sinf(sinf, scene))?;
    msh2.child(tags::MATL, |matl| write_matl(matl, scene))?;
    for (index, model) in scene.models.iter().enumerate() {
        msh2.child(tags::MODL, |modl| write_modl(modl, scene, model, index, options))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SINF / MATL
// ---------------------------------------------------------------------------

fn write_sinf(sinf: &mut ChunkWriter<'_>, scene: &Scene) -> Result<(), ChunkError> {
    sinf.leaf(tags::NAME, |name| name.write_string(&scene.name))?;

    let (start, end, framerate) = scene.animation.as_ref().map_or((0, 1, DEFAULT_FRAMERATE), |a| {
        (a.start_index as i32, a.end_index as i32, a.framerate)
    });
    sinf.leaf(tags::FRAM, |fram| {
        fram.write_i32(start);
        fram.write_i32(end);
        fram.write_f32(framerate);
    })?;

    let aabb = scene_aabb(scene);
    let (center, half_extents) = if aabb.is_empty() {
        (Vec3::ZERO, Vec3::ZERO)
    } else {
        (aabb.center(), aabb.half_extents())
    };
    sinf.leaf(tags::BBOX, |bbox| {
        bbox.write_quat(Quat::IDENTITY);
        bbox.write_vec3(center);
        bbox.write_vec3(half_extents);
        bbox.write_f32(half_extents.length());
    })
}

fn write_matl(matl: &mut ChunkWriter<'_>, scene: &Scene) -> Result<(), ChunkError> {
    if scene.materials.is_empty() {
        let fallback = Material::default_white(format!("{}Material", scene.name));
        matl.write_u32(1);
        return matl.child(tags::MATD, |matd| write_matd(matd, &fallback));
    }

    matl.write_u32(scene.materials.len() as u32);
    for material in &scene.materials {
        matl.child(tags::MATD, |matd| write_matd(matd, material))?;
    }
    Ok(())
}

fn write_matd(matd: &mut ChunkWriter<'_>, material: &Material) -> Result<(), ChunkError> {
    matd.leaf(tags::NAME, |name| name.write_string(&material.name))?;
    matd.leaf(tags::DATA, |data| {
        // Diffuse, specular, ambient, specular exponent. Only specular is
        // used by the engine.
        data.write_f32s(&[1.0, 1.0, 1.0, 1.0]);
        data.write_vec3(material.specular_color);
        data.write_f32(1.0);
        data.write_f32s(&[0.0, 0.0, 0.0, 1.0]);
        data.write_f32(50.0);
    })?;
    matd.leaf(tags::ATRB, |atrb| {
        atrb.write_u8(material.flags.bits());
        atrb.write_u8(material.rendertype.id());
        atrb.write_bytes(&material.rendertype.data());
    })?;
    for (tag, texture) in TEXTURE_TAGS
        .iter()
        .zip(&material.textures)
        .take(material.texture_slots_in_use())
    {
        matd.leaf(*tag, |tx| tx.write_string(texture))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// MODL
// ---------------------------------------------------------------------------

fn write_modl(
    modl: &mut ChunkWriter<'_>,
    scene: &Scene,
    model: &Model,
    index: usize,
    options: &SaveOptions,
) -> Result<(), MshError> {
    modl.leaf(tags::MTYP, |mtyp| mtyp.write_u32(model.model_type.raw()))?;
    modl.leaf(tags::MNDX, |mndx| mndx.write_u32(index as u32 + 1))?;
    modl.leaf(tags::NAME, |name| name.write_string(&model.name))?;
    if !model.is_root() {
        modl.leaf(tags::PRNT, |prnt| prnt.write_string(&model.parent))?;
    }
    if model.hidden {
        modl.leaf(tags::FLGS, |flgs| flgs.write_u32(1))?;
    }
    modl.leaf(tags::TRAN, |tran| {
        // Scale is ignored by the engine.
        tran.write_vec3(Vec3::ONE);
        tran.write_quat(model.transform.rotation);
        tran.write_vec3(model.transform.translation);
    })?;

    let segments: Vec<(usize, &GeometrySegment)> = model
        .geometry
        .iter()
        .enumerate()
        .filter(|(index, segment)| {
            let writable = segment.is_writable();
            if !writable {
                warn!("skipping empty segment {index} of '{}'", model.name);
            }
            writable
        })
        .collect();
    if !segments.is_empty() || !model.bone_map.is_empty() {
        modl.child(tags::GEOM, |geom| {
            write_geom(geom, scene, model, &segments, options)
        })?;
    }

    if let Some(collision) = &model.collision {
        modl.leaf(tags::SWCI, |swci| {
            swci.write_u32(collision.shape.raw());
            swci.write_f32(collision.radius);
            swci.write_f32(collision.height);
            swci.write_f32(collision.length);
        })?;
    }
    Ok(())
}

/// Bones a model's weights refer to, as positions in `scene.models`. The
/// bone map comes first so vertex-group order survives a round trip.
fn build_envelope(scene: &Scene, model: &Model) -> Result<Vec<usize>, MshError> {
    let mut envelope = model
        .bone_map
        .iter()
        .map(|bone| {
            scene
                .model_index(bone)
                .ok_or_else(|| MshError::UnknownBoneName {
                    model: model.name.clone(),
                    bone: bone.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let bones = model
        .geometry
        .iter()
        .filter_map(|s| s.weights.as_ref())
        .flatten()
        .flatten()
        .map(|w| w.bone);
    for bone in bones {
        if bone as usize >= scene.models.len() {
            return Err(MshError::UnknownBone {
                model: model.name.clone(),
                bone,
            });
        }
        if !envelope.contains(&(bone as usize)) {
            envelope.push(bone as usize);
        }
    }
    Ok(envelope)
}

fn write_geom(
    geom: &mut ChunkWriter<'_>,
    scene: &Scene,
    model: &Model,
    segments: &[(usize, &GeometrySegment)],
    options: &SaveOptions,
) -> Result<(), MshError> {
    let envelope = build_envelope(scene, model)?;

    for (index, segment) in segments {
        segment.validate().map_err(|source| MshError::Segment {
            model: model.name.clone(),
            segment: *index,
            source,
        })?;
        let material = material_index(scene, model, *index, segment)?;
        geom.child(tags::SEGM, |segm| {
            write_segm(segm, segment, material, &envelope, options)
        })?;
    }

    if !envelope.is_empty() {
        geom.leaf(tags::ENVL, |envl| {
            envl.write_u32(envelope.len() as u32);
            for bone in &envelope {
                envl.write_u32(*bone as u32 + 1);
            }
        })?;
    }
    Ok(())
}

/// An empty material name picks the first material.
fn material_index(
    scene: &Scene,
    model: &Model,
    index: usize,
    segment: &GeometrySegment,
) -> Result<u32, MshError> {
    if scene.materials.is_empty() || segment.material_name.is_empty() {
        return Ok(0);
    }
    scene
        .material_index(&segment.material_name)
        .map(|i| i as u32)
        .ok_or_else(|| MshError::UnknownMaterial {
            model: model.name.clone(),
            segment: index,
            material: segment.material_name.clone(),
        })
}

// ---------------------------------------------------------------------------
// SEGM
// ---------------------------------------------------------------------------

fn write_segm(
    segm: &mut ChunkWriter<'_>,
    segment: &GeometrySegment,
    material: u32,
    envelope: &[usize],
    options: &SaveOptions,
) -> Result<(), ChunkError> {
    segm.leaf(tags::MATI, |mati| mati.write_u32(material))?;

    let triangles = match &segment.primitives {
        Primitives::Shadow(shadow) => {
            return segm.leaf(tags::SHDW, |shdw| {
                shdw.write_u32(shadow.positions.len() as u32);
                shadow.positions.iter().for_each(|p| shdw.write_vec3(*p));
                shdw.write_u32(shadow.edges.len() as u32);
                for edge in &shadow.edges {
                    shdw.write_u16s(&[edge.vertex, edge.next, edge.twin, edge.unused]);
                }
            });
        }
        Primitives::Strips(_) | Primitives::Empty => None,
        surface => Some(surface.to_triangles()),
    };

    segm.leaf(tags::POSL, |posl| {
        posl.write_u32(segment.positions.len() as u32);
        segment.positions.iter().for_each(|p| posl.write_vec3(*p));
    })?;

    if let Some(weights) = &segment.weights {
        segm.leaf(tags::WGHT, |wght| {
            wght.write_u32(weights.len() as u32);
            for vertex in weights {
                for weight in normalize_vertex_weights(vertex) {
                    let slot = envelope
                        .iter()
                        .position(|bone| *bone == weight.bone as usize)
                        .unwrap_or(0);
                    wght.write_i32(slot as i32);
                    wght.write_f32(weight.weight);
                }
            }
        })?;
    }

    segm.leaf(tags::NRML, |nrml| {
        nrml.write_u32(segment.normals.len() as u32);
        segment.normals.iter().for_each(|n| nrml.write_vec3(*n));
    })?;

    if let Some(colors) = &segment.colors {
        segm.leaf(tags::CLRL, |clrl| {
            clrl.write_u32(colors.len() as u32);
            colors.iter().for_each(|c| clrl.write_u32(pack_color(*c)));
        })?;
    }

    segm.leaf(tags::UV0L, |uv0l| {
        uv0l.write_u32(segment.texcoords.len() as u32);
        segment.texcoords.iter().for_each(|uv| uv0l.write_vec2(*uv));
    })?;

    if let Primitives::Polygons(polygons) = &segment.primitives {
        segm.leaf(tags::NDXL, |ndxl| {
            ndxl.write_u32(polygons.len() as u32);
            for polygon in polygons {
                ndxl.write_u16(polygon.len() as u16);
                ndxl.write_u16s(polygon);
            }
        })?;
    }

    let strip_list = match (&segment.primitives, &triangles) {
        (Primitives::Strips(strip_list), _) => strip_list.clone(),
        (_, Some(triangles)) => {
            segm.leaf(tags::NDXT, |ndxt| {
                ndxt.write_u32(triangles.len() as u32);
                triangles.iter().for_each(|t| ndxt.write_u16s(t));
            })?;
            if options.generate_triangle_strips {
                strips::create_triangle_strips(triangles)
            } else {
                strips::degenerate_strips(triangles)
            }
        }
        _ => Vec::new(),
    };
    debug!(
        "{} strips for {} triangles",
        strip_list.len(),
        triangles.as_ref().map_or(0, Vec::len)
    );

    let indices = strips::encode_strips(&strip_list);
    segm.leaf(tags::STRP, |strp| {
        strp.write_u32(indices.len() as u32);
        strp.write_u16s(&indices);
    })
}

/// Keep the four strongest influences, pad with empty slots and scale the
/// result to sum to one.
pub fn normalize_vertex_weights(weights: &[VertexWeight]) -> [VertexWeight; 4] {
    let mut out = [VertexWeight::default(); 4];
    for (slot, weight) in out.iter_mut().zip(
        weights
            .iter()
            .sorted_by(|a, b| b.weight.total_cmp(&a.weight))
            .take(4),
    ) {
        *slot = *weight;
    }

    let total: f32 = out.iter().map(|w| w.weight).sum();
    if total > 0.0 {
        out.iter_mut().for_each(|w| w.weight /= total);
    }
    out
}

// ---------------------------------------------------------------------------
// Animation
// ---------------------------------------------------------------------------

fn write_animation(hedr: &mut ChunkWriter<'_>, animation: &Animation) -> Result<(), ChunkError> {
    let bone_count = animation.bone_frames.len() as u32;

    hedr.leaf(tags::SKL2, |skl2| {
        skl2.write_u32(bone_count);
        for crc in animation.bone_crcs() {
            skl2.write_u32(crc);
            skl2.write_u32(0);
            // Rotation order and twist placeholders.
            skl2.write_f32s(&[1.0, 0.0, 0.0]);
        }
    })?;

    hedr.leaf(tags::BLN2, |bln2| {
        bln2.write_u32(bone_count);
        for crc in animation.bone_crcs() {
            bln2.write_u32(crc);
            bln2.write_u32(0);
        }
    })?;

    hedr.child(tags::ANM2, |anm2| {
        anm2.leaf(tags::CYCL, |cycl| {
            cycl.write_u32(1);
            let mut name = [0u8; 64];
            let bytes = animation.name.as_bytes();
            let len = bytes.len().min(name.len() - 1);
            name[..len].copy_from_slice(&bytes[..len]);
            cycl.write_bytes(&name);
            cycl.write_f32(animation.framerate);
            // Play style.
            cycl.write_u32(0);
            cycl.write_u32(animation.start_index);
            cycl.write_u32(animation.end_index);
        })?;

        anm2.leaf(tags::KFR3, |kfr3| {
            kfr3.write_u32(bone_count);
            for bone in &animation.bone_frames {
                kfr3.write_u32(bone.bone_crc);
                kfr3.write_u32(0);
                kfr3.write_u32(bone.translations.len() as u32);
                kfr3.write_u32(bone.rotations.len() as u32);
                for frame in &bone.translations {
                    kfr3.write_u32(frame.index);
                    kfr3.write_vec3(frame.translation);
                }
                for frame in &bone.rotations {
                    kfr3.write_u32(frame.index);
                    kfr3.write_quat(frame.rotation);
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msh::read_scene;

    #[test]
    fn test_five_equal_weights_keep_four() {
        let weights: Vec<_> = (0..5)
            .map(|bone| VertexWeight { weight: 0.2, bone })
            .collect();
        let normalized = normalize_vertex_weights(&weights);
        for w in normalized {
            assert!((w.weight - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_three_weights_renormalize() {
        let weights =
            [(0, 0.3), (1, 0.1), (2, 0.05)].map(|(bone, weight)| VertexWeight { weight, bone });
        let normalized = normalize_vertex_weights(&weights);
        let expected = [0.3 / 0.45, 0.1 / 0.45, 0.05 / 0.45, 0.0];
        for (slot, (weight, expected)) in normalized.iter().zip(expected).enumerate() {
            assert!((weight.weight - expected).abs() < 1e-5, "slot {slot}");
        }
        assert_eq!(normalized.map(|w| w.bone), [0, 1, 2, 0]);
    }

    #[test]
    fn test_weights_sorted_and_padded() {
        let weights = [
            VertexWeight {
                weight: 0.25,
                bone: 1,
            },
            VertexWeight {
                weight: 0.75,
                bone: 2,
            },
        ];
        let normalized = normalize_vertex_weights(&weights);
        assert_eq!(normalized[0].bone, 2);
        assert_eq!(normalized[1].bone, 1);
        assert_eq!(normalized[2], VertexWeight::default());
        let total: f32 = normalized.iter().map(|w| w.weight).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    fn strip_count(options: &SaveOptions) -> usize {
        let mut scene = Scene::new("quad");
        let mut model = Model::builder().name("quad").build();
        model.geometry.push(GeometrySegment {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE],
            primitives: Primitives::Triangles(vec![[0, 1, 2], [2, 1, 3]]),
            ..Default::default()
        });
        scene.models.push(model);

        let read = read_scene(&save_scene(&scene, options).unwrap()).unwrap();
        let segment = &read.models[0].geometry[0];
        assert_eq!(segment.triangles(), vec![[0, 1, 2], [2, 1, 3]]);

        let data = save_scene(&scene, options).unwrap();
        let pos = data.windows(4).position(|w| w == b"STRP").unwrap();
        let indices = u32::from_le_bytes(data[pos + 8..pos + 12].try_into().unwrap()) as usize;
        let stream: Vec<u16> = data[pos + 12..pos + 12 + indices * 2]
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect();
        strips::decode_strips(&stream).len()
    }

    #[test]
    fn test_strips_are_opt_in() {
        assert_eq!(strip_count(&SaveOptions::default()), 2);
        let options = SaveOptions::builder().generate_triangle_strips(true).build();
        assert_eq!(strip_count(&options), 1);
    }

    #[test]
    fn test_empty_scene_gets_default_material() {
        let scene = Scene::new("empty");
        let data = save_scene(&scene, &SaveOptions::default()).unwrap();
        assert_eq!(&data[..4], b"HEDR");
        assert_eq!(&data[data.len() - 8..], b"CL1L\0\0\0\0");

        let read = read_scene(&data).unwrap();
        assert_eq!(read.name, "empty");
        assert_eq!(read.materials.len(), 1);
        assert_eq!(read.materials[0].name, "emptyMaterial");
        assert_eq!(read.materials[0].diffuse_map(), "white.tga");
    }

    #[test]
    fn test_unknown_material_is_rejected() {
        let mut scene = Scene::new("s");
        scene.materials.push(Material::builder().name("real").build());
        let mut model = Model::builder().name("mesh").build();
        model.geometry.push(GeometrySegment {
            material_name: "missing".into(),
            positions: vec![Vec3::ZERO; 3],
            primitives: Primitives::Triangles(vec![[0, 1, 2]]),
            ..Default::default()
        });
        scene.models.push(model);

        assert!(matches!(
            save_scene(&scene, &SaveOptions::default()),
            Err(MshError::UnknownMaterial { .. })
        ));
    }

    #[test]
    fn test_segment_over_index_limit_is_rejected() {
        let mut scene = Scene::new("s");
        let mut model = Model::builder().name("mesh").build();
        model.geometry.push(GeometrySegment {
            positions: vec![Vec3::ZERO; 3],
            primitives: Primitives::Triangles(vec![[0, 1, 0x8000]]),
            ..Default::default()
        });
        scene.models.push(model);

        assert!(matches!(
            save_scene(&scene, &SaveOptions::default()),
            Err(MshError::Segment { .. })
        ));
    }
}
