use std::collections::HashMap;

use glam::Vec3;
use tracing::{debug, warn};
use winnow::Parser;
use winnow::binary::{le_f32, le_u16, le_u32};
use winnow::combinator::repeat;
use winnow::token::take;

use crate::chunk::parser_utils::{WResult, parse_quat, parse_vec3};
use crate::chunk::{ChunkError, ChunkReader, ChunkStream};
use crate::models::{
    Animation, BoneFrames, CollisionPrimitive, CollisionShape, GeometrySegment, HalfEdge, Material,
    MaterialFlags, Model, ModelTransform, ModelType, Primitives, Rendertype, RotationFrame, Scene,
    ShadowGeometry, TranslationFrame, VertexWeight,
};

use super::{MshError, strips, tags, unpack_color};

/// Weights at or below this are treated as absent.
const MIN_WEIGHT: f32 = 1e-6;

/// Length of the fixed name field in `CYCL`.
const CYCLE_NAME_LEN: usize = 64;

/// Parse a complete `.msh` file.
pub fn read_scene(data: &[u8]) -> Result<Scene, MshError> {
    let stream = ChunkStream::new(data);
    let mut root = stream.root()?;
    if !root.skip_until(tags::HEDR) {
        return Err(MshError::MissingHeader);
    }

    let mut scene = Scene::default();
    let mut state = ReadState::default();
    {
        let mut hedr = root.read_child()?;
        while hedr.could_have_child() {
            match hedr.peek_next_header() {
                Some(tags::MSH2) => read_msh2(&mut hedr.read_child()?, &mut scene, &mut state)?,
                Some(tags::SKL2) => scene.skeleton = read_skl2(&mut hedr.read_child()?)?,
                Some(tags::ANM2) => scene.animation = Some(read_anm2(&mut hedr.read_child()?)?),
                _ => skip_chunk(&mut hedr)?,
            }
        }
    }

    state.resolve_bones(&mut scene);
    Ok(scene)
}

// ---------------------------------------------------------------------------
// Per-file state
// ---------------------------------------------------------------------------

/// Cross-reference tables that only make sense for one file.
#[derive(Default)]
struct ReadState {
    /// `MATL` material names in file order, for `MATI` lookups.
    material_names: Vec<String>,
    /// `MNDX` value to position in `Scene::models`. First occurrence wins.
    model_positions: HashMap<u32, usize>,
    /// `(model position, ENVL table)` for every model that had one.
    envelopes: Vec<(usize, Vec<u32>)>,
}

impl ReadState {
    /// Turn `MNDX` values in weights into model positions and fill each
    /// skinned model's bone map.
    fn resolve_bones(&self, scene: &mut Scene) {
        for (position, envelope) in &self.envelopes {
            let bone_map = envelope
                .iter()
                .map(|mndx| match self.model_positions.get(mndx) {
                    Some(bone) => scene.models[*bone].name.clone(),
                    None => {
                        warn!(
                            "'{}' references missing model index {mndx}",
                            scene.models[*position].name
                        );
                        String::new()
                    }
                })
                .collect();

            let model = &mut scene.models[*position];
            model.bone_map = bone_map;
            let weights = model
                .geometry
                .iter_mut()
                .filter_map(|s| s.weights.as_mut())
                .flatten()
                .flatten();
            for weight in weights {
                match self.model_positions.get(&weight.bone) {
                    Some(bone) => weight.bone = *bone as u32,
                    None => warn!(
                        "'{}' weights reference missing model index {}",
                        model.name, weight.bone
                    ),
                }
            }
        }
    }
}

fn skip_chunk(parent: &mut ChunkReader<'_, '_>) -> Result<(), ChunkError> {
    let parent_tag = parent.tag();
    let child = parent.read_child()?;
    debug!(
        "skipping {} ({} bytes) in {parent_tag}",
        child.tag(),
        child.size()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// MSH2
// ---------------------------------------------------------------------------

fn read_msh2(
    msh2: &mut ChunkReader<'_, '_>,
    scene: &mut Scene,
    state: &mut ReadState,
) -> Result<(), MshError> {
    while msh2.could_have_child() {
        match msh2.peek_next_header() {
            Some(tags::SINF) => read_sinf(&mut msh2.read_child()?, scene)?,
            Some(tags::MATL) => read_matl(&mut msh2.read_child()?, scene, state)?,
            Some(tags::MODL) => {
                let model = read_modl(&mut msh2.read_child()?, scene.models.len(), state)?;
                scene.models.push(model);
            }
            _ => skip_chunk(msh2)?,
        }
    }
    Ok(())
}

/// Only the scene name is kept; frame range and bounds are derived data.
fn read_sinf(sinf: &mut ChunkReader<'_, '_>, scene: &mut Scene) -> Result<(), ChunkError> {
    while sinf.could_have_child() {
        match sinf.peek_next_header() {
            Some(tags::NAME) => scene.name = sinf.read_child()?.read_string()?,
            _ => skip_chunk(sinf)?,
        }
    }
    Ok(())
}

fn read_matl(
    matl: &mut ChunkReader<'_, '_>,
    scene: &mut Scene,
    state: &mut ReadState,
) -> Result<(), ChunkError> {
    let count = matl.read_u32()?;
    for _ in 0..count {
        let material = read_matd(&mut matl.read_child()?)?;
        state.material_names.push(material.name.clone());
        scene.insert_material(material);
    }
    Ok(())
}

fn read_matd(matd: &mut ChunkReader<'_, '_>) -> Result<Material, ChunkError> {
    let mut material = Material::builder().name(String::new()).build();

    while matd.could_have_child() {
        match matd.peek_next_header() {
            Some(tags::NAME) => material.name = matd.read_child()?.read_string()?,
            Some(tags::DATA) => {
                let mut data = matd.read_child()?;
                let _diffuse = data.read_f32_array(4)?;
                let specular = data.read_f32_array(4)?;
                material.specular_color = Vec3::new(specular[0], specular[1], specular[2]);
            }
            Some(tags::ATRB) => {
                let mut atrb = matd.read_child()?;
                material.flags = MaterialFlags::from_bits_retain(atrb.read_u8()?);
                let id = atrb.read_u8()?;
                let data = [atrb.read_u8()?, atrb.read_u8()?];
                material.rendertype = Rendertype::from_raw(id, data);
            }
            Some(tag @ (tags::TX0D | tags::TX1D | tags::TX2D | tags::TX3D)) => {
                let slot = (tag.0[2] - b'0') as usize;
                material.textures[slot] = matd.read_child()?.read_string()?;
            }
            _ => matd.skip_bytes(1),
        }
    }
    Ok(material)
}

// ---------------------------------------------------------------------------
// MODL
// ---------------------------------------------------------------------------

fn read_modl(
    modl: &mut ChunkReader<'_, '_>,
    position: usize,
    state: &mut ReadState,
) -> Result<Model, MshError> {
    let mut model = Model::builder().name(String::new()).build();

    while modl.could_have_child() {
        match modl.peek_next_header() {
            Some(tags::MTYP) => {
                model.model_type = ModelType::from_raw(modl.read_child()?.read_u32()?);
            }
            Some(tags::MNDX) => {
                let index = modl.read_child()?.read_u32()?;
                state.model_positions.entry(index).or_insert(position);
            }
            Some(tags::NAME) => model.name = modl.read_child()?.read_string()?,
            Some(tags::PRNT) => model.parent = modl.read_child()?.read_string()?,
            Some(tags::FLGS) => model.hidden = modl.read_child()?.read_u32()? != 0,
            Some(tags::TRAN) => model.transform = read_tran(&mut modl.read_child()?)?,
            Some(tags::GEOM) => {
                let envelope = read_geom(&mut modl.read_child()?, &mut model, state)?;
                if let Some(envelope) = envelope {
                    state.envelopes.push((position, envelope));
                }
            }
            Some(tags::SWCI) => {
                let mut swci = modl.read_child()?;
                model.collision = Some(CollisionPrimitive {
                    shape: CollisionShape::from_raw(swci.read_u32()?),
                    radius: swci.read_f32()?,
                    height: swci.read_f32()?,
                    length: swci.read_f32()?,
                });
            }
            _ => skip_chunk(modl)?,
        }
    }
    Ok(model)
}

fn read_tran(tran: &mut ChunkReader<'_, '_>) -> Result<ModelTransform, ChunkError> {
    // Scale is not used by the engine.
    tran.skip_bytes(12);
    let rotation = tran.read_quat()?;
    let translation = tran.read_vec3()?;
    Ok(ModelTransform {
        translation,
        rotation,
    })
}

/// Read the segments of a `GEOM` into `model` and return its `ENVL` table.
///
/// Weight bone slots are rewritten to the `MNDX` values the table lists;
/// without a table they are left untouched.
fn read_geom(
    geom: &mut ChunkReader<'_, '_>,
    model: &mut Model,
    state: &ReadState,
) -> Result<Option<Vec<u32>>, MshError> {
    let first_segment = model.geometry.len();
    let mut envelope: Option<Vec<u32>> = None;

    while geom.could_have_child() {
        match geom.peek_next_header() {
            Some(tags::SEGM) => {
                let segment = read_segm(&mut geom.read_child()?, state)?;
                model.geometry.push(segment);
            }
            Some(tags::ENVL) => {
                let mut envl = geom.read_child()?;
                let count = envl.read_u32()? as usize;
                let table = envl.read_u32_array(count)?;
                if envelope.is_some() {
                    warn!("'{}' has more than one ENVL, keeping the first", model.name);
                } else {
                    envelope = Some(table);
                }
            }
            Some(tags::CLTH) => {
                let clth = geom.read_child()?;
                debug!("ignoring {} bytes of cloth data in '{}'", clth.size(), model.name);
            }
            _ => skip_chunk(geom)?,
        }
    }

    if let Some(table) = &envelope {
        let weights = model.geometry[first_segment..]
            .iter_mut()
            .filter_map(|s| s.weights.as_mut())
            .flatten()
            .flatten();
        for weight in weights {
            match table.get(weight.bone as usize) {
                Some(mndx) => weight.bone = *mndx,
                None => warn!(
                    "'{}' weight slot {} is outside its {}-entry ENVL",
                    model.name,
                    weight.bone,
                    table.len()
                ),
            }
        }
    }
    Ok(envelope)
}

// ---------------------------------------------------------------------------
// SEGM
// ---------------------------------------------------------------------------

fn read_segm(
    segm: &mut ChunkReader<'_, '_>,
    state: &ReadState,
) -> Result<GeometrySegment, MshError> {
    let mut segment = GeometrySegment::default();
    let mut polygons = None;
    let mut triangles = None;
    let mut strip_list = None;
    let mut shadow = None;

    while segm.could_have_child() {
        match segm.peek_next_header() {
            Some(tags::MATI) => {
                let index = segm.read_child()?.read_u32()?;
                segment.material_name = state
                    .material_names
                    .get(index as usize)
                    .cloned()
                    .ok_or(MshError::MaterialIndexOutOfRange {
                        index,
                        count: state.material_names.len(),
                    })?;
            }
            Some(tags::POSL) => {
                let mut posl = segm.read_child()?;
                let count = posl.read_u32()? as usize;
                segment.positions = posl.read_vec3_array(count)?;
            }
            Some(tags::NRML) => {
                let mut nrml = segm.read_child()?;
                let count = nrml.read_u32()? as usize;
                segment.normals = nrml.read_vec3_array(count)?;
            }
            Some(tags::CLRL) => {
                let mut clrl = segm.read_child()?;
                let count = clrl.read_u32()? as usize;
                let packed = clrl.read_u32_array(count)?;
                segment.colors = Some(packed.into_iter().map(unpack_color).collect());
            }
            Some(tags::UV0L) => {
                let mut uv0l = segm.read_child()?;
                let count = uv0l.read_u32()? as usize;
                segment.texcoords = uv0l.read_vec2_array(count)?;
            }
            Some(tags::NDXL) => {
                let mut ndxl = segm.read_child()?;
                polygons = ndxl
                    .parse("polygon list", parse_polygons)
                    .inspect_err(|e| warn!("discarding polygon list: {e}"))
                    .ok();
            }
            Some(tags::NDXT) => {
                let mut ndxt = segm.read_child()?;
                triangles = Some(ndxt.parse("triangle list", parse_triangles)?);
            }
            Some(tags::STRP) => {
                {
                    let mut strp = segm.read_child()?;
                    strip_list = strp
                        .parse("strip list", parse_strip_indices)
                        .inspect_err(|e| warn!("discarding triangle strips: {e}"))
                        .ok()
                        .map(|indices| strips::decode_strips(&indices));
                }
                // Some exporters leave a stray zero index after the chunk.
                if segm.remaining_payload().starts_with(&[0, 0]) {
                    segm.skip_bytes(2);
                }
            }
            Some(tags::WGHT) => {
                let mut wght = segm.read_child()?;
                segment.weights = Some(wght.parse("weights", parse_weights)?);
            }
            Some(tags::SHDW) => {
                let mut shdw = segm.read_child()?;
                shadow = Some(shdw.parse("shadow geometry", parse_shadow)?);
            }
            _ => skip_chunk(segm)?,
        }
    }

    segment.primitives = match (shadow, polygons, triangles, strip_list) {
        (Some(shadow), ..) => Primitives::Shadow(shadow),
        (None, Some(polygons), ..) if !polygons.is_empty() => Primitives::Polygons(polygons),
        (None, _, Some(triangles), _) if !triangles.is_empty() => Primitives::Triangles(triangles),
        (None, _, _, Some(strip_list)) if !strip_list.is_empty() => Primitives::Strips(strip_list),
        _ => Primitives::Empty,
    };
    Ok(segment)
}

fn parse_polygons(input: &mut &[u8]) -> WResult<Vec<Vec<u16>>> {
    let count = le_u32.parse_next(input)?;
    let mut polygons = Vec::new();
    for _ in 0..count {
        let len = le_u16.parse_next(input)?;
        let polygon: Vec<u16> = repeat(len as usize, le_u16).parse_next(input)?;
        polygons.push(polygon);
    }
    Ok(polygons)
}

fn parse_triangles(input: &mut &[u8]) -> WResult<Vec<[u16; 3]>> {
    let count = le_u32.parse_next(input)?;
    repeat(count as usize, (le_u16, le_u16, le_u16).map(|(a, b, c)| [a, b, c])).parse_next(input)
}

fn parse_strip_indices(input: &mut &[u8]) -> WResult<Vec<u16>> {
    let count = le_u32.parse_next(input)?;
    repeat(count as usize, le_u16).parse_next(input)
}

/// Four `(bone, weight)` slots per vertex; empty slots are dropped.
fn parse_vertex_weights(input: &mut &[u8]) -> WResult<Vec<VertexWeight>> {
    let mut weights = Vec::with_capacity(4);
    for _ in 0..4 {
        let bone = le_u32.parse_next(input)?;
        let weight = le_f32.parse_next(input)?;
        if weight > MIN_WEIGHT {
            weights.push(VertexWeight { weight, bone });
        }
    }
    Ok(weights)
}

fn parse_weights(input: &mut &[u8]) -> WResult<Vec<Vec<VertexWeight>>> {
    let count = le_u32.parse_next(input)?;
    repeat(count as usize, parse_vertex_weights).parse_next(input)
}

fn parse_half_edge(input: &mut &[u8]) -> WResult<HalfEdge> {
    let (vertex, next, twin, unused) = (le_u16, le_u16, le_u16, le_u16).parse_next(input)?;
    Ok(HalfEdge {
        vertex,
        next,
        twin,
        unused,
    })
}

fn parse_shadow(input: &mut &[u8]) -> WResult<ShadowGeometry> {
    let position_count = le_u32.parse_next(input)?;
    let positions = repeat(position_count as usize, parse_vec3).parse_next(input)?;
    let edge_count = le_u32.parse_next(input)?;
    let edges = repeat(edge_count as usize, parse_half_edge).parse_next(input)?;
    Ok(ShadowGeometry { positions, edges })
}

// ---------------------------------------------------------------------------
// Skeleton and animation
// ---------------------------------------------------------------------------

fn read_skl2(skl2: &mut ChunkReader<'_, '_>) -> Result<Vec<u32>, ChunkError> {
    skl2.parse("skeleton", |input| {
        let count = le_u32.parse_next(input)?;
        // Each entry is the bone hash followed by 16 bytes the engine ignores.
        repeat(count as usize, (le_u32, take(16usize)).map(|(crc, _): (u32, &[u8])| crc))
            .parse_next(input)
    })
}

fn read_anm2(anm2: &mut ChunkReader<'_, '_>) -> Result<Animation, ChunkError> {
    let mut animation = Animation::default();
    while anm2.could_have_child() {
        match anm2.peek_next_header() {
            Some(tags::CYCL) => {
                let cycles = anm2.read_child()?.parse("animation cycles", parse_cycles)?;
                if cycles.len() > 1 {
                    debug!("using the first of {} animation cycles", cycles.len());
                }
                if let Some(cycle) = cycles.into_iter().next() {
                    animation.name = cycle.name;
                    animation.framerate = cycle.framerate;
                    animation.start_index = cycle.start_index;
                    animation.end_index = cycle.end_index;
                }
            }
            Some(tags::KFR3) => {
                animation.bone_frames = anm2.read_child()?.parse("keyframes", parse_keyframes)?;
            }
            _ => skip_chunk(anm2)?,
        }
    }
    Ok(animation)
}

struct Cycle {
    name: String,
    framerate: f32,
    start_index: u32,
    end_index: u32,
}

fn parse_cycle(input: &mut &[u8]) -> WResult<Cycle> {
    let name: &[u8] = take(CYCLE_NAME_LEN).parse_next(input)?;
    let name = name.split(|b| *b == 0).next().unwrap_or_default();
    let framerate = le_f32.parse_next(input)?;
    let _play_style = le_u32.parse_next(input)?;
    let start_index = le_u32.parse_next(input)?;
    let end_index = le_u32.parse_next(input)?;
    Ok(Cycle {
        name: String::from_utf8_lossy(name).into_owned(),
        framerate,
        start_index,
        end_index,
    })
}

fn parse_cycles(input: &mut &[u8]) -> WResult<Vec<Cycle>> {
    let count = le_u32.parse_next(input)?;
    repeat(count as usize, parse_cycle).parse_next(input)
}

fn parse_bone_frames(input: &mut &[u8]) -> WResult<BoneFrames> {
    let bone_crc = le_u32.parse_next(input)?;
    let keyframe_type = le_u32.parse_next(input)?;
    let translation_count = le_u32.parse_next(input)?;
    let rotation_count = le_u32.parse_next(input)?;
    let translations = repeat(
        translation_count as usize,
        (le_u32, parse_vec3).map(|(index, translation)| TranslationFrame { index, translation }),
    )
    .parse_next(input)?;
    let rotations = repeat(
        rotation_count as usize,
        (le_u32, parse_quat).map(|(index, rotation)| RotationFrame { index, rotation }),
    )
    .parse_next(input)?;
    Ok(BoneFrames {
        bone_crc,
        keyframe_type,
        translations,
        rotations,
    })
}

fn parse_keyframes(input: &mut &[u8]) -> WResult<Vec<BoneFrames>> {
    let count = le_u32.parse_next(input)?;
    repeat(count as usize, parse_bone_frames).parse_next(input)
}
