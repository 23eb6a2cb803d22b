//! G3D JSON (`.g3dj`) loader
//!
//! Vertices are a flat float array described by attribute tokens. Blend
//! weights arrive inline as `(joint, weight)` float pairs, one pair per
//! `BLENDWEIGHTn` token, and are repacked into a Byte4 index element plus a
//! Vector4 weight element. Keytimes are milliseconds.

use std::collections::BTreeMap;
use std::path::Path;

use drm_common::{
    VertexDeclaration, VertexElementFormat, VertexElementUsage, pack_bone_indices,
};
use glam::{Quat, Vec3, Vec4};
use hashbrown::HashMap;
use serde::Deserialize;
use tracing::{debug, info};

use crate::animation::{AnimationClip, SparseTracks};
use crate::content::{MeshContent, MeshPartContent, ModelContent, SkinContent};
use crate::error::{ModelError, Result};
use crate::mesh::{IndexBuffer, Material, PrimitiveType, VertexBuffer};
use crate::transform::SrtTransform;

/// Joint/weight pairs per vertex after repacking
const MAX_BLEND_WEIGHTS: usize = 4;

#[derive(Debug, Deserialize)]
struct G3dModel {
    #[serde(default)]
    id: String,
    #[serde(default)]
    meshes: Vec<G3dMesh>,
    #[serde(default)]
    materials: Vec<G3dMaterial>,
    #[serde(default)]
    nodes: Vec<G3dNode>,
    #[serde(default)]
    animations: Vec<G3dAnimation>,
}

#[derive(Debug, Deserialize)]
struct G3dMesh {
    attributes: Vec<String>,
    vertices: Vec<f32>,
    parts: Vec<G3dMeshPart>,
}

#[derive(Debug, Deserialize)]
struct G3dMeshPart {
    id: String,
    #[serde(rename = "type")]
    primitive: String,
    indices: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct G3dMaterial {
    id: String,
    diffuse: Option<[f32; 3]>,
    specular: Option<[f32; 3]>,
    shininess: Option<f32>,
    opacity: Option<f32>,
    #[serde(default)]
    textures: Vec<G3dTexture>,
}

#[derive(Debug, Deserialize)]
struct G3dTexture {
    filename: String,
    #[serde(rename = "type")]
    usage: String,
}

#[derive(Debug, Deserialize)]
struct G3dNode {
    id: String,
    translation: Option<[f32; 3]>,
    rotation: Option<[f32; 4]>,
    scale: Option<[f32; 3]>,
    #[serde(default)]
    parts: Vec<G3dNodePart>,
    #[serde(default)]
    children: Vec<G3dNode>,
}

#[derive(Debug, Deserialize)]
struct G3dNodePart {
    #[serde(rename = "meshpartid")]
    mesh_part: String,
    #[serde(rename = "materialid")]
    material: Option<String>,
    #[serde(default)]
    bones: Vec<G3dBoneBinding>,
}

/// Bind-pose transform of one joint
#[derive(Debug, Deserialize)]
struct G3dBoneBinding {
    node: String,
    translation: Option<[f32; 3]>,
    rotation: Option<[f32; 4]>,
    scale: Option<[f32; 3]>,
}

#[derive(Debug, Deserialize)]
struct G3dAnimation {
    id: String,
    #[serde(default)]
    bones: Vec<G3dBoneAnimation>,
}

/// Either composite `keyframes`, or one track per component
#[derive(Debug, Deserialize)]
struct G3dBoneAnimation {
    #[serde(rename = "boneId")]
    bone: String,
    #[serde(default)]
    keyframes: Vec<G3dKeyframe>,
    #[serde(default)]
    translation: Vec<G3dVectorKey>,
    #[serde(default)]
    rotation: Vec<G3dQuatKey>,
    #[serde(default)]
    scale: Vec<G3dVectorKey>,
}

#[derive(Debug, Deserialize)]
struct G3dKeyframe {
    keytime: f32,
    translation: Option<[f32; 3]>,
    rotation: Option<[f32; 4]>,
    scale: Option<[f32; 3]>,
}

#[derive(Debug, Deserialize)]
struct G3dVectorKey {
    keytime: f32,
    value: [f32; 3],
}

#[derive(Debug, Deserialize)]
struct G3dQuatKey {
    keytime: f32,
    value: [f32; 4],
}

fn srt(translation: Option<[f32; 3]>, rotation: Option<[f32; 4]>, scale: Option<[f32; 3]>) -> SrtTransform {
    SrtTransform::new(
        translation.map_or(Vec3::ZERO, Vec3::from_array),
        rotation.map_or(Quat::IDENTITY, |r| Quat::from_array(r).normalize()),
        scale.map_or(Vec3::ONE, Vec3::from_array),
    )
}

/// Vertex attribute token with its usage index split off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attribute {
    Position,
    Normal,
    TexCoord(u32),
    BlendWeight(u32),
    ColorPacked,
}

impl Attribute {
    fn parse(token: &str) -> Result<Self> {
        let digits = token.len() - token.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let (name, index) = token.split_at(token.len() - digits);
        let index: u32 = if index.is_empty() {
            0
        } else {
            index
                .parse()
                .map_err(|_| ModelError::format(format!("bad attribute index in '{token}'")))?
        };
        match name {
            "POSITION" => Ok(Self::Position),
            "NORMAL" => Ok(Self::Normal),
            "TEXCOORD" => Ok(Self::TexCoord(index)),
            "BLENDWEIGHT" => Ok(Self::BlendWeight(index)),
            "COLORPACKED" => Ok(Self::ColorPacked),
            _ => Err(ModelError::not_supported(format!("G3D vertex attribute '{token}'"))),
        }
    }

    /// Floats this attribute occupies in the source vertex
    fn float_count(self) -> usize {
        match self {
            Self::Position | Self::Normal => 3,
            Self::TexCoord(_) | Self::BlendWeight(_) => 2,
            Self::ColorPacked => 1,
        }
    }
}

/// Load a `.g3dj` file
pub fn load_g3dj_file(path: &Path) -> Result<ModelContent> {
    let json = std::fs::read_to_string(path)?;
    load_g3dj(&json)
}

pub fn load_g3dj(json: &str) -> Result<ModelContent> {
    let model: G3dModel = serde_json::from_str(json)?;
    let mut content = ModelContent::new();

    let materials: HashMap<&str, usize> = model
        .materials
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id.as_str(), i))
        .collect();
    content.materials = model.materials.iter().map(convert_material).collect();

    // mesh part id -> its window into the mesh buffers
    let mut mesh_parts: HashMap<&str, MeshPartContent> = HashMap::new();
    for mesh in &model.meshes {
        convert_mesh(mesh, &mut content, &mut mesh_parts)?;
    }

    // First pass: bones and hierarchy
    let mut roots = Vec::with_capacity(model.nodes.len());
    for node in &model.nodes {
        roots.push(add_node(node, &mut content)?);
    }
    match roots.as_slice() {
        [] => return Err(ModelError::format("G3D model has no nodes")),
        [root] => content.set_root(*root)?,
        _ => {
            let name = if model.id.is_empty() { "Root" } else { model.id.as_str() };
            let root = content.add_bone(name, SrtTransform::IDENTITY);
            content.set_children(root, roots.clone())?;
            content.set_root(root)?;
        }
    }

    // Second pass: node parts, which may bind any bone by name
    let bones = index_bones(&content);
    let mut pending = Vec::new();
    collect_nodes(&model.nodes, &mut pending);
    for node in pending {
        if node.parts.is_empty() {
            continue;
        }
        let mut parts = Vec::with_capacity(node.parts.len());
        for node_part in &node.parts {
            let mut part = mesh_parts
                .get(node_part.mesh_part.as_str())
                .cloned()
                .ok_or_else(|| {
                    ModelError::format(format!(
                        "node '{}' references missing mesh part '{}'",
                        node.id, node_part.mesh_part
                    ))
                })?;
            part.material = match &node_part.material {
                Some(id) => Some(*materials.get(id.as_str()).ok_or_else(|| {
                    ModelError::format(format!("node '{}' references missing material '{id}'", node.id))
                })?),
                None => None,
            };
            if !node_part.bones.is_empty() {
                part.skin = Some(bind_skin(&node_part.bones, &bones, &mut content)?);
            }
            parts.push(part);
        }
        let bone = *bones
            .get(node.id.as_str())
            .ok_or_else(|| ModelError::MissingBone(node.id.clone()))?;
        content.meshes.push(MeshContent {
            name: node.id.clone(),
            parts,
        });
        let mesh = content.meshes.len() - 1;
        if let Some(b) = content.bone_mut(bone) {
            b.mesh = Some(mesh);
        }
    }

    for animation in &model.animations {
        let clip = convert_animation(animation, &bones, &content)?;
        content.animations.push(clip);
    }

    info!(
        "G3D: {} bones, {} meshes, {} skins, {} animations",
        content.bones().len(),
        content.meshes.len(),
        content.skins.len(),
        content.animations.len()
    );
    Ok(content)
}

fn convert_material(material: &G3dMaterial) -> Material {
    let diffuse = material.diffuse.unwrap_or([1.0; 3]);
    let texture = |usage: &str| {
        material
            .textures
            .iter()
            .find(|t| t.usage == usage)
            .map(|t| t.filename.clone())
    };
    Material {
        name: material.id.clone(),
        diffuse_color: Vec4::new(
            diffuse[0],
            diffuse[1],
            diffuse[2],
            material.opacity.unwrap_or(1.0),
        ),
        specular_color: material.specular.map_or(Vec3::ZERO, Vec3::from_array),
        specular_power: material.shininess.unwrap_or(0.0),
        diffuse_texture: texture("DIFFUSE"),
        normal_texture: texture("NORMAL"),
        specular_texture: texture("SPECULAR"),
    }
}

fn convert_mesh<'m>(
    mesh: &'m G3dMesh,
    content: &mut ModelContent,
    mesh_parts: &mut HashMap<&'m str, MeshPartContent>,
) -> Result<()> {
    let attributes = mesh
        .attributes
        .iter()
        .map(|a| Attribute::parse(a))
        .collect::<Result<Vec<_>>>()?;
    let floats_per_vertex: usize = attributes.iter().map(|a| a.float_count()).sum();
    if floats_per_vertex == 0 || mesh.vertices.len() % floats_per_vertex != 0 {
        return Err(ModelError::format(format!(
            "{} vertex floats do not divide into vertices of {} floats",
            mesh.vertices.len(),
            floats_per_vertex
        )));
    }
    let blend_weights = attributes
        .iter()
        .filter(|a| matches!(a, Attribute::BlendWeight(_)))
        .count();
    if blend_weights > MAX_BLEND_WEIGHTS {
        return Err(ModelError::not_supported(format!(
            "{blend_weights} blend weights per vertex (at most {MAX_BLEND_WEIGHTS})"
        )));
    }

    let mut elements = Vec::new();
    for attribute in &attributes {
        match *attribute {
            Attribute::Position => {
                elements.push((VertexElementUsage::Position, VertexElementFormat::Vector3, 0));
            }
            Attribute::Normal => {
                elements.push((VertexElementUsage::Normal, VertexElementFormat::Vector3, 0));
            }
            Attribute::TexCoord(i) => elements.push((
                VertexElementUsage::TextureCoordinate,
                VertexElementFormat::Vector2,
                i,
            )),
            Attribute::ColorPacked => {
                elements.push((VertexElementUsage::Color, VertexElementFormat::Color, 0));
            }
            Attribute::BlendWeight(_) => {}
        }
    }
    if blend_weights > 0 {
        elements.push((VertexElementUsage::BlendIndices, VertexElementFormat::Byte4, 0));
        elements.push((VertexElementUsage::BlendWeight, VertexElementFormat::Vector4, 0));
    }
    let declaration = VertexDeclaration::from_elements(elements);

    let vertex_count = mesh.vertices.len() / floats_per_vertex;
    let mut data = Vec::with_capacity(vertex_count * declaration.stride() as usize);
    for (v, vertex) in mesh.vertices.chunks_exact(floats_per_vertex).enumerate() {
        let mut joints = [0u32; MAX_BLEND_WEIGHTS];
        let mut weights = [0.0f32; MAX_BLEND_WEIGHTS];
        let mut slot = 0;
        let mut at = 0;
        for attribute in &attributes {
            let values = &vertex[at..at + attribute.float_count()];
            at += attribute.float_count();
            match attribute {
                Attribute::ColorPacked => data.extend_from_slice(&values[0].to_bits().to_le_bytes()),
                Attribute::BlendWeight(_) => {
                    if values[0] < 0.0 {
                        return Err(ModelError::format(format!(
                            "negative joint index at vertex {v}"
                        )));
                    }
                    joints[slot] = values[0] as u32;
                    weights[slot] = values[1];
                    slot += 1;
                }
                _ => {
                    for value in values {
                        data.extend_from_slice(&value.to_le_bytes());
                    }
                }
            }
        }
        if blend_weights > 0 {
            let packed = pack_bone_indices(joints).ok_or_else(|| {
                ModelError::not_supported(format!("joint index above 255 at vertex {v}"))
            })?;
            data.extend_from_slice(&packed);
            for w in weights {
                data.extend_from_slice(&w.to_le_bytes());
            }
        }
    }
    content
        .vertex_buffers
        .push(VertexBuffer::new(declaration, data)?);
    let vertex_buffer = content.vertex_buffers.len() - 1;

    // Parts share one index buffer per mesh and draw windows of it
    let mut indices = Vec::new();
    for part in &mesh.parts {
        if part.primitive != "TRIANGLES" {
            return Err(ModelError::not_supported(format!(
                "G3D primitive type '{}' in part '{}'",
                part.primitive, part.id
            )));
        }
        if part.indices.len() % 3 != 0 {
            return Err(ModelError::format(format!(
                "part '{}' has {} indices, not a whole number of triangles",
                part.id,
                part.indices.len()
            )));
        }
        if let Some(&bad) = part.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(ModelError::format(format!(
                "part '{}' index {bad} is past {vertex_count} vertices",
                part.id
            )));
        }
        mesh_parts.insert(
            part.id.as_str(),
            MeshPartContent {
                vertex_buffer,
                vertex_offset: 0,
                num_vertices: vertex_count as u32,
                index_buffer: content.index_buffers.len(),
                start_index: indices.len() as u32,
                primitive_count: (part.indices.len() / 3) as u32,
                primitive_type: PrimitiveType::TriangleList,
                material: None,
                skin: None,
            },
        );
        indices.extend_from_slice(&part.indices);
    }
    content.index_buffers.push(IndexBuffer::from_indices(&indices));

    debug!(
        "G3D mesh: {} vertices, stride {}, {} parts",
        vertex_count,
        content.vertex_buffers[vertex_buffer].declaration().stride(),
        mesh.parts.len()
    );
    Ok(())
}

fn add_node(node: &G3dNode, content: &mut ModelContent) -> Result<usize> {
    let bone = content.add_bone(
        node.id.clone(),
        srt(node.translation, node.rotation, node.scale),
    );
    for child in &node.children {
        let child = add_node(child, content)?;
        content.add_child(bone, child)?;
    }
    Ok(bone)
}

fn collect_nodes<'m>(nodes: &'m [G3dNode], out: &mut Vec<&'m G3dNode>) {
    for node in nodes {
        out.push(node);
        collect_nodes(&node.children, out);
    }
}

/// Bone name -> index; the first bone wins when names repeat
fn index_bones(content: &ModelContent) -> HashMap<String, usize> {
    let mut bones = HashMap::with_capacity(content.bones().len());
    for (i, bone) in content.bones().iter().enumerate() {
        bones.entry(bone.name.clone()).or_insert(i);
    }
    bones
}

/// Skin from a node part's bone bindings; inverse binds come from the
/// bind-pose transforms stored with each binding
fn bind_skin(
    bindings: &[G3dBoneBinding],
    bones: &HashMap<String, usize>,
    content: &mut ModelContent,
) -> Result<usize> {
    let mut skin = SkinContent::default();
    for binding in bindings {
        let bone = *bones
            .get(binding.node.as_str())
            .ok_or_else(|| ModelError::MissingBone(binding.node.clone()))?;
        let bind = srt(binding.translation, binding.rotation, binding.scale);
        skin.joints.push(bone);
        skin.inverse_bind_matrices.push(bind.to_matrix().inverse());
    }
    content.skins.push(skin);
    Ok(content.skins.len() - 1)
}

fn convert_animation(
    animation: &G3dAnimation,
    bones: &HashMap<String, usize>,
    content: &ModelContent,
) -> Result<AnimationClip> {
    let mut tracks: BTreeMap<usize, SparseTracks> = BTreeMap::new();
    for bone_animation in &animation.bones {
        let bone = *bones
            .get(bone_animation.bone.as_str())
            .ok_or_else(|| ModelError::MissingBone(bone_animation.bone.clone()))?;
        let track = tracks.entry(bone).or_default();

        for key in &bone_animation.keyframes {
            let time = key.keytime / 1000.0;
            if let Some(t) = key.translation {
                track.translation.push((time, Vec3::from_array(t)));
            }
            if let Some(r) = key.rotation {
                track.rotation.push((time, Quat::from_array(r).normalize()));
            }
            if let Some(s) = key.scale {
                track.scale.push((time, Vec3::from_array(s)));
            }
        }
        track.translation.extend(
            bone_animation
                .translation
                .iter()
                .map(|k| (k.keytime / 1000.0, Vec3::from_array(k.value))),
        );
        track.rotation.extend(
            bone_animation
                .rotation
                .iter()
                .map(|k| (k.keytime / 1000.0, Quat::from_array(k.value).normalize())),
        );
        track.scale.extend(
            bone_animation
                .scale
                .iter()
                .map(|k| (k.keytime / 1000.0, Vec3::from_array(k.value))),
        );
    }

    let mut channels = Vec::with_capacity(tracks.len());
    for (bone, track) in tracks {
        let default = content.bones()[bone].default_pose;
        if let Some(channel) = track.into_channel(bone, &default)? {
            channels.push(channel);
        }
    }
    Ok(AnimationClip::from_channels(animation.id.clone(), channels))
}
