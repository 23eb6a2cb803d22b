//! glTF 2.0 / GLB loader
//!
//! Each node becomes a bone (content index = node index). Each primitive gets
//! its own interleaved vertex buffer and index buffer. Skins are linked after
//! every node exists, and per-component animation samplers are merged into
//! composite keyframes per bone.
//!
//! Unsupported: non-triangle primitives, sparse accessors, embedded images
//! (`data:` URIs or buffer views), more than one JOINTS/WEIGHTS set, morph
//! target animation.

use std::collections::BTreeMap;
use std::path::Path;

use ::gltf::animation::util::ReadOutputs;
use ::gltf::animation::Interpolation;
use ::gltf::mesh::{Mode, Semantic};
use ::gltf::scene::Transform;
use ::gltf::{Document, Gltf, buffer, image};
use drm_common::{
    VertexDeclaration, VertexElementFormat, VertexElementUsage, pack_bone_indices,
    pack_color_rgba_unorm8,
};
use glam::{Mat4, Quat, Vec3, Vec4};
use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::animation::{AnimationClip, RotationInterpolation, SparseTracks, VectorInterpolation};
use crate::content::{MeshContent, MeshPartContent, ModelContent, SkinContent};
use crate::error::{ModelError, Result};
use crate::mesh::{IndexBuffer, Material, PrimitiveType, VertexBuffer};
use crate::transform::SrtTransform;

/// Load a `.gltf` or `.glb` file. External buffers resolve next to it.
pub fn load_gltf_file(path: &Path) -> Result<ModelContent> {
    let bytes = std::fs::read(path)?;
    load_gltf(&bytes, path.parent())
}

/// Load glTF JSON or GLB bytes. `base` resolves relative buffer URIs.
pub fn load_gltf(bytes: &[u8], base: Option<&Path>) -> Result<ModelContent> {
    let Gltf { document, blob } = Gltf::from_slice(bytes)?;
    reject_unsupported(&document)?;
    // Buffers only: images are never decoded here
    let buffers = ::gltf::import_buffers(&document, base, blob)?;

    let mut content = ModelContent::new();
    content.materials = document.materials().map(convert_material).collect();

    let templates = document
        .meshes()
        .map(|mesh| convert_mesh(&mesh, &buffers, &mut content))
        .collect::<Result<Vec<_>>>()?;

    load_nodes(&document, &templates, &mut content)?;
    load_skins(&document, &buffers, &mut content)?;
    load_animations(&document, &buffers, &mut content)?;

    info!(
        "glTF: {} nodes, {} meshes, {} skins, {} animations",
        content.bones().len(),
        content.meshes.len(),
        content.skins.len(),
        content.animations.len()
    );
    Ok(content)
}

fn reject_unsupported(document: &Document) -> Result<()> {
    for img in document.images() {
        match img.source() {
            image::Source::View { .. } => {
                return Err(ModelError::not_supported("images stored in buffer views"));
            }
            image::Source::Uri { uri, .. } if uri.starts_with("data:") => {
                return Err(ModelError::not_supported("embedded data: image URIs"));
            }
            image::Source::Uri { .. } => {}
        }
    }
    if let Some(accessor) = document.accessors().find(|a| a.sparse().is_some()) {
        return Err(ModelError::not_supported(format!(
            "sparse accessor {}",
            accessor.index()
        )));
    }
    Ok(())
}

fn texture_uri(texture: ::gltf::Texture<'_>) -> Option<String> {
    match texture.source().source() {
        image::Source::Uri { uri, .. } => Some(uri.to_string()),
        image::Source::View { .. } => None,
    }
}

fn convert_material(material: ::gltf::Material<'_>) -> Material {
    let pbr = material.pbr_metallic_roughness();
    Material {
        name: material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("material_{}", material.index().unwrap_or_default())),
        diffuse_color: Vec4::from_array(pbr.base_color_factor()),
        diffuse_texture: pbr.base_color_texture().and_then(|t| texture_uri(t.texture())),
        normal_texture: material.normal_texture().and_then(|t| texture_uri(t.texture())),
        specular_texture: pbr
            .metallic_roughness_texture()
            .and_then(|t| texture_uri(t.texture())),
        ..Default::default()
    }
}

fn check_count(name: &str, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(ModelError::format(format!(
            "{name} has {actual} values for {expected} vertices"
        )))
    }
}

/// Mesh with unskinned parts; buffers are appended to `content`
fn convert_mesh(
    mesh: &::gltf::Mesh<'_>,
    buffers: &[buffer::Data],
    content: &mut ModelContent,
) -> Result<MeshContent> {
    let name = mesh
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("mesh_{}", mesh.index()));
    let mut parts = Vec::new();

    for primitive in mesh.primitives() {
        if primitive.mode() != Mode::Triangles {
            return Err(ModelError::not_supported(format!(
                "primitive mode {:?} in mesh '{name}'",
                primitive.mode()
            )));
        }
        for (semantic, _) in primitive.attributes() {
            if let Semantic::Joints(set) | Semantic::Weights(set) = semantic
                && set > 0
            {
                return Err(ModelError::not_supported(format!(
                    "more than one JOINTS/WEIGHTS set in mesh '{name}'"
                )));
            }
        }

        let reader = primitive.reader(|b| Some(&buffers[b.index()]));
        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .ok_or_else(|| ModelError::format(format!("mesh '{name}' has no POSITION")))?
            .collect();
        let count = positions.len();

        let mut elements = vec![(VertexElementUsage::Position, VertexElementFormat::Vector3, 0)];
        let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
        let tangents: Option<Vec<[f32; 4]>> = reader.read_tangents().map(Iterator::collect);
        let mut tex_coords: Vec<Vec<[f32; 2]>> = Vec::new();
        while let Some(set) = reader.read_tex_coords(tex_coords.len() as u32) {
            tex_coords.push(set.into_f32().collect());
        }
        let mut colors: Vec<Vec<[f32; 4]>> = Vec::new();
        while let Some(set) = reader.read_colors(colors.len() as u32) {
            colors.push(set.into_rgba_f32().collect());
        }
        let joints: Option<Vec<[u16; 4]>> = reader.read_joints(0).map(|j| j.into_u16().collect());
        let weights: Option<Vec<[f32; 4]>> = reader.read_weights(0).map(|w| w.into_f32().collect());

        if let Some(n) = &normals {
            check_count("NORMAL", n.len(), count)?;
            elements.push((VertexElementUsage::Normal, VertexElementFormat::Vector3, 0));
        }
        if let Some(t) = &tangents {
            check_count("TANGENT", t.len(), count)?;
            elements.push((VertexElementUsage::Tangent, VertexElementFormat::Vector4, 0));
        }
        for (set, uv) in tex_coords.iter().enumerate() {
            check_count("TEXCOORD", uv.len(), count)?;
            elements.push((
                VertexElementUsage::TextureCoordinate,
                VertexElementFormat::Vector2,
                set as u32,
            ));
        }
        for (set, c) in colors.iter().enumerate() {
            check_count("COLOR", c.len(), count)?;
            elements.push((VertexElementUsage::Color, VertexElementFormat::Color, set as u32));
        }
        let skinning = match (joints, weights) {
            (Some(j), Some(w)) => {
                check_count("JOINTS_0", j.len(), count)?;
                check_count("WEIGHTS_0", w.len(), count)?;
                elements.push((VertexElementUsage::BlendIndices, VertexElementFormat::Byte4, 0));
                elements.push((VertexElementUsage::BlendWeight, VertexElementFormat::Vector4, 0));
                Some((j, w))
            }
            (None, None) => None,
            _ => {
                return Err(ModelError::format(format!(
                    "mesh '{name}' has JOINTS_0 without WEIGHTS_0 or the reverse"
                )));
            }
        };

        let declaration = VertexDeclaration::from_elements(elements);
        let mut data = Vec::with_capacity(count * declaration.stride() as usize);
        for v in 0..count {
            push_f32s(&mut data, &positions[v]);
            if let Some(n) = &normals {
                push_f32s(&mut data, &n[v]);
            }
            if let Some(t) = &tangents {
                push_f32s(&mut data, &t[v]);
            }
            for uv in &tex_coords {
                push_f32s(&mut data, &uv[v]);
            }
            for c in &colors {
                data.extend_from_slice(&pack_color_rgba_unorm8(Vec4::from_array(c[v])));
            }
            if let Some((j, w)) = &skinning {
                let indices = j[v].map(u32::from);
                let packed = pack_bone_indices(indices).ok_or_else(|| {
                    ModelError::not_supported(format!(
                        "joint index above 255 at vertex {v} in mesh '{name}'"
                    ))
                })?;
                data.extend_from_slice(&packed);
                push_f32s(&mut data, &w[v]);
            }
        }

        let mut indices: Vec<u32> = match reader.read_indices() {
            Some(i) => i.into_u32().collect(),
            None => (0..count as u32).collect(),
        };
        if indices.len() % 3 != 0 {
            return Err(ModelError::format(format!(
                "mesh '{name}' has {} indices, not a whole number of triangles",
                indices.len()
            )));
        }
        // glTF front faces are counter-clockwise; the runtime expects clockwise
        for tri in indices.chunks_exact_mut(3) {
            tri.reverse();
        }

        content
            .vertex_buffers
            .push(VertexBuffer::new(declaration, data)?);
        content.index_buffers.push(IndexBuffer::from_indices(&indices));
        parts.push(MeshPartContent {
            vertex_buffer: content.vertex_buffers.len() - 1,
            vertex_offset: 0,
            num_vertices: count as u32,
            index_buffer: content.index_buffers.len() - 1,
            start_index: 0,
            primitive_count: (indices.len() / 3) as u32,
            primitive_type: PrimitiveType::TriangleList,
            material: primitive.material().index(),
            skin: None,
        });
    }

    debug!("glTF mesh '{}': {} parts", name, parts.len());
    Ok(MeshContent { name, parts })
}

fn push_f32s(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn node_pose(node: &::gltf::Node<'_>) -> SrtTransform {
    match node.transform() {
        Transform::Matrix { matrix } => {
            SrtTransform::from_matrix(&Mat4::from_cols_array_2d(&matrix))
        }
        Transform::Decomposed {
            translation,
            rotation,
            scale,
        } => SrtTransform::new(
            Vec3::from_array(translation),
            Quat::from_array(rotation),
            Vec3::from_array(scale),
        ),
    }
}

/// First pass: one bone per node, hierarchy, mesh attachment
fn load_nodes(
    document: &Document,
    templates: &[MeshContent],
    content: &mut ModelContent,
) -> Result<()> {
    for node in document.nodes() {
        let name = node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node_{}", node.index()));
        content.add_bone(name, node_pose(&node));
    }

    // A node may reuse a mesh under a different skin, so meshes are
    // instantiated per (mesh, skin) pair
    let mut instantiated: HashMap<(usize, Option<usize>), usize> = HashMap::new();
    for node in document.nodes() {
        let children: Vec<usize> = node.children().map(|c| c.index()).collect();
        if !children.is_empty() {
            content.set_children(node.index(), children)?;
        }
        let Some(mesh) = node.mesh() else { continue };
        let skin = node.skin().map(|s| s.index());
        let mesh_index = *instantiated.entry((mesh.index(), skin)).or_insert_with(|| {
            let mut instance = templates[mesh.index()].clone();
            for part in &mut instance.parts {
                part.skin = skin;
            }
            content.meshes.push(instance);
            content.meshes.len() - 1
        });
        if let Some(bone) = content.bone_mut(node.index()) {
            bone.mesh = Some(mesh_index);
        }
    }

    let scene = document.default_scene().or_else(|| document.scenes().next());
    let roots: Vec<usize> = match &scene {
        Some(scene) => scene.nodes().map(|n| n.index()).collect(),
        None => content.roots().collect(),
    };
    match roots.as_slice() {
        [] => Err(ModelError::format("glTF scene has no nodes")),
        [root] => content.set_root(*root),
        _ => {
            let name = scene
                .as_ref()
                .and_then(|s| s.name())
                .unwrap_or("Scene")
                .to_string();
            let root = content.add_bone(name, SrtTransform::IDENTITY);
            content.set_children(root, roots.clone())?;
            content.set_root(root)
        }
    }
}

/// Second pass: skins reference arbitrary nodes, so they are linked last
fn load_skins(
    document: &Document,
    buffers: &[buffer::Data],
    content: &mut ModelContent,
) -> Result<()> {
    for skin in document.skins() {
        let joints: Vec<usize> = skin.joints().map(|j| j.index()).collect();
        let reader = skin.reader(|b| Some(&buffers[b.index()]));
        let inverse_bind_matrices: Vec<Mat4> = match reader.read_inverse_bind_matrices() {
            Some(matrices) => matrices.map(|m| Mat4::from_cols_array_2d(&m)).collect(),
            None => vec![Mat4::IDENTITY; joints.len()],
        };
        content.skins.push(SkinContent {
            joints,
            inverse_bind_matrices,
        });
    }
    Ok(())
}

fn vector_mode(interpolation: Interpolation) -> VectorInterpolation {
    match interpolation {
        Interpolation::Step => VectorInterpolation::None,
        Interpolation::Linear => VectorInterpolation::Linear,
        Interpolation::CubicSpline => VectorInterpolation::Cubic,
    }
}

fn rotation_mode(interpolation: Interpolation) -> RotationInterpolation {
    match interpolation {
        Interpolation::Step => RotationInterpolation::None,
        Interpolation::Linear | Interpolation::CubicSpline => RotationInterpolation::Spherical,
    }
}

/// Pair sample times with values. Cubic-spline outputs hold (in-tangent,
/// value, out-tangent) triples; only the value is kept.
fn pair<T: Copy>(times: &[f32], values: Vec<T>, interpolation: Interpolation) -> Result<Vec<(f32, T)>> {
    let values: Vec<T> = if interpolation == Interpolation::CubicSpline {
        values.chunks_exact(3).map(|c| c[1]).collect()
    } else {
        values
    };
    if values.len() != times.len() {
        return Err(ModelError::format(format!(
            "animation sampler has {} times but {} values",
            times.len(),
            values.len()
        )));
    }
    Ok(times.iter().copied().zip(values).collect())
}

fn load_animations(
    document: &Document,
    buffers: &[buffer::Data],
    content: &mut ModelContent,
) -> Result<()> {
    for animation in document.animations() {
        let name = animation
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("animation_{}", animation.index()));
        let mut tracks: BTreeMap<usize, SparseTracks> = BTreeMap::new();

        for channel in animation.channels() {
            let node = channel.target().node().index();
            let interpolation = channel.sampler().interpolation();
            let reader = channel.reader(|b| Some(&buffers[b.index()]));
            let times: Vec<f32> = reader
                .read_inputs()
                .ok_or_else(|| ModelError::format(format!("clip '{name}' sampler has no input")))?
                .collect();
            let outputs = reader
                .read_outputs()
                .ok_or_else(|| ModelError::format(format!("clip '{name}' sampler has no output")))?;

            let track = tracks.entry(node).or_default();
            let replaced = match outputs {
                ReadOutputs::Translations(_) => !track.translation.is_empty(),
                ReadOutputs::Rotations(_) => !track.rotation.is_empty(),
                ReadOutputs::Scales(_) => !track.scale.is_empty(),
                ReadOutputs::MorphTargetWeights(_) => false,
            };
            if replaced {
                warn!(
                    "clip '{}' has two samplers for one path of node {}; keeping the last",
                    name, node
                );
            }
            match outputs {
                ReadOutputs::Translations(values) => {
                    let values = values.map(Vec3::from_array).collect();
                    track.translation = pair(&times, values, interpolation)?;
                    track.translation_mode = vector_mode(interpolation);
                }
                ReadOutputs::Rotations(values) => {
                    let values = values
                        .into_f32()
                        .map(|q| Quat::from_array(q).normalize())
                        .collect();
                    track.rotation = pair(&times, values, interpolation)?;
                    track.rotation_mode = rotation_mode(interpolation);
                }
                ReadOutputs::Scales(values) => {
                    let values = values.map(Vec3::from_array).collect();
                    track.scale = pair(&times, values, interpolation)?;
                    track.scale_mode = vector_mode(interpolation);
                }
                ReadOutputs::MorphTargetWeights(_) => {
                    return Err(ModelError::not_supported(format!(
                        "morph target weights animation in clip '{name}'"
                    )));
                }
            }
        }

        let mut channels = Vec::with_capacity(tracks.len());
        for (node, track) in tracks {
            let default = content
                .bone(node)
                .map(|b| b.default_pose)
                .ok_or(ModelError::BoneIndexOutOfRange {
                    index: node,
                    count: content.bones().len(),
                })?;
            if let Some(channel) = track.into_channel(node, &default)? {
                channels.push(channel);
            }
        }
        content
            .animations
            .push(AnimationClip::from_channels(name, channels));
    }
    Ok(())
}
