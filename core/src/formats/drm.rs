//! DRM model files
//!
//! # Monolithic `.drm`
//! ```text
//! "DRM"                      3-byte magic
//! binary chunk * N           vertex buffers, index buffers, skins, channels
//! string chunk               JSON metadata (DrmDocument)
//! ```
//!
//! # Split `.jdrm`
//! The JSON metadata is the whole `.jdrm` file. Its `BinaryPath` names a
//! sibling file holding the same binary chunk sequence, without magic.
//!
//! Buffer ids in the metadata are positions in the binary chunk sequence, so
//! the writer and reader must agree on chunk order.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use drm_common::{
    AnimationDesc, BoneDesc, ChannelDesc, Chunk, ChunkReader, ChunkWriter, DRM_FORMAT,
    DrmDocument, IndexBufferDesc, KEYFRAME_FLOATS, KEYFRAME_SIZE, MATRIX_SIZE, MaterialDesc,
    MeshDesc, MeshPartDesc, SkinDesc, VertexBufferDesc, VertexDeclaration,
};
use glam::{Mat4, Quat, Vec3, Vec4};
use tracing::{debug, info};

use crate::animation::{AnimationChannel, AnimationClip, Keyframe};
use crate::content::{MeshContent, MeshPartContent, ModelContent, SkinContent};
use crate::error::{ModelError, Result};
use crate::mesh::{IndexBuffer, IndexElementSize, Material, Mesh, VertexBuffer};
use crate::model::Model;
use crate::transform::SrtTransform;

// ============================================================================
// Reading
// ============================================================================

/// Read a monolithic `.drm` file
pub fn read_drm(path: &Path) -> Result<ModelContent> {
    let file = File::open(path)?;
    read_drm_from(BufReader::new(file))
}

pub fn read_drm_from<R: Read>(reader: R) -> Result<ModelContent> {
    let mut chunks = ChunkReader::new(reader);
    chunks.read_magic(DRM_FORMAT.magic)?;

    let mut binaries = Vec::new();
    let mut metadata = None;
    while let Some(chunk) = chunks.next_chunk()? {
        match chunk {
            Chunk::Binary(_) | Chunk::String(_) if metadata.is_some() => {
                return Err(ModelError::format("chunk after the metadata string chunk"));
            }
            Chunk::Binary(payload) => binaries.push(payload),
            Chunk::String(text) => metadata = Some(text),
        }
    }
    let metadata = metadata.ok_or_else(|| ModelError::format("missing metadata string chunk"))?;
    let document: DrmDocument = serde_json::from_str(&metadata)?;
    content_from_document(&document, &binaries)
}

/// Read a split `.jdrm` file and its sibling binary
pub fn read_jdrm(path: &Path) -> Result<ModelContent> {
    let json = std::fs::read_to_string(path)?;
    let document: DrmDocument = serde_json::from_str(&json)?;
    let binary_path = document
        .binary_path
        .as_deref()
        .ok_or_else(|| ModelError::format("jdrm metadata has no BinaryPath"))?;
    let sibling = path.parent().unwrap_or(Path::new("")).join(binary_path);
    debug!("reading jdrm chunks from {:?}", sibling);

    let file = File::open(&sibling)?;
    let binaries = read_binary_chunks(BufReader::new(file))?;
    content_from_document(&document, &binaries)
}

/// Read a magic-less sequence of binary chunks
pub fn read_binary_chunks<R: Read>(reader: R) -> Result<Vec<Vec<u8>>> {
    let mut binaries = Vec::new();
    for chunk in ChunkReader::new(reader) {
        match chunk? {
            Chunk::Binary(payload) => binaries.push(payload),
            Chunk::String(_) => {
                return Err(ModelError::format("string chunk in jdrm binary file"));
            }
        }
    }
    Ok(binaries)
}

fn chunk<'c>(chunks: &'c [Vec<u8>], id: usize, what: &str) -> Result<&'c [u8]> {
    chunks.get(id).map(Vec::as_slice).ok_or_else(|| {
        ModelError::format(format!(
            "{what} references buffer id {id}, only {} chunks present",
            chunks.len()
        ))
    })
}

fn expect_len(bytes: &[u8], expected: usize, what: &str) -> Result<()> {
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(ModelError::format(format!(
            "{what} is {} bytes, expected {expected}",
            bytes.len()
        )))
    }
}

fn read_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Rebuild loader content from metadata plus its binary chunks
pub fn content_from_document(document: &DrmDocument, chunks: &[Vec<u8>]) -> Result<ModelContent> {
    let mut content = ModelContent::new();

    for (i, desc) in document.vertex_buffers.iter().enumerate() {
        let what = format!("vertex buffer {i}");
        let declaration = VertexDeclaration::with_stride(desc.stride, desc.elements.clone());
        declaration
            .validate()
            .map_err(|e| ModelError::format(format!("{what}: {e}")))?;
        let data = chunk(chunks, desc.buffer_id, &what)?;
        expect_len(data, desc.vertex_count as usize * desc.stride as usize, &what)?;
        content
            .vertex_buffers
            .push(VertexBuffer::new(declaration, data.to_vec())?);
    }

    for (i, desc) in document.index_buffers.iter().enumerate() {
        let what = format!("index buffer {i}");
        let element_size = IndexElementSize::from_bits(desc.element_size)?;
        let data = chunk(chunks, desc.buffer_id, &what)?;
        expect_len(data, desc.index_count as usize * element_size.bytes(), &what)?;
        content
            .index_buffers
            .push(IndexBuffer::from_bytes(element_size, data.to_vec())?);
    }

    content.materials = document
        .materials
        .iter()
        .map(|m| Material {
            name: m.name.clone(),
            diffuse_color: Vec4::from_array(m.diffuse_color),
            specular_color: Vec3::from_array(m.specular_color),
            specular_power: m.specular_power,
            diffuse_texture: m.diffuse_texture.clone(),
            normal_texture: m.normal_texture.clone(),
            specular_texture: m.specular_texture.clone(),
        })
        .collect();

    for desc in &document.meshes {
        let parts = desc
            .parts
            .iter()
            .map(|p| {
                Ok(MeshPartContent {
                    vertex_buffer: p.vertex_buffer,
                    vertex_offset: p.vertex_offset,
                    num_vertices: p.num_vertices,
                    index_buffer: p.index_buffer,
                    start_index: p.start_index,
                    primitive_count: p.primitive_count,
                    primitive_type: p.primitive_type.parse()?,
                    material: p.material,
                    skin: p.skin,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        content.meshes.push(MeshContent {
            name: desc.name.clone(),
            parts,
        });
    }

    if document.bones.is_empty() {
        return Err(ModelError::format("model has no bones"));
    }
    for desc in &document.bones {
        let pose = SrtTransform::new(
            Vec3::from_array(desc.translation),
            Quat::from_array(desc.rotation),
            Vec3::from_array(desc.scale),
        );
        let index = content.add_bone(desc.name.clone(), pose);
        if let Some(bone) = content.bone_mut(index) {
            bone.mesh = desc.mesh;
        }
        match desc.parent {
            Some(parent) if parent < index => content.add_child(parent, index)?,
            Some(parent) => {
                return Err(ModelError::format(format!(
                    "bone '{}' (index {index}) has parent {parent}; bones must be in pre-order",
                    desc.name
                )));
            }
            None if index > 0 => {
                return Err(ModelError::format(format!(
                    "bone '{}' is a second root",
                    desc.name
                )));
            }
            None => {}
        }
    }
    content.set_root(0)?;

    for (i, desc) in document.skins.iter().enumerate() {
        let what = format!("skin {i}");
        let data = chunk(chunks, desc.buffer_id, &what)?;
        expect_len(data, desc.joints.len() * MATRIX_SIZE, &what)?;
        let inverse_bind_matrices = read_f32s(data)
            .chunks_exact(16)
            .map(Mat4::from_cols_slice)
            .collect();
        content.skins.push(SkinContent {
            joints: desc.joints.clone(),
            inverse_bind_matrices,
        });
    }

    for desc in &document.animations {
        let mut channels = Vec::with_capacity(desc.channels.len());
        for (i, channel) in desc.channels.iter().enumerate() {
            let what = format!("clip '{}' channel {i}", desc.name);
            let data = chunk(chunks, channel.buffer_id, &what)?;
            expect_len(data, channel.keyframe_count as usize * KEYFRAME_SIZE, &what)?;
            let keyframes = read_f32s(data)
                .chunks_exact(KEYFRAME_FLOATS)
                .map(|k| {
                    Keyframe::new(
                        k[0],
                        SrtTransform::new(
                            Vec3::new(k[1], k[2], k[3]),
                            Quat::from_xyzw(k[4], k[5], k[6], k[7]),
                            Vec3::new(k[8], k[9], k[10]),
                        ),
                    )
                })
                .collect();
            channels.push(AnimationChannel::new(channel.bone, keyframes)?.with_modes(
                channel.translation_mode.parse()?,
                channel.rotation_mode.parse()?,
                channel.scale_mode.parse()?,
            ));
        }
        content
            .animations
            .push(AnimationClip::new(desc.name.clone(), desc.duration, channels));
    }

    debug!(
        "drm content: {} chunks, {} bones, {} clips",
        chunks.len(),
        content.bones().len(),
        content.animations.len()
    );
    Ok(content)
}

// ============================================================================
// Writing
// ============================================================================

/// Write a monolithic `.drm` file
pub fn write_drm(model: &Model, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_drm_to(model, &mut writer)?;
    writer.flush()?;
    info!("wrote {:?} ({} bones)", path, model.bone_count());
    Ok(())
}

pub fn write_drm_to<W: Write>(model: &Model, writer: W) -> Result<()> {
    let mut chunks = ChunkWriter::new(writer);
    chunks.write_magic(DRM_FORMAT.magic)?;
    let document = write_binary_chunks(model, &mut chunks)?;
    chunks.write_string(&serde_json::to_string(&document)?)?;
    chunks.flush()?;
    Ok(())
}

/// Write a split `.jdrm` file plus a sibling binary with the same stem
pub fn write_jdrm(model: &Model, path: &Path) -> Result<()> {
    let binary_path = path.with_extension(DRM_FORMAT.sidecar_ext);
    let binary_name = binary_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ModelError::invalid_argument(format!("bad output path {path:?}")))?
        .to_string();

    let mut chunks = ChunkWriter::new(BufWriter::new(File::create(&binary_path)?));
    let mut document = write_binary_chunks(model, &mut chunks)?;
    chunks.flush()?;

    document.binary_path = Some(binary_name);
    let mut json = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut json, &document)?;
    json.flush()?;
    info!("wrote {:?} + {:?}", path, binary_path);
    Ok(())
}

/// Index of `item` in `list` by pointer, appending it when absent
fn intern<T>(list: &mut Vec<Arc<T>>, item: &Arc<T>) -> usize {
    match list.iter().position(|x| Arc::ptr_eq(x, item)) {
        Some(i) => i,
        None => {
            list.push(Arc::clone(item));
            list.len() - 1
        }
    }
}

fn push_f32s(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Emit every binary chunk in canonical order and describe them
pub fn write_binary_chunks<W: Write>(
    model: &Model,
    chunks: &mut ChunkWriter<W>,
) -> Result<DrmDocument> {
    let mut vertex_buffers: Vec<Arc<VertexBuffer>> = Vec::new();
    let mut index_buffers: Vec<Arc<IndexBuffer>> = Vec::new();
    let mut meshes = Vec::new();
    let mut bone_meshes = vec![None; model.bone_count()];

    for bone in model.mesh_bones() {
        let Some(mesh) = bone.mesh() else { continue };
        bone_meshes[bone.index()] = Some(meshes.len());
        meshes.push(describe_mesh(mesh, &mut vertex_buffers, &mut index_buffers));
    }

    let mut document = DrmDocument {
        meshes,
        ..Default::default()
    };

    for vb in &vertex_buffers {
        document.vertex_buffers.push(VertexBufferDesc {
            buffer_id: chunks.write_binary(vb.data())?,
            vertex_count: vb.vertex_count(),
            stride: vb.declaration().stride(),
            elements: vb.declaration().elements().to_vec(),
        });
    }
    for ib in &index_buffers {
        document.index_buffers.push(IndexBufferDesc {
            buffer_id: chunks.write_binary(ib.data())?,
            element_size: ib.element_size().bits(),
            index_count: ib.index_count() as u32,
        });
    }
    for skin in model.skins() {
        let mut payload = Vec::with_capacity(skin.joint_count() * MATRIX_SIZE);
        for joint in skin.joints() {
            push_f32s(&mut payload, &joint.inverse_bind.to_cols_array());
        }
        document.skins.push(SkinDesc {
            joints: skin.joints().iter().map(|j| j.bone).collect(),
            buffer_id: chunks.write_binary(&payload)?,
        });
    }
    for clip in model.animations() {
        let mut channels = Vec::with_capacity(clip.channels().len());
        for channel in clip.channels() {
            let mut payload = Vec::with_capacity(channel.keyframes().len() * KEYFRAME_SIZE);
            for key in channel.keyframes() {
                let t = &key.transform;
                push_f32s(&mut payload, &[key.time]);
                push_f32s(&mut payload, &t.translation.to_array());
                push_f32s(&mut payload, &t.rotation.to_array());
                push_f32s(&mut payload, &t.scale.to_array());
            }
            channels.push(ChannelDesc {
                bone: channel.bone(),
                translation_mode: channel.translation_mode.name().to_string(),
                rotation_mode: channel.rotation_mode.name().to_string(),
                scale_mode: channel.scale_mode.name().to_string(),
                keyframe_count: channel.keyframes().len() as u32,
                buffer_id: chunks.write_binary(&payload)?,
            });
        }
        document.animations.push(AnimationDesc {
            name: clip.name().to_string(),
            duration: clip.duration(),
            channels,
        });
    }

    document.materials = model
        .materials()
        .iter()
        .map(|m| MaterialDesc {
            name: m.name.clone(),
            diffuse_color: m.diffuse_color.to_array(),
            specular_color: m.specular_color.to_array(),
            specular_power: m.specular_power,
            diffuse_texture: m.diffuse_texture.clone(),
            normal_texture: m.normal_texture.clone(),
            specular_texture: m.specular_texture.clone(),
        })
        .collect();

    document.bones = model
        .bones()
        .iter()
        .map(|b| {
            let pose = b.default_pose();
            BoneDesc {
                name: b.name().to_string(),
                parent: b.parent(),
                translation: pose.translation.to_array(),
                rotation: pose.rotation.to_array(),
                scale: pose.scale.to_array(),
                mesh: bone_meshes[b.index()],
                skin: b.skin(),
            }
        })
        .collect();

    debug!("wrote {} binary chunks", chunks.binary_count());
    Ok(document)
}

fn describe_mesh(
    mesh: &Mesh,
    vertex_buffers: &mut Vec<Arc<VertexBuffer>>,
    index_buffers: &mut Vec<Arc<IndexBuffer>>,
) -> MeshDesc {
    MeshDesc {
        name: mesh.name.clone(),
        parts: mesh
            .parts
            .iter()
            .map(|p| MeshPartDesc {
                vertex_buffer: intern(vertex_buffers, &p.vertex_buffer),
                vertex_offset: p.vertex_offset,
                num_vertices: p.num_vertices,
                index_buffer: intern(index_buffers, &p.index_buffer),
                start_index: p.start_index,
                primitive_count: p.primitive_count,
                primitive_type: p.primitive_type.name().to_string(),
                material: p.material,
                skin: p.skin,
                bounds_min: p.bounding_box.min.to_array(),
                bounds_max: p.bounding_box.max.to_array(),
            })
            .collect(),
    }
}
