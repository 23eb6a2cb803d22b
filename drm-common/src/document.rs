//! JSON metadata schema for DRM models
//!
//! The metadata lives in the trailing string chunk of a `.drm` file, or in the
//! `.jdrm` file itself for the split variant. Every `buffer_id` is the
//! positional index of a binary chunk in write order.
//!
//! # Chunk order
//! ```text
//! vertex buffers -> index buffers -> skin joint tables -> animation channels
//! ```
//!
//! # Binary payloads
//! ```text
//! vertex buffer:  vertex_count x stride bytes, interleaved
//! index buffer:   index_count x (2 | 4) bytes
//! skin:           joint_count x 64 bytes (inverse bind mat4, column-major f32)
//! channel:        keyframe_count x 44 bytes (time, T.xyz, R.xyzw, S.xyz as f32)
//! ```

use serde::{Deserialize, Serialize};

use crate::vertex::VertexElement;

/// Size of one serialized 4x4 matrix in bytes (16 floats)
pub const MATRIX_SIZE: usize = 64;

/// Floats per serialized keyframe: time + translation(3) + rotation(4) + scale(3)
pub const KEYFRAME_FLOATS: usize = 11;

/// Size of one serialized keyframe in bytes
pub const KEYFRAME_SIZE: usize = KEYFRAME_FLOATS * 4;

/// Root metadata document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DrmDocument {
    /// Sibling chunk file, relative to the metadata file (split variant only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_path: Option<String>,
    #[serde(default)]
    pub vertex_buffers: Vec<VertexBufferDesc>,
    #[serde(default)]
    pub index_buffers: Vec<IndexBufferDesc>,
    #[serde(default)]
    pub materials: Vec<MaterialDesc>,
    #[serde(default)]
    pub meshes: Vec<MeshDesc>,
    /// Bones in pre-order, root first
    pub bones: Vec<BoneDesc>,
    #[serde(default)]
    pub skins: Vec<SkinDesc>,
    #[serde(default)]
    pub animations: Vec<AnimationDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VertexBufferDesc {
    pub buffer_id: usize,
    pub vertex_count: u32,
    pub stride: u32,
    pub elements: Vec<VertexElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexBufferDesc {
    pub buffer_id: usize,
    /// Index width in bits (16 or 32)
    pub element_size: u32,
    pub index_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MaterialDesc {
    pub name: String,
    pub diffuse_color: [f32; 4],
    pub specular_color: [f32; 3],
    #[serde(default)]
    pub specular_power: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diffuse_texture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_texture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specular_texture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MeshDesc {
    pub name: String,
    pub parts: Vec<MeshPartDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MeshPartDesc {
    /// Index into [`DrmDocument::vertex_buffers`]
    pub vertex_buffer: usize,
    pub vertex_offset: u32,
    pub num_vertices: u32,
    /// Index into [`DrmDocument::index_buffers`]
    pub index_buffer: usize,
    pub start_index: u32,
    pub primitive_count: u32,
    pub primitive_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin: Option<usize>,
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoneDesc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    pub translation: [f32; 3],
    /// Quaternion [x, y, z, w]
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SkinDesc {
    /// Bone index per joint
    pub joints: Vec<usize>,
    /// Chunk holding one inverse bind matrix per joint
    pub buffer_id: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnimationDesc {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<ChannelDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChannelDesc {
    pub bone: usize,
    pub translation_mode: String,
    pub rotation_mode: String,
    pub scale_mode: String,
    pub keyframe_count: u32,
    pub buffer_id: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_are_pascal_case() {
        let doc = DrmDocument {
            binary_path: Some("hero.bin".to_string()),
            bones: vec![BoneDesc {
                name: "Root".to_string(),
                parent: None,
                translation: [0.0; 3],
                rotation: [0.0, 0.0, 0.0, 1.0],
                scale: [1.0; 3],
                mesh: None,
                skin: None,
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["BinaryPath"], "hero.bin");
        assert_eq!(json["Bones"][0]["Name"], "Root");
        assert!(json["Bones"][0].get("Parent").is_none());
    }

    #[test]
    fn test_minimal_document_parses() {
        let doc: DrmDocument = serde_json::from_str(
            r#"{"Bones":[{"Name":"Root","Translation":[0,0,0],"Rotation":[0,0,0,1],"Scale":[1,1,1]}]}"#,
        )
        .unwrap();
        assert_eq!(doc.bones.len(), 1);
        assert!(doc.binary_path.is_none());
        assert!(doc.vertex_buffers.is_empty());
    }

    #[test]
    fn test_sizes() {
        assert_eq!(MATRIX_SIZE, 64);
        assert_eq!(KEYFRAME_SIZE, 44);
    }
}
