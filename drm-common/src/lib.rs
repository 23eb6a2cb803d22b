//! Shared types and utilities for DRM model files
//!
//! This crate provides the pieces shared between:
//! - `drm-core` (runtime model, instance, loaders)
//! - `drm-export` (converter CLI)
//!
//! # Modules
//!
//! - [`chunk`] - Length-prefixed chunk container underlying every DRM file
//! - [`format`] - Magic bytes and file extensions
//! - [`vertex`] - Vertex declarations (usage, format, offset) and packing helpers
//! - [`document`] - JSON metadata schema stored in the trailing string chunk

pub mod chunk;
pub mod document;
pub mod format;
pub mod vertex;

pub use chunk::{Chunk, ChunkError, ChunkReader, ChunkType, ChunkWriter};
pub use document::{
    AnimationDesc, BoneDesc, ChannelDesc, DrmDocument, IndexBufferDesc, MaterialDesc, MeshDesc,
    MeshPartDesc, SkinDesc, VertexBufferDesc, KEYFRAME_FLOATS, KEYFRAME_SIZE, MATRIX_SIZE,
};
pub use format::{DRM_FORMAT, DrmFormat};
pub use vertex::{
    VertexDeclaration, VertexElement, VertexElementFormat, VertexElementUsage, f32_to_unorm8,
    pack_bone_indices, pack_color_rgba_unorm8, unpack_color_rgba_unorm8,
};
