//! DRM Core - Skeletal model runtime
//!
//! Loads skinned, animated models from DRM, glTF/GLB and G3D JSON files into
//! one runtime representation, and evaluates poses per instance.
//!
//! # Architecture
//!
//! - [`ModelContent`] - Intermediate result of every loader (buffers, bone tree, skins, clips)
//! - [`ModelBuilder`] - Indexes bones in pre-order and resolves skins into a [`Model`]
//! - [`Model`] - Immutable, shareable asset
//! - [`ModelInstance`] - Per-entity pose with lazily cached world and skin matrices
//! - [`Skeleton`] - Pose-driver interface implemented by [`ModelInstance`]
//! - [`formats`] - DRM read/write, glTF/GLB and G3D loaders

pub mod animation;
pub mod bone;
pub mod builder;
pub mod content;
pub mod error;
pub mod formats;
pub mod instance;
pub mod mesh;
pub mod model;
pub mod skin;
pub mod transform;

pub use animation::{
    AnimationChannel, AnimationClip, Keyframe, RotationInterpolation, SparseTracks,
    VectorInterpolation, merge_sparse_tracks,
};
pub use bone::Bone;
pub use builder::ModelBuilder;
pub use content::{BoneContent, MeshContent, MeshPartContent, ModelContent, SkinContent};
pub use error::{ModelError, Result};
pub use formats::{LoadOptions, load_content, load_model};
pub use instance::{ModelInstance, Skeleton};
pub use mesh::{
    BoundingBox, IndexBuffer, IndexElementSize, Material, Mesh, MeshData, MeshPart, PrimitiveType,
    VertexBuffer,
};
pub use model::Model;
pub use skin::{Joint, Skin};
pub use transform::SrtTransform;
