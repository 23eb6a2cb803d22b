//! Error type shared by the model runtime and every loader
//!
//! All failures are fatal to the load or operation that raised them; nothing
//! here is retried or partially recovered.

use std::io;

use drm_common::ChunkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    /// Malformed content: bad signature, size/stride mismatch, dangling ids
    #[error("format error: {0}")]
    Format(String),

    /// Well-formed content using a feature this runtime does not handle
    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("bone '{0}' not found")]
    MissingBone(String),

    #[error("animation clip '{0}' not found")]
    MissingClip(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bone index {index} out of range ({count} bones)")]
    BoneIndexOutOfRange { index: usize, count: usize },
}

impl ModelError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
