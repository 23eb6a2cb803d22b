//! Model file formats
//!
//! Every loader produces a [`ModelContent`]; [`load_model`] finishes the job
//! with the requested fix-ups and a [`ModelBuilder`] pass.
//!
//! | Extension | Loader |
//! |-----------|--------|
//! | `.drm` | [`drm::read_drm`] (monolithic chunk file) |
//! | `.jdrm` | [`drm::read_jdrm`] (JSON + sibling `.bin`) |
//! | `.gltf`, `.glb` | [`gltf::load_gltf`] |
//! | `.g3dj` | [`g3d::load_g3dj`] |

pub mod drm;
pub mod g3d;
pub mod gltf;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::builder::ModelBuilder;
use crate::content::ModelContent;
use crate::error::{ModelError, Result};
use crate::model::Model;

/// Content fix-ups applied after a loader runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Reverse every triangle
    pub flip_winding: bool,
    /// Compute tangents for buffers that have normals and UVs but no tangents
    pub generate_tangents: bool,
}

/// Load and post-process content without building a model
pub fn load_content(path: &Path, options: &LoadOptions) -> Result<ModelContent> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    debug!("loading {:?} as '{}'", path, extension);
    let mut content = match extension.as_str() {
        "drm" => drm::read_drm(path)?,
        "jdrm" => drm::read_jdrm(path)?,
        "gltf" | "glb" => gltf::load_gltf_file(path)?,
        "g3dj" => g3d::load_g3dj_file(path)?,
        other => {
            return Err(ModelError::not_supported(format!(
                "model file extension '{other}'"
            )));
        }
    };

    if options.flip_winding {
        content.flip_winding()?;
    }
    if options.generate_tangents {
        content.generate_tangents()?;
    }
    Ok(content)
}

/// Load any supported model file
pub fn load_model(path: &Path, options: &LoadOptions) -> Result<Model> {
    ModelBuilder::new(load_content(path, options)?).build()
}
