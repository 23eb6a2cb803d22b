//! drm-export library
//!
//! Converts any model drm-core can load (glTF/GLB, G3D JSON, DRM) into a
//! monolithic `.drm` or a split `.jdrm` + `.bin` pair.

pub mod config;

use std::path::Path;

use anyhow::{Context, Result, bail};
use drm_common::DRM_FORMAT;
use drm_core::formats::{drm, load_model};

pub use config::{ExportConfig, ExportSettings};

/// Output layout, chosen by the output file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Monolithic chunk file with magic and trailing metadata
    Drm,
    /// JSON metadata next to a sibling chunk file
    Jdrm,
}

impl OutputKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if ext == DRM_FORMAT.binary_ext {
            Some(Self::Drm)
        } else if ext == DRM_FORMAT.json_ext {
            Some(Self::Jdrm)
        } else {
            None
        }
    }
}

/// What a conversion produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub kind: OutputKind,
    pub bones: usize,
    pub meshes: usize,
    pub skins: usize,
    pub animations: usize,
}

/// Load `input`, apply the configured fix-ups and write `output`
pub fn export(input: &Path, output: &Path, settings: &ExportSettings) -> Result<ExportSummary> {
    let Some(kind) = OutputKind::from_path(output) else {
        bail!(
            "Unsupported output format: {:?} (use .{} or .{})",
            output,
            DRM_FORMAT.binary_ext,
            DRM_FORMAT.json_ext
        );
    };

    if !settings.overwrite_model && output.exists() {
        bail!("Output {:?} already exists and overwriting is disabled", output);
    }

    let model = load_model(input, &settings.load_options())
        .with_context(|| format!("Failed to load {:?}", input))?;

    match kind {
        OutputKind::Drm => drm::write_drm(&model, output),
        OutputKind::Jdrm => drm::write_jdrm(&model, output),
    }
    .with_context(|| format!("Failed to write {:?}", output))?;

    Ok(ExportSummary {
        kind,
        bones: model.bone_count(),
        meshes: model.mesh_bones().count(),
        skins: model.skins().len(),
        animations: model.animations().len(),
    })
}
