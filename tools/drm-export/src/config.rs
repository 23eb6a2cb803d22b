//! Converter configuration (drm-export.toml)

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use drm_core::LoadOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub export: ExportSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSettings {
    #[serde(default)]
    pub generate_tangents: bool,
    #[serde(default)]
    pub flip_winding_order: bool,
    #[serde(default = "default_true")]
    pub overwrite_model: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            generate_tangents: false,
            flip_winding_order: false,
            overwrite_model: true,
        }
    }
}

impl ExportSettings {
    /// Content fix-ups to request from the loader
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            flip_winding: self.flip_winding_order,
            generate_tangents: self.generate_tangents,
        }
    }
}

impl ExportConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Invalid config {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
