//! drm-export - DRM model converter
//!
//! Converts glTF/GLB, G3D JSON and DRM models to .drm or .jdrm.
//!
//! Exit codes: 0 on success, 2 on argument errors, 1 on any other failure.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser};

use drm_export::{ExportConfig, OutputKind, export};

#[derive(Parser)]
#[command(name = "drm-export")]
#[command(about = "DRM model converter")]
#[command(version)]
struct Cli {
    /// Input model (.gltf, .glb, .g3dj, .drm, .jdrm)
    input: PathBuf,

    /// Output model (.drm or .jdrm)
    output: PathBuf,

    /// Compute tangents for meshes that have normals and UVs
    #[arg(long = "generateTangents")]
    generate_tangents: bool,

    /// Reverse the winding order of every triangle
    #[arg(long = "flipWindingOrder")]
    flip_winding_order: bool,

    /// Replace the output if it already exists
    #[arg(long = "overwriteModel", action = ArgAction::Set, value_name = "BOOL")]
    overwrite_model: Option<bool>,

    /// TOML file with an [export] table
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if OutputKind::from_path(&cli.output).is_none() {
        tracing::error!(
            "Unsupported output format: {:?} (use .drm or .jdrm)",
            cli.output
        );
        return ExitCode::from(2);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = match &cli.config {
        Some(path) => ExportConfig::load(path)?.export,
        None => ExportConfig::default().export,
    };
    settings.generate_tangents |= cli.generate_tangents;
    settings.flip_winding_order |= cli.flip_winding_order;
    if let Some(overwrite) = cli.overwrite_model {
        settings.overwrite_model = overwrite;
    }

    tracing::info!("Converting {:?} -> {:?}", cli.input, cli.output);
    let summary = export(&cli.input, &cli.output, &settings)?;
    tracing::info!(
        "Done! {} bones, {} meshes, {} skins, {} animations",
        summary.bones,
        summary.meshes,
        summary.skins,
        summary.animations
    );
    Ok(())
}
