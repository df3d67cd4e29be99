//! Command-line argument parsing.

use clap::Parser;

use crate::params::{RecordingConfig, ShadowConfig, WaterPhysics};
use crate::water::BackendKind;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "Ripple")]
#[command(about = "Interactive water pool rendering demo", long_about = None)]
pub struct Args {
    /// Simulation backend: gpu (texture ping-pong, default) or cpu
    /// (double-buffered grid)
    #[arg(long, value_name = "BACKEND", default_value = "gpu")]
    pub backend: String,

    /// Water grid cells along X
    #[arg(long, value_name = "CELLS", default_value = "400")]
    pub grid_x: usize,

    /// Water grid cells along Z
    #[arg(long, value_name = "CELLS", default_value = "200")]
    pub grid_z: usize,

    /// Shadow map resolution (texels per side)
    #[arg(long, value_name = "TEXELS", default_value = "1024")]
    pub shadow_res: u32,

    /// Record the demo to PNG frames (duration in seconds)
    #[arg(long, value_name = "SECONDS")]
    pub record: Option<f32>,
}

impl Args {
    /// Parse the simulation backend, falling back to the GPU variant on
    /// unknown names.
    pub fn parse_backend(&self) -> BackendKind {
        match self.backend.to_lowercase().as_str() {
            "cpu" => {
                log::info!("water backend: CPU grid");
                BackendKind::Cpu
            }
            "gpu" => {
                log::info!("water backend: GPU textures");
                BackendKind::Gpu
            }
            other => {
                log::warn!("unknown backend '{}', using gpu", other);
                BackendKind::Gpu
            }
        }
    }

    /// Water physics with the grid resolution applied.
    pub fn water_physics(&self) -> WaterPhysics {
        WaterPhysics {
            grid_x: self.grid_x,
            grid_z: self.grid_z,
            ..WaterPhysics::default()
        }
    }

    pub fn shadow_config(&self) -> ShadowConfig {
        ShadowConfig {
            resolution: self.shadow_res,
        }
    }

    /// Create recording configuration if recording mode is enabled.
    pub fn create_recording_config(&self) -> std::io::Result<Option<RecordingConfig>> {
        self.record
            .map(|duration| {
                let config = RecordingConfig::new(duration);
                std::fs::create_dir_all(config.frames_dir())?;
                Ok(config)
            })
            .transpose()
    }
}
