//! Runtime settings for the chess station.
//!
//! Every field has a default, so an empty JSON object is a complete config.

use std::path::PathBuf;
use std::time::Duration;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::engine::EngineSettings;
use crate::error::{Error, Result};
use crate::executor::MotionSettings;
use crate::scanner::ScannerSettings;

/// Environment variable naming the directory the position file lives in.
pub const DATA_DIR_ENV: &str = "CHESS_ARM_DATA";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomingSettings {
    /// Slot of the homing switch that parks the arm out of the camera's view.
    pub staging_slot: u32,
    pub settle_ms: u64,
}

impl Default for HomingSettings {
    fn default() -> Self {
        Self {
            staging_slot: 2,
            settle_ms: 1_000,
        }
    }
}

impl HomingSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChessConfig {
    pub data_dir: PathBuf,
    /// `None` plays the first legal move instead of asking an engine.
    pub engine: Option<EngineSettings>,
    /// Off-board point displaced pieces are dropped at.
    pub discard_point: Point3<f64>,
    pub motion: MotionSettings,
    pub homing: HomingSettings,
    pub scanner: ScannerSettings,
}

impl Default for ChessConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::var_os(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            engine: Some(EngineSettings::default()),
            discard_point: Point3::new(400.0, -400.0, 400.0),
            motion: MotionSettings::default(),
            homing: HomingSettings::default(),
            scanner: ScannerSettings::default(),
        }
    }
}

impl ChessConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let m = &self.motion;
        if m.descent_step <= 0.0 {
            return Err(Error::Config("descent_step must be positive".to_string()));
        }
        if m.safe_height <= m.height_floor {
            return Err(Error::Config(format!(
                "safe_height {} must be above height_floor {}",
                m.safe_height, m.height_floor
            )));
        }
        if m.ready_width <= m.min_grasp_aperture {
            return Err(Error::Config(format!(
                "ready_width {} must exceed min_grasp_aperture {}",
                m.ready_width, m.min_grasp_aperture
            )));
        }
        if m.reference_frame.is_empty() {
            return Err(Error::Config("need a reference_frame".to_string()));
        }
        if self.scanner.piece_band <= 0.0 {
            return Err(Error::Config("piece_band must be positive".to_string()));
        }
        if let Some(engine) = &self.engine {
            if engine.program.as_os_str().is_empty() {
                return Err(Error::Config("need an engine program".to_string()));
            }
        }
        Ok(())
    }
}
