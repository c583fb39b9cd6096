use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::shared::constants::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::shared::error::ConfigError;
use crate::tracking::domain::capture_source::CameraSelector;
use crate::tracking::domain::landmark_detector::DetectorOptions;
use crate::tracking::domain::landmark_mapping::LandmarkMapping;

/// Tracking session configuration. Missing JSON fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub landmarks: LandmarkMapping,
    /// Front-camera convention: yaw grows as the nose moves toward image left.
    pub mirror: bool,
    pub auto_start_on_subscribe: bool,
    pub auto_stop_on_unsubscribe: bool,
    pub camera: CameraSelector,
    pub detector: DetectorOptions,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            landmarks: LandmarkMapping::default(),
            mirror: true,
            auto_start_on_subscribe: true,
            auto_stop_on_unsubscribe: true,
            camera: CameraSelector::Front,
            detector: DetectorOptions::default(),
        }
    }
}

impl TrackerConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads from the platform config directory, or defaults if no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(write_err)
    }

    /// Checks the landmark mapping against a detector emitting `landmark_count` points.
    pub fn validate(&self, landmark_count: usize) -> Result<(), ConfigError> {
        self.landmarks.validate(landmark_count)
    }
}
