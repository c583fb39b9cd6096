use std::path::PathBuf;

use thiserror::Error;

/// Capture source could not be bound to the requested camera.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct BindError(pub String);

/// External detector failed a single submission.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct DetectionError(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("landmark '{name}' index {index} is outside the detector schema of {count} points")]
    LandmarkOutOfRange {
        name: &'static str,
        index: usize,
        count: usize,
    },
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Failure to construct a tracking session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to spawn {thread} thread: {source}")]
    Spawn {
        thread: &'static str,
        source: std::io::Error,
    },
}

/// Errors surfaced to the subscriber as discrete events.
///
/// None of these are fatal: the pipeline recovers on the next frame or command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("camera bind failed: {0}")]
    BindFailure(#[from] BindError),
    #[error("landmark detection failed: {0}")]
    Detection(#[from] DetectionError),
}
