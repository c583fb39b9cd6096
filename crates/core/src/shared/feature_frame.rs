use serde::{Deserialize, Serialize};

/// Pose and eye-openness summary derived from one detected face.
///
/// Serializes to the map shape the host bridge consumes:
/// `{"yaw", "pitch", "leftEyeOpen", "rightEyeOpen", "timestampMs"}`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFrame {
    /// Horizontal head turn, nominally `[-1, 1]`. Not clamped.
    pub yaw: f64,
    /// Vertical head tilt, nominally `[-1, 1]`. Not clamped.
    pub pitch: f64,
    /// Raw eye aspect ratio; roughly 0.25-0.35 open, 0.05-0.15 closed.
    pub left_eye_open: f64,
    pub right_eye_open: f64,
    pub timestamp_ms: i64,
}

impl FeatureFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
