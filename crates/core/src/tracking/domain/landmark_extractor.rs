//! Geometric features from face landmarks: head yaw/pitch from the nose tip
//! and per-eye openness as an eye aspect ratio (EAR).

use crate::shared::constants::{EAR_DEGENERATE, EAR_MIN_HORIZONTAL};
use crate::shared::feature_frame::FeatureFrame;
use crate::shared::landmark::{Landmark, LandmarkSet};
use crate::tracking::domain::landmark_mapping::{EyeLandmarks, LandmarkMapping};

/// Converts one detected face into a [`FeatureFrame`].
///
/// Pure: holds only the index mapping and the mirror convention.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LandmarkExtractor {
    mapping: LandmarkMapping,
    mirror: bool,
}

impl LandmarkExtractor {
    pub fn new(mapping: LandmarkMapping, mirror: bool) -> Self {
        Self { mapping, mirror }
    }

    pub fn mapping(&self) -> &LandmarkMapping {
        &self.mapping
    }

    /// Returns `None` when no face was detected.
    ///
    /// A non-empty set shorter than the mapping requires breaks the detector
    /// contract: debug builds panic, release builds log and skip the frame.
    pub fn extract(&self, landmarks: &LandmarkSet, timestamp_ms: i64) -> Option<FeatureFrame> {
        if landmarks.is_empty() {
            return None;
        }

        let required = self.mapping.required_len();
        if landmarks.len() < required {
            debug_assert!(
                false,
                "landmark set has {} points, mapping needs {required}",
                landmarks.len()
            );
            log::warn!(
                "Ignoring landmark set with {} points (mapping needs {required})",
                landmarks.len()
            );
            return None;
        }

        let (yaw, pitch) = head_pose(&landmarks[self.mapping.nose], self.mirror);
        Some(FeatureFrame {
            yaw,
            pitch,
            left_eye_open: eye_openness(landmarks, &self.mapping.left_eye),
            right_eye_open: eye_openness(landmarks, &self.mapping.right_eye),
            timestamp_ms,
        })
    }
}

/// Yaw and pitch from the nose position, centred on the image.
///
/// Mirrored (front camera) negates both axes relative to the raw position;
/// unmirrored flips only yaw back, keeping "up" positive for pitch.
pub fn head_pose(nose: &Landmark, mirror: bool) -> (f64, f64) {
    let x = nose.x as f64;
    let y = nose.y as f64;
    let pitch = (0.5 - y) * 2.0;
    let yaw = if mirror { (0.5 - x) * 2.0 } else { (x - 0.5) * 2.0 };
    (yaw, pitch)
}

/// Lid distance over corner distance. Collapsed corners report fully open.
pub fn eye_aspect_ratio(top: &Landmark, bottom: &Landmark, left: &Landmark, right: &Landmark) -> f64 {
    let vertical = top.planar_distance(bottom);
    let horizontal = left.planar_distance(right);
    if horizontal < EAR_MIN_HORIZONTAL {
        return EAR_DEGENERATE;
    }
    vertical / horizontal
}

fn eye_openness(landmarks: &LandmarkSet, eye: &EyeLandmarks) -> f64 {
    eye_aspect_ratio(
        &landmarks[eye.top],
        &landmarks[eye.bottom],
        &landmarks[eye.left_corner],
        &landmarks[eye.right_corner],
    )
}
