use serde::{Deserialize, Serialize};

use crate::shared::constants::{
    LEFT_EYE_BOTTOM, LEFT_EYE_INNER, LEFT_EYE_OUTER, LEFT_EYE_TOP, NOSE_TIP, RIGHT_EYE_BOTTOM,
    RIGHT_EYE_INNER, RIGHT_EYE_OUTER, RIGHT_EYE_TOP,
};
use crate::shared::error::ConfigError;

/// Indices of the four points that bound one eye.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EyeLandmarks {
    pub top: usize,
    pub bottom: usize,
    pub left_corner: usize,
    pub right_corner: usize,
}

/// Maps semantic face points to positions in the detector's output schema.
///
/// The detector's schema is an external contract, so the mapping is
/// configuration and is checked against the schema length before a session
/// starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandmarkMapping {
    pub nose: usize,
    pub left_eye: EyeLandmarks,
    pub right_eye: EyeLandmarks,
}

impl Default for LandmarkMapping {
    fn default() -> Self {
        Self {
            nose: NOSE_TIP,
            left_eye: EyeLandmarks {
                top: LEFT_EYE_TOP,
                bottom: LEFT_EYE_BOTTOM,
                left_corner: LEFT_EYE_OUTER,
                right_corner: LEFT_EYE_INNER,
            },
            right_eye: EyeLandmarks {
                top: RIGHT_EYE_TOP,
                bottom: RIGHT_EYE_BOTTOM,
                left_corner: RIGHT_EYE_INNER,
                right_corner: RIGHT_EYE_OUTER,
            },
        }
    }
}

impl LandmarkMapping {
    fn named_indices(&self) -> [(&'static str, usize); 9] {
        [
            ("nose", self.nose),
            ("left_eye.top", self.left_eye.top),
            ("left_eye.bottom", self.left_eye.bottom),
            ("left_eye.left_corner", self.left_eye.left_corner),
            ("left_eye.right_corner", self.left_eye.right_corner),
            ("right_eye.top", self.right_eye.top),
            ("right_eye.bottom", self.right_eye.bottom),
            ("right_eye.left_corner", self.right_eye.left_corner),
            ("right_eye.right_corner", self.right_eye.right_corner),
        ]
    }

    /// Smallest landmark count that covers every mapped index.
    pub fn required_len(&self) -> usize {
        self.named_indices()
            .iter()
            .map(|(_, index)| index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Checks every index against a detector schema of `count` points.
    pub fn validate(&self, count: usize) -> Result<(), ConfigError> {
        for (name, index) in self.named_indices() {
            if index >= count {
                return Err(ConfigError::LandmarkOutOfRange { name, index, count });
            }
        }
        Ok(())
    }
}
