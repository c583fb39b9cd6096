/// Landmark count of the face mesh schema the default mapping targets.
pub const FACE_MESH_LANDMARK_COUNT: usize = 478;

pub const NOSE_TIP: usize = 1;

pub const LEFT_EYE_TOP: usize = 159;
pub const LEFT_EYE_BOTTOM: usize = 145;
pub const LEFT_EYE_OUTER: usize = 33;
pub const LEFT_EYE_INNER: usize = 133;

pub const RIGHT_EYE_TOP: usize = 386;
pub const RIGHT_EYE_BOTTOM: usize = 374;
pub const RIGHT_EYE_INNER: usize = 362;
pub const RIGHT_EYE_OUTER: usize = 263;

/// Corner distance below which eye geometry is treated as collapsed.
pub const EAR_MIN_HORIZONTAL: f64 = 1e-3;

/// Openness reported for collapsed eye geometry.
pub const EAR_DEGENERATE: f64 = 1.0;

pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

pub const CONFIG_DIR_NAME: &str = "FacePose";
pub const CONFIG_FILE_NAME: &str = "tracker.json";
