pub mod channel_subscriber;
pub mod replay_landmark_detector;
pub mod timed_capture_source;
