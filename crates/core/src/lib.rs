pub mod shared {
    pub mod constants;
    pub mod error;
    pub mod feature_frame;
    pub mod frame;
    pub mod landmark;
}

pub mod tracking {
    pub mod domain {
        pub mod capture_source;
        pub mod feature_subscriber;
        pub mod landmark_detector;
        pub mod landmark_extractor;
        pub mod landmark_mapping;
    }
    pub mod infrastructure;
}

pub mod session {
    pub mod admission_controller;
    pub(crate) mod delivery;
    pub mod detection_dispatcher;
    pub(crate) mod frame_pipeline;
    pub mod pipeline_stats;
    pub mod tracker_config;
    pub mod tracking_session;
}
