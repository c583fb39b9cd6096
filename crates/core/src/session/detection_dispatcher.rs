use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::Sender;

use crate::session::pipeline_stats::PipelineStats;
use crate::shared::frame::Frame;
use crate::tracking::domain::landmark_detector::{
    DetectionOutcome, DetectionRequest, DetectionTicket, DetectorOptions, LandmarkDetector,
};

/// Hands admitted frames to the external detector.
///
/// Each dispatch copies the pixels into the request, releases the frame, and
/// submits with a one-shot ticket whose completion lands on the completion
/// channel. That channel holds a single outcome, matching the single
/// submission the admission controller allows at a time.
pub struct DetectionDispatcher {
    detector: Mutex<Box<dyn LandmarkDetector>>,
    options: DetectorOptions,
    completions: Sender<DetectionOutcome>,
    stats: Arc<PipelineStats>,
}

impl DetectionDispatcher {
    pub fn new(
        detector: Box<dyn LandmarkDetector>,
        options: DetectorOptions,
        completions: Sender<DetectionOutcome>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            detector: Mutex::new(detector),
            options,
            completions,
            stats,
        }
    }

    pub fn dispatch(&self, frame: Frame, generation: u64) {
        let request = DetectionRequest {
            image: frame.to_payload(),
            timestamp_ms: frame.timestamp_ms(),
            options: self.options,
        };
        let ticket = DetectionTicket::new(generation, request.timestamp_ms, self.completions.clone());
        log::trace!(
            "Dispatching frame {} ({}ms, generation {generation})",
            frame.index(),
            request.timestamp_ms
        );
        frame.close();
        self.stats.record_dispatched();

        self.detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .submit(request, ticket);
    }
}
