use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::shared::constants::DEFAULT_MIN_CONFIDENCE;
use crate::shared::error::DetectionError;
use crate::shared::frame::ImagePayload;
use crate::shared::landmark::LandmarkSet;

/// Confidence thresholds passed through to the detector on every request.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorOptions {
    pub min_face_detection_confidence: f32,
    pub min_face_presence_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            min_face_detection_confidence: DEFAULT_MIN_CONFIDENCE,
            min_face_presence_confidence: DEFAULT_MIN_CONFIDENCE,
            min_tracking_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

/// One image submitted for landmark detection.
#[derive(Clone, Debug)]
pub struct DetectionRequest {
    pub image: ImagePayload,
    pub timestamp_ms: i64,
    pub options: DetectorOptions,
}

/// Result of one submission, routed back to the pipeline.
#[derive(Debug)]
pub struct DetectionOutcome {
    pub generation: u64,
    pub timestamp_ms: i64,
    pub result: Result<LandmarkSet, DetectionError>,
}

/// One-shot completion handle for a single submission.
///
/// Completing consumes the ticket, so a submission can finish only once.
/// A ticket dropped without completing reports a [`DetectionError`], which
/// keeps the pipeline from waiting on a submission the detector abandoned.
pub struct DetectionTicket {
    generation: u64,
    timestamp_ms: i64,
    tx: Option<Sender<DetectionOutcome>>,
}

impl DetectionTicket {
    pub fn new(generation: u64, timestamp_ms: i64, tx: Sender<DetectionOutcome>) -> Self {
        Self {
            generation,
            timestamp_ms,
            tx: Some(tx),
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn complete(mut self, result: Result<LandmarkSet, DetectionError>) {
        self.send(result);
    }

    pub fn succeed(self, landmarks: LandmarkSet) {
        self.complete(Ok(landmarks));
    }

    pub fn fail(self, error: DetectionError) {
        self.complete(Err(error));
    }

    fn send(&mut self, result: Result<LandmarkSet, DetectionError>) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let outcome = DetectionOutcome {
            generation: self.generation,
            timestamp_ms: self.timestamp_ms,
            result,
        };
        if tx.send(outcome).is_err() {
            log::debug!(
                "Dropping detection result for {}ms: pipeline shut down",
                self.timestamp_ms
            );
        }
    }
}

impl Drop for DetectionTicket {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.send(Err(DetectionError(
                "detector dropped the request without completing it".into(),
            )));
        }
    }
}

/// External landmark detector capability.
///
/// `submit` must return promptly; the detector completes the ticket later,
/// from any thread. Submission failures are reported through the ticket too.
pub trait LandmarkDetector: Send {
    fn submit(&mut self, request: DetectionRequest, ticket: DetectionTicket);

    /// Number of points in every non-empty [`LandmarkSet`] this detector emits.
    fn landmark_count(&self) -> usize;
}
