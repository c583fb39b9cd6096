use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::session::admission_controller::{Admission, AdmissionController};
use crate::session::delivery::EventPublisher;
use crate::session::detection_dispatcher::DetectionDispatcher;
use crate::session::pipeline_stats::PipelineStats;
use crate::shared::error::TrackingError;
use crate::shared::frame::Frame;
use crate::tracking::domain::capture_source::FrameConsumer;
use crate::tracking::domain::feature_subscriber::TrackingEvent;
use crate::tracking::domain::landmark_detector::{
    DetectionOutcome, DetectorOptions, LandmarkDetector,
};
use crate::tracking::domain::landmark_extractor::LandmarkExtractor;

/// Capacity of the detector → extractor channel: one outstanding submission.
const COMPLETION_CAPACITY: usize = 1;

/// Frame path from capture to published event:
/// `capture → admission → dispatcher → (detector) → completion worker → extractor → publisher`.
pub(crate) struct FramePipeline {
    admission: AdmissionController,
    dispatcher: DetectionDispatcher,
    extractor: LandmarkExtractor,
    publisher: EventPublisher,
    stats: Arc<PipelineStats>,
}

impl FramePipeline {
    /// Builds the pipeline and the receiving end of its completion channel.
    pub(crate) fn new(
        detector: Box<dyn LandmarkDetector>,
        options: DetectorOptions,
        extractor: LandmarkExtractor,
        publisher: EventPublisher,
        stats: Arc<PipelineStats>,
    ) -> (Self, Receiver<DetectionOutcome>) {
        let (tx, rx) = crossbeam_channel::bounded(COMPLETION_CAPACITY);
        let pipeline = Self {
            admission: AdmissionController::new(),
            dispatcher: DetectionDispatcher::new(detector, options, tx, stats.clone()),
            extractor,
            publisher,
            stats,
        };
        (pipeline, rx)
    }

    pub(crate) fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Runs on the completion worker for every finished submission.
    pub(crate) fn handle_outcome(&self, outcome: DetectionOutcome) {
        if let Some((next, generation)) = self.admission.complete() {
            self.dispatcher.dispatch(next, generation);
        }

        let DetectionOutcome {
            generation,
            timestamp_ms,
            result,
        } = outcome;

        match result {
            Ok(landmarks) => match self.extractor.extract(&landmarks, timestamp_ms) {
                Some(feature) => {
                    self.stats.record_face();
                    self.publisher
                        .publish(Some(generation), TrackingEvent::Feature(feature));
                }
                None => {
                    self.stats.record_no_face();
                    log::trace!("No face at {timestamp_ms}ms");
                }
            },
            Err(e) => {
                self.stats.record_detection_error();
                log::warn!("Landmark detection failed at {timestamp_ms}ms: {e}");
                self.publisher.publish(
                    Some(generation),
                    TrackingEvent::Error(TrackingError::Detection(e)),
                );
            }
        }
    }
}

impl FrameConsumer for FramePipeline {
    fn offer(&self, frame: Frame) {
        self.stats.record_offered();
        match self.admission.offer(frame) {
            Admission::Dispatch(frame, generation) => self.dispatcher.dispatch(frame, generation),
            Admission::Buffered { superseded: true } => self.stats.record_superseded(),
            Admission::Buffered { superseded: false } => {}
            Admission::Rejected => self.stats.record_rejected(),
        }
    }
}

/// Spawns the completion worker. It exits once `shutdown`'s sender is dropped.
pub(crate) fn spawn_completion_worker(
    pipeline: Arc<FramePipeline>,
    outcomes: Receiver<DetectionOutcome>,
    shutdown: Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("facepose-completion".into())
        .spawn(move || loop {
            crossbeam_channel::select! {
                recv(outcomes) -> outcome => match outcome {
                    Ok(outcome) => pipeline.handle_outcome(outcome),
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        })
}

/// Sender half kept by the session; dropping it stops the completion worker.
pub(crate) type ShutdownSignal = Sender<()>;
