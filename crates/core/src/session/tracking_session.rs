use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crate::session::delivery::DeliveryContext;
use crate::session::frame_pipeline::{spawn_completion_worker, FramePipeline, ShutdownSignal};
use crate::session::pipeline_stats::{PipelineSnapshot, PipelineStats};
use crate::session::tracker_config::TrackerConfig;
use crate::shared::error::{SessionError, TrackingError};
use crate::tracking::domain::capture_source::{CaptureSource, FrameConsumer, FrameSink};
use crate::tracking::domain::feature_subscriber::{FeatureSubscriber, TrackingEvent};
use crate::tracking::domain::landmark_detector::LandmarkDetector;
use crate::tracking::domain::landmark_extractor::LandmarkExtractor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

struct SessionControl {
    state: SessionState,
    generation: u64,
    capture: Box<dyn CaptureSource>,
}

/// Owns one face tracking session: the capture binding, the detector, and
/// the single subscriber.
///
/// Commands may come from any thread. `start`/`stop` are idempotent point
/// transitions between [`SessionState::Idle`] and [`SessionState::Active`].
/// Dropping the session stops it and joins its worker threads.
pub struct TrackingSession {
    config: TrackerConfig,
    control: Mutex<SessionControl>,
    pipeline: Arc<FramePipeline>,
    delivery: DeliveryContext,
    stats: Arc<PipelineStats>,
    shutdown: Option<ShutdownSignal>,
    worker: Option<JoinHandle<()>>,
}

impl TrackingSession {
    /// Validates the landmark mapping against the detector's schema and
    /// spawns the completion and delivery threads. The session starts idle.
    pub fn new(
        config: TrackerConfig,
        capture: Box<dyn CaptureSource>,
        detector: Box<dyn LandmarkDetector>,
    ) -> Result<Self, SessionError> {
        config.validate(detector.landmark_count())?;

        let stats = Arc::new(PipelineStats::new());
        let delivery =
            DeliveryContext::spawn(stats.clone()).map_err(|source| SessionError::Spawn {
                thread: "delivery",
                source,
            })?;

        let extractor = LandmarkExtractor::new(config.landmarks, config.mirror);
        let (pipeline, outcomes) = FramePipeline::new(
            detector,
            config.detector,
            extractor,
            delivery.publisher(),
            stats.clone(),
        );
        let pipeline = Arc::new(pipeline);

        let (shutdown, shutdown_rx) = crossbeam_channel::bounded(0);
        let worker = spawn_completion_worker(pipeline.clone(), outcomes, shutdown_rx).map_err(
            |source| SessionError::Spawn {
                thread: "completion",
                source,
            },
        )?;

        Ok(Self {
            config,
            control: Mutex::new(SessionControl {
                state: SessionState::Idle,
                generation: 0,
                capture,
            }),
            pipeline,
            delivery,
            stats,
            shutdown: Some(shutdown),
            worker: Some(worker),
        })
    }

    fn lock_control(&self) -> MutexGuard<'_, SessionControl> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.lock_control().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn has_subscriber(&self) -> bool {
        self.delivery.gate().has_subscriber()
    }

    pub fn stats(&self) -> PipelineSnapshot {
        self.stats.snapshot()
    }

    /// Binds the capture source and begins admitting frames.
    ///
    /// A bind failure leaves the session idle, is reported to the subscriber
    /// as an error event, and is returned. Calling `start` again retries.
    pub fn start(&self) -> Result<(), TrackingError> {
        let mut control = self.lock_control();
        if control.state == SessionState::Active {
            return Ok(());
        }

        let generation = self.advance_generation(&mut control);

        let consumer: Arc<dyn FrameConsumer> = self.pipeline.clone();
        let camera = self.config.camera;
        match control.capture.bind(camera, FrameSink::new(consumer)) {
            Ok(()) => {
                control.state = SessionState::Active;
                log::info!("Tracking started ({camera} camera, generation {generation})");
                Ok(())
            }
            Err(e) => {
                self.pipeline.admission().deactivate();
                self.delivery.gate().deactivate();
                drop(control);

                log::warn!("Camera bind failed: {e}");
                let error = TrackingError::BindFailure(e);
                self.delivery
                    .publisher()
                    .publish(None, TrackingEvent::Error(error.clone()));
                Err(error)
            }
        }
    }

    /// Opens a new generation for admission and delivery. Anything stamped
    /// with an earlier one is stale from here on.
    fn advance_generation(&self, control: &mut SessionControl) -> u64 {
        control.generation += 1;
        let generation = control.generation;
        self.pipeline.admission().activate(generation);
        self.delivery.gate().activate(generation);
        generation
    }

    /// Unbinds the capture source and drops any pending or in-flight result.
    /// The subscriber stays registered.
    pub fn stop(&self) {
        let mut control = self.lock_control();
        if control.state == SessionState::Idle {
            return;
        }

        self.delivery.gate().deactivate();
        self.pipeline.admission().deactivate();
        control.capture.unbind();
        control.state = SessionState::Idle;
        log::info!("Tracking stopped (generation {})", control.generation);
    }

    /// Registers `subscriber` as the only delivery target, superseding any
    /// previous one.
    ///
    /// With auto-start, an idle session starts and an active one re-binds the
    /// camera for the new subscriber.
    ///
    /// Results already in flight belong to the previous subscriber and are
    /// dropped: an active session moves to a new generation before the new
    /// subscriber is registered.
    pub fn subscribe(&self, subscriber: Box<dyn FeatureSubscriber>) {
        {
            let mut control = self.lock_control();
            if control.state == SessionState::Active {
                let generation = self.advance_generation(&mut control);
                log::debug!("Subscriber replaced, now generation {generation}");
            }
            self.delivery.subscribe(subscriber);
        }
        if !self.config.auto_start_on_subscribe {
            return;
        }
        self.stop();
        // Bind failures are already reported to the new subscriber.
        let _ = self.start();
    }

    /// Clears the subscriber; with auto-stop also stops the session.
    pub fn unsubscribe(&self) {
        self.delivery.unsubscribe();
        if self.config.auto_stop_on_unsubscribe {
            self.stop();
        }
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        self.stop();
        self.shutdown.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Completion worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::error::{BindError, ConfigError, DetectionError};
    use crate::shared::frame::Frame;
    use crate::shared::landmark::{Landmark, LandmarkSet};
    use crate::tracking::domain::capture_source::CameraSelector;
    use crate::tracking::domain::landmark_detector::{DetectionRequest, DetectionTicket};
    use crate::tracking::infrastructure::channel_subscriber::ChannelSubscriber;
    use crate::tracking::infrastructure::replay_landmark_detector::ReplayLandmarkDetector;
    use crate::tracking::infrastructure::timed_capture_source::TimedCaptureSource;
    use crossbeam_channel::Receiver;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    const QUIET: Duration = Duration::from_millis(100);

    #[derive(Default)]
    struct CaptureState {
        sink: Option<FrameSink>,
        binds: usize,
        unbinds: usize,
        fail_with: Option<String>,
    }

    /// Capture double: the test pushes frames by hand.
    #[derive(Clone, Default)]
    struct ManualCapture {
        state: Arc<Mutex<CaptureState>>,
    }

    impl ManualCapture {
        fn failing(message: &str) -> Self {
            let capture = Self::default();
            capture.state.lock().unwrap().fail_with = Some(message.into());
            capture
        }

        fn push(&self, frame: Frame) {
            let sink = self.state.lock().unwrap().sink.clone();
            if let Some(sink) = sink {
                sink.offer(frame);
            }
        }

        fn binds(&self) -> usize {
            self.state.lock().unwrap().binds
        }

        fn unbinds(&self) -> usize {
            self.state.lock().unwrap().unbinds
        }
    }

    impl CaptureSource for ManualCapture {
        fn bind(&mut self, _selector: CameraSelector, sink: FrameSink) -> Result<(), BindError> {
            let mut state = self.state.lock().unwrap();
            if let Some(message) = &state.fail_with {
                return Err(BindError(message.clone()));
            }
            state.binds += 1;
            state.sink = Some(sink);
            Ok(())
        }

        fn unbind(&mut self) {
            let mut state = self.state.lock().unwrap();
            if state.sink.take().is_some() {
                state.unbinds += 1;
            }
        }
    }

    /// Detector double: submissions wait until the test completes them.
    #[derive(Clone, Default)]
    struct HeldDetector {
        held: Arc<Mutex<Vec<DetectionTicket>>>,
        submitted: Arc<AtomicUsize>,
    }

    impl HeldDetector {
        fn take(&self) -> DetectionTicket {
            wait_for(|| !self.held.lock().unwrap().is_empty());
            self.held.lock().unwrap().remove(0)
        }

        fn pending(&self) -> usize {
            self.held.lock().unwrap().len()
        }
    }

    impl LandmarkDetector for HeldDetector {
        fn submit(&mut self, _request: DetectionRequest, ticket: DetectionTicket) {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            self.held.lock().unwrap().push(ticket);
        }

        fn landmark_count(&self) -> usize {
            478
        }
    }

    struct Fixture {
        session: TrackingSession,
        capture: ManualCapture,
        detector: HeldDetector,
        released: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn frame(&self, timestamp_ms: i64) -> Frame {
            let released = self.released.clone();
            Frame::new(vec![0u8; 3], 1, 1, 3, timestamp_ms as usize, timestamp_ms).with_release(
                Box::new(move || {
                    released.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
        }

        fn push(&self, timestamp_ms: i64) {
            self.capture.push(self.frame(timestamp_ms));
        }

        fn subscribe(&self) -> Receiver<TrackingEvent> {
            let (subscriber, events) = ChannelSubscriber::new();
            self.session.subscribe(Box::new(subscriber));
            events
        }
    }

    fn fixture_with(config: TrackerConfig, capture: ManualCapture) -> Fixture {
        let detector = HeldDetector::default();
        let session =
            TrackingSession::new(config, Box::new(capture.clone()), Box::new(detector.clone()))
                .unwrap();
        Fixture {
            session,
            capture,
            detector,
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(TrackerConfig::default(), ManualCapture::default())
    }

    fn manual_config() -> TrackerConfig {
        TrackerConfig {
            auto_start_on_subscribe: false,
            auto_stop_on_unsubscribe: false,
            ..TrackerConfig::default()
        }
    }

    fn face() -> LandmarkSet {
        LandmarkSet::new(vec![Landmark::new(0.5, 0.5, 0.0); 478])
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn next_feature_timestamp(events: &Receiver<TrackingEvent>) -> i64 {
        match events.recv_timeout(Duration::from_secs(2)).unwrap() {
            TrackingEvent::Feature(feature) => feature.timestamp_ms,
            other => panic!("expected feature, got {other:?}"),
        }
    }

    #[test]
    fn test_new_session_is_idle() {
        let f = fixture();
        assert_eq!(f.session.state(), SessionState::Idle);
        assert!(!f.session.has_subscriber());
        assert_eq!(f.capture.binds(), 0);
    }

    #[test]
    fn test_mapping_outside_detector_schema_is_rejected() {
        let mut config = TrackerConfig::default();
        config.landmarks.left_eye.top = 900;
        let result = TrackingSession::new(
            config,
            Box::new(ManualCapture::default()),
            Box::new(HeldDetector::default()),
        );
        assert!(matches!(
            result,
            Err(SessionError::Config(ConfigError::LandmarkOutOfRange { index: 900, .. }))
        ));
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let f = fixture_with(manual_config(), ManualCapture::default());
        f.session.start().unwrap();
        f.session.start().unwrap();
        assert!(f.session.is_active());
        assert_eq!(f.capture.binds(), 1);

        f.session.stop();
        f.session.stop();
        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(f.capture.unbinds(), 1);
    }

    #[test]
    fn test_subscribe_auto_starts_and_unsubscribe_auto_stops() {
        let f = fixture();
        let _events = f.subscribe();
        assert!(f.session.is_active());
        assert!(f.session.has_subscriber());

        f.session.unsubscribe();
        assert!(!f.session.is_active());
        assert!(!f.session.has_subscriber());
        assert_eq!(f.capture.unbinds(), 1);
    }

    #[test]
    fn test_manual_config_leaves_lifecycle_to_caller() {
        let f = fixture_with(manual_config(), ManualCapture::default());
        let _events = f.subscribe();
        assert!(!f.session.is_active());

        f.session.start().unwrap();
        f.session.unsubscribe();
        assert!(f.session.is_active());
    }

    #[test]
    fn test_burst_keeps_only_latest_frame() {
        let f = fixture();
        let events = f.subscribe();

        f.push(10);
        f.push(20);
        f.push(30);
        assert_eq!(f.detector.pending(), 1);

        f.detector.take().succeed(face());
        assert_eq!(next_feature_timestamp(&events), 10);

        f.detector.take().succeed(face());
        assert_eq!(next_feature_timestamp(&events), 30);

        assert_eq!(f.detector.submitted.load(Ordering::SeqCst), 2);
        assert_eq!(f.released.load(Ordering::SeqCst), 3);
        assert_eq!(f.session.stats().superseded, 1);
        wait_for(|| f.session.stats().delivered == 2);
    }

    #[test]
    fn test_no_face_emits_nothing_and_processing_continues() {
        let f = fixture();
        let events = f.subscribe();

        f.push(10);
        f.detector.take().succeed(LandmarkSet::empty());
        wait_for(|| f.session.stats().no_face == 1);

        f.push(20);
        f.detector.take().succeed(face());
        assert_eq!(next_feature_timestamp(&events), 20);
    }

    #[test]
    fn test_detection_error_is_reported_and_session_stays_active() {
        let f = fixture();
        let events = f.subscribe();

        f.push(10);
        f.detector.take().fail(DetectionError("model crashed".into()));
        assert_eq!(
            events.recv_timeout(Duration::from_secs(2)).unwrap(),
            TrackingEvent::Error(TrackingError::Detection(DetectionError(
                "model crashed".into()
            )))
        );
        assert!(f.session.is_active());

        f.push(20);
        f.detector.take().succeed(face());
        assert_eq!(next_feature_timestamp(&events), 20);
    }

    #[test]
    fn test_abandoned_submission_reports_error() {
        let f = fixture();
        let events = f.subscribe();

        f.push(10);
        drop(f.detector.take());
        assert!(matches!(
            events.recv_timeout(Duration::from_secs(2)).unwrap(),
            TrackingEvent::Error(TrackingError::Detection(_))
        ));
    }

    #[test]
    fn test_result_completing_after_stop_is_dropped() {
        let f = fixture_with(manual_config(), ManualCapture::default());
        let events = f.subscribe();
        f.session.start().unwrap();

        f.push(10);
        f.session.stop();
        f.detector.take().succeed(face());

        assert!(events.recv_timeout(QUIET).is_err());
        wait_for(|| f.session.stats().discarded == 1);
    }

    #[test]
    fn test_restart_waits_for_stale_submission() {
        let f = fixture_with(manual_config(), ManualCapture::default());
        let events = f.subscribe();
        f.session.start().unwrap();
        f.push(10);

        f.session.stop();
        f.session.start().unwrap();
        f.push(20);
        assert_eq!(f.detector.pending(), 1);

        f.detector.take().succeed(face());
        f.detector.take().succeed(face());
        assert_eq!(next_feature_timestamp(&events), 20);
        assert!(events.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn test_frames_arriving_while_idle_are_released() {
        let f = fixture_with(manual_config(), ManualCapture::default());
        let sink = FrameSink::new(f.session.pipeline.clone());
        sink.offer(f.frame(10));

        assert_eq!(f.released.load(Ordering::SeqCst), 1);
        assert_eq!(f.detector.pending(), 0);
        assert_eq!(f.session.stats().rejected, 1);
    }

    #[test]
    fn test_stop_releases_pending_frame() {
        let f = fixture();
        let _events = f.subscribe();
        f.push(10);
        f.push(20);
        assert_eq!(f.released.load(Ordering::SeqCst), 1);

        f.session.stop();
        assert_eq!(f.released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_bind_failure_is_returned_and_reported() {
        let f = fixture_with(manual_config(), ManualCapture::failing("camera in use"));
        let events = f.subscribe();

        let err = f.session.start().unwrap_err();
        assert_eq!(err, TrackingError::BindFailure(BindError("camera in use".into())));
        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(
            events.recv_timeout(Duration::from_secs(2)).unwrap(),
            TrackingEvent::Error(err)
        );
    }

    #[test]
    fn test_bind_failure_on_auto_start_reaches_new_subscriber() {
        let f = fixture_with(TrackerConfig::default(), ManualCapture::failing("no camera"));
        let events = f.subscribe();

        assert!(matches!(
            events.recv_timeout(Duration::from_secs(2)).unwrap(),
            TrackingEvent::Error(TrackingError::BindFailure(_))
        ));
        assert!(!f.session.is_active());
    }

    #[test]
    fn test_new_subscriber_supersedes_old_one() {
        let f = fixture();
        let first = f.subscribe();
        f.push(10);

        let second = f.subscribe();
        assert_eq!(f.capture.binds(), 2);
        f.detector.take().succeed(face());

        f.push(20);
        f.detector.take().succeed(face());
        assert_eq!(next_feature_timestamp(&second), 20);
        assert!(first.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn test_result_dispatched_for_replaced_subscriber_is_dropped() {
        let f = fixture_with(manual_config(), ManualCapture::default());
        let first = f.subscribe();
        f.session.start().unwrap();
        f.push(10);

        let second = f.subscribe();
        assert!(f.session.is_active());
        f.detector.take().succeed(face());
        assert!(second.recv_timeout(QUIET).is_err());
        assert!(first.recv_timeout(QUIET).is_err());

        f.push(20);
        f.detector.take().succeed(face());
        assert_eq!(next_feature_timestamp(&second), 20);
    }

    #[test]
    fn test_timed_capture_with_slow_replay_detector_releases_every_frame() {
        let capture = TimedCaptureSource::new(8, 8, 500.0);
        let counters = capture.counters();
        let detector = ReplayLandmarkDetector::new(
            vec![Ok(face()), Ok(LandmarkSet::empty())],
            478,
            Duration::from_millis(10),
        )
        .unwrap();
        let session =
            TrackingSession::new(TrackerConfig::default(), Box::new(capture), Box::new(detector))
                .unwrap();
        let (subscriber, events) = ChannelSubscriber::new();
        session.subscribe(Box::new(subscriber));

        wait_for(|| {
            let stats = session.stats();
            stats.delivered > 0 && stats.superseded > 0
        });
        assert!(matches!(
            events.recv_timeout(Duration::from_secs(2)).unwrap(),
            TrackingEvent::Feature(_)
        ));
        let stats = session.stats();
        assert!(stats.dispatched <= stats.offered);

        drop(session);
        assert!(counters.emitted() > 0);
        assert_eq!(counters.outstanding(), 0);
    }

    #[test]
    fn test_drop_unbinds_capture() {
        let f = fixture();
        let _events = f.subscribe();
        let capture = f.capture.clone();
        drop(f);
        assert_eq!(capture.unbinds(), 1);
    }
}
