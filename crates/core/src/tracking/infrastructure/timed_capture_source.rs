use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::shared::error::BindError;
use crate::shared::frame::Frame;
use crate::tracking::domain::capture_source::{CameraSelector, CaptureSource, FrameSink};

const CHANNELS: u8 = 3;

/// Buffer accounting shared with the capture thread.
#[derive(Debug, Default)]
pub struct CaptureCounters {
    emitted: AtomicU64,
    released: AtomicU64,
}

impl CaptureCounters {
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Frames handed out whose buffers have not come back yet.
    pub fn outstanding(&self) -> u64 {
        self.emitted().saturating_sub(self.released())
    }
}

struct Running {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Synthetic camera that emits blank frames at a fixed interval.
///
/// Stands in for a device camera when replaying recorded detections: every
/// frame carries a release hook that is counted, so buffer leaks show up in
/// [`CaptureCounters::outstanding`].
pub struct TimedCaptureSource {
    width: u32,
    height: u32,
    interval: Duration,
    cameras: Vec<CameraSelector>,
    epoch: Instant,
    counters: Arc<CaptureCounters>,
    running: Option<Running>,
}

impl TimedCaptureSource {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        let fps = if fps > 0.0 { fps } else { 30.0 };
        Self {
            width,
            height,
            interval: Duration::from_secs_f64(1.0 / fps),
            cameras: vec![CameraSelector::Front, CameraSelector::Back],
            epoch: Instant::now(),
            counters: Arc::new(CaptureCounters::default()),
            running: None,
        }
    }

    /// Restricts which selectors can be bound; others fail with a bind error.
    pub fn with_cameras(mut self, cameras: Vec<CameraSelector>) -> Self {
        self.cameras = cameras;
        self
    }

    pub fn counters(&self) -> Arc<CaptureCounters> {
        self.counters.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn spawn(&self, sink: FrameSink) -> Result<Running, BindError> {
        let (stop, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let (width, height, interval) = (self.width, self.height, self.interval);
        let epoch = self.epoch;
        let counters = self.counters.clone();
        let frame_len = width as usize * height as usize * CHANNELS as usize;

        let handle = std::thread::Builder::new()
            .name("facepose-capture".into())
            .spawn(move || {
                let mut last_ms = i64::MIN;
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let elapsed = i64::try_from(epoch.elapsed().as_millis()).unwrap_or(i64::MAX);
                    let timestamp_ms = elapsed.max(last_ms.saturating_add(1));
                    last_ms = timestamp_ms;

                    let index = counters.emitted.fetch_add(1, Ordering::SeqCst) as usize;
                    let released = counters.clone();
                    let frame = Frame::new(vec![0u8; frame_len], width, height, CHANNELS, index, timestamp_ms)
                        .with_release(Box::new(move || {
                            released.released.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }));
                    sink.offer(frame);
                }
            })
            .map_err(|e| BindError(format!("failed to start capture thread: {e}")))?;

        Ok(Running { stop, handle })
    }
}

impl CaptureSource for TimedCaptureSource {
    fn bind(&mut self, selector: CameraSelector, sink: FrameSink) -> Result<(), BindError> {
        if !self.cameras.contains(&selector) {
            return Err(BindError(format!("no {selector} camera available")));
        }
        self.unbind();
        self.running = Some(self.spawn(sink)?);
        log::debug!(
            "Capture bound to {selector} camera ({}x{} every {:?})",
            self.width,
            self.height,
            self.interval
        );
        Ok(())
    }

    fn unbind(&mut self) {
        let Some(Running { stop, handle }) = self.running.take() else {
            return;
        };
        drop(stop);
        if handle.join().is_err() {
            log::error!("Capture thread panicked");
        }
        log::debug!(
            "Capture unbound ({} frames emitted, {} released)",
            self.counters.emitted(),
            self.counters.released()
        );
    }
}

impl Drop for TimedCaptureSource {
    fn drop(&mut self) {
        self.unbind();
    }
}
