use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Per-session counters, updated lock-free from the capture, completion and
/// delivery threads.
pub struct PipelineStats {
    started: Instant,
    offered: AtomicU64,
    rejected: AtomicU64,
    superseded: AtomicU64,
    dispatched: AtomicU64,
    faces: AtomicU64,
    no_face: AtomicU64,
    detection_errors: AtomicU64,
    delivered: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    pub elapsed_ms: u64,
    pub offered: u64,
    pub rejected: u64,
    pub superseded: u64,
    pub dispatched: u64,
    pub faces: u64,
    pub no_face: u64,
    pub detection_errors: u64,
    pub delivered: u64,
    pub discarded: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            offered: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            faces: AtomicU64::new(0),
            no_face: AtomicU64::new(0),
            detection_errors: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_offered(&self) {
        self.offered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_face(&self) {
        self.faces.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_no_face(&self) {
        self.no_face.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_detection_error(&self) {
        self.detection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Event dropped because its session or subscriber was no longer current.
    pub(crate) fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            offered: self.offered.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            faces: self.faces.load(Ordering::Relaxed),
            no_face: self.no_face.load(Ordering::Relaxed),
            detection_errors: self.detection_errors.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineSnapshot {
    /// Returns the formatted summary, or `None` if no frame was ever offered.
    pub fn summary_string(&self) -> Option<String> {
        if self.offered == 0 {
            return None;
        }

        let elapsed_s = self.elapsed_ms as f64 / 1000.0;
        let pct = |n: u64| n as f64 / self.offered as f64 * 100.0;
        let mut lines = Vec::new();

        lines.push(format!(
            "Pipeline summary ({} frames offered, {elapsed_s:.1}s):",
            self.offered
        ));
        lines.push(format!(
            "  {:12}: {:6}  ({:4.1}%)",
            "dispatched",
            self.dispatched,
            pct(self.dispatched)
        ));
        lines.push(format!(
            "  {:12}: {:6}  ({:4.1}%)",
            "superseded",
            self.superseded,
            pct(self.superseded)
        ));
        lines.push(format!(
            "  {:12}: {:6}  ({:4.1}%)",
            "rejected",
            self.rejected,
            pct(self.rejected)
        ));
        lines.push(format!(
            "  detections: {} face, {} no face, {} errors",
            self.faces, self.no_face, self.detection_errors
        ));
        lines.push(format!(
            "  events: {} delivered, {} discarded",
            self.delivered, self.discarded
        ));

        if elapsed_s > 0.0 {
            let fps = self.dispatched as f64 / elapsed_s;
            lines.push(format!("  Detection rate: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }
}
