use std::io::BufRead;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use serde::Deserialize;
use thiserror::Error;

use crate::shared::constants::FACE_MESH_LANDMARK_COUNT;
use crate::shared::error::DetectionError;
use crate::shared::landmark::{Landmark, LandmarkSet};
use crate::tracking::domain::landmark_detector::{
    DetectionRequest, DetectionTicket, LandmarkDetector,
};

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("failed to read recording: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to start replay worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
}

/// One recorded detector result.
pub type RecordedDetection = Result<LandmarkSet, DetectionError>;

/// A recording line: `[[x, y, z], ...]` (empty = no face) or `{"error": "..."}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordLine {
    Face(Vec<[f32; 3]>),
    Error { error: String },
}

impl From<RecordLine> for RecordedDetection {
    fn from(line: RecordLine) -> Self {
        match line {
            RecordLine::Face(points) => Ok(LandmarkSet::new(
                points
                    .into_iter()
                    .map(|[x, y, z]| Landmark::new(x, y, z))
                    .collect(),
            )),
            RecordLine::Error { error } => Err(DetectionError(error)),
        }
    }
}

struct Job {
    result: RecordedDetection,
    ticket: DetectionTicket,
}

/// Replays recorded detector results, one per submission, cycling through
/// the recording.
///
/// Results complete on a worker thread after a fixed latency, reproducing
/// the asynchronous completion of a live detector without loading a model.
pub struct ReplayLandmarkDetector {
    recording: Arc<Vec<RecordedDetection>>,
    landmark_count: usize,
    cursor: usize,
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl ReplayLandmarkDetector {
    pub fn new(
        recording: Vec<RecordedDetection>,
        landmark_count: usize,
        latency: Duration,
    ) -> Result<Self, RecordingError> {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let worker = std::thread::Builder::new()
            .name("facepose-replay".into())
            .spawn(move || {
                for job in rx {
                    if !latency.is_zero() {
                        std::thread::sleep(latency);
                    }
                    job.ticket.complete(job.result);
                }
            })
            .map_err(RecordingError::Spawn)?;
        Ok(Self {
            recording: Arc::new(recording),
            landmark_count,
            cursor: 0,
            jobs: Some(tx),
            worker: Some(worker),
        })
    }

    /// Parses a JSON-lines recording. The schema length is taken from the
    /// first non-empty face, falling back to the face mesh size.
    pub fn from_jsonl(reader: impl BufRead, latency: Duration) -> Result<Self, RecordingError> {
        let mut recording = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: RecordLine = serde_json::from_str(&line)
                .map_err(|source| RecordingError::Parse { line: i + 1, source })?;
            recording.push(RecordedDetection::from(parsed));
        }

        let landmark_count = recording
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .find(|set| !set.is_empty())
            .map_or(FACE_MESH_LANDMARK_COUNT, LandmarkSet::len);

        log::info!(
            "Loaded {} recorded detections ({landmark_count} landmarks per face)",
            recording.len()
        );
        Self::new(recording, landmark_count, latency)
    }

    pub fn len(&self) -> usize {
        self.recording.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recording.is_empty()
    }

    fn next_result(&mut self) -> RecordedDetection {
        if self.recording.is_empty() {
            return Ok(LandmarkSet::empty());
        }
        let result = self.recording[self.cursor % self.recording.len()].clone();
        self.cursor += 1;
        result
    }
}

impl LandmarkDetector for ReplayLandmarkDetector {
    fn submit(&mut self, _request: DetectionRequest, ticket: DetectionTicket) {
        let result = self.next_result();
        let Some(jobs) = &self.jobs else {
            ticket.fail(DetectionError("detector closed".into()));
            return;
        };
        if let Err(e) = jobs.send(Job { result, ticket }) {
            e.into_inner()
                .ticket
                .fail(DetectionError("detector worker stopped".into()));
        }
    }

    fn landmark_count(&self) -> usize {
        self.landmark_count
    }
}

impl Drop for ReplayLandmarkDetector {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
