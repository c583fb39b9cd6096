use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::shared::error::BindError;
use crate::shared::frame::Frame;

/// Which physical camera a capture source should bind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSelector {
    #[default]
    Front,
    Back,
}

impl fmt::Display for CameraSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraSelector::Front => write!(f, "front"),
            CameraSelector::Back => write!(f, "back"),
        }
    }
}

/// Receives frames pushed by a capture source.
///
/// Called from the capture source's own thread at sensor rate; must not block.
pub trait FrameConsumer: Send + Sync {
    fn offer(&self, frame: Frame);
}

/// Cloneable handle a capture source pushes frames into.
#[derive(Clone)]
pub struct FrameSink {
    consumer: Arc<dyn FrameConsumer>,
}

impl FrameSink {
    pub fn new(consumer: Arc<dyn FrameConsumer>) -> Self {
        Self { consumer }
    }

    pub fn offer(&self, frame: Frame) {
        self.consumer.offer(frame);
    }
}

/// External camera capture.
///
/// `bind` starts delivering frames into `sink` from the source's thread;
/// `unbind` stops delivery. Every frame delivered must be released exactly
/// once, which [`Frame`] guarantees on close or drop.
pub trait CaptureSource: Send {
    fn bind(&mut self, selector: CameraSelector, sink: FrameSink) -> Result<(), BindError>;

    fn unbind(&mut self);
}
