use std::fmt;

use ndarray::ArrayView3;

/// Error reported by a capture source when a frame buffer cannot be returned.
pub type ReleaseError = Box<dyn std::error::Error + Send + Sync>;

/// Hook that hands a frame buffer back to the capture source.
pub type ReleaseHook = Box<dyn FnOnce() -> Result<(), ReleaseError> + Send>;

/// A single camera frame: contiguous pixel bytes in row-major order, tagged
/// with its capture timestamp.
///
/// The buffer is borrowed from the capture source and must be handed back
/// exactly once. [`Frame::close`] releases it explicitly; dropping an
/// unclosed frame releases it as well, so every exit path returns the buffer.
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
    timestamp_ms: i64,
    release: Option<ReleaseHook>,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        index: usize,
        timestamp_ms: i64,
    ) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
            timestamp_ms,
            release: None,
        }
    }

    /// Attaches the hook run when the frame is released.
    pub fn with_release(mut self, hook: ReleaseHook) -> Self {
        self.release = Some(hook);
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Copies the pixels into a payload the detector can own.
    pub fn to_payload(&self) -> ImagePayload {
        ImagePayload {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
            channels: self.channels,
        }
    }

    /// Releases the buffer back to the capture source.
    pub fn close(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        let Some(hook) = self.release.take() else {
            return;
        };
        if let Err(e) = hook() {
            if cfg!(debug_assertions) && !std::thread::panicking() {
                panic!("frame {} release failed: {e}", self.index);
            }
            log::error!("Failed to release frame {}: {e}", self.index);
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("index", &self.index)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// Pixel copy handed to the landmark detector. Owns its bytes, so the
/// originating [`Frame`] can be released as soon as the payload exists.
#[derive(Clone, Debug, PartialEq)]
pub struct ImagePayload {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl ImagePayload {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// (height, width, channels) view of the pixels. This is the form model
    /// backed [`LandmarkDetector`](crate::tracking::domain::landmark_detector::LandmarkDetector)
    /// adapters read their input tensor from.
    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (
                self.height as usize,
                self.width as usize,
                self.channels as usize,
            ),
            &self.data,
        )
        .expect("Payload data length must match dimensions")
    }
}
