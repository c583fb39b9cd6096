use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::shared::frame::Frame;

/// What happened to a frame offered by the capture source.
#[derive(Debug)]
pub enum Admission {
    /// The dispatcher was free; the caller must dispatch this frame now.
    Dispatch(Frame, u64),
    /// Held as the latest pending frame. `superseded` is true when an older
    /// pending frame was released to make room.
    Buffered { superseded: bool },
    /// The session is idle; the frame was released.
    Rejected,
}

#[derive(Default)]
struct AdmissionState {
    active: bool,
    generation: u64,
    /// A submission is outstanding at the detector.
    busy: bool,
    pending: Option<Frame>,
}

/// Keep-only-latest admission: at most one frame in flight, at most one
/// waiting behind it.
///
/// Offers come from the capture thread, completions from the completion
/// worker, and activation from the session's command thread; all of them go
/// through one short-held lock. Superseded frames are released after the
/// lock is dropped.
#[derive(Default)]
pub struct AdmissionController {
    state: Mutex<AdmissionState>,
}

impl AdmissionController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AdmissionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts admitting frames for `generation`.
    pub fn activate(&self, generation: u64) {
        let mut state = self.lock();
        state.active = true;
        state.generation = generation;
    }

    /// Stops admitting frames and releases the pending one, if any.
    ///
    /// The busy flag is kept: a submission from the previous activation may
    /// still be running, and the detector gets no second one until it ends.
    pub fn deactivate(&self) {
        let discarded = {
            let mut state = self.lock();
            state.active = false;
            state.pending.take()
        };
        if let Some(frame) = discarded {
            log::debug!("Discarding pending frame {} on stop", frame.index());
            frame.close();
        }
    }

    pub fn offer(&self, frame: Frame) -> Admission {
        let mut state = self.lock();
        if !state.active {
            drop(state);
            frame.close();
            return Admission::Rejected;
        }
        if !state.busy {
            state.busy = true;
            return Admission::Dispatch(frame, state.generation);
        }
        let superseded = state.pending.replace(frame);
        drop(state);

        match superseded {
            Some(old) => {
                log::trace!("Frame {} superseded before dispatch", old.index());
                old.close();
                Admission::Buffered { superseded: true }
            }
            None => Admission::Buffered { superseded: false },
        }
    }

    /// Marks the outstanding submission finished and hands out the pending
    /// frame to dispatch next, keeping the controller busy when it does.
    pub fn complete(&self) -> Option<(Frame, u64)> {
        let mut state = self.lock();
        match state.pending.take() {
            Some(frame) if state.active => Some((frame, state.generation)),
            leftover => {
                state.busy = false;
                drop(state);
                if let Some(frame) = leftover {
                    frame.close();
                }
                None
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }
}
