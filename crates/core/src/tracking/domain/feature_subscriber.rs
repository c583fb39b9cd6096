use crate::shared::error::TrackingError;
use crate::shared::feature_frame::FeatureFrame;

/// Discrete event delivered to the registered subscriber.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackingEvent {
    Feature(FeatureFrame),
    Error(TrackingError),
}

/// Single live delivery target at the host boundary.
///
/// All calls arrive on one delivery thread, never concurrently.
pub trait FeatureSubscriber: Send {
    fn on_event(&mut self, event: TrackingEvent);
}

impl<F> FeatureSubscriber for F
where
    F: FnMut(TrackingEvent) + Send,
{
    fn on_event(&mut self, event: TrackingEvent) {
        self(event)
    }
}
