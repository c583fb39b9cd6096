use crossbeam_channel::{Receiver, Sender};

use crate::tracking::domain::feature_subscriber::{FeatureSubscriber, TrackingEvent};

/// Forwards every delivered event into a channel, for hosts that consume
/// events on their own thread.
pub struct ChannelSubscriber {
    tx: Sender<TrackingEvent>,
}

impl ChannelSubscriber {
    pub fn new() -> (Self, Receiver<TrackingEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl FeatureSubscriber for ChannelSubscriber {
    fn on_event(&mut self, event: TrackingEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Event receiver dropped; discarding event");
        }
    }
}
