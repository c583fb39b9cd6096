//! Single delivery context for subscriber notifications.
//!
//! One thread owns the registered subscriber and receives commands and
//! events in order over a channel. Events carry a ticket naming the
//! subscriber and session generation they were produced for; the thread
//! re-checks the ticket against the live gate right before delivering, so
//! events from a stopped session or for a superseded subscriber never reach
//! anyone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::session::pipeline_stats::PipelineStats;
use crate::tracking::domain::feature_subscriber::{FeatureSubscriber, TrackingEvent};

#[derive(Default)]
struct GateState {
    active: bool,
    generation: u64,
    subscriber: Option<u64>,
}

/// Live view of which session generation and subscriber may receive events.
#[derive(Default)]
pub(crate) struct DeliveryGate {
    state: Mutex<GateState>,
}

/// Stamp attached to every queued event.
///
/// `generation: None` marks events not tied to an activation (bind failures),
/// which only need the subscriber to still be current.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EventTicket {
    subscriber: u64,
    generation: Option<u64>,
}

impl DeliveryGate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn activate(&self, generation: u64) {
        let mut state = self.lock();
        state.active = true;
        state.generation = generation;
    }

    pub(crate) fn deactivate(&self) {
        self.lock().active = false;
    }

    fn set_subscriber(&self, subscriber: Option<u64>) {
        self.lock().subscriber = subscriber;
    }

    pub(crate) fn has_subscriber(&self) -> bool {
        self.lock().subscriber.is_some()
    }

    /// Stamps an event for the current subscriber, or `None` if it would
    /// already be rejected.
    fn ticket(&self, generation: Option<u64>) -> Option<EventTicket> {
        let ticket = EventTicket {
            subscriber: self.lock().subscriber?,
            generation,
        };
        self.admits(ticket).then_some(ticket)
    }

    fn admits(&self, ticket: EventTicket) -> bool {
        let state = self.lock();
        if state.subscriber != Some(ticket.subscriber) {
            return false;
        }
        match ticket.generation {
            Some(generation) => state.active && state.generation == generation,
            None => true,
        }
    }
}

enum DeliveryCommand {
    Subscribe(u64, Box<dyn FeatureSubscriber>),
    Unsubscribe,
    Event(EventTicket, TrackingEvent),
    Shutdown,
}

/// Cloneable handle used by producers to queue events for delivery.
#[derive(Clone)]
pub(crate) struct EventPublisher {
    tx: Sender<DeliveryCommand>,
    gate: Arc<DeliveryGate>,
    stats: Arc<PipelineStats>,
}

impl EventPublisher {
    /// Queues `event` for the current subscriber. Returns false when the event
    /// was dropped because nothing current would accept it.
    pub(crate) fn publish(&self, generation: Option<u64>, event: TrackingEvent) -> bool {
        let Some(ticket) = self.gate.ticket(generation) else {
            self.stats.record_discarded();
            return false;
        };
        if self.tx.send(DeliveryCommand::Event(ticket, event)).is_err() {
            log::debug!("Delivery thread gone, dropping event");
            return false;
        }
        true
    }
}

/// Owns the delivery thread and the subscriber registration.
pub(crate) struct DeliveryContext {
    publisher: EventPublisher,
    next_subscriber: AtomicU64,
    handle: Option<JoinHandle<()>>,
}

impl DeliveryContext {
    pub(crate) fn spawn(stats: Arc<PipelineStats>) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<DeliveryCommand>();
        let gate = Arc::new(DeliveryGate::default());

        let thread_gate = gate.clone();
        let thread_stats = stats.clone();
        let handle = std::thread::Builder::new()
            .name("facepose-delivery".into())
            .spawn(move || run_delivery_loop(rx, &thread_gate, &thread_stats))?;

        Ok(Self {
            publisher: EventPublisher { tx, gate, stats },
            next_subscriber: AtomicU64::new(1),
            handle: Some(handle),
        })
    }

    pub(crate) fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    pub(crate) fn gate(&self) -> &DeliveryGate {
        &self.publisher.gate
    }

    /// Makes `subscriber` the only delivery target. Events already queued for
    /// the previous subscriber are dropped from this point on.
    pub(crate) fn subscribe(&self, subscriber: Box<dyn FeatureSubscriber>) {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.publisher.gate.set_subscriber(Some(id));
        let _ = self
            .publisher
            .tx
            .send(DeliveryCommand::Subscribe(id, subscriber));
    }

    pub(crate) fn unsubscribe(&self) {
        self.publisher.gate.set_subscriber(None);
        let _ = self.publisher.tx.send(DeliveryCommand::Unsubscribe);
    }
}

impl Drop for DeliveryContext {
    fn drop(&mut self) {
        let _ = self.publisher.tx.send(DeliveryCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Delivery thread panicked");
            }
        }
    }
}

fn run_delivery_loop(rx: Receiver<DeliveryCommand>, gate: &DeliveryGate, stats: &PipelineStats) {
    let mut current: Option<(u64, Box<dyn FeatureSubscriber>)> = None;

    for command in rx {
        match command {
            DeliveryCommand::Subscribe(id, subscriber) => {
                if let Some((previous, _)) = current.replace((id, subscriber)) {
                    log::debug!("Subscriber {previous} superseded by {id}");
                }
            }
            DeliveryCommand::Unsubscribe => {
                if let Some((id, _)) = current.take() {
                    log::debug!("Subscriber {id} cancelled");
                }
            }
            DeliveryCommand::Event(ticket, event) => match current.as_mut() {
                Some((id, subscriber)) if *id == ticket.subscriber && gate.admits(ticket) => {
                    subscriber.on_event(event);
                    stats.record_delivered();
                }
                _ => stats.record_discarded(),
            },
            DeliveryCommand::Shutdown => break,
        }
    }
}
