//! Broadcast hub fanning file arrivals out to connected subscribers.
//!
//! The hub owns the subscriber registry. Every published arrival is stamped
//! with each subscriber's id and pushed into that subscriber's sink with a
//! non-blocking send, so a slow or dead subscriber never holds up `publish`
//! or any other subscriber.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::OverflowPolicy;
use crate::error::DeliveryError;
use crate::models::{FileArrival, FileArrivalEvent, SessionId};

/// A non-blocking write endpoint for one subscriber.
pub trait EventSink: Send + Sync {
    /// Hand an event to the subscriber without waiting.
    fn try_deliver(&self, event: FileArrivalEvent) -> Result<(), DeliveryError>;
}

impl EventSink for mpsc::Sender<FileArrivalEvent> {
    fn try_deliver(&self, event: FileArrivalEvent) -> Result<(), DeliveryError> {
        self.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Identifies one registration. A handle for a replaced registration never
/// removes its replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: SessionId,
    generation: u64,
}

impl SubscriptionHandle {
    pub fn id(&self) -> &SessionId {
        &self.id
    }
}

struct Subscriber {
    generation: u64,
    sink: Box<dyn EventSink>,
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
    pub evicted: usize,
}

/// Fan-out hub for file arrival events.
pub struct BroadcastHub {
    subscribers: DashMap<SessionId, Subscriber>,
    next_generation: AtomicU64,
    overflow: OverflowPolicy,
}

impl BroadcastHub {
    /// Create a new hub.
    pub fn new(overflow: OverflowPolicy) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_generation: AtomicU64::new(0),
            overflow,
        }
    }

    /// Register `sink` under `id`.
    ///
    /// An existing registration with the same id is replaced in one step:
    /// publishes ordered after the swap only reach the new sink.
    pub fn subscribe(&self, id: SessionId, sink: impl EventSink + 'static) -> SubscriptionHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let subscriber = Subscriber {
            generation,
            sink: Box::new(sink),
        };

        if self.subscribers.insert(id.clone(), subscriber).is_some() {
            info!(session_id = %id, "Replaced existing subscriber");
        } else {
            debug!(session_id = %id, "Subscriber registered");
        }

        SubscriptionHandle { id, generation }
    }

    /// Remove a registration. Returns false if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self
            .subscribers
            .remove_if(&handle.id, |_, s| s.generation == handle.generation)
            .is_some();

        if removed {
            debug!(session_id = %handle.id, "Subscriber removed");
        }
        removed
    }

    /// Deliver an arrival to every current subscriber.
    pub fn publish(&self, arrival: &FileArrival) -> PublishReport {
        let mut report = PublishReport::default();
        let mut failed = Vec::new();

        for entry in self.subscribers.iter() {
            let event = FileArrivalEvent::stamp(entry.key(), arrival);
            match entry.value().sink.try_deliver(event) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Full) if self.overflow == OverflowPolicy::Drop => {
                    warn!(session_id = %entry.key(), "Send queue full, dropping event");
                    report.dropped += 1;
                }
                Err(e) => failed.push((entry.key().clone(), entry.value().generation, e)),
            }
        }

        // Shard locks are released once iteration ends; evict afterwards.
        for (id, generation, err) in failed {
            if self
                .subscribers
                .remove_if(&id, |_, s| s.generation == generation)
                .is_some()
            {
                warn!(session_id = %id, error = %err, "Evicted subscriber");
                report.evicted += 1;
            }
        }

        report
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.subscribers.contains_key(id)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(OverflowPolicy::Evict)
    }
}
