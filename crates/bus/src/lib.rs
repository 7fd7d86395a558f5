//! In-process pub/sub for out-of-band [`Event`]s.
//!
//! Every Element holds a handle to the same `EventBus`. Publishing never
//! blocks: a subscriber with a full channel simply misses that event. The
//! bus has no back-pressure, no persistence, and no replay — it is usable
//! before `start()` is ever called, since `publish` only fans out to
//! whichever subscribers currently exist.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

pub use flowmesh_event::{Event, EventPayload, EventType};

/// Channel depth used when a subscriber doesn't request a specific one.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 32;

/// Handle returned by `subscribe`, used to `unsubscribe` later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving half returned by `subscribe`.
pub type EventReceiver = mpsc::Receiver<Event>;

struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::Sender<Event>,
}

struct Inner {
    subscribers: Mutex<HashMap<EventType, Vec<Subscriber>>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
    started: AtomicBool,
}

/// Typed pub/sub bus. Cheap to clone — all clones share the same
/// subscriber table.
#[derive(Clone)]
pub struct EventBus {
    inner: std::sync::Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(Inner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                dropped: AtomicU64::new(0),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Idempotent: may be called multiple times without effect beyond the
    /// first.
    pub fn start(&self) {
        self.inner.started.store(true, Ordering::Relaxed);
    }

    /// Idempotent.
    pub fn stop(&self) {
        self.inner.started.store(false, Ordering::Relaxed);
    }

    /// Subscribe to one event type with the default channel depth.
    pub fn subscribe(&self, event_type: EventType) -> (SubscriptionId, EventReceiver) {
        self.subscribe_with_capacity(event_type, DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn subscribe_with_capacity(
        &self,
        event_type: EventType,
        capacity: usize,
    ) -> (SubscriptionId, EventReceiver) {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .entry(event_type)
            .or_default()
            .push(Subscriber { id, tx });
        (id, rx)
    }

    /// Remove a subscription. No-op if it was already removed.
    pub fn unsubscribe(&self, event_type: EventType, id: SubscriptionId) {
        if let Some(subs) = self.inner.subscribers.lock().unwrap().get_mut(&event_type) {
            subs.retain(|s| s.id != id);
        }
    }

    /// Publish an event to every current subscriber of its type.
    ///
    /// Non-blocking: a full subscriber channel drops the event for that
    /// subscriber only. Returns `true` if at least one subscriber
    /// received it.
    pub fn publish(&self, event: Event) -> bool {
        let event_type = event.event_type();
        let targets: Vec<mpsc::Sender<Event>> = {
            let subs = self.inner.subscribers.lock().unwrap();
            match subs.get(&event_type) {
                Some(list) => list.iter().map(|s| s.tx.clone()).collect(),
                None => return false,
            }
        };

        let mut delivered = false;
        for tx in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered = true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if dropped % 10 == 1 {
                        tracing::warn!(?event_type, dropped, "event bus subscriber full, dropping");
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self, event_type: EventType) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .get(&event_type)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}
