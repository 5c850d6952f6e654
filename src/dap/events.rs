//! Explicit observer hub for protocol events.
//!
//! Each [`Subscription`] owns an unbounded receiver, so a slow observer
//! never causes another observer to miss an event. Dropping a subscription
//! removes it from the hub immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;

use crate::dap::ProtocolEvent;

type SubscriberMap = Mutex<HashMap<u64, mpsc::UnboundedSender<ProtocolEvent>>>;

#[derive(Debug, Default)]
struct HubInner {
    next_id: AtomicU64,
    subscribers: SubscriberMap,
}

/// Fan-out point for events from one protocol connection.
#[derive(Debug, Clone, Default)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every live observer.
    pub fn publish(&self, event: &ProtocolEvent) {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Drop every observer; their next `recv` yields `None`.
    pub fn close(&self) {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of registered observers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Observer handle returned by [`EventHub::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ProtocolEvent>,
    hub: Weak<HubInner>,
}

impl Subscription {
    /// Wait for the next event; `None` once the hub is closed or dropped.
    pub async fn recv(&mut self) -> Option<ProtocolEvent> {
        self.rx.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<ProtocolEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}
