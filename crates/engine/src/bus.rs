// SPDX-License-Identifier: MIT

//! Single-topic event bus with bounded, dropping fan-out.
//!
//! Publishing never blocks: each subscriber has a 64-event buffer and a
//! full buffer drops the event for that subscriber only. Subscribers see
//! events published after they subscribe, in publication order.

use anvil_core::Event;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Per-subscriber buffer capacity.
pub const SUBSCRIBER_BUFFER: usize = 64;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Event>,
}

#[derive(Default)]
struct Inner {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

/// Cloneable handle to the bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

/// One subscription. Dropping it cancels: the bus forgets the buffer and
/// the stream ends.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Event>,
    bus: EventBus,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish to every current subscriber; full buffers drop.
    pub fn publish(&self, event: Event) {
        let inner = self.inner.lock();
        for sub in &inner.subscribers {
            if sub.tx.try_send(event.clone()).is_err() {
                trace!(subscriber = sub.id, event = %event.id, "event dropped for slow subscriber");
            }
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber { id, tx });
        Subscription {
            id,
            rx,
            bus: self.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    fn unsubscribe(&self, id: u64) {
        self.inner.lock().subscribers.retain(|s| s.id != id);
    }
}

impl Subscription {
    /// Next buffered event; `None` once cancelled and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Non-blocking variant for polls.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
