// Snapshot fan-out to every connected subscriber.

use crate::domain::{SimError, Snapshot};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Lifecycle of one subscriber connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Registered but not yet receiving snapshots.
    Connecting,
    /// Receives every published snapshot in tick order.
    Active,
    /// Fell behind; no new snapshots, may still read what was queued.
    Draining,
    /// Gone. Excluded from fan-out and its queue is released.
    Closed,
}

struct Slot {
    state: SubscriberState,
    // Dropped on the move to Draining so the receiver sees end of stream.
    tx: Option<mpsc::Sender<Arc<Snapshot>>>,
}

#[derive(Default)]
struct Subscribers {
    slots: HashMap<u64, Slot>,
    last_tick: Option<u64>,
}

/// Result of one [`BroadcastHub::publish`] call.
#[derive(Debug, Default)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: Vec<SimError>,
}

/// Per-subscriber bounded queues fed from the tick driver.
///
/// Publishing never blocks: a subscriber whose queue is full is moved to
/// [`SubscriberState::Draining`] instead of slowing everybody else down.
pub struct BroadcastHub {
    subscribers: Mutex<Subscribers>,
    next_id: AtomicU64,
    queue_depth: usize,
}

impl BroadcastHub {
    /// # Panics
    ///
    /// Panics if `queue_depth` is zero.
    pub fn new(queue_depth: usize) -> Arc<Self> {
        assert!(queue_depth > 0, "subscriber queue depth must be > 0");
        Arc::new(Self {
            subscribers: Mutex::new(Subscribers::default()),
            next_id: AtomicU64::new(1),
            queue_depth,
        })
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Registers a new subscriber in the `Connecting` state.
    pub fn connect(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_depth);
        self.subscribers.lock().slots.insert(
            id,
            Slot {
                state: SubscriberState::Connecting,
                tx: Some(tx),
            },
        );
        debug!(subscriber_id = id, "subscriber connecting");
        Subscription {
            id,
            rx,
            hub: Arc::clone(self),
        }
    }

    /// Starts delivery. Returns false unless the subscriber was `Connecting`.
    pub fn activate(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        match subscribers.slots.get_mut(&id) {
            Some(slot) if slot.state == SubscriberState::Connecting => {
                slot.state = SubscriberState::Active;
                true
            }
            _ => false,
        }
    }

    /// Removes a subscriber and releases its queue.
    pub fn close(&self, id: u64) {
        if self.subscribers.lock().slots.remove(&id).is_some() {
            debug!(subscriber_id = id, "subscriber closed");
        }
    }

    pub fn state(&self, id: u64) -> Option<SubscriberState> {
        if let Some(slot) = self.subscribers.lock().slots.get(&id) {
            return Some(slot.state);
        }
        // Ids are never reused, so a known id missing from the table is closed.
        (id > 0 && id < self.next_id.load(Ordering::Relaxed)).then_some(SubscriberState::Closed)
    }

    pub fn active_count(&self) -> usize {
        self.subscribers
            .lock()
            .slots
            .values()
            .filter(|s| s.state == SubscriberState::Active)
            .count()
    }

    pub fn last_tick(&self) -> Option<u64> {
        self.subscribers.lock().last_tick
    }

    /// Hands a snapshot to every active subscriber without waiting on any.
    pub fn publish(&self, snapshot: Arc<Snapshot>) -> PublishReport {
        let mut report = PublishReport::default();
        let mut subscribers = self.subscribers.lock();

        if subscribers.last_tick.is_some_and(|last| snapshot.tick <= last) {
            warn!(
                tick = snapshot.tick,
                last_tick = ?subscribers.last_tick,
                "dropping out-of-order snapshot"
            );
            return report;
        }
        subscribers.last_tick = Some(snapshot.tick);

        let mut gone = Vec::new();
        for (&id, slot) in subscribers.slots.iter_mut() {
            if slot.state != SubscriberState::Active {
                continue;
            }
            let Some(tx) = slot.tx.as_ref() else {
                continue;
            };

            match tx.try_send(Arc::clone(&snapshot)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        subscriber_id = id,
                        tick = snapshot.tick,
                        queue_depth = self.queue_depth,
                        "subscriber queue full; draining"
                    );
                    slot.state = SubscriberState::Draining;
                    slot.tx = None;
                    report
                        .dropped
                        .push(SimError::DeliveryFailure { subscriber_id: id });
                }
                Err(TrySendError::Closed(_)) => {
                    gone.push(id);
                    report
                        .dropped
                        .push(SimError::DeliveryFailure { subscriber_id: id });
                }
            }
        }
        for id in gone {
            subscribers.slots.remove(&id);
            debug!(subscriber_id = id, "subscriber receiver gone; closed");
        }

        report
    }
}

/// Receiving side of one subscriber. Dropping it closes the subscriber.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<Snapshot>>,
    hub: Arc<BroadcastHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next snapshot, or `None` once the hub stopped delivering to us.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.close(self.id);
    }
}
