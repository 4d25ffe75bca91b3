// ── Event coalescer ──
//
// Collapses bursts of updates per key into one delivery. Two timers run
// per pending key: an inactivity timer restarted by every update, and a
// max-wait timer started by the first update. Whichever fires first
// delivers the latest value and cancels the other.
//
// Each pending entry carries an epoch (new per burst) and a generation
// (bumped per update). A timer only delivers if both still match, so a
// timer that lost a race with a newer update or the other timer finds
// nothing to do.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::trace;

const DELIVERY_CAPACITY: usize = 256;

/// One coalesced delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Coalesced<T> {
    pub key: String,
    /// The most recent value submitted for `key`.
    pub value: T,
    /// How many submissions this delivery stands for.
    pub merged: u32,
}

struct Pending<T> {
    value: T,
    epoch: u64,
    generation: u64,
    merged: u32,
    inactivity: AbortHandle,
    max_wait: AbortHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Inactivity { generation: u64 },
    MaxWait,
}

struct CoalescerInner<T> {
    debounce: Duration,
    max_wait: Duration,
    pending: DashMap<String, Pending<T>>,
    next_epoch: AtomicU64,
    deliveries: broadcast::Sender<Arc<Coalesced<T>>>,
}

/// Per-key debounce with a bounded maximum delay.
///
/// Cheaply cloneable; clones share state. Must be used inside a Tokio
/// runtime.
pub struct EventCoalescer<T> {
    inner: Arc<CoalescerInner<T>>,
}

impl<T> Clone for EventCoalescer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> EventCoalescer<T> {
    pub fn new(debounce: Duration, max_wait: Duration) -> Self {
        let (deliveries, _) = broadcast::channel(DELIVERY_CAPACITY);
        Self {
            inner: Arc::new(CoalescerInner {
                debounce,
                max_wait,
                pending: DashMap::new(),
                next_epoch: AtomicU64::new(0),
                deliveries,
            }),
        }
    }

    /// Record an update for `key`, replacing any pending value.
    pub fn submit(&self, key: impl Into<String>, value: T) {
        let key = key.into();
        match self.inner.pending.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let pending = entry.get_mut();
                pending.value = value;
                pending.generation += 1;
                pending.merged = pending.merged.saturating_add(1);
                pending.inactivity.abort();
                pending.inactivity = self.spawn_timer(
                    key,
                    pending.epoch,
                    Timer::Inactivity {
                        generation: pending.generation,
                    },
                );
            }
            Entry::Vacant(entry) => {
                let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
                let max_wait = self.spawn_timer(key.clone(), epoch, Timer::MaxWait);
                let inactivity = self.spawn_timer(key, epoch, Timer::Inactivity { generation: 0 });
                entry.insert(Pending {
                    value,
                    epoch,
                    generation: 0,
                    merged: 1,
                    inactivity,
                    max_wait,
                });
            }
        }
    }

    /// Subscribe to deliveries. Deliveries made before subscribing are
    /// not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Coalesced<T>>> {
        self.inner.deliveries.subscribe()
    }

    /// Cancel every timer and discard pending values without delivering.
    pub fn shutdown(&self) {
        self.inner.pending.retain(|_, pending| {
            pending.inactivity.abort();
            pending.max_wait.abort();
            false
        });
    }

    /// Number of keys with an undelivered value.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.pending.contains_key(key)
    }

    fn spawn_timer(&self, key: String, epoch: u64, timer: Timer) -> AbortHandle {
        let inner = Arc::clone(&self.inner);
        let delay = match timer {
            Timer::Inactivity { .. } => inner.debounce,
            Timer::MaxWait => inner.max_wait,
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire(&key, epoch, timer);
        })
        .abort_handle()
    }
}

impl<T> CoalescerInner<T> {
    fn fire(&self, key: &str, epoch: u64, timer: Timer) {
        let removed = self.pending.remove_if(key, |_, pending| {
            pending.epoch == epoch
                && match timer {
                    Timer::Inactivity { generation } => pending.generation == generation,
                    Timer::MaxWait => true,
                }
        });
        let Some((key, pending)) = removed else {
            trace!(key, ?timer, "coalescer timer superseded");
            return;
        };

        match timer {
            Timer::Inactivity { .. } => pending.max_wait.abort(),
            Timer::MaxWait => pending.inactivity.abort(),
        }

        trace!(key = %key, merged = pending.merged, ?timer, "delivering coalesced update");
        // No subscribers is fine; the value is simply dropped.
        let _ = self.deliveries.send(Arc::new(Coalesced {
            key,
            value: pending.value,
            merged: pending.merged,
        }));
    }
}
