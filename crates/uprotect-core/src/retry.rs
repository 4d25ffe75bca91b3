// ── Per-device retry scheduling ──
//
// A failed device refresh is retried once after a fixed delay. At most
// one retry is pending per key: scheduling again replaces the earlier
// retry, so only the latest one ever runs.
//
// `cancel_all` starts a new generation. Retries of earlier generations
// are aborted even mid-run, and cannot schedule follow-ups.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::DeviceSource;
use crate::error::CoreError;
use crate::model::{ModelType, Record};
use crate::store::{ApplyOutcome, BootstrapCache};
use crate::stream::{UpdateAction, UpdateMessage};

const REACHABILITY_CAPACITY: usize = 64;

// ── RetryScheduler ──────────────────────────────────────────────────

struct PendingRetry {
    token: u64,
    handle: AbortHandle,
}

struct SchedulerInner {
    delay: Duration,
    pending: DashMap<String, PendingRetry>,
    next_token: AtomicU64,
    generation: AtomicU64,
    /// Cancelled and replaced by `cancel_all`.
    shutdown: ArcSwap<CancellationToken>,
}

/// Delayed, de-duplicated per-key tasks.
#[derive(Clone)]
pub struct RetryScheduler {
    inner: Arc<SchedulerInner>,
}

impl RetryScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                delay,
                pending: DashMap::new(),
                next_token: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                shutdown: ArcSwap::from_pointee(CancellationToken::new()),
            }),
        }
    }

    /// Current generation; advanced by every [`cancel_all`](Self::cancel_all).
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Run `task` after the retry delay, replacing any retry already
    /// pending for `key`.
    pub fn schedule<F, Fut>(&self, key: &str, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schedule_in(self.generation(), key, task);
    }

    /// Like [`schedule`](Self::schedule), but only while `generation` is
    /// still current. Returns `false` if the retry was dropped.
    pub fn schedule_in<F, Fut>(&self, generation: u64, key: &str, task: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // Token before generation: a concurrent `cancel_all` either
        // fails the check below or cancels the token we hold.
        let shutdown = self.inner.shutdown.load_full();
        if self.generation() != generation {
            debug!(key, "retries were cancelled, not scheduling");
            return false;
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let owned_key = key.to_owned();

        // Hold the entry while spawning so the task cannot look for its
        // registration before it exists.
        let entry = self.inner.pending.entry(key.to_owned());
        let handle = tokio::spawn(async move {
            let run = async {
                tokio::time::sleep(inner.delay).await;
                // Only the retry that is still registered may run.
                if inner
                    .pending
                    .remove_if(&owned_key, |_, p| p.token == token)
                    .is_some()
                {
                    task().await;
                }
            };
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = run => {}
            }
        })
        .abort_handle();

        match entry {
            Entry::Occupied(mut entry) => {
                debug!(key, "replacing pending retry");
                let old = entry.insert(PendingRetry { token, handle });
                old.handle.abort();
            }
            Entry::Vacant(entry) => {
                entry.insert(PendingRetry { token, handle });
            }
        }
        true
    }

    /// Cancel the pending retry for `key`. Returns `true` if one existed.
    pub fn cancel(&self, key: &str) -> bool {
        match self.inner.pending.remove(key) {
            Some((_, pending)) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending and running retry, and refuse follow-ups
    /// scheduled by them.
    pub fn cancel_all(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner
            .shutdown
            .swap(Arc::new(CancellationToken::new()))
            .cancel();
        self.inner.pending.retain(|_, pending| {
            pending.handle.abort();
            false
        });
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }
}

// ── Device refresh ──────────────────────────────────────────────────

/// Whether the last refresh of a device reached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reachability {
    Reachable,
    /// The last refresh failed; a retry is scheduled.
    Unreachable,
    /// The NVR no longer knows the device; it was removed from the snapshot.
    Gone,
}

/// Outcome of one refresh call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceRefresh {
    Updated(Record),
    Removed,
    /// The fetch failed; a retry was scheduled.
    RetryScheduled,
}

struct RefresherInner {
    source: Arc<dyn DeviceSource>,
    cache: BootstrapCache,
    scheduler: RetryScheduler,
    reachability: DashMap<String, Reachability>,
    changes: broadcast::Sender<(String, Reachability)>,
}

/// Re-fetches single devices into the cached bootstrap, retrying once
/// after a delay when a fetch fails.
#[derive(Clone)]
pub struct DeviceRefresher {
    inner: Arc<RefresherInner>,
}

impl DeviceRefresher {
    pub fn new(source: Arc<dyn DeviceSource>, cache: BootstrapCache, retry_delay: Duration) -> Self {
        let (changes, _) = broadcast::channel(REACHABILITY_CAPACITY);
        Self {
            inner: Arc::new(RefresherInner {
                source,
                cache,
                scheduler: RetryScheduler::new(retry_delay),
                reachability: DashMap::new(),
                changes,
            }),
        }
    }

    /// Fetch one device and fold it into the cached bootstrap.
    ///
    /// `NotFound` removes the device. A configuration error is returned
    /// as-is. Any other failure marks the device unreachable and
    /// schedules a retry.
    pub fn refresh(&self, model_type: ModelType, id: String) -> BoxFuture<'static, Result<DeviceRefresh, CoreError>> {
        self.attempt(model_type, id, self.inner.scheduler.generation())
    }

    fn attempt(
        &self,
        model_type: ModelType,
        id: String,
        generation: u64,
    ) -> BoxFuture<'static, Result<DeviceRefresh, CoreError>> {
        let this = self.clone();
        async move {
            let outcome = match this.inner.source.fetch_device(model_type, &id).await {
                Ok(payload) => this.fold_in(model_type, &id, payload).map(DeviceRefresh::Updated),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(refreshed) => Ok(refreshed),
                Err(e) if e.is_not_found() => {
                    info!(model = %model_type, id = %id, "device no longer exists, removing");
                    this.inner.scheduler.cancel(&id);
                    this.inner
                        .cache
                        .apply_incremental(&UpdateMessage::new(UpdateAction::Remove, model_type, id.clone()))?;
                    this.set_reachability(&id, Reachability::Gone);
                    Ok(DeviceRefresh::Removed)
                }
                Err(e @ CoreError::Config { .. }) => Err(e),
                Err(e) => {
                    warn!(model = %model_type, id = %id, error = %e, "device refresh failed, will retry");
                    this.set_reachability(&id, Reachability::Unreachable);
                    let retry = this.clone();
                    let retry_id = id.clone();
                    let scheduled = this.inner.scheduler.schedule_in(generation, &id, move || {
                        let attempt = retry.attempt(model_type, retry_id, generation);
                        async move {
                            if let Err(e) = attempt.await {
                                warn!(error = %e, "device retry failed");
                            }
                        }
                    });
                    if scheduled {
                        Ok(DeviceRefresh::RetryScheduled)
                    } else {
                        Err(e)
                    }
                }
            }
        }
        .boxed()
    }

    pub fn reachability(&self, id: &str) -> Option<Reachability> {
        self.inner.reachability.get(id).map(|r| *r)
    }

    /// Subscribe to reachability transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<(String, Reachability)> {
        self.inner.changes.subscribe()
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.inner.scheduler
    }

    pub fn cancel_all(&self) {
        self.inner.scheduler.cancel_all();
    }

    /// Send a settings change and fold the NVR's answer into the cache.
    pub fn patch(
        &self,
        model_type: ModelType,
        id: String,
        body: serde_json::Value,
    ) -> BoxFuture<'static, Result<Record, CoreError>> {
        let this = self.clone();
        async move {
            let payload = this.inner.source.patch_device(model_type, &id, &body).await?;
            this.fold_in(model_type, &id, payload)
        }
        .boxed()
    }

    pub fn source(&self) -> &Arc<dyn DeviceSource> {
        &self.inner.source
    }

    /// Decode a full device record and install it in the cache. A record
    /// in hand proves the device reachable.
    fn fold_in(&self, model_type: ModelType, id: &str, payload: serde_json::Value) -> Result<Record, CoreError> {
        let record = Record::decode(model_type, payload.clone())
            .map_err(|e| CoreError::malformed(format!("{model_type} {id}"), e))?
            .ok_or_else(|| CoreError::malformed(format!("{model_type} {id}"), "model has no record shape"))?
            .with_id(id);

        let msg = UpdateMessage::new(UpdateAction::Add, model_type, id).with_payload(payload);
        let outcome = self.inner.cache.apply_incremental(&msg)?;
        if outcome == ApplyOutcome::NoSnapshot {
            debug!(model = %model_type, id, "no bootstrap held, refreshed device not stored");
        }

        self.inner.scheduler.cancel(id);
        self.set_reachability(id, Reachability::Reachable);
        Ok(record)
    }

    fn set_reachability(&self, id: &str, state: Reachability) {
        let previous = self.inner.reachability.insert(id.to_owned(), state);
        if previous != Some(state) {
            debug!(id, ?state, "device reachability changed");
            let _ = self.inner.changes.send((id.to_owned(), state));
        }
    }
}
