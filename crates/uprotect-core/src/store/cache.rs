// ── Bootstrap TTL cache ──
//
// Holds the last good bootstrap and coordinates refreshes. At most one
// fetch runs at a time: concurrent callers join the in-flight fetch and
// all see its result. The fetch runs on its own task, so it completes
// (and populates the cache) even if every caller stops waiting.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::apply::{ApplyOutcome, apply};
use super::bootstrap::Bootstrap;
use crate::backend::BootstrapSource;
use crate::error::CoreError;
use crate::stream::UpdateMessage;

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Bootstrap>, CoreError>>>;

struct CacheEntry {
    bootstrap: Arc<Bootstrap>,
    /// `None` once invalidated by `force`.
    fetched_at: Option<Instant>,
}

struct CacheInner {
    source: Arc<dyn BootstrapSource>,
    ttl: Duration,
    current: ArcSwapOption<CacheEntry>,
    in_flight: Mutex<Option<SharedFetch>>,
}

/// TTL cache over a [`BootstrapSource`] with single-flight refresh.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct BootstrapCache {
    inner: Arc<CacheInner>,
}

impl BootstrapCache {
    pub fn new(source: Arc<dyn BootstrapSource>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                source,
                ttl,
                current: ArcSwapOption::empty(),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Return the cached bootstrap if fresh, otherwise fetch (or join
    /// the fetch already running).
    pub async fn get(&self) -> Result<Arc<Bootstrap>, CoreError> {
        if let Some(bootstrap) = self.fresh() {
            return Ok(bootstrap);
        }
        self.fetch_shared(false).await
    }

    /// Invalidate freshness and fetch.
    ///
    /// Joins a fetch already in flight rather than starting a second one.
    pub async fn force(&self) -> Result<Arc<Bootstrap>, CoreError> {
        self.fetch_shared(true).await
    }

    /// Like [`get`](Self::get), but on failure fall back to the last good
    /// bootstrap, however old. Errors only when nothing was ever fetched.
    pub async fn get_or_stale(&self) -> Result<Arc<Bootstrap>, CoreError> {
        match self.get().await {
            Ok(bootstrap) => Ok(bootstrap),
            Err(e) => match self.get_cached() {
                Some(stale) => {
                    warn!(error = %e, "bootstrap refresh failed, serving stale snapshot");
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// The held bootstrap, fresh or not, without fetching.
    pub fn get_cached(&self) -> Option<Arc<Bootstrap>> {
        self.inner
            .current
            .load()
            .as_ref()
            .map(|entry| Arc::clone(&entry.bootstrap))
    }

    /// Install an externally obtained bootstrap as fresh.
    pub fn update(&self, bootstrap: Bootstrap) {
        self.inner.store(Arc::new(bootstrap));
    }

    /// Apply one incremental update to the held bootstrap.
    pub fn apply_incremental(&self, msg: &UpdateMessage) -> Result<ApplyOutcome, CoreError> {
        match self.get_cached() {
            Some(bootstrap) => apply(&bootstrap, msg),
            None => Ok(ApplyOutcome::NoSnapshot),
        }
    }

    /// `true` while a fetch is running.
    pub fn is_refreshing(&self) -> bool {
        self.inner
            .in_flight
            .try_lock()
            .map_or(true, |slot| slot.is_some())
    }

    /// When the held bootstrap was fetched; `None` if absent or invalidated.
    pub fn fetched_at(&self) -> Option<Instant> {
        self.inner.current.load().as_ref().and_then(|e| e.fetched_at)
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn fresh(&self) -> Option<Arc<Bootstrap>> {
        let entry = self.inner.current.load_full()?;
        let fetched_at = entry.fetched_at?;
        (fetched_at.elapsed() < self.inner.ttl).then(|| Arc::clone(&entry.bootstrap))
    }

    fn invalidate(&self) {
        self.inner.current.rcu(|current| {
            current.as_ref().map(|entry| {
                Arc::new(CacheEntry {
                    bootstrap: Arc::clone(&entry.bootstrap),
                    fetched_at: None,
                })
            })
        });
    }

    async fn fetch_shared(&self, invalidate: bool) -> Result<Arc<Bootstrap>, CoreError> {
        let fetch = {
            let mut slot = self.inner.in_flight.lock().await;
            // Under the slot lock, so a finished fetch cannot publish
            // between the invalidation and the join below.
            if invalidate {
                self.invalidate();
            }
            if let Some(fetch) = slot.as_ref() {
                debug!("joining in-flight bootstrap fetch");
                fetch.clone()
            } else {
                let fetch = Self::spawn_fetch(Arc::clone(&self.inner));
                *slot = Some(fetch.clone());
                fetch
            }
        };
        fetch.await
    }

    fn spawn_fetch(inner: Arc<CacheInner>) -> SharedFetch {
        let task = tokio::spawn(async move {
            debug!("fetching bootstrap");
            let result = inner.source.fetch_bootstrap().await.map(Arc::new);
            // Publish and clear the slot together: callers arriving later
            // see the new entry instead of starting another fetch.
            let mut slot = inner.in_flight.lock().await;
            match &result {
                Ok(bootstrap) => {
                    info!(
                        records = bootstrap.total_records(),
                        cursor = ?bootstrap.last_update_id(),
                        "bootstrap refreshed"
                    );
                    inner.store(Arc::clone(bootstrap));
                }
                Err(e) => warn!(error = %e, "bootstrap fetch failed"),
            }
            slot.take();
            drop(slot);
            result
        });

        task.map(|joined| {
            joined.unwrap_or_else(|e| Err(CoreError::Internal(format!("bootstrap fetch task failed: {e}"))))
        })
        .boxed()
        .shared()
    }
}

impl CacheInner {
    fn store(&self, bootstrap: Arc<Bootstrap>) {
        self.current.store(Some(Arc::new(CacheEntry {
            bootstrap,
            fetched_at: Some(Instant::now()),
        })));
    }
}
