// ── Periodic bootstrap refresh ──

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::cache::BootstrapCache;

/// Force a refresh every `interval` until cancelled.
///
/// Each tick awaits its refresh before the next tick is considered, so
/// periodic refreshes never overlap; ticks missed meanwhile are skipped.
pub async fn refresh_task(cache: BootstrapCache, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately; the initial fetch already happened.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = cache.force() => match result {
                        Ok(bootstrap) => debug!(
                            records = bootstrap.total_records(),
                            "periodic bootstrap refresh complete"
                        ),
                        Err(e) => warn!(error = %e, "periodic bootstrap refresh failed"),
                    },
                }
            }
        }
    }

    debug!("bootstrap refresh task stopped");
}
