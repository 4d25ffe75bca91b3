// ── Bootstrap store ──
//
// The cached full-state snapshot and everything that mutates it:
// incremental apply, TTL-bounded refresh, and the periodic refresh task.

mod apply;
mod bootstrap;
mod cache;
mod collection;
mod refresh;

pub use apply::{ApplyOutcome, apply};
pub use bootstrap::{Bootstrap, BootstrapSnapshot};
pub use cache::BootstrapCache;
pub use collection::RecordCollection;
pub use refresh::refresh_task;
