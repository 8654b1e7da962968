//! The active-operations guard (spec §4.5): every write-capable tool
//! handler runs inside a scoped acquisition so `select_database` and
//! `clear_database` can see outstanding work and refuse.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Scoped RAII guard: increments the shared counter on acquisition,
/// decrements it on every exit path (success or failure), mirroring the
/// worker-lifecycle `Drop` pattern the event bus uses to release its
/// background tasks.
pub struct ActiveOpGuard {
    counter: Arc<AtomicU64>,
    /// The generation captured at acquisition time; callers compare this to
    /// the live generation before committing writes to detect a mid-flight
    /// database switch (`STALE_DATABASE_REFERENCE`).
    pub captured_generation: u64,
}

impl ActiveOpGuard {
    pub(super) fn acquire(counter: Arc<AtomicU64>, generation: u64) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter,
            captured_generation: generation,
        }
    }
}

impl Drop for ActiveOpGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
