//! Process-wide coarse monotonic clock.
//!
//! Deadline bookkeeping happens on every read and write, so it reads a shared
//! atomic instead of sampling the system clock. Each live socket keeps a
//! ticker task that refreshes the value every 250 ms and stops with the
//! socket; concurrent tickers are harmless because every update goes through
//! `fetch_max` against the same monotonic source.

use std::sync::{
    LazyLock,
    atomic::{AtomicU64, Ordering},
};

use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

/// One wall-second, in the clock's nanosecond unit.
pub(crate) const SECOND: u64 = 1_000_000_000;

const TICK: Duration = Duration::from_millis(250);

static EPOCH: LazyLock<std::time::Instant> = LazyLock::new(std::time::Instant::now);
static NOW: AtomicU64 = AtomicU64::new(0);

/// Nanoseconds on the coarse clock. Only differences are meaningful.
#[inline(always)]
pub(crate) fn now() -> u64 {
    NOW.load(Ordering::Relaxed)
}

fn refresh() -> u64 {
    let elapsed = EPOCH.elapsed().as_nanos() as u64;
    NOW.fetch_max(elapsed, Ordering::Relaxed);
    elapsed
}

/// Seeds the clock and runs a refresh task until `shutdown` fires.
pub(crate) fn spawn_ticker(shutdown: CancellationToken) {
    refresh();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(TICK) => { refresh(); }
            }
        }
    });
}
