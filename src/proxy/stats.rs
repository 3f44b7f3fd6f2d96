//! Process-wide connection counters and the periodic reporter

use crate::logging::log_stats;
use crate::models::StatsSnapshot;
use crate::proxy::state::StateWatcher;
use crate::utils::now;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Counters shared by every connection handler.
///
/// Only increments, the active-connection guard and snapshots are exposed.
#[derive(Debug, Default)]
pub struct Stats {
    total_requests: AtomicU64,
    active_connections: AtomicU64,
    errors: AtomicU64,
    rejected: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a connection as active until the returned guard is dropped
    pub fn track_connection(&self) -> ActiveConnection<'_> {
        self.active_connections.fetch_add(1, Ordering::AcqRel);
        ActiveConnection { stats: self }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Acquire)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            taken_at: now(),
            total_requests: self.total_requests(),
            active_connections: self.active_connections(),
            errors: self.errors(),
            rejected: self.rejected(),
        }
    }
}

/// Active-connection guard; decrements exactly once on drop
#[derive(Debug)]
pub struct ActiveConnection<'a> {
    stats: &'a Stats,
}

impl Drop for ActiveConnection<'_> {
    fn drop(&mut self) {
        self.stats.active_connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Log a snapshot every `every` until the server stops.
///
/// The first report comes after one full interval.
pub fn spawn_reporter(stats: Arc<Stats>, every: Duration, mut state: StateWatcher) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = state.stopped() => break,
                _ = ticker.tick() => log_stats(&stats.snapshot()),
            }
        }

        debug!("Stats reporter stopped");
    })
}
