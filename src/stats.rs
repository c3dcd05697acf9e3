use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct Stats {
    start_ms: AtomicU64,
    last_log_ms: AtomicU64,

    refreshes: AtomicU64,
    refresh_errors: AtomicU64,
    last_refresh_ms: AtomicU64,
    unchanged_cycles: AtomicU64,
    rows_in_state: AtomicU64,

    snapshots: AtomicU64,
    deltas: AtomicU64,
    frames_published: AtomicU64,
    frames_dropped: AtomicU64,

    subscribers: AtomicU64,
}

impl Stats {
    pub fn new(now_ms: u64) -> Arc<Self> {
        let s = Arc::new(Self::default());
        s.start_ms.store(now_ms, Ordering::Relaxed);
        s.last_log_ms.store(now_ms, Ordering::Relaxed);
        s
    }

    pub fn record_refresh(&self, elapsed_ms: u64) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        self.last_refresh_ms.store(elapsed_ms, Ordering::Relaxed);
    }

    pub fn inc_refresh_error(&self) {
        self.refresh_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unchanged(&self) {
        self.unchanged_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_rows_in_state(&self, n: u64) {
        self.rows_in_state.store(n, Ordering::Relaxed);
    }

    pub fn inc_snapshot(&self) {
        self.snapshots.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_delta(&self) {
        self.deltas.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_published(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the running total after this drop.
    pub fn inc_dropped(&self) -> u64 {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn refresh_errors(&self) -> u64 {
        self.refresh_errors.load(Ordering::Relaxed)
    }

    pub fn subscriber_joined(&self) {
        self.subscribers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriber_left(&self) {
        let _ = self.subscribers.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
            Some(n.saturating_sub(1))
        });
    }

    pub fn should_log(&self, now_ms: u64, every_sec: u64) -> bool {
        if every_sec == 0 { return false; }
        let last = self.last_log_ms.load(Ordering::Relaxed);
        now_ms.saturating_sub(last) >= every_sec.saturating_mul(1000)
    }

    pub fn mark_logged(&self, now_ms: u64) {
        self.last_log_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self, now_ms: u64) -> StatsSnapshot {
        let start = self.start_ms.load(Ordering::Relaxed);
        StatsSnapshot {
            now_ms,
            up_sec: now_ms.saturating_sub(start) / 1000,
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
            last_refresh_ms: self.last_refresh_ms.load(Ordering::Relaxed),
            unchanged_cycles: self.unchanged_cycles.load(Ordering::Relaxed),
            rows_in_state: self.rows_in_state.load(Ordering::Relaxed),
            snapshots: self.snapshots.load(Ordering::Relaxed),
            deltas: self.deltas.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            subscribers: self.subscribers.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub now_ms: u64,
    pub up_sec: u64,
    pub refreshes: u64,
    pub refresh_errors: u64,
    pub last_refresh_ms: u64,
    pub unchanged_cycles: u64,
    pub rows_in_state: u64,
    pub snapshots: u64,
    pub deltas: u64,
    pub frames_published: u64,
    pub frames_dropped: u64,
    pub subscribers: u64,
}
