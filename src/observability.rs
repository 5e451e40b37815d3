//! Download progress counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Completion counters for one run of the page pipeline
///
/// Counts are independent of page order: a page is "done" as soon as it has
/// a terminal result, whichever worker produced it.
#[derive(Debug, Default)]
pub struct Progress {
    total: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        Self {
            total: AtomicU64::new(total),
            ..Self::default()
        }
    }

    pub fn page_succeeded(&self, bytes: u64) -> ProgressSnapshot {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "pages_completed", "Metric incremented");
        self.snapshot()
    }

    pub fn page_failed(&self) -> ProgressSnapshot {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "pages_failed", "Metric incremented");
        self.snapshot()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub bytes: u64,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> u64 {
        if self.total == 0 {
            return 100;
        }
        self.completed * 100 / self.total
    }

    /// True when this completion moved progress into a new 10% bucket
    pub fn crossed_decile(&self) -> bool {
        if self.total == 0 || self.completed == 0 {
            return false;
        }
        let before = (self.completed - 1) * 10 / self.total;
        let now = self.completed * 10 / self.total;
        now > before
    }
}
