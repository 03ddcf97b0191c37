//! Dispatch and execution counters
//!
//! Lock-free counters updated by the dispatch loop, hand-off tasks and
//! workers, with serializable point-in-time snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters for a single board
#[derive(Debug, Default)]
pub struct BoardStats {
    posted: AtomicU64,
    dispatched: AtomicU64,
    abandoned: AtomicU64,
}

impl BoardStats {
    /// Create a zeroed set of board counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a unit of work entered the pending buffer
    pub(crate) fn record_posted(&self) {
        self.posted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a unit of work was delivered to a worker inbox
    pub(crate) fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record units of work dropped on shutdown
    pub(crate) fn record_abandoned(&self, count: u64) {
        if count > 0 {
            self.abandoned.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Take a snapshot of the current counters
    pub fn snapshot(&self) -> BoardStatsSnapshot {
        BoardStatsSnapshot {
            posted: self.posted.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`BoardStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardStatsSnapshot {
    /// Units of work accepted by `post_work`
    pub posted: u64,
    /// Units of work handed to a worker
    pub dispatched: u64,
    /// Units of work dropped because the board closed first
    pub abandoned: u64,
}

impl BoardStatsSnapshot {
    /// Posted work neither dispatched nor abandoned yet
    pub fn in_flight(&self) -> u64 {
        self.posted
            .saturating_sub(self.dispatched)
            .saturating_sub(self.abandoned)
    }
}

/// Counters for a single worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl WorkerStats {
    /// Create a zeroed set of worker counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of the current counters
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatsSnapshot {
    /// Units of work that ran to completion
    pub completed: u64,
    /// Units of work that panicked while running
    pub panicked: u64,
}

impl WorkerStatsSnapshot {
    /// Every unit of work this worker received
    pub fn received(&self) -> u64 {
        self.completed + self.panicked
    }
}
