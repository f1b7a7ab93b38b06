//! Keep-alive counters.
//!
//! Hosts may tear the process down once nothing is in flight. These counters
//! say what is: open write handles and synchronous uploads per remote (kept
//! here, updated by document handles) plus asynchronous queue counts (set by
//! the upload monitor).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use serde::Serialize;

/// Snapshot shown to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeepAliveState {
    pub open: usize,
    pub sync_uploading: usize,
    pub async_uploading: usize,
    pub async_pending: usize,
}

impl KeepAliveState {
    pub fn total(&self) -> usize {
        self.open + self.sync_uploading + self.async_uploading + self.async_pending
    }
}

/// The host process's view of gateway activity.
pub trait HostLifecycle: Send + Sync {
    /// Outstanding work changed. Hosts typically refresh a foreground
    /// notification here.
    fn keep_alive(&self, state: &KeepAliveState);

    /// Nothing is in flight any more; the process may be torn down.
    fn release(&self);
}

/// Records snapshots and release calls.
#[derive(Debug, Default)]
pub struct CollectingLifecycle {
    states: Mutex<Vec<KeepAliveState>>,
    releases: Mutex<usize>,
}

impl CollectingLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> Vec<KeepAliveState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn releases(&self) -> usize {
        *self.releases.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HostLifecycle for CollectingLifecycle {
    fn keep_alive(&self, state: &KeepAliveState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*state);
    }

    fn release(&self) {
        *self.releases.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SyncCounts {
    open: usize,
    uploading: usize,
}

#[derive(Debug, Default)]
struct Counters {
    per_remote: BTreeMap<String, SyncCounts>,
    async_uploading: usize,
    async_pending: usize,
}

impl Counters {
    fn snapshot(&self) -> KeepAliveState {
        let mut state = KeepAliveState {
            async_uploading: self.async_uploading,
            async_pending: self.async_pending,
            ..Default::default()
        };
        for counts in self.per_remote.values() {
            state.open += counts.open;
            state.sync_uploading += counts.uploading;
        }
        state
    }

    fn adjust(&mut self, remote: &str, open: isize, uploading: isize) {
        let counts = self.per_remote.entry(remote.to_string()).or_default();
        counts.open = counts.open.saturating_add_signed(open);
        counts.uploading = counts.uploading.saturating_add_signed(uploading);
        if *counts == SyncCounts::default() {
            self.per_remote.remove(remote);
        }
    }
}

pub struct KeepAlive {
    counters: Mutex<Counters>,
    host: Arc<dyn HostLifecycle>,
}

impl KeepAlive {
    pub fn new(host: Arc<dyn HostLifecycle>) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            host,
        }
    }

    pub fn host(&self) -> &Arc<dyn HostLifecycle> {
        &self.host
    }

    /// Apply `f` and tell the host if the snapshot changed. The host is
    /// called without the counter lock held.
    fn update(&self, f: impl FnOnce(&mut Counters)) {
        let (before, after) = {
            let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
            let before = counters.snapshot();
            f(&mut counters);
            (before, counters.snapshot())
        };
        if before != after {
            debug!("keep-alive state: {:?}", after);
            self.host.keep_alive(&after);
        }
    }

    /// A write handle was opened on `remote`.
    pub fn handle_opened(&self, remote: &str) {
        self.update(|c| c.adjust(remote, 1, 0));
    }

    /// A write handle on `remote` is closing; its upload starts now.
    pub fn handle_closing(&self, remote: &str) {
        self.update(|c| c.adjust(remote, -1, 1));
    }

    /// The backend close of a write handle on `remote` returned.
    pub fn handle_closed(&self, remote: &str) {
        self.update(|c| c.adjust(remote, 0, -1));
    }

    /// Replace the asynchronous queue counts.
    pub fn set_async(&self, uploading: usize, pending: usize) {
        self.update(|c| {
            c.async_uploading = uploading;
            c.async_pending = pending;
        });
    }

    pub fn snapshot(&self) -> KeepAliveState {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }
}
