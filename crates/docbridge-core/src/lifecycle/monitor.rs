//! Background upload monitor.
//!
//! Uploads that outlive the handle that produced them (resumed after a crash,
//! or queued by the backend) have no completion callback, so the monitor
//! polls the backend's upload queues once per tick and only lets the host
//! tear the process down after several consecutive idle polls.
//!
//! The crash-recovery scan runs at most once per [`UploadMonitor`], not once
//! per process: a second gateway in the same process scans again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::backend::Backend;
use crate::lifecycle::keep_alive::KeepAlive;
use crate::rpc::Rpc;

/// Time between queue polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Consecutive idle polls (after the first) required before release.
pub const IDLE_CONFIRMATIONS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Inactive,
    Active,
    /// Idle; release after this many more idle polls.
    StopAfter(u32),
    /// Terminal. The poll thread exits.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    /// The monitor was (re)started, e.g. by a write handle closing.
    Start,
    /// One poll tick observed `busy` outstanding items.
    Poll { busy: usize },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    /// Let the host tear the process down.
    Release,
}

impl MonitorState {
    pub fn transition(self, event: MonitorEvent) -> (MonitorState, Option<MonitorAction>) {
        use MonitorState::*;

        match (self, event) {
            (Stopped, _) => (Stopped, None),
            (_, MonitorEvent::Stop) => (Stopped, None),
            (_, MonitorEvent::Start) => (Active, None),
            (Inactive, MonitorEvent::Poll { .. }) => (Inactive, None),
            (Active, MonitorEvent::Poll { busy: 0 }) => (StopAfter(IDLE_CONFIRMATIONS), None),
            (Active, MonitorEvent::Poll { .. }) => (Active, None),
            (StopAfter(_), MonitorEvent::Poll { busy }) if busy > 0 => (Active, None),
            (StopAfter(k), MonitorEvent::Poll { .. }) if k > 1 => (StopAfter(k - 1), None),
            (StopAfter(_), MonitorEvent::Poll { .. }) => (Inactive, Some(MonitorAction::Release)),
        }
    }
}

/// What the poll thread talks to.
#[derive(Clone)]
pub struct MonitorDeps {
    pub rpc: Arc<Rpc>,
    pub backend: Arc<dyn Backend>,
    pub keep_alive: Arc<KeepAlive>,
}

struct Inner {
    state: MonitorState,
    scan_requested: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, inner: &mut Inner, event: MonitorEvent) -> Option<MonitorAction> {
        let (next, action) = inner.state.transition(event);
        if next != inner.state {
            info!("upload monitor: {:?} -> {:?}", inner.state, next);
        }
        inner.state = next;
        action
    }
}

/// Owns the poll thread. Dropping the monitor stops it.
pub struct UploadMonitor {
    shared: Arc<Shared>,
    scanned_once: AtomicBool,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl UploadMonitor {
    pub fn spawn(deps: MonitorDeps) -> Self {
        Self::spawn_with_interval(deps, POLL_INTERVAL)
    }

    /// Start the poll thread in the `Inactive` state.
    pub fn spawn_with_interval(deps: MonitorDeps, interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: MonitorState::Inactive,
                scan_requested: false,
            }),
            wake: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || run(&thread_shared, &deps, interval));

        Self {
            shared,
            scanned_once: AtomicBool::new(false),
            thread: Mutex::new(Some(handle)),
        }
    }

    /// (Re)start polling. With `scan_remotes`, the first start of this
    /// monitor also resumes uploads left behind in the backend's cache.
    pub fn start(&self, scan_remotes: bool) {
        let scan = scan_remotes && !self.scanned_once.swap(true, Ordering::SeqCst);
        if scan_remotes && !scan {
            debug!("remote scan already requested once");
        }

        let mut inner = self.shared.lock();
        inner.scan_requested |= scan;
        self.shared.apply(&mut inner, MonitorEvent::Start);
        drop(inner);
        self.shared.wake.notify_all();
    }

    pub fn stop(&self) {
        {
            let mut inner = self.shared.lock();
            self.shared.apply(&mut inner, MonitorEvent::Stop);
        }
        self.shared.wake.notify_all();

        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            // Stopping from inside a host callback on the poll thread.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("upload monitor thread panicked");
            }
        }
    }

    pub fn state(&self) -> MonitorState {
        self.shared.lock().state
    }
}

impl Drop for UploadMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: &Shared, deps: &MonitorDeps, interval: Duration) {
    loop {
        let scan = {
            let mut inner = shared.lock();
            loop {
                match inner.state {
                    MonitorState::Stopped => return,
                    MonitorState::Inactive => {
                        inner = shared
                            .wake
                            .wait(inner)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    _ => break,
                }
            }
            std::mem::take(&mut inner.scan_requested)
        };

        if scan {
            scan_dirty_remotes(deps);
        }

        let busy = poll_busy(deps);

        let action = {
            let mut inner = shared.lock();
            busy.and_then(|busy| shared.apply(&mut inner, MonitorEvent::Poll { busy }))
        };
        if action == Some(MonitorAction::Release) {
            info!("no uploads outstanding, releasing host");
            deps.keep_alive.host().release();
        }

        let inner = shared.lock();
        if inner.state == MonitorState::Stopped {
            return;
        }
        let _ = shared
            .wake
            .wait_timeout(inner, interval)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Outstanding work: queued async uploads plus open and closing write
/// handles. `None` if the queue list itself could not be fetched.
fn poll_busy(deps: &MonitorDeps) -> Option<usize> {
    let vfses = match deps.rpc.vfses() {
        Ok(vfses) => vfses,
        Err(e) => {
            warn!("failed to list VFS instances: {}", e);
            return None;
        }
    };

    let mut uploading = 0;
    let mut pending = 0;
    for vfs in &vfses {
        match deps.rpc.vfs_queue_stats(vfs) {
            Ok(stats) => {
                uploading += stats.in_progress;
                pending += stats.pending;
            }
            Err(e) => warn!("failed to query upload queue of {}: {}", vfs, e),
        }
    }

    deps.keep_alive.set_async(uploading, pending);
    Some(deps.keep_alive.snapshot().total())
}

/// Re-initialise every remote that still has dirty cache data so its
/// pending uploads resume.
fn scan_dirty_remotes(deps: &MonitorDeps) {
    let dirty = match deps.backend.cached_remotes() {
        Ok(dirty) => dirty,
        Err(e) => {
            warn!("failed to list cached remotes: {}", e);
            return;
        }
    };
    if dirty.is_empty() {
        return;
    }

    let configs = match deps.rpc.remote_configs_raw() {
        Ok(configs) => configs,
        Err(e) => {
            warn!("failed to load remote configs: {}", e);
            return;
        }
    };

    for remote in dirty {
        if !configs.contains_key(&remote) {
            debug!("skipping cache of deleted remote {}", remote);
            continue;
        }
        info!("resuming uploads for {}", remote);
        if let Err(e) = deps.backend.init_vfs(&remote) {
            warn!("failed to initialize VFS for {}: {}", remote, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_polls(start: MonitorState, polls: &[usize]) -> (Vec<MonitorState>, usize) {
        let mut state = start;
        let mut trace = Vec::new();
        let mut releases = 0;
        for &busy in polls {
            let (next, action) = state.transition(MonitorEvent::Poll { busy });
            if action == Some(MonitorAction::Release) {
                releases += 1;
            }
            state = next;
            trace.push(state);
        }
        (trace, releases)
    }

    #[test]
    fn test_two_idle_polls_do_not_release() {
        let (trace, releases) = run_polls(MonitorState::Active, &[3, 0, 0]);
        assert_eq!(
            trace,
            vec![
                MonitorState::Active,
                MonitorState::StopAfter(2),
                MonitorState::StopAfter(1),
            ]
        );
        assert_eq!(releases, 0);
    }

    #[test]
    fn test_three_idle_polls_release_once() {
        let (trace, releases) = run_polls(MonitorState::Active, &[3, 0, 0, 0]);
        assert_eq!(trace.last(), Some(&MonitorState::Inactive));
        assert_eq!(releases, 1);

        let (_, releases) = run_polls(MonitorState::Active, &[3, 0, 0, 0, 0, 0]);
        assert_eq!(releases, 1);
    }

    #[test]
    fn test_work_during_countdown_reactivates() {
        let (trace, releases) = run_polls(MonitorState::Active, &[0, 0, 1, 0]);
        assert_eq!(
            trace,
            vec![
                MonitorState::StopAfter(2),
                MonitorState::StopAfter(1),
                MonitorState::Active,
                MonitorState::StopAfter(2),
            ]
        );
        assert_eq!(releases, 0);
    }

    #[test]
    fn test_inactive_ignores_polls() {
        let (trace, releases) = run_polls(MonitorState::Inactive, &[5, 0]);
        assert_eq!(trace, vec![MonitorState::Inactive, MonitorState::Inactive]);
        assert_eq!(releases, 0);
    }

    #[test]
    fn test_start_and_stop() {
        assert_eq!(
            MonitorState::Inactive.transition(MonitorEvent::Start),
            (MonitorState::Active, None)
        );
        assert_eq!(
            MonitorState::StopAfter(1).transition(MonitorEvent::Start),
            (MonitorState::Active, None)
        );
        for state in [
            MonitorState::Inactive,
            MonitorState::Active,
            MonitorState::StopAfter(2),
        ] {
            assert_eq!(
                state.transition(MonitorEvent::Stop),
                (MonitorState::Stopped, None)
            );
        }
    }

    #[test]
    fn test_stopped_is_terminal() {
        for event in [
            MonitorEvent::Start,
            MonitorEvent::Poll { busy: 0 },
            MonitorEvent::Poll { busy: 1 },
            MonitorEvent::Stop,
        ] {
            assert_eq!(
                MonitorState::Stopped.transition(event),
                (MonitorState::Stopped, None)
            );
        }
    }
}
