//! App lock state.
//!
//! Soft-blocked remotes are hidden while the app is locked. The host drives
//! the state with [`LockEvent`]s; the gateway only reads [`AppLock::is_locked`].

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Active,
    /// Paused at the given instant. Reads as locked once the inactivity
    /// timeout has elapsed.
    Inactive { paused_at: Instant },
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    Resume,
    Pause,
    AuthSuccess,
    LockNow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub require_auth: bool,
    pub inactivity_timeout: Duration,
}

impl LockState {
    pub fn initial(policy: &LockPolicy) -> Self {
        if policy.require_auth {
            LockState::Locked
        } else {
            LockState::Active
        }
    }

    pub fn is_locked(&self, policy: &LockPolicy, now: Instant) -> bool {
        match self {
            LockState::Active => false,
            LockState::Inactive { paused_at } => {
                now.saturating_duration_since(*paused_at) >= policy.inactivity_timeout
            }
            LockState::Locked => true,
        }
    }

    pub fn transition(self, event: LockEvent, policy: &LockPolicy, now: Instant) -> Self {
        match (self, event) {
            (LockState::Inactive { .. }, LockEvent::Resume) => {
                if self.is_locked(policy, now) {
                    LockState::Locked
                } else {
                    LockState::Active
                }
            }
            (_, LockEvent::Resume) => self,
            (LockState::Active, LockEvent::Pause) if policy.require_auth => {
                LockState::Inactive { paused_at: now }
            }
            (_, LockEvent::Pause) => self,
            (_, LockEvent::AuthSuccess) => LockState::Active,
            (_, LockEvent::LockNow) if policy.require_auth => LockState::Locked,
            (_, LockEvent::LockNow) => self,
        }
    }
}

/// Shared, thread-safe lock state.
#[derive(Debug)]
pub struct AppLock {
    policy: LockPolicy,
    state: Mutex<LockState>,
}

impl AppLock {
    pub fn new(policy: LockPolicy) -> Self {
        Self {
            state: Mutex::new(LockState::initial(&policy)),
            policy,
        }
    }

    pub fn handle(&self, event: LockEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let next = state.transition(event, &self.policy, Instant::now());
        if next != *state {
            debug!("app lock: {:?} -> {:?} on {:?}", *state, next, event);
        }
        *state = next;
    }

    pub fn is_locked(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_locked(&self.policy, Instant::now())
    }

    pub fn state(&self) -> LockState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(require_auth: bool) -> LockPolicy {
        LockPolicy {
            require_auth,
            inactivity_timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_initial_state() {
        assert_eq!(LockState::initial(&policy(true)), LockState::Locked);
        assert_eq!(LockState::initial(&policy(false)), LockState::Active);
    }

    #[test]
    fn test_pause_and_quick_resume_stays_active() {
        let p = policy(true);
        let t0 = Instant::now();
        let s = LockState::Active.transition(LockEvent::Pause, &p, t0);
        assert_eq!(s, LockState::Inactive { paused_at: t0 });
        assert!(!s.is_locked(&p, t0 + Duration::from_secs(10)));
        let s = s.transition(LockEvent::Resume, &p, t0 + Duration::from_secs(10));
        assert_eq!(s, LockState::Active);
    }

    #[test]
    fn test_resume_after_timeout_locks() {
        let p = policy(true);
        let t0 = Instant::now();
        let s = LockState::Active.transition(LockEvent::Pause, &p, t0);
        let later = t0 + Duration::from_secs(61);
        assert!(s.is_locked(&p, later));
        assert_eq!(s.transition(LockEvent::Resume, &p, later), LockState::Locked);
    }

    #[test]
    fn test_pause_ignored_without_auth() {
        let p = policy(false);
        let now = Instant::now();
        assert_eq!(
            LockState::Active.transition(LockEvent::Pause, &p, now),
            LockState::Active
        );
        assert_eq!(
            LockState::Active.transition(LockEvent::LockNow, &p, now),
            LockState::Active
        );
    }

    #[test]
    fn test_lock_now_and_auth() {
        let p = policy(true);
        let now = Instant::now();
        let s = LockState::Active.transition(LockEvent::LockNow, &p, now);
        assert_eq!(s, LockState::Locked);
        assert_eq!(s.transition(LockEvent::Resume, &p, now), LockState::Locked);
        assert_eq!(s.transition(LockEvent::AuthSuccess, &p, now), LockState::Active);
    }

    #[test]
    fn test_shared_lock() {
        let lock = AppLock::new(policy(true));
        assert!(lock.is_locked());
        lock.handle(LockEvent::AuthSuccess);
        assert!(!lock.is_locked());
        lock.handle(LockEvent::LockNow);
        assert_eq!(lock.state(), LockState::Locked);
    }
}
