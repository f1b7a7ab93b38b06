//! Change notifications towards the host.
//!
//! The gateway reports every visible change through a [`ChangeListener`]:
//! directory contents changing, roots appearing or disappearing, access grants
//! becoming stale, and uploads that failed after the host already closed the
//! handle (close cannot fail, so this is the only place such errors surface).

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeEvent {
    ChildrenChanged { parent: String },
    RootsChanged,
    GrantsRevoked { id: String },
    UploadFailed { id: String, message: String },
}

pub trait ChangeListener: Send + Sync {
    fn handle(&self, event: ChangeEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ChangeListener for NoopListener {
    fn handle(&self, _event: ChangeEvent) {}
}

/// Records every event, in order.
#[derive(Debug, Default)]
pub struct CollectingListener {
    events: Mutex<Vec<ChangeEvent>>,
}

impl CollectingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl ChangeListener for CollectingListener {
    fn handle(&self, event: ChangeEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_listener_keeps_order() {
        let listener = CollectingListener::new();
        listener.handle(ChangeEvent::RootsChanged);
        listener.handle(ChangeEvent::ChildrenChanged {
            parent: "r:".to_string(),
        });
        assert_eq!(
            listener.take(),
            vec![
                ChangeEvent::RootsChanged,
                ChangeEvent::ChildrenChanged {
                    parent: "r:".to_string()
                },
            ]
        );
        assert!(listener.events().is_empty());
    }

    #[test]
    fn test_event_serializes_tagged() {
        let json = serde_json::to_value(ChangeEvent::UploadFailed {
            id: "r:a".to_string(),
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "upload_failed");
        assert_eq!(json["id"], "r:a");
    }
}
