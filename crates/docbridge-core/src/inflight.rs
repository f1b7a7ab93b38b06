//! In-flight write tracking.
//!
//! The backend uploads a written file only after its handle is closed, and the
//! upload is not finished when `close` returns to the host. Renaming, copying or
//! moving a path while that is happening can corrupt the target, so every
//! write-mode handle registers its path here and those operations wait until
//! nothing at or below their source is still registered.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use log::{debug, trace};

use crate::error::Result;
use crate::path;

/// Path-segment trie with a use count per node.
///
/// A node stays attached to its parent only while its count is non-zero or it
/// still has children.
#[derive(Debug, Default)]
pub struct InFlightTrie {
    count: usize,
    children: HashMap<String, InFlightTrie>,
}

impl InFlightTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the count of the node at `components`, creating it if needed.
    pub fn add<S: AsRef<str>>(&mut self, components: &[S]) {
        let mut node = self;
        for component in components {
            node = node
                .children
                .entry(component.as_ref().to_string())
                .or_default();
        }
        node.count += 1;
    }

    /// Decrement the count at `components` and prune nodes left unused.
    ///
    /// Removing a path that was never added is a no-op.
    pub fn remove<S: AsRef<str>>(&mut self, components: &[S]) {
        if components.is_empty() {
            return;
        }
        self.remove_at(components);
    }

    fn remove_at<S: AsRef<str>>(&mut self, components: &[S]) {
        let Some((first, rest)) = components.split_first() else {
            self.count = self.count.saturating_sub(1);
            return;
        };
        let first = first.as_ref();
        if let Some(child) = self.children.get_mut(first) {
            child.remove_at(rest);
            if child.count == 0 && child.children.is_empty() {
                self.children.remove(first);
            }
        }
    }

    /// True iff a node exists for every component, i.e. something at or
    /// below `components` is registered.
    pub fn contains<S: AsRef<str>>(&self, components: &[S]) -> bool {
        let mut node = self;
        for component in components {
            match node.children.get(component.as_ref()) {
                Some(child) => node = child,
                None => return false,
            }
        }
        true
    }

    /// Whether nothing at all is registered.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.count == 0
    }
}

/// Trie key for a document id: the remote name followed by its segments.
fn key(id: &str) -> Result<Vec<String>> {
    let (remote, _) = path::split_remote(id)?;
    let mut components = vec![remote];
    components.extend(path::segments(id).into_iter().map(str::to_string));
    Ok(components)
}

/// Thread-safe wrapper that lets callers block until writes drain.
#[derive(Debug, Default)]
pub struct InFlightTracker {
    trie: Mutex<InFlightTrie>,
    drained: Condvar,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InFlightTrie> {
        self.trie.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark_open_for_write(&self, id: &str) -> Result<()> {
        let key = key(id)?;
        trace!("mark_open_for_write({})", id);
        self.lock().add(key.as_slice());
        Ok(())
    }

    /// Unregister one write handle on `id` and wake every waiter.
    pub fn mark_closed(&self, id: &str) -> Result<()> {
        let key = key(id)?;
        trace!("mark_closed({})", id);
        self.lock().remove(key.as_slice());
        self.drained.notify_all();
        Ok(())
    }

    pub fn is_any_write_active_under(&self, id: &str) -> Result<bool> {
        let key = key(id)?;
        Ok(self.lock().contains(key.as_slice()))
    }

    /// Block until no write handle is open at or below `id`.
    pub fn wait_until_drained(&self, id: &str) -> Result<()> {
        let key = key(id)?;
        let mut trie = self.lock();
        if trie.contains(key.as_slice()) {
            debug!("waiting for uploads under {}", id);
        }
        while trie.contains(key.as_slice()) {
            trie = self
                .drained
                .wait(trie)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
