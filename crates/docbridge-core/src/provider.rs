//! The file-provider façade.
//!
//! [`Gateway`] implements the host's document contract on top of a
//! [`Backend`] and the backend RPC interface. Every operation starts by
//! taking a fresh remote config snapshot and running the access gate, before
//! any path or backend work.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use docbridge_core::{
//!     CollectingLifecycle, CollectingListener, Gateway, GatewayConfig, LocalBackend, RemoteTable,
//! };
//!
//! let backend = LocalBackend::new("/tmp/docbridge".into(), RemoteTable::new())?;
//! let gateway = Gateway::with_local_backend(
//!     GatewayConfig::default(),
//!     backend,
//!     Arc::new(CollectingLifecycle::new()),
//!     Arc::new(CollectingListener::new()),
//! );
//! for root in gateway.query_roots()? {
//!     println!("{}", root.document_id);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use crate::app_lock::{AppLock, LockEvent};
use crate::backend::{Backend, BackendResult, LocalBackend, OpenFlags, Stat};
use crate::config::GatewayConfig;
use crate::error::{BackendError, GatewayError, Result};
use crate::gate::AccessGate;
use crate::handle::{CancellationSignal, DocumentHandle, OpenMode, WriteHooks};
use crate::inflight::InFlightTracker;
use crate::lifecycle::{
    HostLifecycle, KeepAlive, KeepAliveState, MonitorDeps, POLL_INTERVAL, UploadMonitor,
};
use crate::mime::{self, MIME_TYPE_BINARY, MIME_TYPE_DIR};
use crate::naming::{ATTEMPT_LIMIT, ConflictDetection, retry_unique};
use crate::notify::{ChangeEvent, ChangeListener};
use crate::path;
use crate::rpc::{ConfigStore, RemoteConfig, Rpc, RpcTransport};

/// Title shown for every root; the remote name goes in the summary.
pub const ROOT_TITLE: &str = "docbridge";

/// Root row flags.
pub mod root_flags {
    pub const SUPPORTS_CREATE: u32 = 1;
    pub const LOCAL_ONLY: u32 = 1 << 1;
    pub const SUPPORTS_IS_CHILD: u32 = 1 << 4;
}

/// Document row flags.
pub mod document_flags {
    pub const SUPPORTS_THUMBNAIL: u32 = 1;
    pub const SUPPORTS_WRITE: u32 = 1 << 1;
    pub const SUPPORTS_DELETE: u32 = 1 << 2;
    pub const DIR_SUPPORTS_CREATE: u32 = 1 << 3;
    pub const SUPPORTS_RENAME: u32 = 1 << 6;
    pub const SUPPORTS_COPY: u32 = 1 << 7;
    pub const SUPPORTS_MOVE: u32 = 1 << 8;
    pub const SUPPORTS_REMOVE: u32 = 1 << 9;

    /// Carried by every row.
    pub const COMMON: u32 = SUPPORTS_COPY
        | SUPPORTS_DELETE
        | SUPPORTS_MOVE
        | SUPPORTS_REMOVE
        | SUPPORTS_RENAME
        | SUPPORTS_WRITE;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootRow {
    pub root_id: String,
    pub document_id: String,
    pub title: String,
    pub summary: String,
    pub flags: u32,
    pub capacity: Option<u64>,
    pub free: Option<u64>,
    /// The remote asked for a launcher shortcut.
    pub shortcut: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRow {
    pub document_id: String,
    pub mime_type: String,
    pub display_name: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub flags: u32,
}

impl DocumentRow {
    fn from_stat(document_id: String, stat: Stat, thumbnails: bool) -> Self {
        let mut flags = document_flags::COMMON;
        let mime_type = if stat.is_dir() {
            flags |= document_flags::DIR_SUPPORTS_CREATE;
            MIME_TYPE_DIR.to_string()
        } else {
            let mime_type = mime::mime_for_name(&stat.name);
            if thumbnails && (mime_type.starts_with("image/") || mime_type.starts_with("video/")) {
                flags |= document_flags::SUPPORTS_THUMBNAIL;
            }
            mime_type
        };
        Self {
            document_id,
            mime_type,
            display_name: stat.name,
            size: stat.size,
            last_modified: stat.modified,
            flags,
        }
    }
}

/// Collaborators a gateway is built from.
pub struct GatewayParts {
    pub config: GatewayConfig,
    pub backend: Arc<dyn Backend>,
    pub transport: Arc<dyn RpcTransport>,
    pub store: Arc<dyn ConfigStore>,
    pub host: Arc<dyn HostLifecycle>,
    pub listener: Arc<dyn ChangeListener>,
}

/// File-provider façade. Dropping it stops the upload monitor.
pub struct Gateway {
    config: GatewayConfig,
    backend: Arc<dyn Backend>,
    rpc: Arc<Rpc>,
    app_lock: AppLock,
    tracker: Arc<InFlightTracker>,
    keep_alive: Arc<KeepAlive>,
    monitor: Arc<UploadMonitor>,
    listener: Arc<dyn ChangeListener>,
}

/// Map a POSIX-like conflict onto the gateway taxonomy.
fn posix_conflict(err: BackendError, id: &str) -> GatewayError {
    if err.is_exists() {
        GatewayError::AlreadyExists(id.to_string())
    } else if err.is_type_conflict() {
        GatewayError::TypeMismatch(id.to_string())
    } else {
        err.into()
    }
}

/// Display names are single path segments.
fn check_display_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(path::SEPARATOR) || name == "." || name == ".." {
        return Err(GatewayError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

impl Gateway {
    pub fn new(parts: GatewayParts) -> Self {
        Self::with_poll_interval(parts, POLL_INTERVAL)
    }

    pub fn with_poll_interval(parts: GatewayParts, interval: Duration) -> Self {
        let rpc = Arc::new(Rpc::new(parts.transport, parts.store));
        let keep_alive = Arc::new(KeepAlive::new(parts.host));
        let monitor = Arc::new(UploadMonitor::spawn_with_interval(
            MonitorDeps {
                rpc: Arc::clone(&rpc),
                backend: Arc::clone(&parts.backend),
                keep_alive: Arc::clone(&keep_alive),
            },
            interval,
        ));

        Self {
            app_lock: AppLock::new(parts.config.lock_policy()),
            config: parts.config,
            backend: parts.backend,
            rpc,
            tracker: Arc::new(InFlightTracker::new()),
            keep_alive,
            monitor,
            listener: parts.listener,
        }
    }

    /// Serve both collaborator interfaces from one [`LocalBackend`].
    pub fn with_local_backend(
        config: GatewayConfig,
        backend: LocalBackend,
        host: Arc<dyn HostLifecycle>,
        listener: Arc<dyn ChangeListener>,
    ) -> Self {
        let backend = Arc::new(backend);
        Self::new(GatewayParts {
            config,
            backend: backend.clone(),
            transport: backend.clone(),
            store: backend,
            host,
            listener,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn rpc(&self) -> &Rpc {
        &self.rpc
    }

    pub fn tracker(&self) -> &InFlightTracker {
        &self.tracker
    }

    pub fn keep_alive_state(&self) -> KeepAliveState {
        self.keep_alive.snapshot()
    }

    fn notify(&self, event: ChangeEvent) {
        self.listener.handle(event);
    }

    fn configs(&self) -> Result<BTreeMap<String, RemoteConfig>> {
        self.rpc.remote_configs()
    }

    /// Run the access gate over `ids` against a fresh config snapshot.
    fn enforce(&self, ids: &[&str]) -> Result<BTreeMap<String, RemoteConfig>> {
        let configs = self.configs()?;
        AccessGate::new(&configs, self.app_lock.is_locked()).enforce(ids)?;
        Ok(configs)
    }

    /// Feed an app-lock event. Roots are re-announced when the lock flips,
    /// since soft-blocked remotes appear or disappear.
    pub fn handle_lock_event(&self, event: LockEvent) {
        let was_locked = self.app_lock.is_locked();
        self.app_lock.handle(event);
        if self.app_lock.is_locked() != was_locked {
            self.notify(ChangeEvent::RootsChanged);
        }
    }

    pub fn is_locked(&self) -> bool {
        self.app_lock.is_locked()
    }

    /// Replace the gateway's custom options for `remote`.
    pub fn update_remote_config(&self, remote: &str, config: &RemoteConfig) -> Result<()> {
        self.rpc.set_remote_config(remote, config)?;
        self.notify(ChangeEvent::RootsChanged);
        Ok(())
    }

    /// Create a remote non-interactively. `parameters` may carry gateway
    /// options (`docbridge:` keys) alongside the backend's own.
    pub fn create_remote(
        &self,
        name: &str,
        provider_type: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.rpc.create_remote(name, provider_type, parameters)?;
        self.notify(ChangeEvent::RootsChanged);
        Ok(())
    }

    /// Start the upload monitor, resuming uploads a previous run left behind.
    pub fn start(&self) {
        self.monitor.start(true);
    }

    pub fn shutdown(&self) {
        self.monitor.stop();
    }

    pub fn query_roots(&self) -> Result<Vec<RootRow>> {
        debug!("queryRoots()");
        let configs = self.configs()?;
        let gate = AccessGate::new(&configs, self.app_lock.is_locked());

        let mut flags = root_flags::SUPPORTS_CREATE | root_flags::SUPPORTS_IS_CHILD;
        if self.config.pretend_local {
            flags |= root_flags::LOCAL_ONLY;
        }

        Ok(gate
            .visible_remotes()
            .map(|(remote, config)| {
                let (capacity, free) = if config.report_usage_or_default() {
                    match self.rpc.usage(&path::remote_root(remote)) {
                        Ok(usage) => (usage.total, usage.free),
                        Err(e) => {
                            warn!("failed to query usage of {}: {}", remote, e);
                            (None, None)
                        }
                    }
                } else {
                    (None, None)
                };
                RootRow {
                    root_id: remote.clone(),
                    document_id: path::remote_root(remote),
                    title: ROOT_TITLE.to_string(),
                    summary: remote.clone(),
                    flags,
                    capacity,
                    free,
                    shortcut: config.dynamic_shortcut_or_default(),
                }
            })
            .collect())
    }

    fn thumbnails(configs: &BTreeMap<String, RemoteConfig>, id: &str) -> bool {
        path::split_remote(id)
            .ok()
            .and_then(|(remote, _)| configs.get(&remote).map(|c| c.thumbnails_or_default()))
            .unwrap_or(false)
    }

    pub fn query_child_documents(&self, parent_id: &str) -> Result<Vec<DocumentRow>> {
        debug!("queryChildDocuments({})", parent_id);
        let configs = self.enforce(&[parent_id])?;
        let parent = path::normalize(parent_id);
        let thumbnails = Self::thumbnails(&configs, &parent);

        Ok(self
            .backend
            .list_dir(&parent)?
            .into_iter()
            .map(|stat| DocumentRow::from_stat(path::join(&parent, &stat.name), stat, thumbnails))
            .collect())
    }

    pub fn query_document(&self, id: &str) -> Result<DocumentRow> {
        debug!("queryDocument({})", id);
        let configs = self.enforce(&[id])?;
        let id = path::normalize(id);
        let stat = self.backend.stat(&id).map_err(|e| {
            if e.is_not_found() {
                GatewayError::NotFound(id.clone())
            } else {
                e.into()
            }
        })?;
        let thumbnails = Self::thumbnails(&configs, &id);
        Ok(DocumentRow::from_stat(id, stat, thumbnails))
    }

    /// Pure path comparison after the gate.
    pub fn is_child_document(&self, parent_id: &str, id: &str) -> Result<bool> {
        self.enforce(&[parent_id, id])?;
        Ok(path::is_child(parent_id, id))
    }

    pub fn open_document(
        &self,
        id: &str,
        mode: &str,
        signal: Option<CancellationSignal>,
    ) -> Result<DocumentHandle> {
        debug!("openDocument({}, {})", id, mode);
        self.enforce(&[id])?;
        let id = path::normalize(id);
        let mode = OpenMode::decode(mode)?;
        let (remote, _) = path::split_remote(&id)?;

        let file = self.backend.open(&id, mode.flags())?;

        let hooks = if mode.is_write() {
            if let Err(e) = self.tracker.mark_open_for_write(&id) {
                if let Err(close_err) = file.close() {
                    warn!("failed to close {}: {}", id, close_err);
                }
                return Err(e);
            }
            self.keep_alive.handle_opened(&remote);
            Some(WriteHooks {
                tracker: Arc::clone(&self.tracker),
                keep_alive: Arc::clone(&self.keep_alive),
                monitor: Arc::clone(&self.monitor),
                listener: Arc::clone(&self.listener),
            })
        } else {
            None
        };

        Ok(DocumentHandle::new(
            file,
            id,
            remote,
            mode,
            signal,
            hooks,
            self.config.debug_mode && self.config.verbose_backend_logs,
        ))
    }

    /// Create a file or directory named `display_name` under `parent_id` and
    /// return its id.
    pub fn create_document(
        &self,
        parent_id: &str,
        mime_type: &str,
        display_name: &str,
    ) -> Result<String> {
        debug!("createDocument({}, {}, {})", parent_id, mime_type, display_name);
        self.enforce(&[parent_id])?;
        check_display_name(display_name)?;
        let parent = path::normalize(parent_id);
        let is_dir = mime_type == MIME_TYPE_DIR;

        let (mut base, mut ext) = path::split_ext(&path::join(&parent, display_name), is_dir);
        if !is_dir && mime_type != MIME_TYPE_BINARY && self.config.add_file_extension {
            let expected = mime::extension_for(mime_type);
            if ext != expected {
                if let Some(existing) = ext {
                    base = format!("{}.{}", base, existing);
                }
                ext = expected;
            }
        }

        let posix = self.config.posix_like_semantics;
        let id = match (is_dir, posix) {
            (true, false) => retry_unique(
                &base,
                None,
                ConflictDetection::Stat,
                ATTEMPT_LIMIT,
                |c| self.backend.exists(c),
                |c| Ok(self.backend.mkdir(c)?),
            )?,
            (true, true) => retry_unique(
                &base,
                None,
                ConflictDetection::ErrorCode,
                1,
                |_| false,
                |c| self.existing_ok(self.backend.mkdir(c), c, true),
            )?,
            (false, false) => retry_unique(
                &base,
                ext.as_deref(),
                ConflictDetection::ErrorCode,
                ATTEMPT_LIMIT,
                |_| false,
                |c| Ok(self.create_empty(c)?),
            )?,
            (false, true) => retry_unique(
                &base,
                ext.as_deref(),
                ConflictDetection::ErrorCode,
                1,
                |_| false,
                |c| self.existing_ok(self.create_empty(c), c, false),
            )?,
        };

        self.notify(ChangeEvent::ChildrenChanged { parent });
        Ok(id)
    }

    fn create_empty(&self, id: &str) -> BackendResult<()> {
        self.backend.open(id, OpenFlags::CREATE_NEW)?.close()
    }

    /// POSIX-like create: an existing entry of the right type is success, one
    /// of the other type is a mismatch. The type check races with concurrent
    /// changes.
    fn existing_ok(&self, result: BackendResult<()>, id: &str, want_dir: bool) -> Result<()> {
        match result {
            Err(e) if e.is_exists() => {
                if self.backend.is_dir(id) == want_dir {
                    Ok(())
                } else {
                    Err(GatewayError::TypeMismatch(id.to_string()))
                }
            }
            Err(e) if e.is_type_conflict() => Err(GatewayError::TypeMismatch(id.to_string())),
            other => Ok(other?),
        }
    }

    pub fn rename_document(&self, id: &str, display_name: &str) -> Result<String> {
        debug!("renameDocument({}, {})", id, display_name);
        self.enforce(&[id])?;
        check_display_name(display_name)?;
        let id = path::normalize(id);
        if path::is_root(&id) {
            return Err(GatewayError::InvalidIdentifier(id));
        }

        let (parent, _) = path::split_path(&id);
        let target = path::join(&parent, display_name);
        if target == id {
            return Ok(id);
        }

        self.tracker.wait_until_drained(&id)?;
        let source = self.backend.stat(&id)?;

        let new_id = if self.config.posix_like_semantics {
            self.tracker.wait_until_drained(&target)?;
            retry_unique(
                &target,
                None,
                ConflictDetection::ErrorCode,
                1,
                |_| false,
                |c| {
                    self.backend
                        .rename(&id, c)
                        .map_err(|e| posix_conflict(e, c))
                },
            )?
        } else {
            let (base, ext) = path::split_ext(&target, source.is_dir());
            retry_unique(
                &base,
                ext.as_deref(),
                ConflictDetection::Stat,
                ATTEMPT_LIMIT,
                |c| self.backend.exists(c),
                |c| Ok(self.backend.rename(&id, c)?),
            )?
        };

        self.notify(ChangeEvent::ChildrenChanged { parent });
        Ok(new_id)
    }

    /// Delete `id` recursively. Deleting something that is already gone
    /// succeeds.
    pub fn delete_document(&self, id: &str) -> Result<()> {
        debug!("deleteDocument({})", id);
        self.enforce(&[id])?;
        let id = path::normalize(id);
        if path::is_root(&id) {
            return Err(GatewayError::InvalidIdentifier(id));
        }

        match self.backend.remove(&id, true) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("{} already gone", id);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let (parent, _) = path::split_path(&id);
        self.notify(ChangeEvent::GrantsRevoked { id });
        self.notify(ChangeEvent::ChildrenChanged { parent });
        Ok(())
    }

    pub fn remove_document(&self, id: &str, parent_id: &str) -> Result<()> {
        debug!("removeDocument({}, {})", id, parent_id);
        self.enforce(&[id, parent_id])?;
        if !path::is_child(parent_id, id) {
            return Err(GatewayError::NotAChild {
                id: id.to_string(),
                parent: parent_id.to_string(),
            });
        }
        self.delete_document(id)
    }

    pub fn copy_document(&self, source_id: &str, target_parent_id: &str) -> Result<String> {
        debug!("copyDocument({}, {})", source_id, target_parent_id);
        self.enforce(&[source_id, target_parent_id])?;
        self.transfer(source_id, target_parent_id, true)
    }

    pub fn move_document(
        &self,
        source_id: &str,
        source_parent_id: &str,
        target_parent_id: &str,
    ) -> Result<String> {
        debug!(
            "moveDocument({}, {}, {})",
            source_id, source_parent_id, target_parent_id
        );
        self.enforce(&[source_id, source_parent_id, target_parent_id])?;
        if !path::is_child(source_parent_id, source_id) {
            return Err(GatewayError::NotAChild {
                id: source_id.to_string(),
                parent: source_parent_id.to_string(),
            });
        }
        self.transfer(source_id, target_parent_id, false)
    }

    fn transfer(&self, source_id: &str, target_parent_id: &str, copy: bool) -> Result<String> {
        let source = path::normalize(source_id);
        let target_parent = path::normalize(target_parent_id);
        let (source_parent, leaf) = path::split_path(&source);
        if leaf.is_empty() {
            return Err(GatewayError::InvalidIdentifier(source));
        }
        let target = path::join(&target_parent, &leaf);

        self.tracker.wait_until_drained(&source)?;
        let stat = self.backend.stat(&source)?;

        let new_id = if self.config.posix_like_semantics {
            self.tracker.wait_until_drained(&target)?;
            retry_unique(
                &target,
                None,
                ConflictDetection::ErrorCode,
                1,
                |_| false,
                |c| {
                    self.backend
                        .copy_or_move(&source, c, copy)
                        .map_err(|e| posix_conflict(e, c))
                },
            )?
        } else {
            let (base, ext) = path::split_ext(&target, stat.is_dir());
            retry_unique(
                &base,
                ext.as_deref(),
                ConflictDetection::Stat,
                ATTEMPT_LIMIT,
                |c| self.backend.exists(c),
                |c| Ok(self.backend.copy_or_move(&source, c, copy)?),
            )?
        };

        self.notify(ChangeEvent::ChildrenChanged {
            parent: target_parent,
        });
        if !copy {
            self.notify(ChangeEvent::GrantsRevoked { id: source });
            self.notify(ChangeEvent::ChildrenChanged {
                parent: source_parent,
            });
        }
        Ok(new_id)
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.monitor.stop();
    }
}
