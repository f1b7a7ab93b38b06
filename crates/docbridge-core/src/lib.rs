//! docbridge-core: file-provider gateway over a remote storage backend
//!
//! Exposes the remotes of a storage backend as a document tree: unique
//! naming under Android-like or POSIX-like semantics, in-flight write
//! tracking so renames never race an upload, per-remote access control, and
//! the upload-lifecycle monitor that decides when the host may shut down.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::io::Write;
//! use std::sync::Arc;
//! use docbridge_core::{
//!     CollectingLifecycle, CollectingListener, Gateway, GatewayConfig, LocalBackend,
//! };
//!
//! let remotes = docbridge_core::config::parse_remotes("[photos]\ntype = \"local\"\n")?;
//! let backend = LocalBackend::new("/tmp/docbridge".into(), remotes)?;
//! let gateway = Gateway::with_local_backend(
//!     GatewayConfig::default(),
//!     backend,
//!     Arc::new(CollectingLifecycle::new()),
//!     Arc::new(CollectingListener::new()),
//! );
//!
//! let id = gateway.create_document("photos:", "text/plain", "notes")?;
//! let mut handle = gateway.open_document(&id, "w", None)?;
//! handle.write_all(b"hello")?;
//! handle.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! For lower-level access, use the individual modules directly.

pub mod app_lock;
pub mod backend;
pub mod config;
pub mod error;
pub mod gate;
pub mod handle;
pub mod inflight;
pub mod lifecycle;
pub mod mime;
pub mod naming;
pub mod notify;
pub mod path;
mod provider;
pub mod rpc;

// Re-export the facade
pub use provider::{
    DocumentRow, Gateway, GatewayParts, ROOT_TITLE, RootRow, document_flags, root_flags,
};

// Re-export commonly used types
pub use app_lock::{AppLock, LockEvent, LockPolicy, LockState};
pub use backend::{Backend, BackendFile, EntryKind, LocalBackend, OpenFlags, Stat};
pub use config::{GatewayConfig, RemoteTable};
pub use error::{BackendError, BlockKind, GatewayError, Result};
pub use handle::{CancellationSignal, DocumentHandle, OpenMode};
pub use inflight::{InFlightTracker, InFlightTrie};
pub use lifecycle::{CollectingLifecycle, HostLifecycle, KeepAliveState};
pub use naming::ConflictDetection;
pub use notify::{ChangeEvent, ChangeListener, CollectingListener, NoopListener};
pub use rpc::{ConfigStore, RemoteConfig, Rpc, RpcTransport};
