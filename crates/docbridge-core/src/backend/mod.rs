//! Backend filesystem interface.
//!
//! Backends expose stat/list/open/mkdir/remove/rename/copy-or-move over
//! document ids and fail with a structured [`BackendError`]. They know
//! nothing about access control, unique naming or in-flight writes; the
//! gateway layers all of that on top.
//!
//! # Implementing a backend
//!
//! Ids arrive as `remote:path` (or an absolute local path). Map them to
//! your storage and report failures with the errno code a POSIX filesystem
//! would use: `ENOENT` for missing paths, `EEXIST` for exclusive-create and
//! mkdir collisions, `ENOTDIR`/`EISDIR` for type conflicts.

mod local;

pub use local::LocalBackend;

use chrono::{DateTime, Utc};

use crate::error::BackendError;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata of one entry. `name` is the leaf name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Decoded open flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    /// Fail with `EEXIST` if the file exists. Implies `create`.
    pub exclusive: bool,
    pub truncate: bool,
    pub append: bool,
}

impl OpenFlags {
    pub const READ_ONLY: OpenFlags = OpenFlags {
        read: true,
        write: false,
        create: false,
        exclusive: false,
        truncate: false,
        append: false,
    };

    /// `O_WRONLY | O_CREAT | O_EXCL`, used to create empty files.
    pub const CREATE_NEW: OpenFlags = OpenFlags {
        read: false,
        write: true,
        create: true,
        exclusive: true,
        truncate: false,
        append: false,
    };
}

/// An open file. The host serializes calls on one handle.
pub trait BackendFile: Send {
    fn size(&mut self) -> BackendResult<u64>;

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> BackendResult<usize>;

    fn write_at(&mut self, buf: &[u8], offset: u64) -> BackendResult<usize>;

    fn flush(&mut self) -> BackendResult<()>;

    /// Close the handle. For write handles this starts the upload; it may
    /// still be running in the background when this returns.
    fn close(self: Box<Self>) -> BackendResult<()>;
}

pub trait Backend: Send + Sync {
    fn stat(&self, id: &str) -> BackendResult<Stat>;

    fn list_dir(&self, id: &str) -> BackendResult<Vec<Stat>>;

    fn open(&self, id: &str, flags: OpenFlags) -> BackendResult<Box<dyn BackendFile>>;

    /// Create one directory. `EEXIST` if anything exists at `id`.
    fn mkdir(&self, id: &str) -> BackendResult<()>;

    fn remove(&self, id: &str, recurse: bool) -> BackendResult<()>;

    /// POSIX rename: files are overwritten, non-empty directories are not.
    fn rename(&self, source: &str, target: &str) -> BackendResult<()>;

    /// Copy or move, merging directories and overwriting files.
    fn copy_or_move(&self, source: &str, target: &str, copy: bool) -> BackendResult<()>;

    /// Remotes that still have dirty cache data from an earlier run.
    fn cached_remotes(&self) -> BackendResult<Vec<String>>;

    /// Bring up the VFS of `remote`, resuming any pending uploads.
    fn init_vfs(&self, remote: &str) -> BackendResult<()>;

    fn exists(&self, id: &str) -> bool {
        self.stat(id).is_ok()
    }

    fn is_dir(&self, id: &str) -> bool {
        self.stat(id).map(|s| s.is_dir()).unwrap_or(false)
    }
}
