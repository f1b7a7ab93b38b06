//! Directory-backed reference backend.
//!
//! Remote `name` lives in `<root>/name/`. Writes go to a staging copy under
//! `<root>/.vfs-cache/<name>/...` and are uploaded to the real path when the
//! handle closes. A staged file left behind (process killed before close)
//! marks the remote as dirty; [`Backend::init_vfs`] uploads it.
//!
//! The `vfs_cache_mode` VFS option of a remote (`docbridge:vfs:vfs_cache_mode`)
//! selects staging: `off` writes straight to the target, every other mode
//! stages.
//!
//! The same type serves the RPC interface from an in-memory remote table.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use serde_json::{Map, Value, json};

use super::{Backend, BackendFile, BackendResult, EntryKind, OpenFlags, Stat};
use crate::config::RemoteTable;
use crate::error::{self, BackendError, errno};
use crate::path;
use crate::rpc::{ConfigStore, RemoteConfig, RpcMethod, RpcResponse, RpcTransport};

const CACHE_DIR: &str = ".vfs-cache";

const VFS_CACHE_MODE: &str = "vfs_cache_mode";
const CACHE_MODES: [&str; 4] = ["off", "minimal", "writes", "full"];

fn io_error(err: io::Error, path: &Path) -> BackendError {
    let mut e = BackendError::from_io(&err);
    e.message = format!("{}: {}", path.display(), err);
    e
}

fn bad_id(id: &str, reason: &str) -> BackendError {
    BackendError::new(errno::EINVAL, format!("{}: {}", reason, id))
}

/// Remote names double as directory names.
fn valid_remote_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', ':', '\0'])
}

struct Inner {
    root: PathBuf,
    remotes: Mutex<RemoteTable>,
    /// Open write handles per staging file.
    writers: Mutex<HashMap<PathBuf, usize>>,
    /// Staging files whose upload is running right now.
    uploading: Mutex<HashSet<PathBuf>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where an id lives on disk.
struct Resolved {
    /// Empty for local paths.
    remote: String,
    target: PathBuf,
    /// Staging path for writes; `None` when writes go straight to the target
    /// (local paths, or a remote with caching off).
    stage: Option<PathBuf>,
}

impl Inner {
    fn cache_root(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    fn remote_cache(&self, remote: &str) -> PathBuf {
        self.cache_root().join(remote)
    }

    fn resolve(&self, id: &str) -> BackendResult<Resolved> {
        let (remote, _) = path::split_remote(id).map_err(|_| bad_id(id, "invalid id"))?;
        let segments = path::segments(id);
        if segments.iter().any(|s| *s == "." || *s == ".." || s.contains('\0')) {
            return Err(bad_id(id, "invalid path component"));
        }

        if remote.is_empty() {
            let mut target = PathBuf::from("/");
            target.extend(&segments);
            return Ok(Resolved {
                remote,
                target,
                stage: None,
            });
        }

        let vfs_options = match lock(&self.remotes).get(&remote) {
            Some(raw) => RemoteConfig::from_raw(raw).vfs_options,
            None => {
                return Err(BackendError::not_found(format!(
                    "remote not configured: {}",
                    remote
                )));
            }
        };

        let mut target = self.root.join(&remote);
        target.extend(&segments);
        let stage = if vfs_options.get(VFS_CACHE_MODE).is_some_and(|m| m == "off") {
            None
        } else {
            let mut stage = self.remote_cache(&remote);
            stage.extend(&segments);
            Some(stage)
        };
        Ok(Resolved {
            remote,
            target,
            stage,
        })
    }

    /// Like [`resolve`](Self::resolve), creating the remote's directory.
    fn resolve_for_write(&self, id: &str) -> BackendResult<Resolved> {
        let resolved = self.resolve(id)?;
        if !resolved.remote.is_empty() {
            let remote_dir = self.root.join(&resolved.remote);
            fs::create_dir_all(&remote_dir).map_err(|e| io_error(e, &remote_dir))?;
        }
        Ok(resolved)
    }

    fn release_writer(&self, stage: &Path) -> bool {
        let mut writers = lock(&self.writers);
        match writers.get_mut(stage) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            _ => {
                writers.remove(stage);
                true
            }
        }
    }

    /// Remove empty directories from `dir` upwards, stopping at `stop`.
    fn prune_cache_dirs(&self, mut dir: &Path, stop: &Path) {
        while dir != stop && dir.starts_with(stop) {
            if fs::remove_dir(dir).is_err() {
                break;
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    /// Copy a staged file to its target and drop the staging copy.
    fn upload(&self, remote: &str, stage: &Path, target: &Path) -> BackendResult<()> {
        lock(&self.uploading).insert(stage.to_path_buf());
        let result = fs::copy(stage, target)
            .map(|_| ())
            .map_err(|e| io_error(e, target));
        lock(&self.uploading).remove(stage);

        if result.is_ok() {
            if let Err(e) = fs::remove_file(stage) {
                warn!("failed to remove staged file {}: {}", stage.display(), e);
            }
            if let Some(parent) = stage.parent() {
                self.prune_cache_dirs(parent, &self.remote_cache(remote));
            }
        }
        result
    }
}

/// Every regular file under `dir`, recursively. Missing dirs are empty.
fn files_under(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            out.extend(files_under(&entry.path())?);
        } else {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

fn stat_path(path: &Path, name: String) -> BackendResult<Stat> {
    let meta = fs::metadata(path).map_err(|e| io_error(e, path))?;
    Ok(Stat {
        name,
        kind: if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        },
        size: if meta.is_dir() { 0 } else { meta.len() },
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
    })
}

/// Open the staging copy of `target`. The first writer seeds it from the
/// current contents unless truncating.
fn open_stage(stage: &Path, target: &Path, truncate: bool, first: bool) -> BackendResult<File> {
    if first {
        if let Some(parent) = stage.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(e, parent))?;
        }
        if truncate {
            File::create(stage).map_err(|e| io_error(e, stage))?;
        } else {
            fs::copy(target, stage).map_err(|e| io_error(e, stage))?;
        }
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .truncate(truncate)
        .open(stage)
        .map_err(|e| io_error(e, stage))
}

/// Recursively merge `source` into `target`, overwriting files.
fn merge_copy(source: &Path, target: &Path) -> BackendResult<()> {
    match fs::metadata(target) {
        Ok(meta) if !meta.is_dir() => {
            return Err(BackendError::new(
                errno::ENOTDIR,
                format!("{}: not a directory", target.display()),
            ));
        }
        Ok(_) => {}
        Err(_) => fs::create_dir(target).map_err(|e| io_error(e, target))?,
    }

    for entry in fs::read_dir(source).map_err(|e| io_error(e, source))? {
        let entry = entry.map_err(|e| io_error(e, source))?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if entry.file_type().map_err(|e| io_error(e, &from))?.is_dir() {
            merge_copy(&from, &to)?;
        } else {
            copy_file(&from, &to)?;
        }
    }
    Ok(())
}

fn copy_file(source: &Path, target: &Path) -> BackendResult<()> {
    if target.is_dir() {
        return Err(BackendError::new(
            errno::EISDIR,
            format!("{}: is a directory", target.display()),
        ));
    }
    fs::copy(source, target)
        .map(|_| ())
        .map_err(|e| io_error(e, target))
}

/// Reference backend over a local directory.
#[derive(Clone)]
pub struct LocalBackend {
    inner: Arc<Inner>,
}

impl LocalBackend {
    /// Create a backend rooted at `root` with the given remote table.
    pub fn new(root: PathBuf, remotes: RemoteTable) -> BackendResult<Self> {
        fs::create_dir_all(&root).map_err(|e| io_error(e, &root))?;
        for name in remotes.keys() {
            if !valid_remote_name(name) {
                return Err(BackendError::new(
                    errno::EINVAL,
                    format!("invalid remote name: {}", name),
                ));
            }
            let dir = root.join(name);
            fs::create_dir_all(&dir).map_err(|e| io_error(e, &dir))?;
        }
        Ok(Self {
            inner: Arc::new(Inner {
                root,
                remotes: Mutex::new(remotes),
                writers: Mutex::new(HashMap::new()),
                uploading: Mutex::new(HashSet::new()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Current remote table.
    pub fn remotes(&self) -> RemoteTable {
        lock(&self.inner.remotes).clone()
    }
}

impl Backend for LocalBackend {
    fn stat(&self, id: &str) -> BackendResult<Stat> {
        let resolved = self.inner.resolve(id)?;
        let (_, leaf) = path::split_path(id);
        let name = if leaf.is_empty() {
            resolved.remote.clone()
        } else {
            leaf
        };
        stat_path(&resolved.target, name)
    }

    fn list_dir(&self, id: &str) -> BackendResult<Vec<Stat>> {
        let resolved = self.inner.resolve(id)?;
        let dir = &resolved.target;
        if !dir.is_dir() {
            return Err(match fs::metadata(dir) {
                Ok(_) => BackendError::new(
                    errno::ENOTDIR,
                    format!("{}: not a directory", dir.display()),
                ),
                Err(e) => io_error(e, dir),
            });
        }

        let mut out = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| io_error(e, dir))? {
            let entry = entry.map_err(|e| io_error(e, dir))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            out.push(stat_path(&entry.path(), name)?);
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn open(&self, id: &str, flags: OpenFlags) -> BackendResult<Box<dyn BackendFile>> {
        let resolved = if flags.write {
            self.inner.resolve_for_write(id)?
        } else {
            self.inner.resolve(id)?
        };
        let target = &resolved.target;
        trace!("open({}, {:?})", id, flags);

        match fs::metadata(target) {
            Ok(_) if flags.exclusive => {
                return Err(BackendError::exists(format!(
                    "{}: file exists",
                    target.display()
                )));
            }
            Ok(meta) if meta.is_dir() => {
                return Err(BackendError::new(
                    errno::EISDIR,
                    format!("{}: is a directory", target.display()),
                ));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound && flags.write && flags.create => {
                // The empty file shows up in listings right away; the
                // contents follow on close.
                OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(target)
                    .map_err(|e| io_error(e, target))?;
            }
            Err(e) => return Err(io_error(e, target)),
        }

        if !flags.write {
            let file = File::open(target).map_err(|e| io_error(e, target))?;
            return Ok(Box::new(LocalFile {
                file,
                writable: false,
                append: false,
                upload: None,
            }));
        }

        let Some(stage) = resolved.stage else {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .truncate(flags.truncate)
                .open(target)
                .map_err(|e| io_error(e, target))?;
            return Ok(Box::new(LocalFile {
                file,
                writable: true,
                append: flags.append,
                upload: None,
            }));
        };

        let file = {
            let mut writers = lock(&self.inner.writers);
            let first = !writers.contains_key(&stage);
            let file = open_stage(&stage, target, flags.truncate, first)?;
            *writers.entry(stage.clone()).or_insert(0) += 1;
            file
        };

        Ok(Box::new(LocalFile {
            file,
            writable: true,
            append: flags.append,
            upload: Some(PendingUpload {
                inner: Arc::clone(&self.inner),
                remote: resolved.remote,
                stage,
                target: resolved.target,
            }),
        }))
    }

    fn mkdir(&self, id: &str) -> BackendResult<()> {
        let resolved = self.inner.resolve_for_write(id)?;
        fs::create_dir(&resolved.target).map_err(|e| io_error(e, &resolved.target))
    }

    fn remove(&self, id: &str, recurse: bool) -> BackendResult<()> {
        let resolved = self.inner.resolve(id)?;
        let target = &resolved.target;
        if path::is_root(id) {
            return Err(BackendError::new(
                errno::EINVAL,
                format!("refusing to remove remote root: {}", id),
            ));
        }
        let meta = fs::symlink_metadata(target).map_err(|e| io_error(e, target))?;
        let result = if meta.is_dir() {
            if recurse {
                fs::remove_dir_all(target)
            } else {
                fs::remove_dir(target)
            }
        } else {
            fs::remove_file(target)
        };
        result.map_err(|e| io_error(e, target))
    }

    fn rename(&self, source: &str, target: &str) -> BackendResult<()> {
        let from = self.inner.resolve(source)?.target;
        let to = self.inner.resolve_for_write(target)?.target;
        let from_meta = fs::metadata(&from).map_err(|e| io_error(e, &from))?;
        if from == to {
            return Ok(());
        }

        if let Ok(to_meta) = fs::metadata(&to) {
            match (from_meta.is_dir(), to_meta.is_dir()) {
                (true, false) => {
                    return Err(BackendError::new(
                        errno::ENOTDIR,
                        format!("{}: not a directory", to.display()),
                    ));
                }
                (false, true) => {
                    return Err(BackendError::new(
                        errno::EISDIR,
                        format!("{}: is a directory", to.display()),
                    ));
                }
                (true, true) => {
                    let empty = fs::read_dir(&to)
                        .map_err(|e| io_error(e, &to))?
                        .next()
                        .is_none();
                    if !empty {
                        return Err(BackendError::exists(format!(
                            "{}: directory not empty",
                            to.display()
                        )));
                    }
                    fs::remove_dir(&to).map_err(|e| io_error(e, &to))?;
                }
                (false, false) => {}
            }
        }

        fs::rename(&from, &to).map_err(|e| io_error(e, &to))
    }

    fn copy_or_move(&self, source: &str, target: &str, copy: bool) -> BackendResult<()> {
        let from = self.inner.resolve(source)?.target;
        let to = self.inner.resolve_for_write(target)?.target;
        let from_meta = fs::metadata(&from).map_err(|e| io_error(e, &from))?;
        if from == to {
            return Ok(());
        }
        if to.starts_with(&from) {
            return Err(BackendError::new(
                errno::EINVAL,
                format!("cannot {} {} into itself", if copy { "copy" } else { "move" }, source),
            ));
        }

        if from_meta.is_dir() {
            if !copy && !to.exists() {
                return fs::rename(&from, &to).map_err(|e| io_error(e, &to));
            }
            merge_copy(&from, &to)?;
            if !copy {
                fs::remove_dir_all(&from).map_err(|e| io_error(e, &from))?;
            }
        } else {
            if !copy && !to.is_dir() {
                return fs::rename(&from, &to).map_err(|e| io_error(e, &to));
            }
            copy_file(&from, &to)?;
            if !copy {
                fs::remove_file(&from).map_err(|e| io_error(e, &from))?;
            }
        }
        Ok(())
    }

    fn cached_remotes(&self) -> BackendResult<Vec<String>> {
        let cache = self.inner.cache_root();
        let entries = match fs::read_dir(&cache) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(e, &cache)),
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(e, &cache))?;
            let dirty = !files_under(&entry.path())
                .map_err(|e| io_error(e, &entry.path()))?
                .is_empty();
            if dirty {
                out.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        out.sort();
        Ok(out)
    }

    fn init_vfs(&self, remote: &str) -> BackendResult<()> {
        let vfs_options = lock(&self.inner.remotes)
            .get(remote)
            .map(|raw| RemoteConfig::from_raw(raw).vfs_options)
            .unwrap_or_default();
        if let Some(mode) = vfs_options.get(VFS_CACHE_MODE) {
            if !CACHE_MODES.contains(&mode.as_str()) {
                return Err(BackendError::new(
                    errno::EINVAL,
                    format!("{}: invalid {}: {}", remote, VFS_CACHE_MODE, mode),
                ));
            }
        }
        debug!("vfs {} options: {:?}", remote, vfs_options);

        let remote_cache = self.inner.remote_cache(remote);
        let remote_dir = self.inner.root.join(remote);
        let staged = files_under(&remote_cache).map_err(|e| io_error(e, &remote_cache))?;

        for stage in staged {
            if lock(&self.inner.writers).contains_key(&stage) {
                continue;
            }
            let Ok(relative) = stage.strip_prefix(&remote_cache) else {
                continue;
            };
            let target = remote_dir.join(relative);
            debug!("resuming upload of {}", target.display());
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| io_error(e, parent))?;
            }
            self.inner.upload(remote, &stage, &target)?;
        }
        Ok(())
    }
}

/// An open file. Write handles on remotes carry a pending upload.
struct LocalFile {
    file: File,
    writable: bool,
    append: bool,
    upload: Option<PendingUpload>,
}

struct PendingUpload {
    inner: Arc<Inner>,
    remote: String,
    stage: PathBuf,
    target: PathBuf,
}

impl BackendFile for LocalFile {
    fn size(&mut self) -> BackendResult<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(BackendError::from)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> BackendResult<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> BackendResult<usize> {
        if !self.writable {
            return Err(BackendError::new(errno::EBADF, "handle not open for writing"));
        }
        if self.append {
            self.file.seek(SeekFrom::End(0))?;
        } else {
            self.file.seek(SeekFrom::Start(offset))?;
        }
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> BackendResult<()> {
        self.file.flush()?;
        if self.writable {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> BackendResult<()> {
        let LocalFile { file, upload, .. } = *self;
        drop(file);

        let Some(upload) = upload else {
            return Ok(());
        };
        let last = upload.inner.release_writer(&upload.stage);
        if !last {
            // Another writer still owns the staging copy; sync what we have.
            return fs::copy(&upload.stage, &upload.target)
                .map(|_| ())
                .map_err(|e| io_error(e, &upload.target));
        }
        upload
            .inner
            .upload(&upload.remote, &upload.stage, &upload.target)
    }
}

// RPC

fn string_param<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// `"name:"` or `"name"` to `"name"`.
fn fs_remote(input: &Value) -> Option<String> {
    string_param(input, "fs").map(|fs| fs.trim_end_matches(':').to_string())
}

impl LocalBackend {
    fn rpc_create(&self, input: &Value) -> RpcResponse {
        let Some(name) = string_param(input, "name") else {
            return RpcResponse::error(400, "missing name");
        };
        if !valid_remote_name(name) {
            return RpcResponse::error(400, format!("invalid remote name: {}", name));
        }
        let Some(kind) = string_param(input, "type") else {
            return RpcResponse::error(400, "missing type");
        };

        let mut options = string_map(input.get("parameters"));
        options.insert("type".to_string(), kind.to_string());

        let dir = self.inner.root.join(name);
        if let Err(e) = fs::create_dir_all(&dir) {
            return RpcResponse::error(500, e.to_string());
        }
        lock(&self.inner.remotes).insert(name.to_string(), options);
        RpcResponse::ok(json!({ "State": "", "Option": null }))
    }

    fn rpc_update(&self, input: &Value) -> RpcResponse {
        let Some(name) = string_param(input, "name") else {
            return RpcResponse::error(400, "missing name");
        };
        let mut remotes = lock(&self.inner.remotes);
        let Some(options) = remotes.get_mut(name) else {
            return RpcResponse::error(404, format!("remote not found: {}", name));
        };
        options.extend(string_map(input.get("parameters")));
        RpcResponse::ok(json!({ "State": "", "Option": null }))
    }

    fn rpc_about(&self, input: &Value) -> RpcResponse {
        let Some(remote) = fs_remote(input) else {
            return RpcResponse::error(400, "missing fs");
        };
        if !lock(&self.inner.remotes).contains_key(&remote) {
            return RpcResponse::error(404, format!("remote not found: {}", remote));
        }
        let files = match files_under(&self.inner.root.join(&remote)) {
            Ok(files) => files,
            Err(e) => return RpcResponse::error(500, e.to_string()),
        };
        let used: u64 = files
            .iter()
            .filter_map(|f| fs::metadata(f).ok())
            .map(|m| m.len())
            .sum();
        RpcResponse::ok(json!({
            "total": null,
            "used": used,
            "free": null,
            "objects": files.len(),
        }))
    }

    fn rpc_queue(&self, input: &Value) -> RpcResponse {
        let Some(remote) = fs_remote(input) else {
            return RpcResponse::error(400, "missing fs");
        };
        let cache = self.inner.remote_cache(&remote);
        let staged = match files_under(&cache) {
            Ok(staged) => staged,
            Err(e) => return RpcResponse::error(500, e.to_string()),
        };
        let uploading = lock(&self.inner.uploading);
        let queue: Vec<Value> = staged
            .iter()
            .map(|stage| {
                let name = stage
                    .strip_prefix(&cache)
                    .unwrap_or(stage)
                    .to_string_lossy()
                    .into_owned();
                json!({ "name": name, "uploading": uploading.contains(stage) })
            })
            .collect();
        RpcResponse::ok(json!({ "queue": queue }))
    }
}

impl RpcTransport for LocalBackend {
    fn call(&self, method: &str, input: &Value) -> RpcResponse {
        let Ok(method) = RpcMethod::from_str(method) else {
            return RpcResponse::error(404, format!("unknown method: {}", method));
        };
        debug!("local rpc {}", method);

        match method {
            RpcMethod::ListRemotes => {
                let names: Vec<String> = lock(&self.inner.remotes).keys().cloned().collect();
                RpcResponse::ok(json!({ "remotes": names }))
            }
            RpcMethod::Dump => {
                let remotes = lock(&self.inner.remotes);
                let dump: Map<String, Value> = remotes
                    .iter()
                    .map(|(name, options)| (name.clone(), json!(options)))
                    .collect();
                RpcResponse::ok(Value::Object(dump))
            }
            RpcMethod::Create => self.rpc_create(input),
            RpcMethod::Update => self.rpc_update(input),
            RpcMethod::Delete => {
                let Some(name) = string_param(input, "name") else {
                    return RpcResponse::error(400, "missing name");
                };
                match lock(&self.inner.remotes).remove(name) {
                    Some(_) => RpcResponse::ok(json!({})),
                    None => RpcResponse::error(404, format!("remote not found: {}", name)),
                }
            }
            RpcMethod::Providers => RpcResponse::ok(json!({
                "providers": [{
                    "Name": "local",
                    "Description": "Local Disk",
                    "Prefix": "local",
                    "Options": [],
                    "Aliases": [],
                    "Hide": false,
                }],
            })),
            RpcMethod::Obscure => match string_param(input, "clear") {
                Some(clear) => {
                    RpcResponse::ok(json!({ "obscured": URL_SAFE_NO_PAD.encode(clear) }))
                }
                None => RpcResponse::error(400, "missing clear"),
            },
            RpcMethod::About => self.rpc_about(input),
            RpcMethod::VfsList => {
                let vfses: Vec<String> = lock(&self.inner.remotes)
                    .keys()
                    .map(|name| path::remote_root(name))
                    .collect();
                RpcResponse::ok(json!({ "vfses": vfses }))
            }
            RpcMethod::VfsQueue => self.rpc_queue(input),
        }
    }
}

impl ConfigStore for LocalBackend {
    fn delete_section_key(&self, remote: &str, key: &str) -> error::Result<()> {
        if let Some(options) = lock(&self.inner.remotes).get_mut(remote) {
            options.remove(key);
        }
        Ok(())
    }

    fn notify_config_changed(&self) {
        debug!("remote table changed");
    }
}
