//! Open document handles.
//!
//! A [`DocumentHandle`] wraps one backend file. Write handles are registered
//! with the in-flight tracker and the keep-alive counters for their whole
//! lifetime; closing one unregisters it only after the backend close returns,
//! so a rename waiting on the tracker never overtakes the upload.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{trace, warn};
use strum::{AsRefStr, Display, EnumString};

use crate::backend::{BackendFile, OpenFlags};
use crate::error::{BackendError, GatewayError, Result, errno};
use crate::inflight::InFlightTracker;
use crate::lifecycle::{KeepAlive, UploadMonitor};
use crate::notify::{ChangeEvent, ChangeListener};

/// Host open modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
pub enum OpenMode {
    #[strum(serialize = "r")]
    Read,
    /// Write-only; creates and truncates.
    #[strum(serialize = "w")]
    Write,
    #[strum(serialize = "wt")]
    WriteTruncate,
    #[strum(serialize = "wa")]
    WriteAppend,
    /// Read-write; creates, keeps existing contents.
    #[strum(serialize = "rw")]
    ReadWrite,
    #[strum(serialize = "rwt")]
    ReadWriteTruncate,
}

impl OpenMode {
    pub fn decode(mode: &str) -> Result<Self> {
        mode.parse()
            .map_err(|_| GatewayError::InvalidMode(mode.to_string()))
    }

    pub fn is_write(self) -> bool {
        self != OpenMode::Read
    }

    pub fn flags(self) -> OpenFlags {
        let write = OpenFlags {
            write: true,
            create: true,
            ..Default::default()
        };
        match self {
            OpenMode::Read => OpenFlags::READ_ONLY,
            OpenMode::Write | OpenMode::WriteTruncate => OpenFlags {
                truncate: true,
                ..write
            },
            OpenMode::WriteAppend => OpenFlags {
                append: true,
                ..write
            },
            OpenMode::ReadWrite => OpenFlags {
                read: true,
                ..write
            },
            OpenMode::ReadWriteTruncate => OpenFlags {
                read: true,
                truncate: true,
                ..write
            },
        }
    }
}

/// Cooperative cancellation flag shared between the host and a handle.
///
/// Checked before every read and write; I/O already handed to the backend
/// runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a write handle must report to when it closes.
pub(crate) struct WriteHooks {
    pub(crate) tracker: Arc<InFlightTracker>,
    pub(crate) keep_alive: Arc<KeepAlive>,
    pub(crate) monitor: Arc<UploadMonitor>,
    pub(crate) listener: Arc<dyn ChangeListener>,
}

pub struct DocumentHandle {
    file: Option<Box<dyn BackendFile>>,
    id: String,
    remote: String,
    mode: OpenMode,
    signal: Option<CancellationSignal>,
    hooks: Option<WriteHooks>,
    verbose: bool,
    /// Cursor for the `Read`/`Write` impls.
    position: u64,
}

impl DocumentHandle {
    pub(crate) fn new(
        file: Box<dyn BackendFile>,
        id: String,
        remote: String,
        mode: OpenMode,
        signal: Option<CancellationSignal>,
        hooks: Option<WriteHooks>,
        verbose: bool,
    ) -> Self {
        Self {
            file: Some(file),
            id,
            remote,
            mode,
            signal,
            hooks,
            verbose,
            position: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    fn checkpoint(&self) -> Result<()> {
        match &self.signal {
            Some(signal) if signal.is_cancelled() => Err(GatewayError::Cancelled),
            _ => Ok(()),
        }
    }

    fn file(&mut self) -> Result<&mut Box<dyn BackendFile>> {
        self.file
            .as_mut()
            .ok_or_else(|| BackendError::new(errno::EBADF, "handle already closed").into())
    }

    pub fn size(&mut self) -> Result<u64> {
        Ok(self.file()?.size()?)
    }

    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.checkpoint()?;
        if self.verbose {
            trace!("read({}, {} bytes @ {})", self.id, buf.len(), offset);
        }
        Ok(self.file()?.read_at(buf, offset)?)
    }

    pub fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        self.checkpoint()?;
        if self.verbose {
            trace!("write({}, {} bytes @ {})", self.id, buf.len(), offset);
        }
        Ok(self.file()?.write_at(buf, offset)?)
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.file()?.flush()?)
    }

    /// Close the handle. Failures are logged and, for write handles, reported
    /// as [`ChangeEvent::UploadFailed`]; closing itself never fails.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };

        if let Some(hooks) = &self.hooks {
            hooks.keep_alive.handle_closing(&self.remote);
        }
        let result = file.close();

        if let Some(hooks) = &self.hooks {
            hooks.keep_alive.handle_closed(&self.remote);
            if let Err(e) = hooks.tracker.mark_closed(&self.id) {
                warn!("failed to unregister write on {}: {}", self.id, e);
            }
        }

        if let Err(e) = result {
            warn!("failed to close {}: {}", self.id, e);
            if let Some(hooks) = &self.hooks {
                hooks.listener.handle(ChangeEvent::UploadFailed {
                    id: self.id.clone(),
                    message: e.to_string(),
                });
            }
        }

        if let Some(hooks) = &self.hooks {
            hooks.monitor.start(false);
        }
    }
}

impl Drop for DocumentHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl Read for DocumentHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_at(buf, self.position)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for DocumentHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.write_at(buf, self.position)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(DocumentHandle::flush(self)?)
    }
}
