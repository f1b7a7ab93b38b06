//! Output handling for the CLI.
//!
//! Results go to stdout as one JSON object per line. Gateway events (change
//! notifications, keep-alive updates) are diagnostics and go through `log`.

use std::io::{self, Write};

use docbridge_core::{ChangeEvent, ChangeListener, HostLifecycle, KeepAliveState};
use log::{debug, info, warn};
use serde::Serialize;

/// Writes one JSON line per result.
pub struct JsonLines<W: Write> {
    out: W,
}

impl<W: Write> JsonLines<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn emit<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, value)?;
        self.out.write_all(b"\n")
    }
}

/// The CLI's view of the gateway's host callbacks.
#[derive(Debug, Default)]
pub struct CliHost;

impl HostLifecycle for CliHost {
    fn keep_alive(&self, state: &KeepAliveState) {
        debug!("keep-alive: {} item(s) outstanding", state.total());
    }

    fn release(&self) {
        info!("all uploads finished");
    }
}

impl ChangeListener for CliHost {
    fn handle(&self, event: ChangeEvent) {
        match &event {
            ChangeEvent::UploadFailed { id, message } => {
                warn!("upload of {} failed: {}", id, message)
            }
            other => debug!("{:?}", other),
        }
    }
}
