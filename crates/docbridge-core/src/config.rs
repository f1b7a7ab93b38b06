//! Gateway settings.
//!
//! `docbridge.toml` holds host-level preferences. Every key is optional; a
//! missing file yields [`GatewayConfig::default`]. The file is only read.
//!
//! `remotes.toml` (same directory) seeds the local backend's remote table,
//! one table per remote with raw string options. Hosts write it back after
//! adding a remote:
//!
//! ```toml
//! [photos]
//! type = "local"
//! "docbridge:soft_blocked" = "true"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app_lock::LockPolicy;
use crate::error::{GatewayError, Result};

pub const CONFIG_FILE_NAME: &str = "docbridge.toml";
pub const REMOTES_FILE_NAME: &str = "remotes.toml";

/// Default values, shared by `Default` and serde.
pub struct ConfigDefaults;

impl ConfigDefaults {
    pub const PRETEND_LOCAL: bool = false;
    pub const POSIX_LIKE_SEMANTICS: bool = false;
    pub const ADD_FILE_EXTENSION: bool = true;
    pub const REQUIRE_AUTH: bool = false;
    pub const INACTIVITY_TIMEOUT_SECS: u64 = 60;
    pub const DEBUG_MODE: bool = false;
    pub const VERBOSE_BACKEND_LOGS: bool = false;
}

fn default_pretend_local() -> bool {
    ConfigDefaults::PRETEND_LOCAL
}
fn default_posix_like_semantics() -> bool {
    ConfigDefaults::POSIX_LIKE_SEMANTICS
}
fn default_add_file_extension() -> bool {
    ConfigDefaults::ADD_FILE_EXTENSION
}
fn default_require_auth() -> bool {
    ConfigDefaults::REQUIRE_AUTH
}
fn default_inactivity_timeout_secs() -> u64 {
    ConfigDefaults::INACTIVITY_TIMEOUT_SECS
}
fn default_debug_mode() -> bool {
    ConfigDefaults::DEBUG_MODE
}
fn default_verbose_backend_logs() -> bool {
    ConfigDefaults::VERBOSE_BACKEND_LOGS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Mark roots as local-only so pickers that hide cloud roots show them.
    #[serde(default = "default_pretend_local")]
    pub pretend_local: bool,
    /// Overwrite files and merge directories instead of suffixing names.
    #[serde(default = "default_posix_like_semantics")]
    pub posix_like_semantics: bool,
    /// Append the MIME type's extension to created files.
    #[serde(default = "default_add_file_extension")]
    pub add_file_extension: bool,
    #[serde(default = "default_require_auth")]
    pub require_auth: bool,
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
    #[serde(default = "default_debug_mode")]
    pub debug_mode: bool,
    /// Trace every read and write. Only honoured with `debug_mode`.
    #[serde(default = "default_verbose_backend_logs")]
    pub verbose_backend_logs: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            pretend_local: ConfigDefaults::PRETEND_LOCAL,
            posix_like_semantics: ConfigDefaults::POSIX_LIKE_SEMANTICS,
            add_file_extension: ConfigDefaults::ADD_FILE_EXTENSION,
            require_auth: ConfigDefaults::REQUIRE_AUTH,
            inactivity_timeout_secs: ConfigDefaults::INACTIVITY_TIMEOUT_SECS,
            debug_mode: ConfigDefaults::DEBUG_MODE,
            verbose_backend_logs: ConfigDefaults::VERBOSE_BACKEND_LOGS,
        }
    }
}

impl GatewayConfig {
    /// Load from `path`, or defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            require_auth: self.require_auth,
            inactivity_timeout: Duration::from_secs(self.inactivity_timeout_secs),
        }
    }

    /// `log` filter level implied by the debug settings.
    pub fn log_level(&self) -> log::LevelFilter {
        match (self.debug_mode, self.verbose_backend_logs) {
            (true, true) => log::LevelFilter::Trace,
            (true, false) => log::LevelFilter::Debug,
            (false, _) => log::LevelFilter::Warn,
        }
    }
}

/// Raw option maps keyed by remote name.
pub type RemoteTable = BTreeMap<String, BTreeMap<String, String>>;

/// Load `remotes.toml`, or an empty table if it does not exist.
///
/// Scalar values are stringified, so `"docbridge:hard_blocked" = true` and
/// `= "true"` are equivalent.
pub fn load_remotes(path: &Path) -> Result<RemoteTable> {
    if !path.exists() {
        return Ok(RemoteTable::new());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| GatewayError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_remotes(&content)
}

/// Write `table` to `path` in the format [`load_remotes`] reads.
pub fn save_remotes(path: &Path, table: &RemoteTable) -> Result<()> {
    let content = toml::to_string(table)
        .map_err(|e| GatewayError::Config(format!("Failed to serialize remotes: {}", e)))?;
    fs::write(path, content)
        .map_err(|e| GatewayError::Config(format!("Failed to write {}: {}", path.display(), e)))
}

pub fn parse_remotes(content: &str) -> Result<RemoteTable> {
    let raw: BTreeMap<String, toml::Table> = toml::from_str(content)
        .map_err(|e| GatewayError::Config(format!("Failed to parse remotes: {}", e)))?;

    let mut table = RemoteTable::new();
    for (remote, options) in raw {
        let mut out = BTreeMap::new();
        for (key, value) in options {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                other => {
                    return Err(GatewayError::Config(format!(
                        "Remote {} option {} must be a scalar, got {}",
                        remote,
                        key,
                        other.type_str()
                    )));
                }
            };
            out.insert(key, value);
        }
        table.insert(remote, out);
    }
    Ok(table)
}
