//! Per-remote gateway options stored alongside the backend's own options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Prefix marking options owned by the gateway rather than the backend.
pub const CUSTOM_OPT_PREFIX: &str = "docbridge:";
const OPT_HARD_BLOCKED: &str = "docbridge:hard_blocked";
const OPT_SOFT_BLOCKED: &str = "docbridge:soft_blocked";
const OPT_DYNAMIC_SHORTCUT: &str = "docbridge:dynamic_shortcut";
const OPT_THUMBNAILS: &str = "docbridge:thumbnails";
const OPT_REPORT_USAGE: &str = "docbridge:report_usage";
const OPT_VFS_PREFIX: &str = "docbridge:vfs:";

const DEFAULT_HARD_BLOCKED: bool = false;
const DEFAULT_SOFT_BLOCKED: bool = false;
const DEFAULT_DYNAMIC_SHORTCUT: bool = false;
const DEFAULT_THUMBNAILS: bool = true;
const DEFAULT_REPORT_USAGE: bool = false;

/// Gateway attributes of one remote. `None` means "unset, use the default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub hard_blocked: Option<bool>,
    pub soft_blocked: Option<bool>,
    pub dynamic_shortcut: Option<bool>,
    pub thumbnails: Option<bool>,
    pub report_usage: Option<bool>,
    #[serde(default)]
    pub vfs_options: BTreeMap<String, String>,
}

/// `"true"`/`"false"` only; anything else counts as unset.
fn parse_strict_bool(value: Option<&String>) -> Option<bool> {
    match value.map(String::as_str) {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    }
}

impl RemoteConfig {
    /// Extract the gateway options from a remote's raw option map.
    pub fn from_raw(raw: &BTreeMap<String, String>) -> Self {
        Self {
            hard_blocked: parse_strict_bool(raw.get(OPT_HARD_BLOCKED)),
            soft_blocked: parse_strict_bool(raw.get(OPT_SOFT_BLOCKED)),
            dynamic_shortcut: parse_strict_bool(raw.get(OPT_DYNAMIC_SHORTCUT)),
            thumbnails: parse_strict_bool(raw.get(OPT_THUMBNAILS)),
            report_usage: parse_strict_bool(raw.get(OPT_REPORT_USAGE)),
            vfs_options: raw
                .iter()
                .filter_map(|(k, v)| {
                    k.strip_prefix(OPT_VFS_PREFIX)
                        .map(|k| (k.to_string(), v.clone()))
                })
                .collect(),
        }
    }

    /// Inverse of [`from_raw`](Self::from_raw): only set options are emitted.
    pub fn to_raw(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let flags = [
            (OPT_HARD_BLOCKED, self.hard_blocked),
            (OPT_SOFT_BLOCKED, self.soft_blocked),
            (OPT_DYNAMIC_SHORTCUT, self.dynamic_shortcut),
            (OPT_THUMBNAILS, self.thumbnails),
            (OPT_REPORT_USAGE, self.report_usage),
        ];
        for (key, value) in flags {
            if let Some(value) = value {
                out.insert(key.to_string(), value.to_string());
            }
        }
        for (k, v) in &self.vfs_options {
            out.insert(format!("{}{}", OPT_VFS_PREFIX, k), v.clone());
        }
        out
    }

    pub fn hard_blocked_or_default(&self) -> bool {
        self.hard_blocked.unwrap_or(DEFAULT_HARD_BLOCKED)
    }

    pub fn soft_blocked_or_default(&self) -> bool {
        self.soft_blocked.unwrap_or(DEFAULT_SOFT_BLOCKED)
    }

    pub fn dynamic_shortcut_or_default(&self) -> bool {
        self.dynamic_shortcut.unwrap_or(DEFAULT_DYNAMIC_SHORTCUT)
    }

    pub fn thumbnails_or_default(&self) -> bool {
        self.thumbnails.unwrap_or(DEFAULT_THUMBNAILS)
    }

    pub fn report_usage_or_default(&self) -> bool {
        self.report_usage.unwrap_or(DEFAULT_REPORT_USAGE)
    }
}
