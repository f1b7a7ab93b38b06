//! Backend RPC interface.
//!
//! The backend answers method calls (`config/dump`, `vfs/queue`, ...) with a
//! status code and a JSON payload. [`Rpc`] wraps a raw [`RpcTransport`] with
//! typed helpers; any status other than 200 is a hard failure.

mod remote_config;

pub use remote_config::{CUSTOM_OPT_PREFIX, RemoteConfig};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::{AsRefStr, Display, EnumString};

use crate::error::{GatewayError, Result};

/// Methods the gateway calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
pub enum RpcMethod {
    #[strum(serialize = "config/listremotes")]
    ListRemotes,
    #[strum(serialize = "config/dump")]
    Dump,
    #[strum(serialize = "config/create")]
    Create,
    #[strum(serialize = "config/update")]
    Update,
    #[strum(serialize = "config/delete")]
    Delete,
    #[strum(serialize = "config/providers")]
    Providers,
    #[strum(serialize = "core/obscure")]
    Obscure,
    #[strum(serialize = "operations/about")]
    About,
    #[strum(serialize = "vfs/list")]
    VfsList,
    #[strum(serialize = "vfs/queue")]
    VfsQueue,
}

impl RpcMethod {
    /// Whether a call changes the backend's config file.
    pub fn mutates_config(self) -> bool {
        matches!(self, RpcMethod::Create | RpcMethod::Update | RpcMethod::Delete)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub status: u16,
    pub output: Value,
}

impl RpcResponse {
    pub fn ok(output: Value) -> Self {
        Self {
            status: 200,
            output,
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            output: json!({ "error": message.into(), "status": status }),
        }
    }
}

/// Raw request/response channel to the backend.
pub trait RpcTransport: Send + Sync {
    fn call(&self, method: &str, input: &Value) -> RpcResponse;
}

/// The layer that owns the backend's persisted config.
pub trait ConfigStore: Send + Sync {
    /// Remove one key of a remote's section. The RPC interface can add and
    /// update keys but never delete them.
    fn delete_section_key(&self, remote: &str, key: &str) -> Result<()>;

    /// Called after every config-mutating RPC.
    fn notify_config_changed(&self);
}

/// Filesystem usage reported by `operations/about`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub total: Option<u64>,
    pub used: Option<u64>,
    pub trashed: Option<u64>,
    pub other: Option<u64>,
    pub free: Option<u64>,
    pub objects: Option<u64>,
}

/// Upload queue counts for one VFS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VfsQueueStats {
    pub in_progress: usize,
    pub pending: usize,
}

impl VfsQueueStats {
    pub fn total(&self) -> usize {
        self.in_progress + self.pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProviderOptionExample {
    pub value: String,
    #[serde(default)]
    pub help: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProviderOption {
    pub name: String,
    #[serde(default)]
    pub help: String,
    #[serde(rename = "DefaultStr", default)]
    pub default: String,
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub is_password: bool,
    #[serde(default)]
    pub advanced: bool,
    #[serde(default)]
    pub examples: Vec<ProviderOptionExample>,
}

/// A backend storage type (`s3`, `drive`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Provider {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub options: Vec<ProviderOption>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub hide: bool,
}

#[derive(Deserialize)]
struct RemotesOutput {
    #[serde(default)]
    remotes: Vec<String>,
}

#[derive(Deserialize)]
struct ProvidersOutput {
    providers: Vec<Provider>,
}

#[derive(Deserialize)]
struct ObscureOutput {
    obscured: String,
}

#[derive(Deserialize)]
struct VfsesOutput {
    #[serde(default)]
    vfses: Vec<String>,
}

#[derive(Deserialize)]
struct QueueItem {
    uploading: bool,
}

#[derive(Deserialize)]
struct QueueOutput {
    queue: Vec<QueueItem>,
}

/// Typed client over a [`RpcTransport`].
pub struct Rpc {
    transport: Arc<dyn RpcTransport>,
    store: Arc<dyn ConfigStore>,
    providers: Mutex<Option<Arc<BTreeMap<String, Provider>>>>,
}

impl Rpc {
    pub fn new(transport: Arc<dyn RpcTransport>, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            transport,
            store,
            providers: Mutex::new(None),
        }
    }

    /// Perform a call, failing on any non-200 status.
    pub fn invoke(&self, method: RpcMethod, input: Value) -> Result<Value> {
        debug!("rpc {}", method);
        let response = self.transport.call(method.as_ref(), &input);

        if method.mutates_config() {
            self.store.notify_config_changed();
        }

        if response.status != 200 {
            return Err(GatewayError::Rpc {
                method: method.to_string(),
                status: response.status,
            });
        }
        Ok(response.output)
    }

    fn invoke_as<T: DeserializeOwned>(&self, method: RpcMethod, input: Value) -> Result<T> {
        let output = self.invoke(method, input)?;
        serde_json::from_value(output).map_err(|e| GatewayError::RpcPayload {
            method: method.to_string(),
            message: e.to_string(),
        })
    }

    /// All remote names, without the delimiter.
    pub fn remote_names(&self) -> Result<Vec<String>> {
        Ok(self
            .invoke_as::<RemotesOutput>(RpcMethod::ListRemotes, json!({}))?
            .remotes)
    }

    /// Every remote with its raw option map.
    pub fn remote_configs_raw(&self) -> Result<BTreeMap<String, BTreeMap<String, String>>> {
        self.invoke_as(RpcMethod::Dump, json!({}))
    }

    /// Every remote with its gateway options. Read fresh on every call.
    pub fn remote_configs(&self) -> Result<BTreeMap<String, RemoteConfig>> {
        Ok(self
            .remote_configs_raw()?
            .into_iter()
            .map(|(name, raw)| {
                let config = RemoteConfig::from_raw(&raw);
                (name, config)
            })
            .collect())
    }

    /// Create a remote non-interactively.
    pub fn create_remote(
        &self,
        name: &str,
        provider_type: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.invoke(
            RpcMethod::Create,
            json!({
                "name": name,
                "type": provider_type,
                "parameters": parameters,
                "opt": { "nonInteractive": true, "obscure": true },
            }),
        )?;
        Ok(())
    }

    /// Replace the gateway options of `remote`. Stale custom keys are removed
    /// through the config store first.
    pub fn set_remote_config(&self, remote: &str, config: &RemoteConfig) -> Result<()> {
        let desired = config.to_raw();
        if let Some(existing) = self.remote_configs_raw()?.get(remote) {
            for key in existing.keys() {
                if key.starts_with(CUSTOM_OPT_PREFIX) && !desired.contains_key(key) {
                    self.store.delete_section_key(remote, key)?;
                }
            }
        }

        self.invoke(
            RpcMethod::Update,
            json!({
                "name": remote,
                "parameters": desired,
                "opt": { "nonInteractive": true, "obscure": true },
            }),
        )?;
        Ok(())
    }

    pub fn delete_remote(&self, remote: &str) -> Result<()> {
        self.invoke(RpcMethod::Delete, json!({ "name": remote }))?;
        Ok(())
    }

    /// Available storage types, fetched once and cached. The cache lock is
    /// not held across the call, so concurrent first callers may both fetch.
    pub fn providers(&self) -> Result<Arc<BTreeMap<String, Provider>>> {
        let cached = self.cached_providers().clone();
        if let Some(providers) = cached {
            return Ok(providers);
        }

        let output: ProvidersOutput = self.invoke_as(RpcMethod::Providers, json!({}))?;
        let fetched: Arc<BTreeMap<String, Provider>> = Arc::new(
            output
                .providers
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
        );
        let mut cached = self.cached_providers();
        Ok(Arc::clone(cached.get_or_insert(fetched)))
    }

    fn cached_providers(&self) -> MutexGuard<'_, Option<Arc<BTreeMap<String, Provider>>>> {
        self.providers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Convert a plain-text password into the backend's obscured form.
    pub fn obscure(&self, clear: &str) -> Result<String> {
        Ok(self
            .invoke_as::<ObscureOutput>(RpcMethod::Obscure, json!({ "clear": clear }))?
            .obscured)
    }

    pub fn usage(&self, remote: &str) -> Result<Usage> {
        self.invoke_as(RpcMethod::About, json!({ "fs": remote }))
    }

    /// Names of the active VFS instances (`remote:` form).
    pub fn vfses(&self) -> Result<Vec<String>> {
        Ok(self
            .invoke_as::<VfsesOutput>(RpcMethod::VfsList, json!({}))?
            .vfses)
    }

    pub fn vfs_queue_stats(&self, vfs: &str) -> Result<VfsQueueStats> {
        let output: QueueOutput = self.invoke_as(RpcMethod::VfsQueue, json!({ "fs": vfs }))?;
        let in_progress = output.queue.iter().filter(|item| item.uploading).count();
        Ok(VfsQueueStats {
            in_progress,
            pending: output.queue.len() - in_progress,
        })
    }
}

/// A [`ConfigStore`] that only records notifications. Useful when nothing
/// persists the backend config.
#[derive(Debug, Default)]
pub struct CollectingConfigStore {
    pub deleted_keys: Mutex<Vec<(String, String)>>,
    pub changes: Mutex<usize>,
}

impl ConfigStore for CollectingConfigStore {
    fn delete_section_key(&self, remote: &str, key: &str) -> Result<()> {
        self.deleted_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((remote.to_string(), key.to_string()));
        Ok(())
    }

    fn notify_config_changed(&self) {
        *self.changes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}
