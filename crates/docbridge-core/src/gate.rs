//! Per-remote access control.
//!
//! A gate is built from a config snapshot taken at the start of a call and
//! checked before any path or backend work happens.

use std::collections::BTreeMap;

use crate::error::{BlockKind, GatewayError, Result};
use crate::path;
use crate::rpc::RemoteConfig;

pub struct AccessGate<'a> {
    configs: &'a BTreeMap<String, RemoteConfig>,
    locked: bool,
}

impl<'a> AccessGate<'a> {
    pub fn new(configs: &'a BTreeMap<String, RemoteConfig>, locked: bool) -> Self {
        Self { configs, locked }
    }

    /// Refuse access to the remote of `id` if it is blocked.
    ///
    /// Local paths always pass. Malformed ids fail with `InvalidIdentifier`.
    pub fn check(&self, id: &str) -> Result<()> {
        let (remote, _) = path::split_remote(id)?;
        if remote.is_empty() {
            return Ok(());
        }

        let config = self
            .configs
            .get(&remote)
            .ok_or_else(|| GatewayError::UnknownRemote(remote.clone()))?;

        if config.hard_blocked_or_default() {
            return Err(GatewayError::AccessDenied {
                remote,
                kind: BlockKind::Hard,
            });
        }
        if self.locked && config.soft_blocked_or_default() {
            return Err(GatewayError::AccessDenied {
                remote,
                kind: BlockKind::Soft,
            });
        }
        Ok(())
    }

    pub fn enforce(&self, ids: &[&str]) -> Result<()> {
        ids.iter().try_for_each(|id| self.check(id))
    }

    /// Remotes that may appear in a root listing, with their config.
    pub fn visible_remotes(&self) -> impl Iterator<Item = (&'a String, &'a RemoteConfig)> + '_ {
        self.configs.iter().filter(move |(_, config)| {
            !config.hard_blocked_or_default()
                && !(self.locked && config.soft_blocked_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> BTreeMap<String, RemoteConfig> {
        let mut map = BTreeMap::new();
        map.insert("open".to_string(), RemoteConfig::default());
        map.insert(
            "hard".to_string(),
            RemoteConfig {
                hard_blocked: Some(true),
                ..Default::default()
            },
        );
        map.insert(
            "soft".to_string(),
            RemoteConfig {
                soft_blocked: Some(true),
                ..Default::default()
            },
        );
        map
    }

    #[test]
    fn test_local_paths_pass() {
        let configs = configs();
        let gate = AccessGate::new(&configs, true);
        gate.check("/sdcard/Download").unwrap();
    }

    #[test]
    fn test_unknown_remote() {
        let configs = configs();
        let gate = AccessGate::new(&configs, false);
        assert!(matches!(
            gate.check("missing:a"),
            Err(GatewayError::UnknownRemote(r)) if r == "missing"
        ));
    }

    #[test]
    fn test_invalid_identifier() {
        let configs = configs();
        let gate = AccessGate::new(&configs, false);
        assert!(matches!(
            gate.check("garbage"),
            Err(GatewayError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_hard_block_always_denies() {
        let configs = configs();
        for locked in [false, true] {
            let gate = AccessGate::new(&configs, locked);
            assert!(matches!(
                gate.check("hard:x"),
                Err(GatewayError::AccessDenied { kind: BlockKind::Hard, .. })
            ));
        }
    }

    #[test]
    fn test_soft_block_only_while_locked() {
        let configs = configs();
        AccessGate::new(&configs, false).check("soft:x").unwrap();
        let err = AccessGate::new(&configs, true).check("soft:x").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_enforce_checks_every_id() {
        let configs = configs();
        let gate = AccessGate::new(&configs, false);
        gate.enforce(&["open:a", "soft:b"]).unwrap();
        assert!(gate.enforce(&["open:a", "hard:b"]).is_err());
    }

    #[test]
    fn test_visible_remotes() {
        let configs = configs();
        let unlocked: Vec<_> = AccessGate::new(&configs, false)
            .visible_remotes()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(unlocked, vec!["open", "soft"]);

        let locked: Vec<_> = AccessGate::new(&configs, true)
            .visible_remotes()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(locked, vec!["open"]);
    }
}
