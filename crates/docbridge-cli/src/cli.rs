//! Command-line definition.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use docbridge_core::config::CONFIG_FILE_NAME;

/// Environment variable naming the docbridge home directory.
pub const HOME_ENV: &str = "DOCBRIDGE_HOME";

/// docbridge - browse and edit storage remotes through the document gateway
#[derive(Parser, Debug)]
#[command(name = "docbridge", version, about)]
pub struct Cli {
    /// Settings file (default: $DOCBRIDGE_HOME/docbridge.toml, or the
    /// platform config dir)
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the remotes' data (default: <home>/data)
    #[arg(long = "data-dir", value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Treat the app as authenticated, so soft-blocked remotes are visible
    #[arg(long = "unlock", global = true)]
    pub unlock: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// List visible roots
    Roots,
    /// List the children of a directory
    Ls { parent: String },
    /// Show one document row
    Stat { id: String },
    /// Create a document, applying the naming rules
    Create {
        parent: String,
        mime_type: String,
        name: String,
    },
    /// Create a directory
    Mkdir { parent: String, name: String },
    /// Write a document's contents to stdout
    Cat { id: String },
    /// Replace a document's contents with stdin (created if missing)
    Put { id: String },
    /// Rename a document within its directory
    Rename { id: String, name: String },
    /// Delete a document; missing documents are not an error
    Rm { id: String },
    /// Copy a document into another directory
    Cp { source: String, target_parent: String },
    /// Move a document into another directory
    Mv {
        source: String,
        source_parent: String,
        target_parent: String,
    },
    /// Check whether ID lies at or under PARENT
    IsChild { parent: String, id: String },
    /// List configured remotes and their gateway options
    Remotes,
    /// Add a remote and save it to remotes.toml
    RemoteAdd {
        name: String,
        #[arg(value_name = "TYPE")]
        provider_type: String,
        /// Remote options, including `docbridge:` gateway options
        #[arg(value_name = "KEY=VALUE")]
        options: Vec<String>,
    },
}

impl Cli {
    /// Settings file and home directory, in precedence order: `--config`,
    /// `DOCBRIDGE_HOME`, platform config dir.
    pub fn resolve_paths(&self) -> Option<(PathBuf, PathBuf)> {
        let env_home = std::env::var_os(HOME_ENV).map(PathBuf::from);
        resolve_paths(self.config.as_deref(), env_home)
    }
}

fn resolve_paths(config: Option<&Path>, env_home: Option<PathBuf>) -> Option<(PathBuf, PathBuf)> {
    if let Some(config) = config {
        let home = config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        return Some((config.to_path_buf(), home));
    }
    let home = env_home.or_else(|| dirs_next::config_dir().map(|dir| dir.join("docbridge")))?;
    Some((home.join(CONFIG_FILE_NAME), home))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("docbridge").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_subcommands() {
        assert_eq!(parse(&["roots"]).command, Command::Roots);
        assert_eq!(
            parse(&["create", "r:", "text/plain", "notes"]).command,
            Command::Create {
                parent: "r:".to_string(),
                mime_type: "text/plain".to_string(),
                name: "notes".to_string(),
            }
        );
        assert_eq!(
            parse(&["mv", "r:a", "r:", "s:"]).command,
            Command::Mv {
                source: "r:a".to_string(),
                source_parent: "r:".to_string(),
                target_parent: "s:".to_string(),
            }
        );
        assert_eq!(
            parse(&["is-child", "r:", "r:a"]).command,
            Command::IsChild {
                parent: "r:".to_string(),
                id: "r:a".to_string(),
            }
        );
    }

    #[test]
    fn test_remote_add_collects_options() {
        assert_eq!(
            parse(&["remote-add", "photos", "local", "docbridge:soft_blocked=true"]).command,
            Command::RemoteAdd {
                name: "photos".to_string(),
                provider_type: "local".to_string(),
                options: vec!["docbridge:soft_blocked=true".to_string()],
            }
        );
        assert_eq!(
            parse(&["remote-add", "bare", "local"]).command,
            Command::RemoteAdd {
                name: "bare".to_string(),
                provider_type: "local".to_string(),
                options: Vec::new(),
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["ls", "r:", "--unlock", "--config", "/tmp/x/docbridge.toml"]);
        assert!(cli.unlock);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x/docbridge.toml")));
    }

    #[test]
    fn test_missing_argument_rejected() {
        assert!(Cli::try_parse_from(["docbridge", "rename", "r:a"]).is_err());
    }

    #[test]
    fn test_config_flag_wins() {
        let (config, home) = resolve_paths(
            Some(Path::new("/etc/db/custom.toml")),
            Some(PathBuf::from("/env/home")),
        )
        .unwrap();
        assert_eq!(config, PathBuf::from("/etc/db/custom.toml"));
        assert_eq!(home, PathBuf::from("/etc/db"));
    }

    #[test]
    fn test_env_home_used() {
        let (config, home) = resolve_paths(None, Some(PathBuf::from("/env/home"))).unwrap();
        assert_eq!(config, PathBuf::from("/env/home/docbridge.toml"));
        assert_eq!(home, PathBuf::from("/env/home"));
    }
}
