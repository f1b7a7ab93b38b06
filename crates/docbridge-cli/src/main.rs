// docbridge-cli: command-line host for the docbridge gateway
// Loads settings, wires the gateway over the local backend, runs one command

mod cli;
mod output;

use std::collections::BTreeMap;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use docbridge_core::config::{self, REMOTES_FILE_NAME};
use docbridge_core::mime::MIME_TYPE_DIR;
use docbridge_core::{Gateway, GatewayConfig, LocalBackend, LockEvent, RemoteConfig};
use log::debug;
use serde::Serialize;

use cli::{Cli, Command};
use output::{CliHost, JsonLines};

#[derive(Serialize)]
struct IdResult<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct PutResult<'a> {
    id: &'a str,
    bytes: u64,
}

#[derive(Serialize)]
struct DeleteResult<'a> {
    deleted: &'a str,
}

#[derive(Serialize)]
struct IsChildResult {
    is_child: bool,
}

#[derive(Serialize)]
struct RemoteResult<'a> {
    name: &'a str,
    config: &'a RemoteConfig,
}

fn init_logging(config: &GatewayConfig) {
    // RUST_LOG overrides the settings file.
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();
}

/// A gateway plus what the CLI needs to persist remote changes.
struct Session {
    gateway: Gateway,
    backend: LocalBackend,
    remotes_path: PathBuf,
}

/// `KEY=VALUE` arguments to an option map.
fn parse_options(options: &[String]) -> io::Result<BTreeMap<String, String>> {
    options
        .iter()
        .map(|option| {
            option
                .split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| {
                    io::Error::new(
                        ErrorKind::InvalidInput,
                        format!("expected KEY=VALUE, got {}", option),
                    )
                })
        })
        .collect()
}

fn open_session(cli: &Cli, config: GatewayConfig, home: &Path) -> io::Result<Session> {
    let remotes_path = home.join(REMOTES_FILE_NAME);
    let remotes = config::load_remotes(&remotes_path)?;
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| home.join("data"));
    debug!(
        "{} remote(s), data in {}",
        remotes.len(),
        data_dir.display()
    );

    let backend = LocalBackend::new(data_dir, remotes).map_err(io::Error::other)?;
    let host = Arc::new(CliHost);
    let gateway = Gateway::with_local_backend(config, backend.clone(), host.clone(), host);
    if cli.unlock {
        gateway.handle_lock_event(LockEvent::AuthSuccess);
    }
    Ok(Session {
        gateway,
        backend,
        remotes_path,
    })
}

fn run(session: &Session, command: Command) -> io::Result<()> {
    let gateway = &session.gateway;
    let stdout = io::stdout();
    let mut out = JsonLines::new(stdout.lock());

    match command {
        Command::Roots => {
            for root in gateway.query_roots()? {
                out.emit(&root)?;
            }
        }
        Command::Ls { parent } => {
            for row in gateway.query_child_documents(&parent)? {
                out.emit(&row)?;
            }
        }
        Command::Stat { id } => out.emit(&gateway.query_document(&id)?)?,
        Command::Create {
            parent,
            mime_type,
            name,
        } => {
            let id = gateway.create_document(&parent, &mime_type, &name)?;
            out.emit(&IdResult { id: &id })?;
        }
        Command::Mkdir { parent, name } => {
            let id = gateway.create_document(&parent, MIME_TYPE_DIR, &name)?;
            out.emit(&IdResult { id: &id })?;
        }
        Command::Cat { id } => {
            let mut handle = gateway.open_document(&id, "r", None)?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut handle, &mut stdout)?;
            stdout.flush()?;
            handle.close();
        }
        Command::Put { id } => {
            let mut data = Vec::new();
            io::stdin().read_to_end(&mut data)?;
            let mut handle = gateway.open_document(&id, "w", None)?;
            handle.write_all(&data)?;
            handle.flush()?;
            handle.close();
            out.emit(&PutResult {
                id: &id,
                bytes: data.len() as u64,
            })?;
        }
        Command::Rename { id, name } => {
            let id = gateway.rename_document(&id, &name)?;
            out.emit(&IdResult { id: &id })?;
        }
        Command::Rm { id } => {
            gateway.delete_document(&id)?;
            out.emit(&DeleteResult { deleted: &id })?;
        }
        Command::Cp {
            source,
            target_parent,
        } => {
            let id = gateway.copy_document(&source, &target_parent)?;
            out.emit(&IdResult { id: &id })?;
        }
        Command::Mv {
            source,
            source_parent,
            target_parent,
        } => {
            let id = gateway.move_document(&source, &source_parent, &target_parent)?;
            out.emit(&IdResult { id: &id })?;
        }
        Command::IsChild { parent, id } => {
            let is_child = gateway.is_child_document(&parent, &id)?;
            out.emit(&IsChildResult { is_child })?;
        }
        Command::Remotes => {
            for (name, config) in gateway.rpc().remote_configs()? {
                out.emit(&RemoteResult {
                    name: &name,
                    config: &config,
                })?;
            }
        }
        Command::RemoteAdd {
            name,
            provider_type,
            options,
        } => {
            gateway.create_remote(&name, &provider_type, &parse_options(&options)?)?;
            config::save_remotes(&session.remotes_path, &session.backend.remotes())?;
            debug!("saved {}", session.remotes_path.display());
            if let Some(config) = gateway.rpc().remote_configs()?.get(&name) {
                out.emit(&RemoteResult {
                    name: &name,
                    config,
                })?;
            }
        }
    }
    Ok(())
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let (config_path, home) = cli
        .resolve_paths()
        .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "Config directory not found"))?;
    let config = GatewayConfig::load(&config_path)?;
    init_logging(&config);
    debug!("config: {}", config_path.display());

    let session = open_session(&cli, config, &home)?;
    // Resume uploads an earlier run left in the cache.
    session.gateway.start();
    let result = run(&session, cli.command);
    session.gateway.shutdown();
    result
}
