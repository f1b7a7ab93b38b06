//! Integration tests for the gateway over the local reference backend.
//!
//! Each test builds a fresh `Gateway` on top of a `LocalBackend` rooted in a
//! temporary directory, so nothing touches the real filesystem outside it.
//! Tests that depend on the monitor thread's timing are `#[serial]`.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use docbridge_core::backend::Backend;
use docbridge_core::config::parse_remotes;
use docbridge_core::mime::{MIME_TYPE_BINARY, MIME_TYPE_DIR};
use docbridge_core::{
    BlockKind, ChangeEvent, CollectingLifecycle, CollectingListener, Gateway, GatewayConfig,
    GatewayError, GatewayParts, LocalBackend, LockEvent, OpenFlags,
};
use serial_test::serial;
use tempfile::TempDir;

const REMOTES: &str = r#"
[r]
type = "local"

[s]
type = "local"

[hidden]
type = "local"
"docbridge:hard_blocked" = true

[secret]
type = "local"
"docbridge:soft_blocked" = true
"#;

struct Harness {
    _dir: TempDir,
    gateway: Gateway,
    listener: Arc<CollectingListener>,
    host: Arc<CollectingLifecycle>,
}

fn harness_at(dir: TempDir, config: GatewayConfig, interval: Duration) -> Harness {
    let remotes = parse_remotes(REMOTES).expect("remotes parse");
    let backend =
        Arc::new(LocalBackend::new(dir.path().to_path_buf(), remotes).expect("backend"));
    let listener = Arc::new(CollectingListener::new());
    let host = Arc::new(CollectingLifecycle::new());
    let gateway = Gateway::with_poll_interval(
        GatewayParts {
            config,
            backend: backend.clone(),
            transport: backend.clone(),
            store: backend,
            host: host.clone(),
            listener: listener.clone(),
        },
        interval,
    );
    Harness {
        _dir: dir,
        gateway,
        listener,
        host,
    }
}

fn harness(config: GatewayConfig) -> Harness {
    harness_at(
        TempDir::new().expect("temp dir"),
        config,
        Duration::from_millis(20),
    )
}

fn android() -> Harness {
    harness(GatewayConfig::default())
}

fn posix() -> Harness {
    harness(GatewayConfig {
        posix_like_semantics: true,
        ..Default::default()
    })
}

fn write_doc(gateway: &Gateway, id: &str, data: &[u8]) {
    let mut handle = gateway.open_document(id, "w", None).expect("open for write");
    handle.write_all(data).expect("write");
    handle.close();
}

fn read_doc(gateway: &Gateway, id: &str) -> Vec<u8> {
    let mut handle = gateway.open_document(id, "r", None).expect("open for read");
    let mut out = Vec::new();
    handle.read_to_end(&mut out).expect("read");
    handle.close();
    out
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

// =============================================================================
// Create
// =============================================================================

#[test]
fn integration_android_create_twice_suffixes() {
    let h = android();
    let first = h.gateway.create_document("r:", "text/plain", "file.txt").unwrap();
    let second = h.gateway.create_document("r:", "text/plain", "file.txt").unwrap();
    assert_eq!(first, "r:file.txt");
    assert_eq!(second, "r:file(1).txt");
}

#[test]
fn integration_posix_create_twice_returns_same_id() {
    let h = posix();
    let first = h.gateway.create_document("r:", "text/plain", "file.txt").unwrap();
    write_doc(&h.gateway, &first, b"keep");
    let second = h.gateway.create_document("r:", "text/plain", "file.txt").unwrap();
    assert_eq!(first, second);
    assert_eq!(read_doc(&h.gateway, &first), b"keep");
}

#[test]
fn integration_android_create_gives_up_after_attempt_limit() {
    let h = android();
    for _ in 0..32 {
        h.gateway.create_document("r:", MIME_TYPE_DIR, "d").unwrap();
    }
    let err = h.gateway.create_document("r:", MIME_TYPE_DIR, "d").unwrap_err();
    assert!(matches!(
        err,
        GatewayError::NoUniqueNameFound { attempts: 32, .. }
    ));
}

#[test]
fn integration_create_notifies_parent() {
    let h = android();
    h.gateway.create_document("r:", MIME_TYPE_DIR, "dir").unwrap();
    h.listener.take();
    h.gateway.create_document("r:dir/", "text/plain", "a").unwrap();
    assert_eq!(
        h.listener.take(),
        vec![ChangeEvent::ChildrenChanged {
            parent: "r:dir".to_string()
        }]
    );
}

#[test]
fn integration_directory_name_ending_in_colon() {
    let h = android();
    let dir = h.gateway.create_document("r:", MIME_TYPE_DIR, "d:").unwrap();
    assert_eq!(dir, "r:d:");
    let file = h.gateway.create_document(&dir, "text/plain", "x").unwrap();
    assert_eq!(file, "r:d:/x.txt");
    write_doc(&h.gateway, &file, b"inside");

    let children: Vec<String> = h
        .gateway
        .query_child_documents(&dir)
        .unwrap()
        .into_iter()
        .map(|row| row.document_id)
        .collect();
    assert_eq!(children, vec!["r:d:/x.txt".to_string()]);

    let root: Vec<String> = h
        .gateway
        .query_child_documents("r:")
        .unwrap()
        .into_iter()
        .map(|row| row.document_id)
        .collect();
    assert_eq!(root, vec!["r:d:".to_string()]);
    assert!(h.gateway.is_child_document(&dir, &file).unwrap());
    assert_eq!(read_doc(&h.gateway, &file), b"inside");
}

// =============================================================================
// Delete
// =============================================================================

#[test]
fn integration_delete_missing_is_idempotent() {
    let h = android();
    h.gateway.delete_document("r:never-existed").unwrap();
    h.gateway.delete_document("r:never-existed").unwrap();
}

#[test]
fn integration_delete_directory_recursively() {
    let h = android();
    let dir = h.gateway.create_document("r:", MIME_TYPE_DIR, "dir").unwrap();
    let file = h.gateway.create_document(&dir, "text/plain", "a").unwrap();
    write_doc(&h.gateway, &file, b"x");
    h.gateway.delete_document(&dir).unwrap();
    assert!(h.gateway.query_document(&dir).unwrap_err().is_not_found());
}

// =============================================================================
// In-flight writes
// =============================================================================

#[test]
fn integration_rename_waits_for_open_write() {
    let h = android();
    let id = h.gateway.create_document("r:", "text/plain", "file.txt").unwrap();

    let mut handle = h.gateway.open_document(&id, "w", None).unwrap();
    handle.write_all(b"written before rename").unwrap();

    let gateway = &h.gateway;
    let source = id.as_str();
    let (tx, rx) = mpsc::channel();
    thread::scope(|s| {
        s.spawn(move || {
            tx.send(gateway.rename_document(source, "renamed.txt")).unwrap();
        });

        // Still blocked on the open handle.
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        handle.close();

        let renamed = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("rename finished")
            .unwrap();
        assert_eq!(renamed, "r:renamed.txt");
    });

    assert_eq!(read_doc(&h.gateway, "r:renamed.txt"), b"written before rename");
    assert!(h.gateway.query_document(&id).is_err());
}

#[test]
fn integration_read_handles_do_not_block_rename() {
    let h = android();
    let id = h.gateway.create_document("r:", "text/plain", "file.txt").unwrap();
    let handle = h.gateway.open_document(&id, "r", None).unwrap();
    assert!(h.gateway.tracker().is_empty());
    assert_eq!(h.gateway.rename_document(&id, "other.txt").unwrap(), "r:other.txt");
    handle.close();
}

#[test]
fn integration_append_and_read_write_modes() {
    let h = android();
    let id = h.gateway.create_document("r:", "text/plain", "log").unwrap();
    write_doc(&h.gateway, &id, b"one");

    let mut handle = h.gateway.open_document(&id, "wa", None).unwrap();
    handle.write_all(b",two").unwrap();
    handle.close();
    assert_eq!(read_doc(&h.gateway, &id), b"one,two");

    let mut handle = h.gateway.open_document(&id, "rw", None).unwrap();
    handle.write_at(b"ONE", 0).unwrap();
    let mut buf = [0u8; 7];
    assert_eq!(handle.read_at(&mut buf, 0).unwrap(), 7);
    assert_eq!(&buf, b"ONE,two");
    handle.close();
}

// =============================================================================
// Access gate
// =============================================================================

#[test]
fn integration_hard_blocked_remote_is_invisible() {
    let h = android();
    let roots: Vec<String> = h
        .gateway
        .query_roots()
        .unwrap()
        .into_iter()
        .map(|r| r.root_id)
        .collect();
    assert_eq!(roots, vec!["r", "s", "secret"]);

    let err = h.gateway.query_child_documents("hidden:").unwrap_err();
    assert!(matches!(
        err,
        GatewayError::AccessDenied {
            kind: BlockKind::Hard,
            ..
        }
    ));
    assert!(h.gateway.is_child_document("hidden:", "hidden:a").is_err());
}

#[test]
fn integration_soft_block_follows_app_lock() {
    let h = harness(GatewayConfig {
        require_auth: true,
        ..Default::default()
    });

    let roots: Vec<String> = h
        .gateway
        .query_roots()
        .unwrap()
        .into_iter()
        .map(|r| r.root_id)
        .collect();
    assert_eq!(roots, vec!["r", "s"]);

    let err = h.gateway.query_child_documents("secret:").unwrap_err();
    assert!(err.is_not_found());
    let io_err: std::io::Error = err.into();
    assert_eq!(io_err.kind(), std::io::ErrorKind::NotFound);

    h.gateway.handle_lock_event(LockEvent::AuthSuccess);
    assert!(h.gateway.query_child_documents("secret:").unwrap().is_empty());
    assert_eq!(h.gateway.query_roots().unwrap().len(), 3);
}

#[test]
fn integration_unknown_remote() {
    let h = android();
    assert!(matches!(
        h.gateway.query_document("nope:file"),
        Err(GatewayError::UnknownRemote(r)) if r == "nope"
    ));
    assert!(matches!(
        h.gateway.query_document("no-delimiter"),
        Err(GatewayError::InvalidIdentifier(_))
    ));
}

#[test]
fn integration_is_child_document() {
    let h = android();
    assert!(h.gateway.is_child_document("r:a", "r:a").unwrap());
    assert!(h.gateway.is_child_document("r:a//", "r:a/x/").unwrap());
    assert!(h.gateway.is_child_document("r:", "r:a/b").unwrap());
    assert!(!h.gateway.is_child_document("r:a", "r:ab").unwrap());
    assert!(!h.gateway.is_child_document("r:", "s:a").unwrap());
}

// =============================================================================
// Copy / move
// =============================================================================

#[test]
fn integration_android_copy_into_same_parent() {
    let h = android();
    let id = h.gateway.create_document("r:", "text/plain", "a").unwrap();
    write_doc(&h.gateway, &id, b"data");
    let copy = h.gateway.copy_document(&id, "r:").unwrap();
    assert_eq!(copy, "r:a(1).txt");
    assert_eq!(read_doc(&h.gateway, &copy), b"data");
}

#[test]
fn integration_move_across_remotes() {
    let h = android();
    let id = h.gateway.create_document("r:", "text/plain", "a").unwrap();
    write_doc(&h.gateway, &id, b"data");
    h.listener.take();

    let moved = h.gateway.move_document(&id, "r:", "s:").unwrap();
    assert_eq!(moved, "s:a.txt");
    assert_eq!(read_doc(&h.gateway, &moved), b"data");
    assert!(h.gateway.query_document(&id).is_err());

    let events = h.listener.take();
    assert!(events.contains(&ChangeEvent::GrantsRevoked { id: id.clone() }));
    assert!(events.contains(&ChangeEvent::ChildrenChanged {
        parent: "s:".to_string()
    }));
}

#[test]
fn integration_posix_copy_merges_directories() {
    let h = posix();
    h.gateway.create_document("r:", MIME_TYPE_DIR, "src").unwrap();
    h.gateway.create_document("s:", MIME_TYPE_DIR, "src").unwrap();
    write_doc(&h.gateway, "r:src/new.txt", b"new");
    write_doc(&h.gateway, "s:src/old.txt", b"old");

    assert_eq!(h.gateway.copy_document("r:src", "s:").unwrap(), "s:src");
    let names: Vec<String> = h
        .gateway
        .query_child_documents("s:src")
        .unwrap()
        .into_iter()
        .map(|row| row.display_name)
        .collect();
    assert_eq!(names, vec!["new.txt", "old.txt"]);
}

#[test]
fn integration_posix_move_dir_onto_file_is_type_mismatch() {
    let h = posix();
    h.gateway.create_document("r:", MIME_TYPE_DIR, "thing").unwrap();
    h.gateway.create_document("s:", MIME_TYPE_BINARY, "thing").unwrap();
    assert!(matches!(
        h.gateway.move_document("r:thing", "r:", "s:"),
        Err(GatewayError::TypeMismatch(_))
    ));
}

// =============================================================================
// Upload lifecycle
// =============================================================================

#[test]
#[serial]
fn integration_monitor_releases_host_after_idle_polls() {
    let h = android();
    write_doc(&h.gateway, "r:a.txt", b"x");

    assert!(
        wait_for(Duration::from_secs(5), || h.host.releases() == 1),
        "host was never released"
    );
    thread::sleep(Duration::from_millis(100));
    assert_eq!(h.host.releases(), 1);

    // Open, closing, closed.
    let totals: Vec<usize> = h.host.states().iter().map(|s| s.total()).collect();
    assert!(totals.starts_with(&[1, 1, 0]));
}

#[test]
#[serial]
fn integration_monitor_resumes_abandoned_uploads() {
    let dir = TempDir::new().unwrap();
    let remotes = parse_remotes(REMOTES).unwrap();

    // A previous process wrote into the cache and died before closing.
    {
        let crashed = LocalBackend::new(dir.path().to_path_buf(), remotes.clone()).unwrap();
        let flags = OpenFlags {
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        };
        let mut file = crashed.open("r:draft.txt", flags).unwrap();
        file.write_at(b"recovered", 0).unwrap();
        drop(file);
        assert_eq!(crashed.cached_remotes().unwrap(), vec!["r".to_string()]);
    }

    let h = harness_at(dir, GatewayConfig::default(), Duration::from_millis(20));
    h.gateway.start();

    assert!(
        wait_for(Duration::from_secs(5), || h.host.releases() == 1),
        "host was never released"
    );
    assert_eq!(read_doc(&h.gateway, "r:draft.txt"), b"recovered");
}

#[test]
fn integration_remote_config_round_trip() {
    let h = android();
    let configs = h.gateway.rpc().remote_configs().unwrap();
    assert!(configs["hidden"].hard_blocked_or_default());
    assert!(configs["secret"].soft_blocked_or_default());

    let mut updated = configs["hidden"].clone();
    updated.hard_blocked = None;
    h.gateway.update_remote_config("hidden", &updated).unwrap();

    let raw: BTreeMap<String, BTreeMap<String, String>> =
        h.gateway.rpc().remote_configs_raw().unwrap();
    assert!(!raw["hidden"].contains_key("docbridge:hard_blocked"));
    assert!(h.gateway.query_child_documents("hidden:").is_ok());
}

#[test]
fn integration_create_remote_through_rpc() {
    let h = android();
    let parameters = BTreeMap::from([
        ("docbridge:soft_blocked".to_string(), "true".to_string()),
        ("docbridge:vfs:vfs_cache_mode".to_string(), "off".to_string()),
    ]);
    h.gateway.create_remote("fresh", "local", &parameters).unwrap();
    assert_eq!(h.listener.take(), vec![ChangeEvent::RootsChanged]);

    let raw = h.gateway.rpc().remote_configs_raw().unwrap();
    assert_eq!(raw["fresh"]["type"], "local");
    assert_eq!(raw["fresh"]["docbridge:soft_blocked"], "true");

    let config = &h.gateway.rpc().remote_configs().unwrap()["fresh"];
    assert_eq!(config.soft_blocked, Some(true));
    assert_eq!(config.vfs_options["vfs_cache_mode"], "off");

    assert!(h.gateway.rpc().remote_names().unwrap().contains(&"fresh".to_string()));
    let id = h.gateway.create_document("fresh:", "text/plain", "a").unwrap();
    write_doc(&h.gateway, &id, b"direct");
    assert_eq!(read_doc(&h.gateway, &id), b"direct");
}
