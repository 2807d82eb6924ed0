//! Binary-level checks that never need a running indexing core.

use std::process::{Command, Output};
use tempfile::tempdir;

// Nothing listens on the discard port.
const DEAD_CORE: &str = "http://127.0.0.1:9";

fn scry(cwd: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_scry"))
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .env("SCRY_CORE_TIMEOUT_MS", "500")
        .args(["--core-url", DEAD_CORE])
        .args(args)
        .output()
        .expect("spawn scry binary")
}

#[test]
fn help_lists_every_command() {
    let dir = tempdir().unwrap();
    let out = scry(dir.path(), &["--help"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    for cmd in ["index", "search", "embed", "symbol", "outline", "context", "summarize"] {
        assert!(text.contains(cmd), "missing {cmd} in help:\n{text}");
    }
}

#[test]
fn outline_rejects_paths_outside_project() {
    let dir = tempdir().unwrap();
    let out = scry(dir.path(), &["outline", "../../etc/passwd"]);
    assert!(!out.status.success());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("outside"), "unexpected stderr:\n{err}");
}

#[test]
fn search_rejects_escaping_path_filter() {
    let dir = tempdir().unwrap();
    let out = scry(
        dir.path(),
        &["search", "parse", "--path-filter", "../elsewhere/"],
    );
    assert!(!out.status.success());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("outside"), "unexpected stderr:\n{err}");
}

#[test]
fn embed_without_backend_reports_missing_provider() {
    let dir = tempdir().unwrap();
    let out = scry(dir.path(), &["embed"]);
    assert!(!out.status.success());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("embedding"), "unexpected stderr:\n{err}");
}

#[test]
fn unreachable_core_fails_search_cleanly() {
    let dir = tempdir().unwrap();
    let out = scry(dir.path(), &["search", "parse_config", "--json"]);
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
}
