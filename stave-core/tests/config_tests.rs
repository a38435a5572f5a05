//! Config error-message, atomic-write-safety, and init integration tests.
//! Storage: ~/.stave/config.yaml

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use std::fs;
use std::path::PathBuf;

use stave_core::{config, ConfigError, IndexFilter, ServerConfig};

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_returns_not_found() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ConfigNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("config not found"));
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".stave/config.yaml")
        .write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    let msg = err.to_string();
    assert!(msg.contains("config.yaml"), "must contain file path, got: {msg}");
}

#[test]
fn load_wrong_shape_filter_returns_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".stave/config.yaml")
        .write_str("index_files: 42\n")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn mid_write_crash_leaves_original_intact() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_at(home.path(), &ServerConfig::with_root("/code/app")).expect("save");

    let yaml_path = config::config_path_at(home.path());
    let original_bytes = fs::read(&yaml_path).expect("read original");

    // Simulate crash: .tmp written but process died before rename
    let tmp = yaml_path.with_file_name("config.yaml.tmp");
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    let current_bytes = fs::read(&yaml_path).expect("read after crash");
    assert_eq!(original_bytes, current_bytes, "original must be unchanged after crash");
    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded.workspace_root, Some(PathBuf::from("/code/app")));
}

// ---------------------------------------------------------------------------
// 3. Init integration test
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_yaml() {
    let home = assert_fs::TempDir::new().expect("home tempdir");
    let root = assert_fs::TempDir::new().expect("root tempdir");

    let created = config::init_at(
        root.path().to_path_buf(),
        IndexFilter::from_names(["A.groovy"]),
        vec!["/libs/*".to_string()],
        home.path(),
    )
    .expect("init");

    home.child(".stave/config.yaml").assert(predicate::path::exists());
    home.child(".stave/config.yaml")
        .assert(predicate::str::contains("A.groovy"));

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded.workspace_root, created.workspace_root);
    assert!(loaded.index_files.admits("A.groovy"));
    assert!(!loaded.index_files.admits("B.groovy"));
}

#[test]
fn reinit_replaces_filter_and_keeps_other_settings() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let root = assert_fs::TempDir::new().expect("tempdir");

    let mut first = ServerConfig::with_root(root.path());
    first.doc_comments = false;
    config::save_at(home.path(), &first).expect("save");

    config::init_at(
        root.path().to_path_buf(),
        IndexFilter::unrestricted(),
        vec![],
        home.path(),
    )
    .expect("init");

    let loaded = config::load_at(home.path()).expect("load");
    assert!(loaded.index_files.is_unrestricted());
    assert!(!loaded.doc_comments, "unrelated settings survive re-init");
}
