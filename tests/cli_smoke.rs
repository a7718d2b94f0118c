//! End-to-end CLI coverage for the task lifecycle (§8 Smoke / error-path
//! scenarios). Commit itself requires a working bind-mount tool, so it is
//! gated behind [`can_mount`] and skipped in environments without root or
//! `bindfs`.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn gistore() -> Command {
    Command::cargo_bin("gistore").expect("binary built")
}

/// An isolated `$HOME` keeps task registration and runtime-dir resolution
/// from touching the machine actually running the test suite.
fn isolated_home() -> tempfile::TempDir {
    tempdir().expect("tempdir")
}

fn can_mount() -> bool {
    gistore::identity::is_root() || which::which("bindfs").is_ok()
}

#[test]
fn status_on_uninitialized_task_fails_with_uninitialized_exit_code() {
    let home = isolated_home();
    let task_root = tempdir().unwrap();

    gistore()
        .env("HOME", home.path())
        .current_dir(task_root.path())
        .arg("status")
        .assert()
        .code(6)
        .stderr(predicate::str::contains("has not been initialized"));
}

#[test]
fn init_then_reinit_fails_with_task_already_exists() {
    let home = isolated_home();
    let task_root = tempdir().unwrap();

    gistore()
        .env("HOME", home.path())
        .current_dir(task_root.path())
        .arg("init")
        .assert()
        .success();

    gistore()
        .env("HOME", home.path())
        .current_dir(task_root.path())
        .arg("init")
        .assert()
        .code(5)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn init_creates_bare_repo_and_default_config() {
    let home = isolated_home();
    let task_root = tempdir().unwrap();

    gistore()
        .env("HOME", home.path())
        .current_dir(task_root.path())
        .arg("init")
        .assert()
        .success();

    assert!(task_root.path().join("repo.git").join("objects").is_dir());
    assert!(task_root.path().join(".gistore").join("config").is_file());
}

#[test]
fn init_creates_a_not_yet_existing_task_root() {
    let home = isolated_home();
    let parent = tempdir().unwrap();
    let new_root = parent.path().join("brand-new-task");
    assert!(!new_root.exists());

    gistore()
        .env("HOME", home.path())
        .arg("-C")
        .arg(&new_root)
        .arg("init")
        .assert()
        .success();

    assert!(new_root.join("repo.git").join("objects").is_dir());
    assert!(new_root.join(".gistore").join("config").is_file());
}

#[test]
fn status_after_init_with_no_sources_reports_no_changes() {
    let home = isolated_home();
    let task_root = tempdir().unwrap();

    gistore()
        .env("HOME", home.path())
        .current_dir(task_root.path())
        .arg("init")
        .assert()
        .success();

    gistore()
        .env("HOME", home.path())
        .current_dir(task_root.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn add_is_idempotent_in_the_config_store() {
    let home = isolated_home();
    let task_root = tempdir().unwrap();
    let source = tempdir().unwrap();
    let source_path = source.path().to_str().unwrap().to_string();

    gistore()
        .env("HOME", home.path())
        .current_dir(task_root.path())
        .arg("init")
        .assert()
        .success();

    for _ in 0..2 {
        gistore()
            .env("HOME", home.path())
            .current_dir(task_root.path())
            .arg("add")
            .arg(&source_path)
            .assert()
            .success();
    }

    let config = fs::read_to_string(task_root.path().join(".gistore").join("config")).unwrap();
    let key = format!("store.{source_path}.enabled");
    assert_eq!(config.matches(&key).count(), 1);
}

#[test]
fn commit_end_to_end_smoke() {
    if !can_mount() {
        eprintln!("skipping commit_end_to_end_smoke: no usable bind-mount tool in this environment");
        return;
    }

    let home = isolated_home();
    let task_root = tempdir().unwrap();
    let source = tempdir().unwrap();
    fs::write(source.path().join("hello.txt"), b"hello gistore\n").unwrap();

    gistore()
        .env("HOME", home.path())
        .current_dir(task_root.path())
        .arg("init")
        .assert()
        .success();

    gistore()
        .env("HOME", home.path())
        .current_dir(task_root.path())
        .arg("add")
        .arg(source.path())
        .assert()
        .success();

    gistore()
        .env("HOME", home.path())
        .current_dir(task_root.path())
        .arg("commit")
        .arg("-m")
        .arg("smoke test commit")
        .assert()
        .success();

    gistore()
        .env("HOME", home.path())
        .current_dir(task_root.path())
        .arg("log")
        .arg("--oneline")
        .assert()
        .success()
        .stdout(predicate::str::contains("smoke test commit"));
}
