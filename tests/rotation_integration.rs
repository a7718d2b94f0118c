//! Rotation-trigger scenario (§8): drive the DVCS driver and rotation engine
//! directly against a scratch bare repository, without going through the
//! mount layer (rotation itself has nothing to do with staging).

use std::fs;

use gistore::git::GitDriver;
use gistore::identity::Identity;
use gistore::rotation::RotationEngine;
use tempfile::tempdir;

fn test_identity() -> Identity {
    Identity {
        name: "Test User".to_string(),
        email: "test@example.com".to_string(),
    }
}

#[test]
fn rotation_creates_generation_branches_and_graft_chain() {
    let task_root = tempdir().unwrap();
    let work_tree = tempdir().unwrap();

    let bare = GitDriver::new(task_root.path(), test_identity());
    bare.init().unwrap();

    let driver = GitDriver::new(task_root.path(), test_identity()).with_work_tree(work_tree.path().to_path_buf());

    for i in 0..5 {
        fs::write(work_tree.path().join("file.txt"), format!("revision {i}\n")).unwrap();
        driver.add_all().unwrap();
        driver.commit(&format!("revision {i}")).unwrap();
    }

    // backup_history=3 forces a rotation well before real-world defaults
    // would trigger, keeping the test fast. backup_copies=2 means the first
    // rotation only ever produces `gistore/1` (the sliding window of
    // generation branches only fully forms after `backup_copies` rotations).
    let rotation = RotationEngine::new(&driver, 3, 2);
    let rotated = rotation.maybe_rotate().unwrap();
    assert!(rotated);

    let branches = driver.branches().unwrap();
    assert!(branches.iter().any(|b| b == "gistore/1"));

    let grafts_path = driver.git_dir().join("info").join("grafts");
    assert!(grafts_path.exists());

    // master was reparented: its rev-list no longer reaches the original root.
    let master_history = driver.rev_list("master").unwrap();
    assert_eq!(master_history.len(), 1);

    // A second rotation, once gistore/1's own history grows past the bound
    // again, completes the sliding window.
    for i in 5..8 {
        fs::write(work_tree.path().join("file.txt"), format!("revision {i}\n")).unwrap();
        driver.add_all().unwrap();
        driver.commit(&format!("revision {i}")).unwrap();
    }
    let rotation = RotationEngine::new(&driver, 3, 2);
    assert!(rotation.maybe_rotate().unwrap());
    let branches = driver.branches().unwrap();
    assert!(branches.iter().any(|b| b == "gistore/2"));

    // A third rotation exercises the full sliding window (generations.len()
    // >= backup_copies): gistore/1 is retired, gistore/2 slides down to
    // gistore/1, and a fresh gistore/2 is cut from the current master.
    for i in 8..11 {
        fs::write(work_tree.path().join("file.txt"), format!("revision {i}\n")).unwrap();
        driver.add_all().unwrap();
        driver.commit(&format!("revision {i}")).unwrap();
    }
    let old_gistore_2 = driver.rev_list("gistore/2").unwrap();
    let rotation = RotationEngine::new(&driver, 3, 2);
    assert!(rotation.maybe_rotate().unwrap());
    let branches = driver.branches().unwrap();
    assert!(branches.iter().any(|b| b == "gistore/1"));
    assert!(branches.iter().any(|b| b == "gistore/2"));
    let new_gistore_1 = driver.rev_list("gistore/1").unwrap();
    assert_eq!(new_gistore_1, old_gistore_2);
}

#[test]
fn rotation_is_disabled_below_the_configured_history_bound() {
    let task_root = tempdir().unwrap();
    let work_tree = tempdir().unwrap();

    let bare = GitDriver::new(task_root.path(), test_identity());
    bare.init().unwrap();

    let driver = GitDriver::new(task_root.path(), test_identity()).with_work_tree(work_tree.path().to_path_buf());
    fs::write(work_tree.path().join("file.txt"), "only revision\n").unwrap();
    driver.add_all().unwrap();
    driver.commit("only revision").unwrap();

    let rotation = RotationEngine::new(&driver, 200, 5);
    assert!(!rotation.maybe_rotate().unwrap());
    // `init` creates the sentinel `gistore/0`; no real generation branch
    // should exist since rotation never ran.
    assert!(!driver.branches().unwrap().contains(&"gistore/1".to_string()));
}

#[test]
fn rotation_leaves_pending_work_tree_changes_untouched() {
    // In the real commit flow, rotation runs before `add_all`/`commit`, so the
    // staging work tree already holds the next, not-yet-committed snapshot
    // when rotation fires. Finalizing with a mixed reset (not `--hard`) must
    // leave that pending content alone: a hard reset would try to overwrite
    // it to match the old tree, which fails outright against the real
    // read-only bind-mounted staging tree.
    let task_root = tempdir().unwrap();
    let work_tree = tempdir().unwrap();

    let bare = GitDriver::new(task_root.path(), test_identity());
    bare.init().unwrap();

    let driver = GitDriver::new(task_root.path(), test_identity()).with_work_tree(work_tree.path().to_path_buf());
    for i in 0..3 {
        fs::write(work_tree.path().join("file.txt"), format!("revision {i}\n")).unwrap();
        driver.add_all().unwrap();
        driver.commit(&format!("revision {i}")).unwrap();
    }

    // A pending change that has not been committed yet, mirroring the
    // orchestrator calling `maybe_rotate` before `add_all`/`commit`.
    fs::write(work_tree.path().join("file.txt"), "uncommitted pending revision\n").unwrap();

    let rotation = RotationEngine::new(&driver, 3, 2);
    assert!(rotation.maybe_rotate().unwrap());

    let content = fs::read_to_string(work_tree.path().join("file.txt")).unwrap();
    assert_eq!(content, "uncommitted pending revision\n");
}
