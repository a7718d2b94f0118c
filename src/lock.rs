//! Lock manager (C4): named file-based advisory locks for `mount` and `commit`.
//!
//! Acquisition uses atomic exclusive file creation (`File::create_new`,
//! stable since Rust 1.77) rather than an OS-level `flock`. An OS flock is
//! released automatically by the kernel when its owning process dies, which
//! would erase the exact signal this lock exists to give: the file's mere
//! *presence* on startup means a prior run crashed while holding it (§3).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{GistoreError, Result};

pub const LOCK_DIR: &str = "locks";
pub const LOCK_PREFIX: &str = "_gistore-lock-";

pub struct LockManager {
    lock_dir: PathBuf,
}

impl LockManager {
    pub fn new(task_root: &Path) -> Self {
        LockManager {
            lock_dir: task_root.join(LOCK_DIR),
        }
    }

    fn path_for(&self, event: &str) -> PathBuf {
        self.lock_dir.join(format!("{LOCK_PREFIX}{event}"))
    }

    pub fn has_lock(&self, event: &str) -> bool {
        self.path_for(event).exists()
    }

    /// Acquire the named lock, writing this process's pid as the (purely
    /// informational) file content. Fails with `LockError` if already held.
    pub fn lock(&self, event: &str) -> Result<()> {
        fs::create_dir_all(&self.lock_dir).map_err(|e| GistoreError::CommandError {
            command: format!("mkdir -p {}", self.lock_dir.display()),
            status: None,
            output: e.to_string(),
        })?;

        let path = self.path_for(event);
        match fs::File::create_new(&path) {
            Ok(mut file) => {
                use std::io::Write;
                let _ = write!(file, "{}", std::process::id());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let holder_pid = fs::read_to_string(&path)
                    .ok()
                    .and_then(|s| s.trim().parse().ok());
                Err(GistoreError::LockError {
                    event: event.to_string(),
                    holder_pid,
                })
            }
            Err(e) => Err(GistoreError::CommandError {
                command: format!("create {}", path.display()),
                status: None,
                output: e.to_string(),
            }),
        }
    }

    pub fn unlock(&self, event: &str) -> Result<()> {
        let path = self.path_for(event);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(_) if !path.exists() => Ok(()),
            Err(e) => Err(GistoreError::CommandError {
                command: format!("rm {}", path.display()),
                status: None,
                output: e.to_string(),
            }),
        }
    }

    pub fn assert_lock(&self, event: &str) -> Result<()> {
        if self.has_lock(event) {
            Ok(())
        } else {
            Err(GistoreError::LockError {
                event: event.to_string(),
                holder_pid: None,
            })
        }
    }

    pub fn assert_no_lock(&self, event: &str) -> Result<()> {
        if self.has_lock(event) {
            let holder_pid = fs::read_to_string(self.path_for(event))
                .ok()
                .and_then(|s| s.trim().parse().ok());
            Err(GistoreError::LockError {
                event: event.to_string(),
                holder_pid,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lock_then_relock_fails() {
        let tmp = tempdir().unwrap();
        let mgr = LockManager::new(tmp.path());
        mgr.lock("mount").unwrap();
        let err = mgr.lock("mount").unwrap_err();
        assert!(matches!(err, GistoreError::LockError { .. }));
    }

    #[test]
    fn unlock_then_relock_succeeds() {
        let tmp = tempdir().unwrap();
        let mgr = LockManager::new(tmp.path());
        mgr.lock("commit").unwrap();
        mgr.unlock("commit").unwrap();
        assert!(mgr.lock("commit").is_ok());
    }

    #[test]
    fn unlock_of_absent_lock_is_a_no_op() {
        let tmp = tempdir().unwrap();
        let mgr = LockManager::new(tmp.path());
        assert!(mgr.unlock("mount").is_ok());
    }

    #[test]
    fn assert_no_lock_reports_holder_pid() {
        let tmp = tempdir().unwrap();
        let mgr = LockManager::new(tmp.path());
        mgr.lock("mount").unwrap();
        let err = mgr.assert_no_lock("mount").unwrap_err();
        match err {
            GistoreError::LockError { holder_pid, .. } => {
                assert_eq!(holder_pid, Some(std::process::id()))
            }
            _ => panic!("expected LockError"),
        }
    }
}
