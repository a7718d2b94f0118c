//! Task log (C13): a rolling, always-on audit trail independent of C10's
//! leveled stderr logging.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{GistoreError, Result};

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "gistore.log";

/// Truncate the log once it exceeds this many bytes, keeping only the tail.
const MAX_LOG_BYTES: u64 = 1024 * 1024;

pub struct TaskLog {
    path: PathBuf,
}

impl TaskLog {
    pub fn new(task_root: &Path) -> Self {
        TaskLog {
            path: task_root.join(LOG_DIR).join(LOG_FILE),
        }
    }

    pub fn append(&self, message: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| GistoreError::CommandError {
                command: format!("mkdir -p {}", parent.display()),
                status: None,
                output: e.to_string(),
            })?;
        }

        self.maybe_truncate()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| GistoreError::CommandError {
                command: format!("open {}", self.path.display()),
                status: None,
                output: e.to_string(),
            })?;

        let timestamp = unix_timestamp();
        writeln!(file, "[{timestamp}] {message}").map_err(|e| GistoreError::CommandError {
            command: format!("write {}", self.path.display()),
            status: None,
            output: e.to_string(),
        })
    }

    fn maybe_truncate(&self) -> Result<()> {
        let Ok(meta) = fs::metadata(&self.path) else {
            return Ok(());
        };
        if meta.len() <= MAX_LOG_BYTES {
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path).unwrap_or_default();
        let tail: String = contents
            .chars()
            .rev()
            .take(MAX_LOG_BYTES as usize / 2)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        fs::write(&self.path, tail).map_err(|e| GistoreError::CommandError {
            command: format!("truncate {}", self.path.display()),
            status: None,
            output: e.to_string(),
        })
    }
}

fn unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
