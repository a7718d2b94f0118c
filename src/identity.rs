//! Committer identity and runtime-directory resolution (C12).

use std::path::PathBuf;

/// Committer identity exported to the DVCS driver around commit-writing
/// child processes.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    /// Derive identity from the running user and local hostname, per
    /// `GIT_COMMITTER_NAME` / `GIT_COMMITTER_EMAIL=<user>@<hostname>`.
    pub fn from_environment() -> Self {
        let user = whoami::username();
        let host = whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_string());
        Identity {
            name: user.clone(),
            email: format!("{user}@{host}"),
        }
    }
}

/// True when running as uid 0. Used by `main.rootonly` enforcement and by
/// runtime-directory resolution.
#[cfg(unix)]
pub fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Directory that holds per-invocation staging trees:
/// `/var/run/gistore/` for root, `$HOME/.gistore.d/run/` otherwise.
pub fn runtime_dir() -> PathBuf {
    if is_root() {
        PathBuf::from("/var/run/gistore")
    } else {
        home_dir().join(".gistore.d").join("run")
    }
}

/// System registry directory for named tasks:
/// `/etc/gistore/tasks` for root, `$HOME/.gistore.d/tasks` otherwise.
pub fn tasks_dir() -> PathBuf {
    if is_root() {
        PathBuf::from("/etc/gistore/tasks")
    } else {
        home_dir().join(".gistore.d").join("tasks")
    }
}

/// System config directory, sibling of [`tasks_dir`].
pub fn sys_config_dir() -> PathBuf {
    if is_root() {
        PathBuf::from("/etc/gistore")
    } else {
        home_dir().join(".gistore.d").join("etc")
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
}
