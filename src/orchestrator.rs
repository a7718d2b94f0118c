//! Orchestrator (C8): sequences C1–C7 for each user-visible operation and
//! owns the Cleanup contract (§5).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::{RepoConfig, CONFIG_FILE, GISTORE_CONFIG_DIR};
use crate::error::{GistoreError, Result};
use crate::git::GitDriver;
use crate::identity::{self, Identity};
use crate::lock::LockManager;
use crate::mount::MountEngine;
use crate::path::{self, SourceEntry};
use crate::rotation::RotationEngine;
use crate::styling::WARNING;
use crate::tasklog::TaskLog;

/// Shared, signal-reachable record of what cleanup still owes this process:
/// which locks are held and whether a staging tree is up, so a fatal signal
/// handler can unwind it without re-deriving state.
#[derive(Default)]
struct CleanupState {
    mount_locked: bool,
    commit_locked: bool,
    staging_up: bool,
}

pub struct Task {
    pub root: PathBuf,
    pub config_dir: PathBuf,
    pub config: RepoConfig,
    name: Option<String>,
}

impl Task {
    pub fn open(root: PathBuf) -> Result<Self> {
        let config_dir = root.join(GISTORE_CONFIG_DIR);
        let config_path = config_dir.join(CONFIG_FILE);
        let config = RepoConfig::load(&config_path)?;
        let name = crate::task::dir_to_task(&root);

        if !identity::is_root() && config.get_bool("main.rootonly", false) {
            return Err(GistoreError::PermissionDenied {
                reason: format!(
                    "task '{}' is configured for root only",
                    name.clone().unwrap_or_else(|| root.display().to_string())
                ),
            });
        }

        Ok(Task {
            root,
            config_dir,
            config,
            name,
        })
    }

    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.root.display().to_string())
    }
}

pub struct Orchestrator {
    task: Task,
    identity: Identity,
    locks: LockManager,
    tasklog: TaskLog,
    state: Arc<Mutex<CleanupState>>,
}

impl Orchestrator {
    pub fn new(task: Task) -> Self {
        let locks = LockManager::new(&task.root);
        let tasklog = TaskLog::new(&task.root);
        Orchestrator {
            task,
            identity: Identity::from_environment(),
            locks,
            tasklog,
            state: Arc::new(Mutex::new(CleanupState::default())),
        }
    }

    fn staging_root(&self) -> PathBuf {
        let name = self.task.label();
        identity::runtime_dir().join(name).join(std::process::id().to_string())
    }

    fn driver(&self) -> GitDriver {
        GitDriver::new(&self.task.root, self.identity.clone())
    }

    // ---- init ------------------------------------------------------------

    pub fn init(&mut self) -> Result<()> {
        if self.driver().is_repo() {
            return Err(GistoreError::TaskAlreadyExists {
                name: self.task.label(),
            });
        }

        std::fs::create_dir_all(&self.task.config_dir).map_err(|e| GistoreError::CommandError {
            command: format!("mkdir -p {}", self.task.config_dir.display()),
            status: None,
            output: e.to_string(),
        })?;

        self.driver().init()?;
        self.task.config.save()?;
        self.tasklog.append("init")?;
        Ok(())
    }

    // ---- status / list -----------------------------------------------

    pub fn status(&self) -> Result<Vec<crate::git::parse::StatusLine>> {
        self.driver().ensure_repo(&self.task.label())?;
        self.driver().status_porcelain()
    }

    pub fn log(&self, args: &[&str]) -> Result<String> {
        self.driver().ensure_repo(&self.task.label())?;
        self.driver().log(args)
    }

    // ---- add / rm (config only, no mount/commit cycle) -------------------

    pub fn add_source(&mut self, path: &str) -> Result<()> {
        let key = format!("store.{path}.enabled");
        self.task.config.set(&key, "true")?;
        self.tasklog.append(&format!("add {path}"))
    }

    pub fn remove_source(&mut self, path: &str) -> Result<()> {
        let key = format!("store.{path}.enabled");
        self.task.config.set(&key, "false")?;
        self.tasklog.append(&format!("rm {path}"))
    }

    fn configured_sources(&self) -> Vec<PathBuf> {
        let prefix = "store.";
        let suffix = ".enabled";
        self.task
            .config
            .iter()
            .filter_map(|(k, v)| {
                let path = k.strip_prefix(prefix)?.strip_suffix(suffix)?;
                (v == "true").then(|| PathBuf::from(path))
            })
            .collect()
    }

    // ---- commit: the canonical sequence of §4.8 --------------------------

    pub fn commit(&mut self, message: Option<&str>) -> Result<()> {
        self.driver().ensure_repo(&self.task.label())?;

        self.locks.lock("mount")?;
        self.state.lock().unwrap().mount_locked = true;
        let result = self.commit_inner(message);
        let cleanup = self.teardown_after_commit();

        self.state.lock().unwrap().mount_locked = false;
        let _ = self.locks.unlock("mount");

        result.and(cleanup)
    }

    fn commit_inner(&mut self, message: Option<&str>) -> Result<()> {
        let staging = self.staging_root();
        let mount_engine = MountEngine::new(staging.clone());
        let config_dir_resolved = self.task.config_dir.canonicalize().unwrap_or(self.task.config_dir.clone());
        let task_root_resolved = self
            .task
            .root
            .canonicalize()
            .unwrap_or(self.task.root.clone());

        let candidates: Vec<PathBuf> = self
            .configured_sources()
            .into_iter()
            .chain(std::iter::once(self.task.config_dir.clone()))
            .collect();
        let (entries, dropped): (Vec<SourceEntry>, _) =
            path::normalize(&task_root_resolved, &config_dir_resolved, &candidates);
        for drop in &dropped {
            log::warn!("dropping source {}: {:?}", drop.path.display(), drop.reason);
            eprintln!(
                "{WARNING}warning:{WARNING:#} dropping source {}: {:?}",
                drop.path.display(),
                drop.reason
            );
        }

        mount_engine.mount_all(&entries, &config_dir_resolved)?;
        self.state.lock().unwrap().staging_up = true;
        self.tasklog.append("mount")?;

        self.locks.lock("commit")?;
        self.state.lock().unwrap().commit_locked = true;

        let commit_result = self.run_commit_sequence(&staging, message);

        self.state.lock().unwrap().commit_locked = false;
        self.locks.unlock("commit")?;

        commit_result
    }

    fn run_commit_sequence(&mut self, staging: &PathBuf, message: Option<&str>) -> Result<()> {
        let backup_history = self.task.config.get_int("main.backuphistory", 200);
        let backup_copies = self.task.config.get_int("main.backupcopies", 5);

        let driver = self.driver().with_work_tree(staging.clone());
        if RotationEngine::new(&driver, backup_history, backup_copies).maybe_rotate()? {
            self.tasklog.append("rotate")?;
        }

        driver.add_all()?;
        let deleted = driver.list_deleted()?;
        driver.remove_cached(&deleted)?;

        let mut stat = driver.status_porcelain()?;
        loop {
            let flattened = driver.flatten_submodules()?;
            if flattened == 0 {
                break;
            }
            stat = driver.status_porcelain()?;
        }

        let summary = crate::git::parse::summarize_status(&stat);
        let full_message = match message {
            Some(m) if !m.is_empty() => format!("{m}\n\n{summary}"),
            _ => summary,
        };

        driver.commit(&full_message)?;
        self.tasklog.append("commit")
    }

    fn teardown_after_commit(&mut self) -> Result<()> {
        let staging = self.staging_root();
        let config_dir_resolved = self.task.config_dir.canonicalize().unwrap_or(self.task.config_dir.clone());
        let task_root_resolved = self
            .task
            .root
            .canonicalize()
            .unwrap_or(self.task.root.clone());

        let candidates: Vec<PathBuf> = self
            .configured_sources()
            .into_iter()
            .chain(std::iter::once(self.task.config_dir.clone()))
            .collect();
        let (entries, _) = path::normalize(&task_root_resolved, &config_dir_resolved, &candidates);

        let mount_engine = MountEngine::new(staging);
        mount_engine.unmount_all(&entries, &config_dir_resolved)?;
        self.state.lock().unwrap().staging_up = false;
        self.tasklog.append("umount")
    }

    /// Release whatever this orchestrator still owes, best-effort, for the
    /// fatal-signal path (§5 Cancellation & timeouts).
    pub fn cleanup_on_signal(&mut self) {
        let snapshot = {
            let guard = self.state.lock().unwrap();
            (guard.commit_locked, guard.staging_up, guard.mount_locked)
        };
        let (commit_locked, staging_up, mount_locked) = snapshot;

        if commit_locked {
            let _ = self.locks.unlock("commit");
        }
        if staging_up {
            let _ = self.teardown_after_commit();
        }
        if mount_locked {
            let _ = self.locks.unlock("mount");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_sources_reads_enabled_store_keys() {
        let mut task = Task {
            root: PathBuf::from("/tmp/t"),
            config_dir: PathBuf::from("/tmp/t/.gistore"),
            config: RepoConfig::default(),
            name: None,
        };
        task.config.set("store./etc/hostname.enabled", "true").unwrap();
        task.config.set("store./var/log.enabled", "false").unwrap();
        let orch = Orchestrator::new(task);

        let sources = orch.configured_sources();
        assert_eq!(sources, vec![PathBuf::from("/etc/hostname")]);
    }
}
