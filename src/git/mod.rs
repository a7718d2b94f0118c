//! DVCS driver (C6): the narrow command surface described in §4.6.
//!
//! Implemented as a thin wrapper around the `git` CLI (`std::process::Command`),
//! not a library binding — every call is a blocking child-process invocation,
//! matching the concurrency model of §5.

pub mod parse;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{GistoreError, Result};
use crate::identity::Identity;

/// How many times the submodule-flattening loop may run before giving up
/// (§9, Open Question (b)).
const MAX_SUBMODULE_FLATTEN_DEPTH: usize = 16;

/// Output of an external command, captured for success-predicate matching
/// and error reporting.
struct CommandOutput {
    status: std::process::ExitStatus,
    combined: String,
}

/// A thin wrapper around the `git` CLI scoped to one task's bare repository
/// and (for work-tree-sensitive commands) its current staging tree.
pub struct GitDriver {
    git_dir: PathBuf,
    work_tree: Option<PathBuf>,
    identity: Identity,
}

impl GitDriver {
    pub fn new(task_root: &Path, identity: Identity) -> Self {
        GitDriver {
            git_dir: task_root.join("repo.git"),
            work_tree: None,
            identity,
        }
    }

    pub fn with_work_tree(mut self, work_tree: PathBuf) -> Self {
        self.work_tree = Some(work_tree);
        self
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec!["--git-dir".to_string(), self.git_dir.display().to_string()];
        if let Some(wt) = &self.work_tree {
            args.push("--work-tree".to_string());
            args.push(wt.display().to_string());
        }
        args
    }

    fn spawn(&self, args: &[&str], extra_env: &[(&str, &str)]) -> Result<CommandOutput> {
        let mut cmd = Command::new("git");
        cmd.args(self.base_args()).args(args);
        cmd.env("GIT_COMMITTER_NAME", &self.identity.name);
        cmd.env("GIT_COMMITTER_EMAIL", &self.identity.email);
        cmd.env("GIT_AUTHOR_NAME", &self.identity.name);
        cmd.env("GIT_AUTHOR_EMAIL", &self.identity.email);
        for (k, v) in extra_env {
            cmd.env(k, v);
        }

        let full_args: Vec<String> = self.base_args().into_iter().chain(args.iter().map(|a| a.to_string())).collect();
        log::debug!("git {}", full_args.join(" "));

        let output = cmd.output().map_err(|e| GistoreError::CommandError {
            command: format!("git {}", full_args.join(" ")),
            status: None,
            output: e.to_string(),
        })?;

        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(CommandOutput {
            status: output.status,
            combined,
        })
    }

    /// Run a command, returning stdout-and-stderr combined on success, and a
    /// `CommandError` otherwise unless `success_if` whitelists the output
    /// (the success-predicate pattern of §7).
    fn run_checked(&self, args: &[&str], success_if: impl Fn(&str) -> bool) -> Result<String> {
        self.run_checked_env(args, &[], success_if)
    }

    fn run_checked_env(
        &self,
        args: &[&str],
        extra_env: &[(&str, &str)],
        success_if: impl Fn(&str) -> bool,
    ) -> Result<String> {
        let out = self.spawn(args, extra_env)?;
        if out.status.success() || success_if(&out.combined) {
            Ok(out.combined)
        } else {
            Err(GistoreError::CommandError {
                command: format!("git {}", args.join(" ")),
                status: out.status.code(),
                output: out.combined,
            })
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        self.run_checked(args, |_| false)
    }

    // ---- capability surface (§4.6) -------------------------------------

    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.git_dir).map_err(|e| GistoreError::CommandError {
            command: format!("mkdir -p {}", self.git_dir.display()),
            status: None,
            output: e.to_string(),
        })?;

        self.run(&["init", "--bare", self.git_dir.to_str().unwrap_or_default()])?;
        self.run(&["commit", "--allow-empty", "-m", "gistore root commit initialized."])?;
        self.run(&["branch", "gistore/0"])?;

        for (key, value) in [
            ("core.autocrlf", "false"),
            ("core.safecrlf", "false"),
            ("core.symlinks", "true"),
            ("core.trustctime", "false"),
            ("core.sharedRepository", "group"),
            ("merge.ours.name", "always keep ours merge driver"),
            ("merge.ours.driver", "touch %A"),
        ] {
            self.run(&["config", key, value])?;
        }

        Ok(())
    }

    pub fn is_repo(&self) -> bool {
        self.git_dir.join("objects").is_dir()
    }

    pub fn ensure_repo(&self, task_label: &str) -> Result<()> {
        if self.is_repo() {
            Ok(())
        } else {
            Err(GistoreError::UninitializedRepository {
                task: task_label.to_string(),
            })
        }
    }

    pub fn add_all(&self) -> Result<()> {
        self.run(&["add", "."]).map(|_| ())
    }

    pub fn list_deleted(&self) -> Result<Vec<String>> {
        let out = self.run(&["ls-files", "--deleted"])?;
        Ok(out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    /// Drop `paths` from the index without touching the working tree.
    /// Falls back to one-by-one invocation if the combined argv would be
    /// too long for the OS to exec.
    pub fn remove_cached(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut args: Vec<&str> = vec!["rm", "--cached", "--quiet", "--"];
        args.extend(paths.iter().map(String::as_str));

        match self.run(&args) {
            Ok(_) => Ok(()),
            Err(GistoreError::CommandError { output, .. }) if looks_like_arg_list_too_long(&output) => {
                for path in paths {
                    self.run(&["rm", "--cached", "--quiet", "--", path])?;
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn status_porcelain(&self) -> Result<Vec<parse::StatusLine>> {
        let out = self.run(&["status", "--porcelain"])?;
        Ok(parse::parse_status_porcelain(&out))
    }

    pub fn submodule_status(&self) -> Result<Vec<String>> {
        let out = self.run_checked(&["submodule", "status"], |_| true)?;
        Ok(parse::parse_submodule_status(&out))
    }

    /// Flatten every reported submodule into a plain directory entry by
    /// planting and then un-indexing a sentinel file, looping until none
    /// remain (newly exposed directories may themselves be submodules).
    pub fn flatten_submodules(&self) -> Result<usize> {
        let mut total = 0;
        for _ in 0..MAX_SUBMODULE_FLATTEN_DEPTH {
            let submodules = self.submodule_status()?;
            if submodules.is_empty() {
                return Ok(total);
            }
            for submodule in &submodules {
                self.add_submodule_as_directory(submodule)?;
            }
            total += submodules.len();
        }

        let remaining = self.submodule_status()?;
        if remaining.is_empty() {
            Ok(total)
        } else {
            Err(GistoreError::CommandError {
                command: "submodule flatten".to_string(),
                status: None,
                output: format!(
                    "could not flatten submodules after {MAX_SUBMODULE_FLATTEN_DEPTH} passes: {}",
                    remaining.join(", ")
                ),
            })
        }
    }

    fn add_submodule_as_directory(&self, submodule: &str) -> Result<()> {
        let Some(work_tree) = &self.work_tree else {
            return Err(GistoreError::NotImplemented(
                "add_submodule_as_directory requires a work tree".to_string(),
            ));
        };
        let sentinel = work_tree.join(submodule).join(".gistore-submodule");
        fs::write(&sentinel, b"").map_err(|e| GistoreError::CommandError {
            command: format!("write {}", sentinel.display()),
            status: None,
            output: e.to_string(),
        })?;

        let sentinel_rel = format!("{submodule}/.gistore-submodule");
        self.run(&["add", "-f", &sentinel_rel])?;
        self.run(&["add", submodule])?;
        self.run_checked(&["rm", "--cached", "-f", "--quiet", &sentinel_rel], |_| true)?;
        Ok(())
    }

    /// Write a message file and create a commit, treating "nothing to
    /// commit" diagnostics as success.
    pub fn commit(&self, message: &str) -> Result<()> {
        let Some(work_tree) = &self.work_tree else {
            return Err(GistoreError::NotImplemented("commit requires a work tree".to_string()));
        };
        let message_file = work_tree.join(".gistore-commit-msg");
        fs::write(&message_file, message).map_err(|e| GistoreError::CommandError {
            command: format!("write {}", message_file.display()),
            status: None,
            output: e.to_string(),
        })?;

        let message_file_str = message_file.display().to_string();
        let result = self.run_checked(
            &["commit", "--quiet", "-F", &message_file_str],
            |out| {
                let lowered = out.to_lowercase();
                lowered.contains("nothing to commit") || lowered.contains("no changes added to commit")
            },
        );
        let _ = fs::remove_file(&message_file);
        result.map(|_| ())
    }

    /// Number of ancestors reachable from `refname`, inclusive.
    pub fn rev_list_count(&self, refname: &str) -> Result<usize> {
        let out = self.run(&["rev-list", refname])?;
        Ok(out.lines().filter(|l| !l.is_empty()).count())
    }

    pub fn rev_list(&self, refname: &str) -> Result<Vec<String>> {
        let out = self.run(&["rev-list", refname])?;
        Ok(out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    /// Same as [`Self::rev_list`], but with `GIT_GRAFT_FILE` pointed at
    /// `graft_file` instead of the repository's persistent one — used while
    /// computing a new rotation chain so the already-installed graft file
    /// from a prior rotation can't perturb the raw ancestry being read
    /// (§4.6, "a private graft-file path ... so the permanent graft file is
    /// not perturbed").
    pub fn rev_list_with_graft(&self, refname: &str, graft_file: &Path) -> Result<Vec<String>> {
        let graft_file = graft_file.display().to_string();
        let out = self.run_checked_env(&["rev-list", refname], &[("GIT_GRAFT_FILE", graft_file.as_str())], |_| false)?;
        Ok(out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    /// All local branch names (without the `refs/heads/` prefix).
    pub fn branches(&self) -> Result<Vec<String>> {
        let out = self.run(&["for-each-ref", "--format=%(refname:short)", "refs/heads/"])?;
        Ok(out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    pub fn create_branch(&self, name: &str, target: &str) -> Result<()> {
        self.run(&["branch", "--force", name, target]).map(|_| ())
    }

    /// Mark `target` as generation `name` (§4.6: generations are "tagged" by
    /// a branch ref, not a real annotated tag, so this is `create_branch`
    /// under another name for callers reasoning in terms of the abstract
    /// driver's tag/branch/update-ref capability set).
    pub fn tag(&self, name: &str, target: &str) -> Result<()> {
        self.create_branch(name, target)
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        self.run_checked(&["branch", "-D", name], |out| out.to_lowercase().contains("not found")).map(|_| ())
    }

    pub fn update_ref(&self, refname: &str, target: &str) -> Result<()> {
        self.run(&["update-ref", refname, target]).map(|_| ())
    }

    pub fn cat_file(&self, object: &str) -> Result<String> {
        self.run(&["cat-file", "-p", object])
    }

    /// Same as [`Self::cat_file`], but with `GIT_GRAFT_FILE` neutralized
    /// against `graft_file` rather than the persistent one, for the same
    /// reason as [`Self::rev_list_with_graft`].
    pub fn cat_file_with_graft(&self, object: &str, graft_file: &Path) -> Result<String> {
        let graft_file = graft_file.display().to_string();
        self.run_checked_env(&["cat-file", "-p", object], &[("GIT_GRAFT_FILE", graft_file.as_str())], |_| false)
    }

    /// Write `content` as a loose commit object and return its id.
    pub fn hash_object_commit(&self, content: &str, graft_file: Option<&Path>) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(self.base_args());
        cmd.args(["hash-object", "-t", "commit", "-w", "--stdin"]);
        if let Some(graft) = graft_file {
            cmd.env("GIT_GRAFT_FILE", graft);
        }
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| GistoreError::CommandError {
            command: "git hash-object".to_string(),
            status: None,
            output: e.to_string(),
        })?;

        {
            use std::io::Write;
            let stdin = child.stdin.as_mut().expect("stdin piped");
            stdin.write_all(content.as_bytes()).map_err(|e| GistoreError::CommandError {
                command: "git hash-object".to_string(),
                status: None,
                output: e.to_string(),
            })?;
        }

        let output = child.wait_with_output().map_err(|e| GistoreError::CommandError {
            command: "git hash-object".to_string(),
            status: None,
            output: e.to_string(),
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(GistoreError::CommandError {
                command: "git hash-object -t commit -w --stdin".to_string(),
                status: output.status.code(),
                output: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    pub fn log(&self, args: &[&str]) -> Result<String> {
        let mut full = vec!["log"];
        full.extend_from_slice(args);
        self.run(&full)
    }

    pub fn gc(&self) -> Result<()> {
        self.run(&["gc", "--quiet"]).map(|_| ())
    }

    /// Mixed reset: moves `HEAD`/the index to `refname` but leaves the work
    /// tree untouched (`git reset <refname>`, no `--hard`). Rotation uses
    /// this against the staging tree, whose files are read-only bind mounts
    /// that a hard reset would try, and fail, to overwrite (§4.7).
    pub fn reset_mixed(&self, refname: &str) -> Result<()> {
        self.run(&["reset", refname]).map(|_| ())
    }

    /// Distinct set of two-char status groups present in the working tree,
    /// used by the orchestrator to decide whether to loop the submodule
    /// flattening pass again.
    pub fn status_groups(&self) -> Result<HashSet<String>> {
        Ok(self
            .status_porcelain()?
            .into_iter()
            .map(|l| l.code)
            .collect())
    }
}

fn looks_like_arg_list_too_long(output: &str) -> bool {
    let lowered = output.to_lowercase();
    lowered.contains("argument list too long") || lowered.contains("e2big")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_arg_list_too_long() {
        assert!(looks_like_arg_list_too_long("execvp: Argument list too long"));
        assert!(!looks_like_arg_list_too_long("fatal: pathspec did not match"));
    }
}
