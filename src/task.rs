//! Task registry (C2): resolve a task argument to a task root, and reverse-lookup.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{GistoreError, Result};
use crate::identity;

/// Resolve a CLI-supplied task argument to a symlink-resolved task root.
///
/// - Empty → current directory.
/// - A bare token containing no path separator and not starting with `.` →
///   looked up as `<tasks_dir>/<name>`.
/// - Anything else → treated as a path (absolute or relative to cwd).
pub fn resolve(arg: Option<&str>) -> Result<PathBuf> {
    let candidate = candidate_for(arg)?;
    candidate.canonicalize().map_err(|_| GistoreError::TaskNotExists {
        name: arg.unwrap_or(".").to_string(),
    })
}

/// Same as [`resolve`], but tolerant of a task root that doesn't exist yet:
/// only the parent directory needs to be resolvable, matching `init`'s own
/// ability to create the root directory (the original's `os.path.realpath`
/// + `os.makedirs` when the task is being created rather than opened).
pub fn resolve_for_init(arg: Option<&str>) -> Result<PathBuf> {
    let candidate = candidate_for(arg)?;
    if candidate.exists() {
        return candidate.canonicalize().map_err(|_| GistoreError::TaskNotExists {
            name: arg.unwrap_or(".").to_string(),
        });
    }

    let not_found = || GistoreError::TaskNotExists {
        name: arg.unwrap_or(".").to_string(),
    };
    let absolute = if candidate.is_absolute() {
        candidate
    } else {
        std::env::current_dir().map_err(|_| not_found())?.join(candidate)
    };
    let parent = absolute.parent().ok_or_else(not_found)?;
    let leaf = absolute.file_name().ok_or_else(not_found)?;
    let resolved_parent = parent.canonicalize().map_err(|_| not_found())?;
    Ok(resolved_parent.join(leaf))
}

fn candidate_for(arg: Option<&str>) -> Result<PathBuf> {
    match arg {
        None | Some("") => std::env::current_dir().map_err(|e| GistoreError::TaskNotExists {
            name: format!("<cwd>: {e}"),
        }),
        Some(token) if looks_like_task_name(token) => {
            let linked = identity::tasks_dir().join(token);
            if linked.exists() {
                Ok(linked)
            } else {
                Ok(PathBuf::from(token))
            }
        }
        Some(path) => Ok(PathBuf::from(path)),
    }
}

fn looks_like_task_name(token: &str) -> bool {
    !token.contains(std::path::MAIN_SEPARATOR) && !token.starts_with('.')
}

/// Reverse lookup: find the registered task name for `task_root`, if any, by
/// scanning the registry directory and comparing resolved targets.
pub fn dir_to_task(task_root: &Path) -> Option<String> {
    let tasks_dir = identity::tasks_dir();
    let entries = fs::read_dir(&tasks_dir).ok()?;
    for entry in entries.flatten() {
        if entry.path().canonicalize().ok().as_deref() == Some(task_root) {
            return entry.file_name().into_string().ok();
        }
    }
    None
}

/// Enumerate every task registered under the registry directory, resolving
/// each symlink to its task root. Broken links are skipped.
pub fn list_tasks() -> Vec<(String, PathBuf)> {
    let tasks_dir = identity::tasks_dir();
    let Ok(entries) = fs::read_dir(&tasks_dir) else {
        return Vec::new();
    };

    entries
        .flatten()
        .filter_map(|entry| {
            let root = entry.path().canonicalize().ok()?;
            let name = entry.file_name().into_string().ok()?;
            Some((name, root))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_token_looks_like_task_name() {
        assert!(looks_like_task_name("backups"));
        assert!(!looks_like_task_name("./backups"));
        assert!(!looks_like_task_name("a/b"));
    }
}
