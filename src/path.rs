//! Path normalizer (C1): dedup, containment, and task-root guard logic.

use std::path::{Path, PathBuf};

/// A source path kept after normalization.
///
/// `original` is the identity used for configuration and mounting;
/// `resolved` (symlinks followed) is used only for validation and ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub original: PathBuf,
    pub resolved: PathBuf,
}

/// A path dropped during normalization, with the reason, for logging/tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedEntry {
    pub path: PathBuf,
    pub reason: DropReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    NotFound,
    Duplicate,
    Contained { within: PathBuf },
    TaskRootOrAncestor,
    DescendantOfTaskRoot,
}

/// Normalize a list of candidate source paths against a task root.
///
/// `config_dir` is the one path under `task_root` that is allowed to be kept
/// (the deliberate self-include for the configuration directory).
pub fn normalize(
    task_root: &Path,
    config_dir: &Path,
    candidates: &[PathBuf],
) -> (Vec<SourceEntry>, Vec<DroppedEntry>) {
    let mut candidates_resolved: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(candidates.len());
    let mut dropped = Vec::new();

    for candidate in candidates {
        let original = make_absolute(candidate);
        match dunce::canonicalize(&original) {
            Ok(resolved) => candidates_resolved.push((original, resolved)),
            Err(_) => dropped.push(DroppedEntry {
                path: original,
                reason: DropReason::NotFound,
            }),
        }
    }

    // Sort by resolved path: an ancestor directory always sorts before its
    // descendants, so containment dedup is correct in a single forward pass.
    candidates_resolved.sort_by(|a, b| a.1.cmp(&b.1));

    let mut kept: Vec<SourceEntry> = Vec::new();

    for (original, resolved) in candidates_resolved {
        if let Some(last) = kept.last() {
            if last.resolved == resolved {
                dropped.push(DroppedEntry {
                    path: original,
                    reason: DropReason::Duplicate,
                });
                continue;
            }
            if is_ancestor(&last.resolved, &resolved) {
                dropped.push(DroppedEntry {
                    path: original,
                    reason: DropReason::Contained {
                        within: last.resolved.clone(),
                    },
                });
                continue;
            }
        }

        if resolved == task_root || is_ancestor(&resolved, task_root) {
            dropped.push(DroppedEntry {
                path: original,
                reason: DropReason::TaskRootOrAncestor,
            });
            continue;
        }

        if is_ancestor(task_root, &resolved) && resolved != config_dir {
            dropped.push(DroppedEntry {
                path: original,
                reason: DropReason::DescendantOfTaskRoot,
            });
            continue;
        }

        kept.push(SourceEntry { original, resolved });
    }

    (kept, dropped)
}

/// True if `ancestor` is a strict directory prefix of `path`.
fn is_ancestor(ancestor: &Path, path: &Path) -> bool {
    ancestor != path && path.starts_with(ancestor)
}

fn make_absolute(p: &Path) -> PathBuf {
    if p.is_absolute() {
        normalize_path::NormalizePath::normalize(p)
    } else {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        normalize_path::NormalizePath::normalize(&cwd.join(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn dedup_exact_and_contained() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let a = tmp.path().join("a");
        let a_b = a.join("b");
        fs::create_dir_all(&a_b).unwrap();

        let candidates = vec![a.clone(), a_b.clone(), a.clone()];
        let (kept, dropped) = normalize(&root.canonicalize().unwrap(), &root, &candidates);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].resolved, a.canonicalize().unwrap());
        assert_eq!(dropped.len(), 2);
        assert!(matches!(dropped[0].reason, DropReason::Contained { .. }));
        assert!(matches!(dropped[1].reason, DropReason::Duplicate));
    }

    #[test]
    fn task_root_is_rejected() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let root_resolved = root.canonicalize().unwrap();

        let (kept, dropped) = normalize(&root_resolved, &root_resolved, &[root.clone()]);
        assert!(kept.is_empty());
        assert_eq!(dropped.len(), 1);
        assert!(matches!(dropped[0].reason, DropReason::TaskRootOrAncestor));
    }

    #[test]
    fn config_dir_is_the_one_allowed_self_include() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("root");
        let config_dir = root.join(".gistore");
        fs::create_dir_all(&config_dir).unwrap();
        let root_resolved = root.canonicalize().unwrap();
        let config_resolved = config_dir.canonicalize().unwrap();

        let (kept, dropped) = normalize(&root_resolved, &config_resolved, &[config_dir.clone()]);
        assert_eq!(kept.len(), 1);
        assert!(dropped.is_empty());
    }

    #[test]
    fn other_descendants_of_task_root_are_rejected() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("root");
        let config_dir = root.join(".gistore");
        let other = root.join("other");
        fs::create_dir_all(&config_dir).unwrap();
        fs::create_dir_all(&other).unwrap();
        let root_resolved = root.canonicalize().unwrap();
        let config_resolved = config_dir.canonicalize().unwrap();

        let (kept, dropped) = normalize(&root_resolved, &config_resolved, &[other.clone()]);
        assert!(kept.is_empty());
        assert_eq!(dropped.len(), 1);
        assert!(matches!(dropped[0].reason, DropReason::DescendantOfTaskRoot));
    }

    #[test]
    fn missing_path_is_dropped_not_found() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let root_resolved = root.canonicalize().unwrap();
        let missing = tmp.path().join("does-not-exist");

        let (kept, dropped) = normalize(&root_resolved, &root_resolved, &[missing]);
        assert!(kept.is_empty());
        assert_eq!(dropped.len(), 1);
        assert!(matches!(dropped[0].reason, DropReason::NotFound));
    }
}
