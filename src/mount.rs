//! Mount engine (C5): bring up/tear down a bind-mount staging tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{GistoreError, Result};
use crate::path::SourceEntry;

/// Diagnostics that the unmount path treats as success rather than failure,
/// since they mean "there was nothing here to tear down" (§7's success
/// predicate pattern).
const BENIGN_UNMOUNT_DIAGNOSTICS: &[&str] = &["not mounted", "not found", "no mount point specified"];

/// Ordered list of argv prefixes to try for mount, and the matching list for
/// unmount, built once from what's available on `$PATH` and the process uid.
pub struct MountEngine {
    staging: PathBuf,
    mount_cmds: Vec<Vec<String>>,
    umount_cmds: Vec<Vec<String>>,
    umount_force_cmds: Vec<Vec<String>>,
}

impl MountEngine {
    pub fn new(staging: PathBuf) -> Self {
        let is_root = crate::identity::is_root();
        let have_sudo = which::which("sudo").is_ok();
        let have_bindfs = which::which("bindfs").is_ok();

        let mut mount_cmds = vec![vec!["mount".into(), "--rbind".into(), "-o".into(), "ro".into()]];
        let mut umount_cmds = vec![vec!["umount".into()]];
        let mut umount_force_cmds = vec![vec!["umount".into(), "-f".into(), "-l".into()]];

        if !is_root && have_sudo {
            mount_cmds.push(prefix_with_sudo(&mount_cmds[0]));
        }
        if have_bindfs {
            mount_cmds.push(vec!["bindfs".into(), "--no-allow-other".into(), "-o".into(), "ro".into()]);
            umount_cmds.insert(0, vec!["fusermount".into(), "-u".into()]);
            if !is_root && have_sudo {
                mount_cmds.push(prefix_with_sudo(mount_cmds.last().unwrap()));
            }
        }
        if !is_root && have_sudo {
            umount_force_cmds.push(prefix_with_sudo(&umount_force_cmds[0]));
        }

        MountEngine {
            staging,
            mount_cmds,
            umount_cmds,
            umount_force_cmds,
        }
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Target path under the staging tree for source `entry`.
    pub fn target_for(&self, entry: &SourceEntry, config_dir: &Path) -> PathBuf {
        if entry.resolved == config_dir {
            let name = config_dir
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new(crate::config::GISTORE_CONFIG_DIR));
            self.staging.join(name)
        } else {
            let stripped = entry.original.strip_prefix("/").unwrap_or(&entry.original);
            self.staging.join(stripped)
        }
    }

    /// Mount every entry into the staging tree, in order, skipping any
    /// already mounted (inode-equal or already a mount point).
    pub fn mount_all(&self, entries: &[SourceEntry], config_dir: &Path) -> Result<()> {
        for entry in entries {
            let target = self.target_for(entry, config_dir);
            create_placeholder(&entry.resolved, &target)?;

            if is_mount(&entry.resolved, &target) {
                log::debug!("{} already mounted at {}", entry.resolved.display(), target.display());
                continue;
            }

            self.mount_one(&entry.resolved, &target)?;
        }
        Ok(())
    }

    fn mount_one(&self, source: &Path, target: &Path) -> Result<()> {
        let mut last_output = String::new();
        let mut last_status = None;

        for cmd in &self.mount_cmds {
            let (program, fixed_args) = cmd.split_first().expect("non-empty command");
            let output = Command::new(program)
                .args(fixed_args)
                .arg(source)
                .arg(target)
                .output();

            match output {
                Ok(out) if out.status.success() => {
                    log::debug!("mounted {} -> {}", source.display(), target.display());
                    return Ok(());
                }
                Ok(out) => {
                    last_status = out.status.code();
                    last_output = format!(
                        "{}{}",
                        String::from_utf8_lossy(&out.stdout),
                        String::from_utf8_lossy(&out.stderr)
                    );
                }
                Err(e) => {
                    last_output = e.to_string();
                }
            }
        }

        Err(GistoreError::CommandError {
            command: format!("mount {} {}", source.display(), target.display()),
            status: last_status,
            output: last_output,
        })
    }

    /// Unmount every configured entry (reverse-sorted so inner mounts release
    /// before outer ones), then sweep the system mount table for anything
    /// else left under the staging tree, then remove emptied directories.
    pub fn unmount_all(&self, entries: &[SourceEntry], config_dir: &Path) -> Result<()> {
        let mut targets: Vec<PathBuf> = entries
            .iter()
            .map(|e| self.target_for(e, config_dir))
            .collect();
        targets.sort();
        targets.reverse();

        for target in &targets {
            if target.exists() {
                self.unmount_one(target)?;
                remove_empty_ancestors(target, &self.staging);
            }
        }

        for leftover in mount_points_under(&self.staging) {
            self.unmount_one(&leftover)?;
            remove_empty_ancestors(&leftover, &self.staging);
        }

        Ok(())
    }

    fn unmount_one(&self, target: &Path) -> Result<()> {
        let mut last_output = String::new();
        let mut last_status = None;

        for cmd in self.umount_cmds.iter().chain(self.umount_force_cmds.iter()) {
            let (program, fixed_args) = cmd.split_first().expect("non-empty command");
            let output = Command::new(program).args(fixed_args).arg(target).output();

            let out = match output {
                Ok(out) => out,
                Err(e) => {
                    last_output = e.to_string();
                    continue;
                }
            };
            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            );

            if out.status.success() || benign_unmount_diagnostic(&combined) {
                return Ok(());
            }

            last_status = out.status.code();
            last_output = combined;
        }

        Err(GistoreError::CommandError {
            command: format!("umount {}", target.display()),
            status: last_status,
            output: last_output,
        })
    }
}

fn benign_unmount_diagnostic(output: &str) -> bool {
    let lowered = output.to_lowercase();
    BENIGN_UNMOUNT_DIAGNOSTICS
        .iter()
        .any(|needle| lowered.contains(needle))
}

fn prefix_with_sudo(cmd: &[String]) -> Vec<String> {
    let mut with_sudo = vec!["sudo".to_string()];
    with_sudo.extend_from_slice(cmd);
    with_sudo
}

fn create_placeholder(source: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        return Ok(());
    }
    let meta = fs::metadata(source).map_err(|e| GistoreError::CommandError {
        command: format!("stat {}", source.display()),
        status: None,
        output: e.to_string(),
    })?;

    if meta.is_dir() {
        fs::create_dir_all(target)
    } else {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::File::create(target).map(|_| ())
    }
    .map_err(|e| GistoreError::CommandError {
        command: format!("create placeholder {}", target.display()),
        status: None,
        output: e.to_string(),
    })
}

/// True when `target` is already a view of `source`: same inode, or `target`
/// is itself a mount point.
fn is_mount(source: &Path, target: &Path) -> bool {
    same_inode(source, target) || is_mount_point(target)
}

#[cfg(unix)]
fn same_inode(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    let (Ok(ma), Ok(mb)) = (fs::metadata(a), fs::metadata(b)) else {
        return false;
    };
    ma.dev() == mb.dev() && ma.ino() == mb.ino()
}

#[cfg(not(unix))]
fn same_inode(_a: &Path, _b: &Path) -> bool {
    false
}

#[cfg(unix)]
fn is_mount_point(p: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    let Ok(meta) = fs::metadata(p) else { return false };
    let Some(parent) = p.parent() else { return false };
    let Ok(parent_meta) = fs::metadata(parent) else {
        return false;
    };
    meta.dev() != parent_meta.dev()
}

#[cfg(not(unix))]
fn is_mount_point(_p: &Path) -> bool {
    false
}

/// Re-read the system mount table (`/proc/self/mounts` on Linux, falling
/// back to the `mount` command elsewhere) and collect every mount point
/// under `staging`.
fn mount_points_under(staging: &Path) -> Vec<PathBuf> {
    let table = fs::read_to_string("/proc/self/mounts")
        .or_else(|_| {
            Command::new("mount")
                .output()
                .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
        })
        .unwrap_or_default();

    let mut points: Vec<PathBuf> = table
        .lines()
        .filter_map(|line| {
            // `/proc/self/mounts` format: `<src> <dest> <type> <opts> <dump> <pass>`
            let mut fields = line.split_whitespace();
            fields.next()?;
            let dest = fields.next()?;
            let dest = PathBuf::from(dest);
            dest.starts_with(staging).then_some(dest)
        })
        .collect();

    points.sort();
    points.reverse();
    points
}

/// Remove directories from `from` up to (but not including) `stop_at`, as
/// long as they remain empty. Stops at the first non-empty directory.
fn remove_empty_ancestors(from: &Path, stop_at: &Path) {
    if from.is_file() || (from.exists() && !from.is_dir()) {
        let _ = fs::remove_file(from);
    }
    let mut dir = if from.is_dir() { Some(from.to_path_buf()) } else { from.parent().map(Path::to_path_buf) };

    while let Some(d) = dir {
        if d == *stop_at || !d.starts_with(stop_at) {
            break;
        }
        match fs::remove_dir(&d) {
            Ok(()) => dir = d.parent().map(Path::to_path_buf),
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_diagnostics_are_recognized() {
        assert!(benign_unmount_diagnostic("umount: /x: not mounted."));
        assert!(!benign_unmount_diagnostic("umount: /x: device is busy."));
    }

    #[test]
    fn target_for_config_dir_uses_its_basename() {
        let staging = PathBuf::from("/run/gistore/t/123");
        let engine = MountEngine {
            staging: staging.clone(),
            mount_cmds: vec![],
            umount_cmds: vec![],
            umount_force_cmds: vec![],
        };
        let config_dir = PathBuf::from("/home/u/root/.gistore");
        let entry = SourceEntry {
            original: config_dir.clone(),
            resolved: config_dir.clone(),
        };
        assert_eq!(
            engine.target_for(&entry, &config_dir),
            staging.join(".gistore")
        );
    }

    #[test]
    fn target_for_other_path_mirrors_it_under_staging() {
        let staging = PathBuf::from("/run/gistore/t/123");
        let engine = MountEngine {
            staging: staging.clone(),
            mount_cmds: vec![],
            umount_cmds: vec![],
            umount_force_cmds: vec![],
        };
        let config_dir = PathBuf::from("/home/u/root/.gistore");
        let entry = SourceEntry {
            original: PathBuf::from("/etc/hostname"),
            resolved: PathBuf::from("/etc/hostname"),
        };
        assert_eq!(
            engine.target_for(&entry, &config_dir),
            staging.join("etc/hostname")
        );
    }
}
