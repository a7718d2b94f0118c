//! Repo-config store (C3): a dotted key/value store backed by `git config --file`.
//!
//! The store never parses the on-disk format itself; it shells out to the
//! DVCS's own config subcommand for every operation, which is what keeps
//! concurrent writers serialized through one implementation (§4.3, §6.4).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{GistoreError, Result};

pub const GISTORE_CONFIG_DIR: &str = ".gistore";
pub const CONFIG_FILE: &str = "config";

/// In-memory view of a task's dotted-key configuration, lazily synced with
/// the on-disk file through `git config --file`.
#[derive(Debug, Clone, Default)]
pub struct RepoConfig {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl RepoConfig {
    /// Load the config at `path`, migrating a legacy INI-style file in place
    /// if the dotted-key read fails.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(RepoConfig {
                path: path.to_path_buf(),
                entries: default_entries(),
            });
        }

        match list_all(path) {
            Ok(entries) => Ok(RepoConfig {
                path: path.to_path_buf(),
                entries,
            }),
            Err(_) => {
                migrate_ini(path)?;
                let entries = list_all(path)?;
                Ok(RepoConfig {
                    path: path.to_path_buf(),
                    entries,
                })
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.entries.get(key).map(String::as_str) {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        }
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.entries
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Write every in-memory entry back to the file, sorted for determinism.
    pub fn save(&self) -> Result<()> {
        for (key, val) in &self.entries {
            git_config(&self.path, &[key.as_str(), val.as_str()])?;
        }
        Ok(())
    }

    /// `add(key, value, update)`: write to disk, and mirror into memory when
    /// `update` is true. `set` is an alias used by callers that always want
    /// the in-memory view to reflect the write.
    pub fn add(&mut self, key: &str, value: &str, update: bool) -> Result<()> {
        let lowered_key = lower_last_segment(key);
        git_config(&self.path, &[lowered_key.as_str(), value])?;
        if update {
            self.entries.insert(lowered_key, value.to_string());
        }
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.add(key, value, true)
    }

    /// `remove(key)`: unset every instance of `key`; never errors on a
    /// missing key.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        let _ = git_config(&self.path, &["unset-all", key]);
        self.entries.remove(key);
        Ok(())
    }

    /// `remove_section(section)`: drop every key under `section.`.
    pub fn remove_section(&mut self, section: &str) -> Result<()> {
        let output = git_config(&self.path, &["--remove-section", section]);
        if let Err(GistoreError::CommandError { output: msg, .. }) = &output {
            if !msg.contains("No such section") {
                return output.map(|_| ());
            }
        }
        let prefix = format!("{section}.");
        self.entries.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn default_entries() -> BTreeMap<String, String> {
    let mut defaults = BTreeMap::new();
    defaults.insert("main.backend".to_string(), "git".to_string());
    defaults.insert(
        "main.rootonly".to_string(),
        crate::identity::is_root().to_string(),
    );
    defaults.insert("main.backuphistory".to_string(), "200".to_string());
    defaults.insert("main.backupcopies".to_string(), "5".to_string());
    defaults.insert("main.version".to_string(), "2".to_string());
    defaults.insert("default.keepperm".to_string(), "false".to_string());
    defaults.insert("default.keepemptydir".to_string(), "false".to_string());
    defaults
}

fn list_all(path: &Path) -> Result<BTreeMap<String, String>> {
    let output = git_config(path, &["--list"])?;
    let mut entries = BTreeMap::new();
    for line in output.lines() {
        if let Some((key, value)) = line.split_once('=') {
            entries.insert(key.to_string(), value.to_string());
        }
    }
    Ok(entries)
}

fn git_config(path: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("config")
        .arg("--file")
        .arg(path)
        .args(args)
        .output()
        .map_err(|e| GistoreError::CommandError {
            command: format!("git config --file {} {}", path.display(), args.join(" ")),
            status: None,
            output: e.to_string(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if output.status.success() {
        Ok(stdout)
    } else {
        Err(GistoreError::CommandError {
            command: format!("git config --file {} {}", path.display(), args.join(" ")),
            status: output.status.code(),
            output: format!("{stdout}{stderr}"),
        })
    }
}

fn lower_last_segment(key: &str) -> String {
    match key.rsplit_once('.') {
        Some((prefix, last)) => format!("{prefix}.{}", last.to_lowercase()),
        None => key.to_lowercase(),
    }
}

/// Migrate a legacy `[main]`/`[default]`/`[store "<path>"]` INI file into the
/// dotted-key format, atomically, via a temp file + rename.
fn migrate_ini(path: &Path) -> Result<()> {
    let contents = fs::read_to_string(path).map_err(|e| GistoreError::CommandError {
        command: format!("read {}", path.display()),
        status: None,
        output: e.to_string(),
    })?;

    let mut dotted = default_entries();
    let mut section: Option<String> = None;

    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = Some(parse_section(&line[1..line.len() - 1]));
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_lowercase().replace(' ', "_");
        let value = value.trim().to_string();

        match &section {
            Some(s) if s.starts_with("store.") => {
                dotted.insert(format!("{s}.{key}"), value);
            }
            Some(s) => {
                dotted.insert(format!("{s}.{key}"), value);
            }
            None => {}
        }
    }

    // Any `store.<path>` section with no explicit `enabled` key defaults to enabled.
    let store_prefixes: Vec<String> = dotted
        .keys()
        .filter(|k| k.starts_with("store."))
        .filter_map(|k| {
            let rest = k.strip_prefix("store.")?;
            let (store_path, _attr) = rest.rsplit_once('.')?;
            Some(format!("store.{store_path}"))
        })
        .collect();
    for prefix in store_prefixes {
        dotted.entry(format!("{prefix}.enabled")).or_insert_with(|| "true".to_string());
    }

    let tmp_path = path.with_extension(format!("{}.tmp", std::process::id()));
    let tmp = RepoConfig {
        path: tmp_path.clone(),
        entries: dotted,
    };

    let result = tmp.save().and_then(|_| {
        fs::rename(&tmp_path, path).map_err(|e| GistoreError::CommandError {
            command: format!("rename {} -> {}", tmp_path.display(), path.display()),
            status: None,
            output: e.to_string(),
        })
    });

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn parse_section(raw: &str) -> String {
    if let Some(rest) = raw.strip_prefix("store ") {
        let path = rest.trim().trim_matches('"');
        format!("store.{path}")
    } else {
        raw.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_only_the_last_dotted_segment() {
        assert_eq!(lower_last_segment("store./a/B.EnaBled"), "store./a/B.enabled");
        assert_eq!(lower_last_segment("Main.Backend"), "Main.backend");
    }

    #[test]
    fn parses_store_sections_with_path() {
        assert_eq!(parse_section("store \"/var/log\""), "store./var/log");
        assert_eq!(parse_section("Main"), "main");
    }
}
