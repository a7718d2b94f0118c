//! Rotation engine (C7): bounded retention over the commit DAG (§4.7).

use std::path::Path;

use crate::error::Result;
use crate::git::GitDriver;

pub struct RotationEngine<'a> {
    driver: &'a GitDriver,
    backup_history: i64,
    backup_copies: i64,
}

impl<'a> RotationEngine<'a> {
    pub fn new(driver: &'a GitDriver, backup_history: i64, backup_copies: i64) -> Self {
        RotationEngine {
            driver,
            backup_history,
            backup_copies,
        }
    }

    /// Rotate if `master`'s history has grown past `backup_history`.
    /// `backup_history < 1` or `backup_copies < 1` disables rotation
    /// entirely, per the documented edge case.
    pub fn maybe_rotate(&self) -> Result<bool> {
        if self.backup_history < 1 || self.backup_copies < 1 {
            return Ok(false);
        }

        let count = self.driver.rev_list_count("master")?;
        if (count as i64) < self.backup_history {
            return Ok(false);
        }

        self.rotate()?;
        Ok(true)
    }

    fn rotate(&self) -> Result<()> {
        let backup_copies = self.backup_copies as usize;
        let mut generations = self.existing_generations()?;
        generations.sort_unstable();

        if generations.len() >= backup_copies {
            // For i in [1, backup_copies): gistore/i <- T[i - backup_copies],
            // i.e. the last (backup_copies - 1) entries of T, oldest first.
            let window_start = generations.len().saturating_sub(backup_copies.saturating_sub(1));
            let slid: Vec<i64> = generations[window_start..].to_vec();
            for (offset, source_gen) in slid.iter().enumerate() {
                let i = offset + 1;
                let source_ref = format!("refs/heads/gistore/{source_gen}");
                self.driver.create_branch(&format!("gistore/{i}"), &source_ref)?;
            }
            for name in self.driver.branches()? {
                if let Some(n) = parse_generation(&name) {
                    if n > 0 && !(1..backup_copies as i64).contains(&n) {
                        self.driver.delete_branch(&name)?;
                    }
                }
            }
            self.driver
                .create_branch(&format!("gistore/{backup_copies}"), "master")?;
        } else {
            let next = generations.last().map(|m| m + 1).unwrap_or(1);
            self.driver.create_branch(&format!("gistore/{next}"), "master")?;
        }

        let scratch_grafts = self.driver.git_dir().join("info").join(format!(".gistore-rotate-{}", std::process::id()));
        let reparented = self.reparent_master(&scratch_grafts)?;
        self.write_graft_file(backup_copies, &reparented, &scratch_grafts)?;
        self.driver.gc()?;
        self.driver.reset_mixed("master")?;

        Ok(())
    }

    fn existing_generations(&self) -> Result<Vec<i64>> {
        Ok(self
            .driver
            .branches()?
            .iter()
            .filter_map(|name| parse_generation(name))
            .filter(|&n| n > 0)
            .collect())
    }

    /// Read `master`, strip its parent lines, write it back as a new
    /// parentless object, and point `refs/heads/master` at it. Reads and
    /// writes go through `scratch_grafts` rather than the permanent graft
    /// file, so a prior rotation's grafts can't perturb this one.
    fn reparent_master(&self, scratch_grafts: &Path) -> Result<String> {
        let object = self.driver.cat_file_with_graft("master", scratch_grafts)?;
        let stripped = crate::git::parse::strip_parent_lines(&object);
        let new_root = self.driver.hash_object_commit(&stripped, Some(scratch_grafts))?;
        self.driver.update_ref("refs/heads/master", &new_root)?;
        Ok(new_root)
    }

    /// Rebuild `info/grafts` so that `gistore/1 -> gistore/2 -> ... ->
    /// gistore/backup_copies -> master` reads as one continuous history.
    fn write_graft_file(&self, backup_copies: usize, new_root: &str, scratch_grafts: &Path) -> Result<()> {
        let mut lines = Vec::new();
        let mut child = new_root.to_string();

        for k in (1..=backup_copies).rev() {
            let branch = format!("gistore/{k}");
            let Ok(history) = self.driver.rev_list_with_graft(&branch, scratch_grafts) else {
                continue;
            };
            if history.is_empty() {
                continue;
            }
            let tip = history[0].clone();
            if history.len() == 1 {
                // No real ancestor on this generation: no graft line for this
                // edge, chain continues directly from the tip (§9, Open
                // Question (a)).
                child = tip;
                continue;
            }
            let real_parent = history[1].clone();
            lines.push(format!("{child} {real_parent}"));
            child = tip;
        }

        let grafts_path = self.driver.git_dir().join("info").join("grafts");
        write_grafts(&grafts_path, &lines)
    }
}

fn parse_generation(branch: &str) -> Option<i64> {
    branch.strip_prefix("gistore/")?.parse().ok()
}

fn write_grafts(path: &Path, lines: &[String]) -> Result<()> {
    use std::fs;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| crate::error::GistoreError::CommandError {
            command: format!("mkdir -p {}", parent.display()),
            status: None,
            output: e.to_string(),
        })?;
    }
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    fs::write(path, content).map_err(|e| crate::error::GistoreError::CommandError {
        command: format!("write {}", path.display()),
        status: None,
        output: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_generation_numbers() {
        assert_eq!(parse_generation("gistore/3"), Some(3));
        assert_eq!(parse_generation("gistore/0"), Some(0));
        assert_eq!(parse_generation("master"), None);
    }
}
