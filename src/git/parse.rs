//! Parsing helpers for git porcelain output and raw commit objects.

use std::collections::BTreeMap;

use regex::Regex;

/// One line of `git status --porcelain`: a two-character status code and a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub code: String,
    pub path: String,
}

pub fn parse_status_porcelain(output: &str) -> Vec<StatusLine> {
    output
        .lines()
        .filter(|l| l.len() > 3)
        .map(|line| StatusLine {
            code: line[..2].to_string(),
            path: line[3..].trim().to_string(),
        })
        .collect()
}

/// Group status lines by code, capping the sample shown per group at 5 and
/// appending `...N more...` for the remainder, mirroring the original
/// commit-summary generator.
pub fn summarize_status(lines: &[StatusLine]) -> String {
    const SAMPLE: usize = 5;

    let mut groups: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for line in lines {
        groups.entry(line.code.clone()).or_default().push(&line.path);
    }

    let mut out = String::new();
    for (code, paths) in groups {
        out.push_str(&format!("{code}:\n"));
        for path in paths.iter().take(SAMPLE) {
            out.push_str(&format!("  {path}\n"));
        }
        if paths.len() > SAMPLE {
            out.push_str(&format!("  ...{} more...\n", paths.len() - SAMPLE));
        }
    }
    out
}

/// Paths reported as submodules by `git submodule status`, including the
/// "no submodule mapping found" form for orphaned gitlink entries.
pub fn parse_submodule_status(output: &str) -> Vec<String> {
    let normal = Regex::new(r"^.[0-9a-fA-F]{40} (\S+)(?: \(.*\))?$").unwrap();
    let orphaned =
        Regex::new(r"^No submodule mapping found in \.gitmodules for path '(.*)'$").unwrap();

    let mut paths = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if let Some(caps) = normal.captures(line) {
            paths.push(caps[1].to_string());
        } else if let Some(caps) = orphaned.captures(line) {
            paths.push(caps[1].to_string());
        }
    }
    paths
}

/// Raw `cat-file -p <commit>` output, with `parent` lines stripped and
/// everything else preserved byte-for-byte, ready to be rewritten through
/// `hash-object -t commit -w --stdin`.
pub fn strip_parent_lines(commit_object: &str) -> String {
    commit_object
        .lines()
        .filter(|line| !line.starts_with("parent "))
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}

/// Parent commit ids declared by a raw commit object, in object order.
pub fn parent_ids(commit_object: &str) -> Vec<String> {
    commit_object
        .lines()
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.strip_prefix("parent ").map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_porcelain_lines() {
        let lines = parse_status_porcelain(" M etc/hostname\n?? new-file\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].code, " M");
        assert_eq!(lines[0].path, "etc/hostname");
        assert_eq!(lines[1].code, "??");
    }

    #[test]
    fn summarizes_with_sample_cap() {
        let lines: Vec<StatusLine> = (0..7)
            .map(|i| StatusLine {
                code: "??".to_string(),
                path: format!("file{i}"),
            })
            .collect();
        let summary = summarize_status(&lines);
        assert!(summary.contains("...2 more..."));
    }

    #[test]
    fn strips_only_parent_lines() {
        let object = "tree abc\nparent def\nparent ghi\nauthor a <a@b> 0 +0000\n\nmsg\n";
        let stripped = strip_parent_lines(object);
        assert!(!stripped.contains("parent"));
        assert!(stripped.contains("tree abc"));
        assert!(stripped.contains("msg"));
    }

    #[test]
    fn extracts_parent_ids() {
        let object = "tree abc\nparent def\nparent ghi\nauthor a <a@b> 0 +0000\n\nmsg\n";
        assert_eq!(parent_ids(object), vec!["def".to_string(), "ghi".to_string()]);
    }
}
