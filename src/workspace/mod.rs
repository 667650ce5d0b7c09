pub mod git;

use std::path::Path;

use chrono::{DateTime, Local};

/// Whether `path` contains a version-control root.
pub fn has_vcs_root(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Working-branch name for a finding: `fix-<key>-<timestamp>`.
///
/// The key is sanitized for ref syntax and the timestamp suffix keeps
/// repeated runs against the same finding from colliding.
pub fn branch_name_for(finding_key: &str, now: DateTime<Local>) -> String {
    let clean_key = finding_key.replace([':', '/'], "-");
    format!("fix-{clean_key}-{}", now.format("%Y%m%d%H%M%S"))
}
