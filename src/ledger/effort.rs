//! Cumulative remediation-effort counter, persisted as a one-field JSON
//! object. Load-modify-save scoped to the notification step; the file is the
//! sole source of truth.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Serialize, Deserialize)]
struct EffortState {
    #[serde(rename = "totalEffortMinutes", default)]
    total_effort_minutes: u64,
}

/// The tracker reports `"0min"` for some findings; the floor keeps the
/// cumulative tally from under-counting work that still takes review time.
pub fn apply_effort_floor(effort: &str) -> String {
    if effort == "0min" {
        "5min".to_string()
    } else {
        effort.to_string()
    }
}

/// Minutes from a free-text duration like `"15min"`.
pub fn parse_minutes(effort: &str) -> Option<u64> {
    effort.split("min").next()?.trim().parse().ok()
}

pub struct EffortLedger {
    path: PathBuf,
}

impl EffortLedger {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Current total, treating a missing or corrupt file as zero.
    pub fn load(&self) -> u64 {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str::<EffortState>(&content).ok())
            .map(|state| state.total_effort_minutes)
            .unwrap_or(0)
    }

    /// Add minutes to the persisted total and return the new value.
    pub fn record(&self, minutes: u64) -> Result<u64> {
        let total = self.load() + minutes;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let state = EffortState {
            total_effort_minutes: total,
        };
        fs::write(&self.path, serde_json::to_string_pretty(&state)?)?;
        Ok(total)
    }
}
