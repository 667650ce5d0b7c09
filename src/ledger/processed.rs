//! Persisted list of findings a review request has already been produced
//! for. Whole-file read-modify-write; single-writer operation only.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub key: String,
    #[serde(rename = "processedDate")]
    pub processed_date: String,
    #[serde(default)]
    pub assignee: String,
    #[serde(rename = "prUrl")]
    pub review_url: String,
    pub status: String,
    #[serde(default)]
    pub component: String,
}

pub struct ProcessedLedger {
    path: PathBuf,
}

impl ProcessedLedger {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// All records, treating a missing or corrupt file as empty.
    pub fn load(&self) -> Vec<ProcessedRecord> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "Ledger unreadable, treating as empty");
            Vec::new()
        })
    }

    /// The "already handled" key set computed at discovery time.
    pub fn processed_keys(&self) -> HashSet<String> {
        self.load().into_iter().map(|r| r.key).collect()
    }

    /// Append one record and rewrite the file wholesale.
    pub fn append(&self, record: ProcessedRecord) -> Result<()> {
        let mut records = self.load();
        records.push(record);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&records)?)?;
        Ok(())
    }

    /// Truncate the ledger to an empty list.
    pub fn reset(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, "[]")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str) -> ProcessedRecord {
        ProcessedRecord {
            key: key.to_string(),
            processed_date: "2026-08-28T12:00:00+08:00".to_string(),
            assignee: "guid-1".to_string(),
            review_url: "https://review.example.com/pullrequest/7".to_string(),
            status: "completed".to_string(),
            component: "proj:src/Main.java".to_string(),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = ProcessedLedger::new(&tmp.path().join("ledger.json"));
        assert!(ledger.load().is_empty());
        assert!(ledger.processed_keys().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(ProcessedLedger::new(&path).load().is_empty());
    }

    #[test]
    fn test_append_accumulates_records() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = ProcessedLedger::new(&tmp.path().join("ledger.json"));

        ledger.append(record("AB-1")).unwrap();
        ledger.append(record("AB-2")).unwrap();

        let keys = ledger.processed_keys();
        assert!(keys.contains("AB-1"));
        assert!(keys.contains("AB-2"));
        assert_eq!(ledger.load().len(), 2);
    }

    #[test]
    fn test_records_use_wire_field_names() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.json");
        ProcessedLedger::new(&path).append(record("AB-1")).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"processedDate\""));
        assert!(raw.contains("\"prUrl\""));
    }

    #[test]
    fn test_reset_truncates() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = ProcessedLedger::new(&tmp.path().join("ledger.json"));
        ledger.append(record("AB-1")).unwrap();
        ledger.reset().unwrap();
        assert!(ledger.load().is_empty());
    }
}
