//! On-disk records of past runs.
//!
//! One directory per run under `~/.jobmux/jobs/<uuid>/`, holding a
//! `meta.json`. Records are best-effort bookkeeping: the session itself
//! never depends on them.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub job_id: String,
    pub command: String,
    pub started_at: u64,
    pub ended_at: Option<u64>,
    pub exit_code: Option<i32>,
}

pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    pub fn new() -> Result<Self> {
        let home = std::env::var("HOME").map_err(|_| anyhow!("HOME not set"))?;
        Ok(Self::at(Path::new(&home).join(".jobmux").join("jobs")))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn meta_path(&self, id: Uuid) -> PathBuf {
        self.record_dir(id).join("meta.json")
    }

    pub fn create(&self, job_id: &str, command: &str) -> Result<JobRecord> {
        let record = JobRecord {
            id: Uuid::new_v4(),
            job_id: job_id.to_string(),
            command: command.to_string(),
            started_at: now_epoch(),
            ended_at: None,
            exit_code: None,
        };
        fs::create_dir_all(self.record_dir(record.id))?;
        self.write(&record)?;
        Ok(record)
    }

    pub fn write(&self, record: &JobRecord) -> Result<()> {
        let data = serde_json::to_vec_pretty(record)?;
        fs::write(self.meta_path(record.id), data)?;
        Ok(())
    }

    pub fn load(&self, id: Uuid) -> Result<JobRecord> {
        let data = fs::read(self.meta_path(id))?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn finish(&self, record: &mut JobRecord, exit_code: i32) -> Result<()> {
        record.ended_at = Some(now_epoch());
        record.exit_code = Some(exit_code);
        self.write(record)
    }

    pub fn list(&self) -> Result<Vec<JobRecord>> {
        let mut records = Vec::new();
        if !self.root.exists() {
            return Ok(records);
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let meta_path = entry.path().join("meta.json");
            if let Ok(data) = fs::read(&meta_path) {
                if let Ok(record) = serde_json::from_slice::<JobRecord>(&data) {
                    records.push(record);
                }
            }
        }
        records.sort_by_key(|record| record.started_at);
        Ok(records)
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::at(dir.path());

        let mut record = store.create("job-1", "sleep 1").unwrap();
        store.finish(&mut record, 0).unwrap();

        let loaded = store.load(record.id).unwrap();
        assert_eq!(loaded.job_id, "job-1");
        assert_eq!(loaded.exit_code, Some(0));
        assert!(loaded.ended_at.is_some());
    }

    #[test]
    fn lists_records_in_start_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::at(dir.path());

        store.create("job-a", "true").unwrap();
        store.create("job-b", "false").unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn missing_root_lists_empty() {
        let store = JobStore::at("/nonexistent/jobmux-test");
        assert!(store.list().unwrap().is_empty());
    }
}
