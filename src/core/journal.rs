//! Append-only run journal with file-based persistence.
//!
//! Each run gets `<base>/<run_id>/events.jsonl`, one `RunRecord` per line.
//! The journal is diagnostic only: nothing reads it back during a run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;
use uuid::Uuid;

use crate::domain::{RecordType, RunRecord};

/// File-based journal for a single run
pub struct RunJournal {
    events_path: PathBuf,
}

impl RunJournal {
    /// Create or open the journal for `run_id` under `base_dir`
    pub async fn open(base_dir: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = base_dir.join(run_id.to_string());

        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        Ok(Self::at(&run_dir))
    }

    /// The journal of `run_id` if its directory exists. Never creates anything.
    pub async fn existing(base_dir: &Path, run_id: Uuid) -> Result<Option<Self>> {
        let run_dir = base_dir.join(run_id.to_string());
        let found = fs::try_exists(&run_dir)
            .await
            .with_context(|| format!("Failed to look up run directory: {}", run_dir.display()))?;

        Ok(found.then(|| Self::at(&run_dir)))
    }

    fn at(run_dir: &Path) -> Self {
        Self {
            events_path: run_dir.join("events.jsonl"),
        }
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Append a record to the log
    pub async fn append(&self, record: &RunRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!("Failed to open journal: {}", self.events_path.display())
            })?;

        let json = serde_json::to_string(record).context("Failed to serialize record")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write record")?;
        file.flush().await.context("Failed to flush record")?;

        Ok(())
    }

    /// Append a record, logging instead of failing.
    ///
    /// Journal trouble must never abort an analysis.
    pub async fn record(&self, record: RunRecord) {
        if let Err(e) = self.append(&record).await {
            warn!(
                path = %self.events_path.display(),
                error = %e,
                "Failed to write run journal"
            );
        }
    }

    /// Replay all records in order
    pub async fn replay(&self) -> Result<Vec<RunRecord>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open journal: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut records = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let record: RunRecord = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse record: {}", line))?;
            records.push(record);
        }

        Ok(records)
    }

    /// The last record of a specific type
    pub async fn last_of_type(&self, record_type: RecordType) -> Result<Option<RunRecord>> {
        let records = self.replay().await?;
        Ok(records.into_iter().rev().find(|r| r.record_type == record_type))
    }

    /// List all run IDs with a journal under `base_dir`
    pub async fn list_runs(base_dir: &Path) -> Result<Vec<Uuid>> {
        if !base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_replay_in_order() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let journal = RunJournal::open(temp.path(), run_id).await.unwrap();

        journal
            .append(&RunRecord::new(
                run_id,
                None,
                RecordType::RunStarted,
                NodeStatus::Running,
            ))
            .await
            .unwrap();
        for node in ["preprocess", "extract_claims", "detect_biases"] {
            journal
                .append(&RunRecord::new(
                    run_id,
                    Some(node.to_string()),
                    RecordType::NodeCompleted,
                    NodeStatus::Completed,
                ))
                .await
                .unwrap();
        }

        let records = journal.replay().await.unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].record_type, RecordType::RunStarted);
        assert_eq!(records[1].node.as_deref(), Some("preprocess"));
        assert_eq!(records[3].node.as_deref(), Some("detect_biases"));
        assert!(journal.events_path().ends_with("events.jsonl"));
    }

    #[tokio::test]
    async fn test_replay_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let journal = RunJournal::open(temp.path(), Uuid::new_v4()).await.unwrap();

        assert!(journal.replay().await.unwrap().is_empty());
        assert!(journal
            .last_of_type(RecordType::RunCompleted)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_runs_ignores_foreign_entries() {
        let temp = TempDir::new().unwrap();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        RunJournal::open(temp.path(), first).await.unwrap();
        RunJournal::open(temp.path(), second).await.unwrap();
        std::fs::create_dir(temp.path().join("not-a-run")).unwrap();
        std::fs::write(temp.path().join("README"), "x").unwrap();

        let mut runs = RunJournal::list_runs(temp.path()).await.unwrap();
        runs.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(runs, expected);
    }

    #[tokio::test]
    async fn test_existing_does_not_create_runs() {
        let temp = TempDir::new().unwrap();
        let unknown = Uuid::new_v4();

        assert!(RunJournal::existing(temp.path(), unknown)
            .await
            .unwrap()
            .is_none());
        assert!(RunJournal::list_runs(temp.path()).await.unwrap().is_empty());
        assert!(!temp.path().join(unknown.to_string()).exists());

        let known = Uuid::new_v4();
        let journal = RunJournal::open(temp.path(), known).await.unwrap();
        journal
            .append(&RunRecord::new(
                known,
                None,
                RecordType::RunStarted,
                NodeStatus::Running,
            ))
            .await
            .unwrap();

        let found = RunJournal::existing(temp.path(), known)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.events_path(), journal.events_path());
        assert_eq!(found.replay().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_runs_missing_dir() {
        let temp = TempDir::new().unwrap();
        let runs = RunJournal::list_runs(&temp.path().join("absent"))
            .await
            .unwrap();
        assert!(runs.is_empty());
    }
}
