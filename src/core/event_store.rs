//! Append-only run log with file-based persistence.
//!
//! Events are stored as newline-delimited JSON (JSONL) for simplicity
//! and easy debugging/inspection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{Eid, Event, PendingTransaction};

/// File-based event store using JSONL format
pub struct EventStore {
    /// Directory containing the run
    run_dir: PathBuf,

    /// Path to the events.jsonl file
    events_path: PathBuf,
}

impl EventStore {
    /// Create or open the event store for a run (~/.omniwire/runs/<run_id>)
    pub async fn open(run_id: Uuid) -> Result<Self> {
        let base_dir = Self::base_directory()?;
        Self::open_in(&base_dir, run_id).await
    }

    /// Create or open the event store for a run below `base_dir`
    pub async fn open_in(base_dir: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = base_dir.join(run_id.to_string());

        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        let events_path = run_dir.join("events.jsonl");

        Ok(Self { run_dir, events_path })
    }

    /// Get the base directory for all runs (~/.omniwire/runs or $OMNIWIRE_HOME/runs)
    pub fn base_directory() -> Result<PathBuf> {
        crate::config::runs_dir()
    }

    /// Get the path to the events file
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Get the run directory
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event =
                serde_json::from_str(&line).with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// List all run IDs in the base directory
    pub async fn list_runs() -> Result<Vec<Uuid>> {
        let base_dir = Self::base_directory()?;
        Self::list_runs_in(&base_dir).await
    }

    /// List all run IDs below `base_dir`
    pub async fn list_runs_in(base_dir: &Path) -> Result<Vec<Uuid>> {
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

/// Generate an idempotency key for a transaction
pub fn generate_idempotency_key(run_id: Uuid, eid: Eid, data_hash: &str) -> String {
    format!("{}:{}:{}", run_id, eid, data_hash)
}

/// Idempotency key of a pending transaction within a run
pub fn transaction_key(run_id: Uuid, transaction: &PendingTransaction) -> String {
    generate_idempotency_key(run_id, transaction.eid(), &transaction.data_hash())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventType, Status};
    use tempfile::TempDir;

    // Helper to create a test event store in a temp directory
    async fn create_test_store() -> (EventStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = EventStore::open_in(temp_dir.path(), Uuid::new_v4()).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_event_append_and_replay() {
        let (store, _temp) = create_test_store().await;
        let run_id = Uuid::new_v4();

        let event1 = Event::new(
            run_id,
            None,
            EventType::RunStarted,
            format!("{}:start", run_id),
            "Run started".to_string(),
            Status::Running,
        );

        let event2 = Event::new(
            run_id,
            Some(Eid(101)),
            EventType::TransactionConfirmed,
            format!("{}:101:abc", run_id),
            "Set default send library".to_string(),
            Status::Completed,
        );

        store.append(&event1).await.unwrap();
        store.append(&event2).await.unwrap();

        let events = store.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::RunStarted);
        assert_eq!(events[1].event_type, EventType::TransactionConfirmed);
    }

    #[test]
    fn test_idempotency_key_format() {
        let run_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let key = generate_idempotency_key(run_id, Eid(30101), "0011223344556677");

        assert_eq!(key, "550e8400-e29b-41d4-a716-446655440000:30101:0011223344556677");
    }
}
