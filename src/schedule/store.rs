//! Durable storage for scheduled entries
//!
//! Persistence is best-effort: the scheduler's in-memory table stays
//! authoritative for the current run, and store failures are logged as
//! warnings by the caller, never escalated.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// One persisted scheduled entry (the durable record format)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Execution time formatted as `YYYY-MM-DDThh:mm`
    pub exec_time: String,

    /// Maximum lateness in minutes before the entry is discarded
    pub grace_period_in_minutes: u32,

    /// Always true for stored records; kept for wire compatibility
    pub persist_after_reboot: bool,

    /// Wire name of the repeat policy
    pub repeat_policy: String,

    /// The payload's own JSON encoding
    pub event: String,
}

/// Storage trait for scheduled entries
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Load all persisted entries
    async fn load(&self) -> Result<Vec<StoredEntry>>;

    /// Append one entry
    async fn append(&self, entry: &StoredEntry) -> Result<()>;

    /// Remove the first entry equal to `entry`; absent entries are a no-op
    async fn remove(&self, entry: &StoredEntry) -> Result<()>;
}

// ============================================================================
// File-based Store
// ============================================================================

/// File-based schedule store
///
/// Persists entries as one JSON list on disk. Writes are atomic via a
/// temp file + rename; the file is created empty when missing.
pub struct FileScheduleStore {
    path: PathBuf,
}

impl FileScheduleStore {
    /// Create a file-based store at the given path
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if !path.exists() {
            let empty: Vec<StoredEntry> = Vec::new();
            let json = serde_json::to_string_pretty(&empty)?;
            fs::write(&path, json).await?;
        }

        Ok(Self { path })
    }

    /// The file path backing this store
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_all(&self) -> Result<Vec<StoredEntry>> {
        let content = fs::read_to_string(&self.path).await?;
        let entries: Vec<StoredEntry> = serde_json::from_str(&content)?;
        Ok(entries)
    }

    async fn save_all(&self, entries: &[StoredEntry]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;

        // Write atomically
        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &self.path).await?;

        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for FileScheduleStore {
    async fn load(&self) -> Result<Vec<StoredEntry>> {
        self.load_all().await
    }

    async fn append(&self, entry: &StoredEntry) -> Result<()> {
        let mut entries = self.load_all().await?;
        entries.push(entry.clone());
        self.save_all(&entries).await
    }

    async fn remove(&self, entry: &StoredEntry) -> Result<()> {
        let mut entries = self.load_all().await?;
        match entries.iter().position(|e| e == entry) {
            Some(index) => {
                entries.remove(index);
                self.save_all(&entries).await
            }
            None => {
                tracing::warn!(exec_time = %entry.exec_time, "Persisted entry to remove was not found");
                Ok(())
            }
        }
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// In-memory schedule store for tests and volatile runs
#[derive(Default)]
pub struct MemoryScheduleStore {
    entries: RwLock<Vec<StoredEntry>>,
}

impl MemoryScheduleStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn load(&self) -> Result<Vec<StoredEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.clone())
    }

    async fn append(&self, entry: &StoredEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.push(entry.clone());
        Ok(())
    }

    async fn remove(&self, entry: &StoredEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(index) = entries.iter().position(|e| e == entry) {
            entries.remove(index);
        }
        Ok(())
    }
}
