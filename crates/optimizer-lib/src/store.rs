//! Audit record persistence
//!
//! Records are append-only and keyed by (instance id, timestamp). A second
//! write for an existing key is rejected rather than overwriting history.

use crate::models::AuditRecord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Durable sink for audit records
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn put_record(&self, record: &AuditRecord) -> Result<()>;
}

/// Audit store backed by an in-process vector
#[derive(Default)]
pub struct InMemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn put_record(&self, record: &AuditRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        if records.iter().any(|r| r.key() == record.key()) {
            anyhow::bail!(
                "audit record already exists for {} at {}",
                record.instance_id,
                record.timestamp
            );
        }
        records.push(record.clone());
        Ok(())
    }
}

struct FileState {
    keys: HashSet<(String, String)>,
}

/// Audit store writing one JSON document per line to `<dir>/<table>.jsonl`
pub struct FileAuditStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileAuditStore {
    /// Open (or create) the table file and index the keys already written
    pub async fn open(dir: impl AsRef<Path>, table_name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create audit directory {:?}", dir))?;

        let path = dir.join(format!("{}.jsonl", table_name));
        let mut keys = HashSet::new();

        if fs::try_exists(&path).await.unwrap_or(false) {
            for record in read_records(&path).await? {
                keys.insert((record.instance_id, record.timestamp));
            }
        }

        info!(path = ?path, existing_records = keys.len(), "Opened audit table");

        Ok(Self {
            path,
            state: Mutex::new(FileState { keys }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record in write order
    pub async fn records(&self) -> Result<Vec<AuditRecord>> {
        let _guard = self.state.lock().await;
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        read_records(&self.path).await
    }
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn put_record(&self, record: &AuditRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        let key = (record.instance_id.clone(), record.timestamp.clone());
        if state.keys.contains(&key) {
            anyhow::bail!(
                "audit record already exists for {} at {}",
                record.instance_id,
                record.timestamp
            );
        }

        let mut line = serde_json::to_string(record).context("Failed to serialize audit record")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open audit table {:?}", self.path))?;
        file.write_all(line.as_bytes())
            .await
            .context("Failed to append audit record")?;
        file.flush().await.context("Failed to flush audit table")?;

        state.keys.insert(key);
        debug!(instance_id = %record.instance_id, timestamp = %record.timestamp, "Audit record written");
        Ok(())
    }
}

async fn read_records(path: &Path) -> Result<Vec<AuditRecord>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read audit table {:?}", path))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Corrupt audit record at line {}", i + 1))
        })
        .collect()
}
