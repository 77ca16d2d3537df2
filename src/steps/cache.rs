//! Persisted element-id → description cache.
//!
//! `lookup` is a read with a side effect: every hit bumps `counter` and
//! persists it before returning. `store` upserts; a new record starts at
//! `counter = 1`, an existing record keeps its counter and only has its
//! name and description replaced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::errors::{ScribeError, ScribeResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub element_id: String,
    pub name: String,
    pub description: String,
    pub counter: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The only mutation points on the step store.
#[async_trait]
pub trait StepCache: Send + Sync {
    /// Fetch a record, incrementing and persisting its counter on a hit.
    async fn lookup(&self, element_id: &str) -> ScribeResult<Option<StepRecord>>;

    /// Insert or overwrite the record for `element_id`.
    async fn store(&self, element_id: &str, name: &str, description: &str) -> ScribeResult<StepRecord>;
}

/// On-disk layout: `{"steps": {<element_id>: StepRecord}}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    steps: BTreeMap<String, StepRecord>,
}

/// JSON-file store. Every operation reads the file, mutates, and writes it
/// back through a temp file + rename, all under one async mutex so
/// concurrent requests never interleave a read-modify-write.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> ScribeResult<StoreFile> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(StoreFile::default()),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| ScribeError::Store(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, file: &StoreFile) -> ScribeResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StepCache for JsonFileStore {
    async fn lookup(&self, element_id: &str) -> ScribeResult<Option<StepRecord>> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        let Some(record) = file.steps.get_mut(element_id) else {
            return Ok(None);
        };
        record.counter += 1;
        let hit = record.clone();
        self.write(&file).await?;
        tracing::debug!(element_id, counter = hit.counter, "step cache hit");
        Ok(Some(hit))
    }

    async fn store(&self, element_id: &str, name: &str, description: &str) -> ScribeResult<StepRecord> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        let counter = file.steps.get(element_id).map(|r| r.counter).unwrap_or(1);
        let record = StepRecord {
            element_id: element_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            counter,
            updated_at: Some(Utc::now()),
        };
        file.steps.insert(element_id.to_string(), record.clone());
        self.write(&file).await?;
        tracing::info!(element_id, counter, path = %self.path.display(), "step stored");
        Ok(record)
    }
}
