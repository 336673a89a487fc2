//! In-memory keyed job store.
//!
//! Records are partitioned across a fixed number of shards, each behind its
//! own `RwLock`. An update holds the owning shard's write lock for the whole
//! read-modify-write, so pollers never see a half-applied record and jobs on
//! different shards never contend.
//!
//! Records are never evicted; they live for the lifetime of the process.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::job::{JobRecord, JobState, JobUpdate};
use crate::types::JobId;

const SHARD_COUNT: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {0} already exists")]
    AlreadyExists(JobId),

    /// The record already reached `Succeeded` or `Failed`.
    #[error("job {0} is already terminal")]
    Terminal(JobId),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => CoreError::NotFound {
                entity: "Job",
                id: id.to_string(),
            },
            other => CoreError::Conflict(other.to_string()),
        }
    }
}

/// Concurrent job record holder shared by supervisors and pollers.
pub struct JobStore {
    shards: Vec<RwLock<HashMap<JobId, JobRecord>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, id: &JobId) -> &RwLock<HashMap<JobId, JobRecord>> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    /// Insert a new record. Ids are never reused, so an existing id is rejected.
    pub async fn create(&self, record: JobRecord) -> Result<(), StoreError> {
        let mut shard = self.shard(&record.id).write().await;
        if shard.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        shard.insert(record.id, record);
        Ok(())
    }

    /// Apply a partial update atomically and return the resulting record.
    ///
    /// A progress value lower than the stored one is dropped unless the
    /// update moves the job to `Failed`, which forces progress to 0.
    pub async fn update(&self, id: JobId, update: JobUpdate) -> Result<JobRecord, StoreError> {
        let mut shard = self.shard(&id).write().await;
        let record = shard.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if record.state.is_terminal() {
            return Err(StoreError::Terminal(id));
        }

        let failing = update.state == Some(JobState::Failed);

        if let Some(progress) = update.progress {
            let progress = progress.min(100);
            if failing || progress >= record.progress {
                record.progress = progress;
            }
        }
        if let Some(state) = update.state {
            record.state = state;
        }
        if let Some(status) = update.status_message {
            record.status_message = status;
        }
        if failing {
            record.error_detail = update.error_detail;
        }
        if let Some(files) = update.output_files {
            record.output_files = files;
        }
        record.updated_at = chrono::Utc::now();

        Ok(record.clone())
    }

    /// Snapshot of the record, or `None` for an unknown id.
    pub async fn get(&self, id: JobId) -> Option<JobRecord> {
        self.shard(&id).read().await.get(&id).cloned()
    }

    /// Total number of records across all shards.
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
