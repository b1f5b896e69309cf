//! Checkpoint persistence for provisioning runs
//!
//! Manages the `.deskflow/checkpoint.json` file which records every resource
//! a run has created, so that a restarted run resumes instead of
//! provisioning duplicates.

use crate::error::{CloudError, Result};
use crate::resource::ResourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const CHECKPOINT_VERSION: u32 = 1;
const CHECKPOINT_FILE: &str = "checkpoint.json";
const CHECKPOINT_BACKUP: &str = "checkpoint.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Inputs that identify a run; a checkpoint is only resumed when they match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInputs {
    pub source_image_id: String,
    pub directory_id: String,
    pub user_name: String,
    pub bundle_name: String,
}

/// Progress of one create-then-wait stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The create call returned an id; the resource may not be ready yet
    Submitted,
    /// The resource reached the available state
    Settled,
}

/// A resource created by the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub resource_id: String,
    pub status: StageStatus,
    pub idempotency_key: String,
    pub submitted_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    pub fn submitted(resource_id: impl Into<String>, idempotency_key: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            status: StageStatus::Submitted,
            idempotency_key: idempotency_key.into(),
            submitted_at: Utc::now(),
            settled_at: None,
        }
    }

    pub fn mark_settled(&mut self) {
        self.status = StageStatus::Settled;
        self.settled_at = Some(Utc::now());
    }

    pub fn is_settled(&self) -> bool {
        self.status == StageStatus::Settled
    }
}

/// Persisted state of one provisioning run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint file version
    pub version: u32,

    /// Identifier from which idempotency keys are derived
    pub run_id: String,

    pub inputs: RunInputs,

    pub started_at: DateTime<Utc>,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Created resources indexed by kind
    pub stages: BTreeMap<ResourceKind, StageRecord>,
}

impl Checkpoint {
    pub fn new(run_id: impl Into<String>, inputs: RunInputs) -> Self {
        let now = Utc::now();
        Self {
            version: CHECKPOINT_VERSION,
            run_id: run_id.into(),
            inputs,
            started_at: now,
            updated_at: now,
            stages: BTreeMap::new(),
        }
    }

    pub fn stage(&self, kind: ResourceKind) -> Option<&StageRecord> {
        self.stages.get(&kind)
    }

    /// Add or replace the record for a stage
    pub fn record(&mut self, kind: ResourceKind, record: StageRecord) {
        self.stages.insert(kind, record);
        self.updated_at = Utc::now();
    }

    pub fn mark_settled(&mut self, kind: ResourceKind) {
        if let Some(record) = self.stages.get_mut(&kind) {
            record.mark_settled();
            self.updated_at = Utc::now();
        }
    }

    /// Forget a stage so that a resumed run creates it again
    pub fn forget(&mut self, kind: ResourceKind) -> Option<StageRecord> {
        let result = self.stages.remove(&kind);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    /// Idempotency key for the create call of a stage
    pub fn idempotency_key(&self, kind: ResourceKind) -> String {
        format!("{}-{}", self.run_id, kind)
    }
}

/// Checkpoint manager for reading/writing checkpoint files
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// `dir` is the state directory itself (e.g. `./.deskflow`)
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
            tracing::debug!("Created state directory: {}", self.dir.display());
        }
        Ok(())
    }

    /// Load the current checkpoint, if any
    pub async fn load(&self) -> Result<Option<Checkpoint>> {
        let path = self.checkpoint_path();
        if !path.exists() {
            tracing::debug!("Checkpoint not found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let checkpoint: Checkpoint = serde_json::from_str(&content)?;

        if checkpoint.version > CHECKPOINT_VERSION {
            return Err(CloudError::StateError(format!(
                "Checkpoint version {} is newer than supported version {}",
                checkpoint.version, CHECKPOINT_VERSION
            )));
        }

        tracing::debug!(
            "Loaded checkpoint {} with {} stages",
            checkpoint.run_id,
            checkpoint.stages.len()
        );
        Ok(Some(checkpoint))
    }

    /// Save the checkpoint, keeping the previous one as a backup
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.checkpoint_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }

        let content = serde_json::to_string_pretty(checkpoint)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved checkpoint with {} stages", checkpoint.stages.len());
        Ok(())
    }

    /// Remove the checkpoint (the backup is kept for inspection)
    pub async fn clear(&self) -> Result<()> {
        let path = self.checkpoint_path();
        if path.exists() {
            let backup = self.backup_path();
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Cleared checkpoint");
        }
        Ok(())
    }

    /// Acquire a lock so that only one run uses this state directory
    pub async fn acquire_lock(&self) -> Result<CheckpointLock> {
        self.ensure_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Desktop waits alone can take hours, so a lock is stale only after a day
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 24 {
                return Err(CloudError::LockError(format!(
                    "State directory {} is locked by {} (pid {}) since {}",
                    self.dir.display(),
                    lock_info.holder,
                    lock_info.pid,
                    lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired checkpoint lock");
        Ok(CheckpointLock {
            lock_path,
            released: false,
        })
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the checkpoint lock
#[derive(Debug)]
pub struct CheckpointLock {
    lock_path: PathBuf,
    released: bool,
}

impl CheckpointLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released checkpoint lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for CheckpointLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
