//! Job definitions for the background queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default maximum number of attempts before a job is dead-lettered.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// The work a job carries.
///
/// Every variant is idempotent under re-execution: dataset builds overwrite
/// their artifacts and re-derive the status, sweeps converge on the same
/// state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobKind {
    /// Build the feature/target dataset of one DataFrame specification.
    BuildDataset {
        tenant: String,
        dataframe_id: i64,
        /// Reduction method names as supplied by the caller.
        methods: Vec<String>,
        /// Explicit product selection; `None` resolves candidates from the
        /// specification.
        product_ids: Option<Vec<i64>>,
    },
    /// Synchronize the status of all active runs across tenants.
    SyncRunStatus,
    /// Import the orchestrator's template catalog into every tenant.
    SyncCatalog,
}

impl JobKind {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::BuildDataset { .. } => "build_dataset",
            JobKind::SyncRunStatus => "sync_run_status",
            JobKind::SyncCatalog => "sync_catalog",
        }
    }
}

/// A queued unit of work with retry bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub created_at: DateTime<Utc>,
    /// Number of times this job has been attempted.
    pub attempts: u32,
    /// Attempts allowed before the job moves to the dead letter queue.
    pub max_attempts: u32,
}

impl Job {
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            created_at: Utc::now(),
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Called before each execution attempt.
    pub fn increment_attempts(&mut self) {
        self.attempts += 1;
    }

    pub fn should_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }
}
