use crate::update::{ImageUpdateRecord, RunPhase, UpdaterItem};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tsugi_common::Result;

/// Persistence for per-image check outcomes.
#[async_trait]
pub trait UpdateRecordStore: Send + Sync {
    /// Insert or overwrite the record for its image id.
    async fn upsert(&self, record: &ImageUpdateRecord) -> Result<()>;

    async fn get(&self, image_id: &str) -> Result<Option<ImageUpdateRecord>>;

    async fn list(&self) -> Result<Vec<ImageUpdateRecord>>;

    /// Records with `has_update = true`, the planner's input.
    async fn list_pending(&self) -> Result<Vec<ImageUpdateRecord>>;

    /// Idempotent: flips `has_update` off once the stale image is no longer
    /// referenced. A later check re-sets it if still genuinely outdated.
    async fn clear_update(&self, image_id: &str) -> Result<()>;

    async fn delete(&self, image_id: &str) -> Result<()>;

    /// Garbage-collect records for images that no longer exist locally.
    /// Returns the number of rows removed.
    async fn prune(&self, live_image_ids: &[String]) -> Result<u64>;
}

/// One persisted audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub run_id: String,
    pub phase: RunPhase,
    pub item: UpdaterItem,
    pub created_at: i64,
}

/// Append-only audit trail of apply runs.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, run_id: &str, phase: RunPhase, item: &UpdaterItem) -> Result<()>;

    /// Newest-first page of the audit history.
    async fn history(&self, limit: i64, offset: i64) -> Result<Vec<AuditEntry>>;
}
