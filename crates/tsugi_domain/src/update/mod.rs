use crate::credential::AuthMethod;
use crate::image::ImageRef;
use serde::{Deserialize, Serialize};

/// What kind of update was detected. Digest comparison is the primary
/// mechanism; tag updates are a best-effort heuristic on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Digest,
    Tag,
}

/// Outcome of a single remote check, as produced by the checker and
/// persisted into an [`ImageUpdateRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub has_update: bool,
    pub update_type: Option<UpdateType>,
    pub current_digest: String,
    pub latest_digest: String,
    pub latest_version: Option<String>,
    /// Unix timestamp of the check.
    pub check_time: i64,
    pub response_time_ms: i64,
    pub auth_method: AuthMethod,
    pub auth_username: Option<String>,
    pub auth_registry: Option<String>,
    pub used_credential: bool,
    pub error: Option<String>,
}

impl CheckResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            has_update: false,
            update_type: None,
            current_digest: String::new(),
            latest_digest: String::new(),
            latest_version: None,
            check_time: time::OffsetDateTime::now_utc().unix_timestamp(),
            response_time_ms: 0,
            auth_method: AuthMethod::None,
            auth_username: None,
            auth_registry: None,
            used_credential: false,
            error: Some(error.into()),
        }
    }
}

/// Persisted check outcome, keyed by the local Docker image id. At most one
/// row per image id; every check overwrites (last write wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUpdateRecord {
    pub image_id: String,
    pub repository: String,
    pub tag: String,
    pub has_update: bool,
    pub update_type: Option<UpdateType>,
    pub current_digest: String,
    pub latest_digest: String,
    pub latest_version: Option<String>,
    pub check_time: i64,
    pub response_time_ms: i64,
    pub auth_method: AuthMethod,
    pub auth_username: Option<String>,
    pub auth_registry: Option<String>,
    pub used_credential: bool,
    pub last_error: Option<String>,
}

impl ImageUpdateRecord {
    pub fn from_check(image_id: impl Into<String>, reference: &ImageRef, check: &CheckResult) -> Self {
        Self {
            image_id: image_id.into(),
            repository: reference.repository.clone(),
            tag: reference.tag.clone(),
            has_update: check.has_update,
            update_type: check.update_type,
            current_digest: check.current_digest.clone(),
            latest_digest: check.latest_digest.clone(),
            latest_version: check.latest_version.clone(),
            check_time: check.check_time,
            response_time_ms: check.response_time_ms,
            auth_method: check.auth_method,
            auth_username: check.auth_username.clone(),
            auth_registry: check.auth_registry.clone(),
            used_credential: check.used_credential,
            last_error: check.error.clone(),
        }
    }
}

/// One planned pull, built per apply run.
///
/// `old_image_ids` is captured before the pull: pulling can silently move
/// the tag's local digest, after which container matching by image id would
/// come up empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub old_ref: ImageRef,
    pub new_ref: ImageRef,
    pub old_image_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Run,
    Image,
    Container,
    Stack,
}

/// User-visible outcome of one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Checked,
    Updated,
    Skipped,
    Failed,
    UpToDate,
    UpdateAvailable,
}

/// Apply-run phases, tagged onto audit entries for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Start,
    ImagePull,
    Container,
    Stack,
    Complete,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ImagePull => "image_pull",
            Self::Container => "container",
            Self::Stack => "stack",
            Self::Complete => "complete",
        }
    }
}

/// Append-only audit entry: one row per unit of work per run, never
/// mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterItem {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub resource_name: String,
    pub status: ItemStatus,
    pub old_images: Vec<String>,
    pub new_images: Vec<String>,
    pub error: Option<String>,
    pub update_applied: bool,
}

impl UpdaterItem {
    pub fn new(
        resource_type: ResourceType,
        resource_id: impl Into<String>,
        resource_name: impl Into<String>,
        status: ItemStatus,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_type,
            resource_name: resource_name.into(),
            status,
            old_images: Vec::new(),
            new_images: Vec::new(),
            error: None,
            update_applied: false,
        }
    }

    pub fn with_images(mut self, old: Vec<String>, new: Vec<String>) -> Self {
        self.old_images = old;
        self.new_images = new;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn applied(mut self) -> Self {
        self.update_applied = true;
        self
    }
}

/// Run-level result. Always returned, never thrown: per-unit failures are
/// folded into `failed` and the item list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub checked: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<UpdaterItem>,
    pub duration_ms: i64,
}

impl RunSummary {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            checked: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            items: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn push(&mut self, item: UpdaterItem) {
        match item.status {
            ItemStatus::Updated => self.updated += 1,
            ItemStatus::Skipped => self.skipped += 1,
            ItemStatus::Failed => self.failed += 1,
            _ => self.checked += 1,
        }
        self.items.push(item);
    }
}
