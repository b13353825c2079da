use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use tracing::info;
use tsugi_common::Result;
use tsugi_domain::credential::AuthMethod;
use tsugi_domain::store::{AuditEntry, AuditStore, UpdateRecordStore};
use tsugi_domain::update::{ImageUpdateRecord, RunPhase, UpdateType, UpdaterItem};

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS image_update_records (
                image_id TEXT PRIMARY KEY,
                repository TEXT NOT NULL,
                tag TEXT NOT NULL,
                has_update INTEGER NOT NULL,
                update_type TEXT,
                current_digest TEXT NOT NULL,
                latest_digest TEXT NOT NULL,
                latest_version TEXT,
                check_time INTEGER NOT NULL,
                response_time_ms INTEGER NOT NULL,
                auth_method TEXT NOT NULL,
                auth_username TEXT,
                auth_registry TEXT,
                used_credential INTEGER NOT NULL,
                last_error TEXT
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS updater_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                phase TEXT NOT NULL,
                item JSON NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )
        .execute(&pool)
        .await?;

        info!("SQLite store initialized at {}", database_url);

        Ok(Self { pool })
    }

    fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> ImageUpdateRecord {
        ImageUpdateRecord {
            image_id: row.get("image_id"),
            repository: row.get("repository"),
            tag: row.get("tag"),
            has_update: row.get::<i64, _>("has_update") != 0,
            update_type: parse_update_type(row.get::<Option<String>, _>("update_type").as_deref()),
            current_digest: row.get("current_digest"),
            latest_digest: row.get("latest_digest"),
            latest_version: row.get("latest_version"),
            check_time: row.get("check_time"),
            response_time_ms: row.get("response_time_ms"),
            auth_method: parse_auth_method(&row.get::<String, _>("auth_method")),
            auth_username: row.get("auth_username"),
            auth_registry: row.get("auth_registry"),
            used_credential: row.get::<i64, _>("used_credential") != 0,
            last_error: row.get("last_error"),
        }
    }
}

fn update_type_str(t: Option<UpdateType>) -> Option<&'static str> {
    t.map(|t| match t {
        UpdateType::Digest => "digest",
        UpdateType::Tag => "tag",
    })
}

fn parse_update_type(s: Option<&str>) -> Option<UpdateType> {
    match s {
        Some("digest") => Some(UpdateType::Digest),
        Some("tag") => Some(UpdateType::Tag),
        _ => None,
    }
}

fn auth_method_str(m: AuthMethod) -> &'static str {
    match m {
        AuthMethod::None => "none",
        AuthMethod::Anonymous => "anonymous",
        AuthMethod::Credential => "credential",
    }
}

fn parse_auth_method(s: &str) -> AuthMethod {
    match s {
        "anonymous" => AuthMethod::Anonymous,
        "credential" => AuthMethod::Credential,
        _ => AuthMethod::None,
    }
}

fn parse_phase(s: &str) -> RunPhase {
    match s {
        "start" => RunPhase::Start,
        "image_pull" => RunPhase::ImagePull,
        "container" => RunPhase::Container,
        "stack" => RunPhase::Stack,
        _ => RunPhase::Complete,
    }
}

#[async_trait]
impl UpdateRecordStore for SqliteStore {
    async fn upsert(&self, record: &ImageUpdateRecord) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO image_update_records (
                image_id, repository, tag, has_update, update_type,
                current_digest, latest_digest, latest_version, check_time,
                response_time_ms, auth_method, auth_username, auth_registry,
                used_credential, last_error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.image_id)
        .bind(&record.repository)
        .bind(&record.tag)
        .bind(record.has_update as i64)
        .bind(update_type_str(record.update_type))
        .bind(&record.current_digest)
        .bind(&record.latest_digest)
        .bind(&record.latest_version)
        .bind(record.check_time)
        .bind(record.response_time_ms)
        .bind(auth_method_str(record.auth_method))
        .bind(&record.auth_username)
        .bind(&record.auth_registry)
        .bind(record.used_credential as i64)
        .bind(&record.last_error)
        .execute(&self.pool)
        .await
        .map_err(|e| tsugi_common::diagnostic::Error::new(DbError(e)))?;

        Ok(())
    }

    async fn get(&self, image_id: &str) -> Result<Option<ImageUpdateRecord>> {
        let row = sqlx::query("SELECT * FROM image_update_records WHERE image_id = ?")
            .bind(image_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| tsugi_common::diagnostic::Error::new(DbError(e)))?;

        Ok(row.as_ref().map(Self::record_from_row))
    }

    async fn list(&self) -> Result<Vec<ImageUpdateRecord>> {
        let rows = sqlx::query("SELECT * FROM image_update_records ORDER BY check_time DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| tsugi_common::diagnostic::Error::new(DbError(e)))?;

        Ok(rows.iter().map(Self::record_from_row).collect())
    }

    async fn list_pending(&self) -> Result<Vec<ImageUpdateRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM image_update_records WHERE has_update = 1 ORDER BY check_time DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| tsugi_common::diagnostic::Error::new(DbError(e)))?;

        Ok(rows.iter().map(Self::record_from_row).collect())
    }

    async fn clear_update(&self, image_id: &str) -> Result<()> {
        sqlx::query("UPDATE image_update_records SET has_update = 0 WHERE image_id = ?")
            .bind(image_id)
            .execute(&self.pool)
            .await
            .map_err(|e| tsugi_common::diagnostic::Error::new(DbError(e)))?;

        Ok(())
    }

    async fn delete(&self, image_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM image_update_records WHERE image_id = ?")
            .bind(image_id)
            .execute(&self.pool)
            .await
            .map_err(|e| tsugi_common::diagnostic::Error::new(DbError(e)))?;

        Ok(())
    }

    async fn prune(&self, live_image_ids: &[String]) -> Result<u64> {
        let result = if live_image_ids.is_empty() {
            sqlx::query("DELETE FROM image_update_records")
                .execute(&self.pool)
                .await
        } else {
            let placeholders = vec!["?"; live_image_ids.len()].join(", ");
            let sql = format!(
                "DELETE FROM image_update_records WHERE image_id NOT IN ({})",
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for id in live_image_ids {
                query = query.bind(id);
            }
            query.execute(&self.pool).await
        }
        .map_err(|e| tsugi_common::diagnostic::Error::new(DbError(e)))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn append(&self, run_id: &str, phase: RunPhase, item: &UpdaterItem) -> Result<()> {
        let item_json = serde_json::to_string(item)
            .map_err(|e| tsugi_common::diagnostic::Error::new(SerializationError(e)))?;

        sqlx::query(
            "INSERT INTO updater_audit (run_id, phase, item, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(phase.as_str())
        .bind(item_json)
        .bind(time::OffsetDateTime::now_utc().unix_timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| tsugi_common::diagnostic::Error::new(DbError(e)))?;

        Ok(())
    }

    async fn history(&self, limit: i64, offset: i64) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT run_id, phase, item, created_at FROM updater_audit
             ORDER BY id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| tsugi_common::diagnostic::Error::new(DbError(e)))?;

        let mut entries = Vec::new();
        for row in rows {
            let item_str: String = row.get("item");
            let item: UpdaterItem = serde_json::from_str(&item_str)
                .map_err(|e| tsugi_common::diagnostic::Error::new(SerializationError(e)))?;
            entries.push(AuditEntry {
                run_id: row.get("run_id"),
                phase: parse_phase(&row.get::<String, _>("phase")),
                item,
                created_at: row.get("created_at"),
            });
        }

        Ok(entries)
    }
}

// Map sqlx errors to our Diagnosable error
#[derive(Debug, thiserror::Error)]
#[error("Database error: {0}")]
struct DbError(#[from] sqlx::Error);

impl tsugi_common::diagnostic::Diagnosable for DbError {
    fn code(&self) -> String {
        "DB_ERROR".to_string()
    }
    fn suggestion(&self) -> Option<String> {
        Some("Check database connection or query syntax".to_string())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Serialization error: {0}")]
struct SerializationError(#[from] serde_json::Error);

impl tsugi_common::diagnostic::Diagnosable for SerializationError {
    fn code(&self) -> String {
        "DB_SERIALIZATION_ERROR".to_string()
    }
    fn suggestion(&self) -> Option<String> {
        Some("Check data integrity".to_string())
    }
}
