use anyhow::Context;
use std::time::Duration;
use tsugi_domain::credential::RegistryCredential;

/// Daemon configuration, read once at startup from `TSUGID_*` environment
/// variables. Every value has a development-friendly default.
pub struct Settings {
    pub bind: String,
    pub database_url: String,
    pub docker_host: String,
    pub concurrency: usize,
    pub http_timeout: Duration,
    pub credentials_file: Option<String>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let concurrency = match std::env::var("TSUGID_CONCURRENCY") {
            Ok(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("TSUGID_CONCURRENCY is not a number: {}", raw))?,
            Err(_) => 8,
        };

        // Every outbound registry and engine request is bounded by this, so
        // one hung registry cannot pin a check worker for the whole run.
        let http_timeout = match std::env::var("TSUGID_HTTP_TIMEOUT") {
            Ok(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .with_context(|| format!("TSUGID_HTTP_TIMEOUT is not a number: {}", raw))?,
            ),
            Err(_) => Duration::from_secs(30),
        };

        Ok(Self {
            bind: env_or("TSUGID_BIND", "127.0.0.1:7070"),
            database_url: env_or("TSUGID_DB", "sqlite://tsugi.db?mode=rwc"),
            docker_host: env_or("TSUGID_DOCKER_HOST", "http://localhost:2375"),
            concurrency,
            http_timeout,
            credentials_file: std::env::var("TSUGID_CREDENTIALS_FILE").ok(),
        })
    }

    /// Stored registry credentials, a JSON array in the file named by
    /// `TSUGID_CREDENTIALS_FILE`. None configured means anonymous only.
    pub fn load_credentials(&self) -> anyhow::Result<Vec<RegistryCredential>> {
        let Some(path) = &self.credentials_file else {
            return Ok(vec![]);
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading credentials file {}", path))?;
        let credentials: Vec<RegistryCredential> =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path))?;
        Ok(credentials)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
