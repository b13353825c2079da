use crate::image::normalize_registry_host;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tsugi_common::Result;

/// How a registry request was authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    Anonymous,
    Credential,
}

/// A stored registry credential. Owned by the registry-config collaborator;
/// read-only here. The token is base64-encoded at rest and decoded just
/// before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryCredential {
    pub url: String,
    pub username: String,
    pub encrypted_token: String,
    pub enabled: bool,
}

impl RegistryCredential {
    /// The normalized host this credential applies to.
    pub fn host(&self) -> String {
        normalize_registry_host(&self.url)
    }

    pub fn matches_host(&self, host: &str) -> bool {
        self.enabled && self.host() == normalize_registry_host(host)
    }

    /// Decode the at-rest token. Decoding happens at the call site of the
    /// token request, never earlier.
    pub fn decrypt_token(&self) -> Result<String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.encrypted_token)
            .map_err(|e| tsugi_common::diagnostic::Error::new(CredentialError(e.to_string())))?;
        String::from_utf8(bytes)
            .map_err(|e| tsugi_common::diagnostic::Error::new(CredentialError(e.to_string())))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Credential decode failed: {0}")]
pub struct CredentialError(String);

impl tsugi_common::diagnostic::Diagnosable for CredentialError {
    fn code(&self) -> String {
        "CRED_DECODE_FAILED".to_string()
    }
    fn suggestion(&self) -> Option<String> {
        Some("Re-save the registry credential; its stored token is not valid base64.".to_string())
    }
}

/// Read-only provider of stored registry credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn list_enabled(&self) -> Result<Vec<RegistryCredential>>;
}

/// Provider backed by a fixed list, used by the daemon (credentials come
/// from configuration) and by tests.
pub struct StaticCredentialProvider {
    credentials: Vec<RegistryCredential>,
}

impl StaticCredentialProvider {
    pub fn new(credentials: Vec<RegistryCredential>) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn list_enabled(&self) -> Result<Vec<RegistryCredential>> {
        Ok(self
            .credentials
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect())
    }
}
