use thiserror::Error;
use tsugi_common::diagnostic::Diagnosable;
use tsugi_infra_docker::DockerError;
use tsugi_infra_registry::RegistryError;

/// Per-unit error taxonomy. Every variant is captured into that unit's
/// result; a batch or apply run never aborts because of one unit.
#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("Malformed image reference: {0}")]
    Parse(String),
    #[error("No usable registry token: {0}")]
    Auth(String),
    #[error("Registry unreachable: {0}")]
    Network(String),
    #[error("Docker operation failed: {0}")]
    Daemon(String),
    #[error("Resource vanished between plan and apply: {0}")]
    NotFound(String),
}

impl Diagnosable for UpdaterError {
    fn code(&self) -> String {
        match self {
            Self::Parse(_) => "UPD_PARSE_ERROR",
            Self::Auth(_) => "UPD_AUTH_ERROR",
            Self::Network(_) => "UPD_NETWORK_ERROR",
            Self::Daemon(_) => "UPD_DAEMON_ERROR",
            Self::NotFound(_) => "UPD_NOT_FOUND",
        }
        .to_string()
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Self::Auth(_) => Some("Add or fix a registry credential for this host.".to_string()),
            Self::Network(_) => Some("The next scheduled check acts as the retry.".to_string()),
            _ => None,
        }
    }
}

impl From<RegistryError> for UpdaterError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::AuthenticationFailed(_)
            | RegistryError::ChallengeUnparsable(_)
            | RegistryError::Unauthorized => Self::Auth(e.to_string()),
            RegistryError::ManifestNotFound(r) => Self::NotFound(r),
            RegistryError::MissingDigestHeader
            | RegistryError::UnexpectedStatus(_)
            | RegistryError::Network(_) => Self::Network(e.to_string()),
        }
    }
}

impl From<DockerError> for UpdaterError {
    fn from(e: DockerError) -> Self {
        match e {
            DockerError::NotFound(r) => Self::NotFound(r),
            other => Self::Daemon(other.to_string()),
        }
    }
}

impl From<tsugi_domain::image::ParseRefError> for UpdaterError {
    fn from(e: tsugi_domain::image::ParseRefError) -> Self {
        Self::Parse(e.0)
    }
}
