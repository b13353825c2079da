use thiserror::Error;
use tsugi_common::diagnostic::Diagnosable;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to authenticate with registry: {0}")]
    AuthenticationFailed(String),
    #[error("Unparsable auth challenge: {0}")]
    ChallengeUnparsable(String),
    #[error("Registry rejected the token (401)")]
    Unauthorized,
    #[error("Manifest not found: {0}")]
    ManifestNotFound(String),
    #[error("Registry response carried no Docker-Content-Digest header")]
    MissingDigestHeader,
    #[error("Unexpected registry status: {0}")]
    UnexpectedStatus(reqwest::StatusCode),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl Diagnosable for RegistryError {
    fn code(&self) -> String {
        match self {
            Self::AuthenticationFailed(_) => "REG_AUTH_FAILED",
            Self::ChallengeUnparsable(_) => "REG_CHALLENGE_UNPARSABLE",
            Self::Unauthorized => "REG_UNAUTHORIZED",
            Self::ManifestNotFound(_) => "REG_MANIFEST_MISSING",
            Self::MissingDigestHeader => "REG_DIGEST_HEADER_MISSING",
            Self::UnexpectedStatus(_) => "REG_UNEXPECTED_STATUS",
            Self::Network(_) => "REG_NETWORK_ERROR",
        }
        .to_string()
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Self::AuthenticationFailed(_) | Self::Unauthorized => {
                Some("Check the stored registry credentials for this host.".to_string())
            }
            Self::ManifestNotFound(_) => {
                Some("The image or tag might not exist. Check spelling.".to_string())
            }
            _ => None,
        }
    }
}
