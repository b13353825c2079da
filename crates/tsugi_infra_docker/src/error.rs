use thiserror::Error;
use tsugi_common::diagnostic::Diagnosable;

#[derive(Debug, Error)]
pub enum DockerError {
    #[error("Docker resource not found: {0}")]
    NotFound(String),
    #[error("Docker API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Network error talking to the Docker daemon: {0}")]
    Network(#[from] reqwest::Error),
}

impl DockerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Diagnosable for DockerError {
    fn code(&self) -> String {
        match self {
            Self::NotFound(_) => "DOCKER_NOT_FOUND",
            Self::Api { .. } => "DOCKER_API_ERROR",
            Self::Network(_) => "DOCKER_UNREACHABLE",
        }
        .to_string()
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Self::Network(_) => {
                Some("Check that the Docker daemon is running and DOCKER_HOST is correct.".to_string())
            }
            _ => None,
        }
    }
}
