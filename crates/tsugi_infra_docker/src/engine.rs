use crate::error::DockerError;
use crate::v1_45::{ContainerInspect, ContainerSummary, ImageInspect, ImageSummary};
use async_trait::async_trait;

/// The slice of the Engine API the updater needs, behind a trait so the
/// engine can be faked in tests.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, DockerError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect, DockerError>;

    async fn stop_container(&self, id: &str) -> Result<(), DockerError>;

    async fn remove_container(&self, id: &str) -> Result<(), DockerError>;

    /// Returns the new container id.
    async fn create_container(
        &self,
        name: &str,
        body: serde_json::Value,
    ) -> Result<String, DockerError>;

    async fn start_container(&self, id: &str) -> Result<(), DockerError>;

    /// Inspect by name:tag or image id.
    async fn inspect_image(&self, reference: &str) -> Result<ImageInspect, DockerError>;

    /// Pull `repository:tag`, draining the progress stream to completion.
    async fn pull_image(&self, repository: &str, tag: &str) -> Result<(), DockerError>;

    async fn list_images(&self) -> Result<Vec<ImageSummary>, DockerError>;
}
