use crate::engine::ContainerEngine;
use crate::error::DockerError;
use crate::v1_45::{ContainerInspect, ContainerSummary, ImageInspect, ImageSummary};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use tracing::info;

/// HTTP client against the Docker Engine API (v1.45).
#[derive(Clone)]
pub struct DockerClient {
    client: Client,
    base: String,
}

impl DockerClient {
    /// `base` is the daemon endpoint, e.g. `http://127.0.0.1:2375`.
    pub fn new(client: Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn check(resp: Response, subject: &str) -> Result<Response, DockerError> {
        match resp.status() {
            StatusCode::NOT_FOUND => Err(DockerError::NotFound(subject.to_string())),
            status if status.is_success() => Ok(resp),
            status => {
                let message = resp.text().await.unwrap_or_default();
                Err(DockerError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerClient {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, DockerError> {
        let url = self.url(&format!("/containers/json?all={}", if all { 1 } else { 0 }));
        let resp = self.client.get(&url).send().await?;
        Ok(Self::check(resp, "containers").await?.json().await?)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect, DockerError> {
        let url = self.url(&format!("/containers/{}/json", id));
        let resp = self.client.get(&url).send().await?;
        Ok(Self::check(resp, id).await?.json().await?)
    }

    async fn stop_container(&self, id: &str) -> Result<(), DockerError> {
        let url = self.url(&format!("/containers/{}/stop", id));
        let resp = self.client.post(&url).send().await?;
        // 304 means already stopped, which is fine for our sequence.
        if resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        Self::check(resp, id).await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), DockerError> {
        let url = self.url(&format!("/containers/{}", id));
        let resp = self.client.delete(&url).send().await?;
        Self::check(resp, id).await?;
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        body: serde_json::Value,
    ) -> Result<String, DockerError> {
        let url = self.url(&format!("/containers/create?name={}", name));
        let resp = self.client.post(&url).json(&body).send().await?;
        let created: serde_json::Value = Self::check(resp, name).await?.json().await?;
        created
            .get("Id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| DockerError::Api {
                status: 0,
                message: "create response carried no Id".to_string(),
            })
    }

    async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        let url = self.url(&format!("/containers/{}/start", id));
        let resp = self.client.post(&url).send().await?;
        if resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        Self::check(resp, id).await?;
        Ok(())
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageInspect, DockerError> {
        let url = self.url(&format!("/images/{}/json", reference));
        let resp = self.client.get(&url).send().await?;
        Ok(Self::check(resp, reference).await?.json().await?)
    }

    async fn pull_image(&self, repository: &str, tag: &str) -> Result<(), DockerError> {
        info!("Pulling image: {}:{}", repository, tag);
        let url = self.url(&format!(
            "/images/create?fromImage={}&tag={}",
            repository, tag
        ));
        let resp = self.client.post(&url).send().await?;
        let resp = Self::check(resp, repository).await?;

        // The daemon streams progress JSON; drain it so the pull completes
        // before we return.
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let text = String::from_utf8_lossy(&chunk);
            if text.contains("\"error\"") {
                return Err(DockerError::Api {
                    status: 200,
                    message: text.trim().to_string(),
                });
            }
        }
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>, DockerError> {
        let url = self.url("/images/json");
        let resp = self.client.get(&url).send().await?;
        Ok(Self::check(resp, "images").await?.json().await?)
    }
}
