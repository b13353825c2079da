use crate::api_base;
use crate::error::RegistryError;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Accept header covering the Docker and OCI manifest formats. The digest
/// is read from the `Docker-Content-Digest` response header, so the body
/// format never needs to be interpreted.
const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.oci.image.manifest.v1+json, \
    application/vnd.oci.image.index.v1+json";

#[derive(Debug, Deserialize)]
struct TagsResponse {
    tags: Option<Vec<String>>,
}

/// Thin Docker Registry v2 client for digest and tag lookups.
#[derive(Clone)]
pub struct RegistryClient {
    client: Client,
}

impl RegistryClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// HEAD the manifest for `tag` and return the authoritative
    /// `Docker-Content-Digest` header value.
    pub async fn get_latest_digest(
        &self,
        host: &str,
        repository: &str,
        tag: &str,
        authorization: Option<&str>,
    ) -> Result<String, RegistryError> {
        let url = format!("{}/v2/{}/manifests/{}", api_base(host), repository, tag);
        let mut req = self
            .client
            .head(&url)
            .header(header::ACCEPT, MANIFEST_ACCEPT);
        if let Some(auth) = authorization {
            req = req.header(header::AUTHORIZATION, auth);
        }
        let resp = req.send().await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => Err(RegistryError::Unauthorized),
            StatusCode::NOT_FOUND => Err(RegistryError::ManifestNotFound(format!(
                "{}:{}",
                repository, tag
            ))),
            status if status.is_success() => {
                let digest = resp
                    .headers()
                    .get("Docker-Content-Digest")
                    .and_then(|v| v.to_str().ok())
                    .ok_or(RegistryError::MissingDigestHeader)?
                    .to_string();
                debug!(host, repository, tag, %digest, "manifest digest resolved");
                Ok(digest)
            }
            status => Err(RegistryError::UnexpectedStatus(status)),
        }
    }

    /// List the repository's tags, for the best-effort tag-version
    /// heuristic. Failures here never fail a check.
    pub async fn list_tags(
        &self,
        host: &str,
        repository: &str,
        authorization: Option<&str>,
    ) -> Result<Vec<String>, RegistryError> {
        let url = format!("{}/v2/{}/tags/list", api_base(host), repository);
        let mut req = self.client.get(&url);
        if let Some(auth) = authorization {
            req = req.header(header::AUTHORIZATION, auth);
        }
        let resp = req.send().await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => Err(RegistryError::Unauthorized),
            StatusCode::NOT_FOUND => {
                Err(RegistryError::ManifestNotFound(repository.to_string()))
            }
            status if status.is_success() => {
                let body: TagsResponse = resp.json().await?;
                Ok(body.tags.unwrap_or_default())
            }
            status => Err(RegistryError::UnexpectedStatus(status)),
        }
    }
}
