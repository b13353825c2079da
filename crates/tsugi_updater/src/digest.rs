use crate::error::UpdaterError;
use tsugi_domain::image::ImageRef;
use tsugi_infra_docker::ContainerEngine;

/// Every digest the local daemon knows for one image. An image pulled from
/// several registries or tags carries one `RepoDigests` entry per source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDigests {
    pub primary: String,
    pub all: Vec<String>,
}

/// Inspect the local image and collect its digest set, falling back to the
/// image id when no `RepoDigests` exist (e.g. locally built images).
/// Returns the local image id alongside.
pub async fn local_digests(
    engine: &dyn ContainerEngine,
    reference: &ImageRef,
) -> Result<(String, LocalDigests), UpdaterError> {
    let inspect = engine.inspect_image(&reference.local_name()).await?;

    let all: Vec<String> = inspect
        .repo_digests
        .iter()
        .filter_map(|entry| entry.split_once('@').map(|(_, digest)| digest.to_string()))
        .collect();

    let digests = if all.is_empty() {
        LocalDigests {
            primary: inspect.id.clone(),
            all: vec![inspect.id.clone()],
        }
    } else {
        LocalDigests {
            primary: all[0].clone(),
            all,
        }
    };

    Ok((inspect.id, digests))
}

/// An update exists iff the remote digest is not a member of the full local
/// set. Comparing only the primary entry would raise false positives for
/// multi-tagged images.
pub fn has_update(remote_digest: &str, local: &LocalDigests) -> bool {
    !local.all.iter().any(|d| d == remote_digest)
}
