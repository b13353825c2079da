//! In-memory fakes shared by the engine tests: a scriptable container
//! engine, store implementations, and a recording stack provider.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tsugi_common::Result;
use tsugi_domain::store::{AuditEntry, AuditStore, UpdateRecordStore};
use tsugi_domain::update::{ImageUpdateRecord, RunPhase, UpdaterItem};
use tsugi_infra_docker::v1_45::{
    ContainerInspect, ContainerSummary, ImageInspect, ImageSummary, InspectState, NetworkSettings,
};
use tsugi_infra_docker::{ContainerEngine, DockerError};

pub fn container(
    id: &str,
    image: &str,
    image_id: &str,
    running: bool,
    labels: &[(&str, &str)],
) -> ContainerSummary {
    ContainerSummary {
        id: id.to_string(),
        names: vec![format!("/{}", id)],
        image: image.to_string(),
        image_id: image_id.to_string(),
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        state: if running { "running" } else { "exited" }.to_string(),
        status: String::new(),
    }
}

pub fn image_inspect(id: &str, repo_digests: &[&str]) -> ImageInspect {
    ImageInspect {
        id: id.to_string(),
        repo_tags: vec![],
        repo_digests: repo_digests.iter().map(|s| s.to_string()).collect(),
    }
}

fn inspect_for(summary: &ContainerSummary) -> ContainerInspect {
    ContainerInspect {
        id: summary.id.clone(),
        name: format!("/{}", summary.name()),
        image: summary.image.clone(),
        state: InspectState {
            status: summary.state.clone(),
            running: summary.is_running(),
        },
        config: serde_json::json!({
            "Image": summary.image,
            "Env": ["PATH=/usr/bin"],
            "Labels": summary.labels,
        }),
        host_config: serde_json::json!({ "NetworkMode": "bridge" }),
        network_settings: NetworkSettings {
            networks: HashMap::new(),
        },
    }
}

#[derive(Default)]
struct EngineState {
    containers: Vec<ContainerSummary>,
    images: HashMap<String, ImageInspect>,
    image_list: Vec<ImageSummary>,
    calls: Vec<String>,
    fail_stop: HashSet<String>,
    fail_pull: HashSet<String>,
}

/// Scriptable [`ContainerEngine`] that records every mutating call.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn add_container(&self, summary: ContainerSummary) {
        self.state.lock().unwrap().containers.push(summary);
    }

    pub fn add_image(&self, reference: &str, inspect: ImageInspect) {
        let mut state = self.state.lock().unwrap();
        state.image_list.push(ImageSummary {
            id: inspect.id.clone(),
            repo_tags: vec![reference.to_string()],
            repo_digests: inspect.repo_digests.clone(),
        });
        state.images.insert(reference.to_string(), inspect);
    }

    pub fn fail_stop(&self, id: &str) {
        self.state.lock().unwrap().fail_stop.insert(id.to_string());
    }

    pub fn fail_pull(&self, repository: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_pull
            .insert(repository.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("list") && !c.starts_with("inspect"))
            .collect()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn list_containers(&self, all: bool) -> std::result::Result<Vec<ContainerSummary>, DockerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("list_containers all={}", all));
        Ok(state
            .containers
            .iter()
            .filter(|c| all || c.is_running())
            .cloned()
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> std::result::Result<ContainerInspect, DockerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("inspect_container {}", id));
        state
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(inspect_for)
            .ok_or_else(|| DockerError::NotFound(id.to_string()))
    }

    async fn stop_container(&self, id: &str) -> std::result::Result<(), DockerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("stop {}", id));
        if state.fail_stop.contains(id) {
            return Err(DockerError::Api {
                status: 500,
                message: "injected stop failure".to_string(),
            });
        }
        if let Some(c) = state.containers.iter_mut().find(|c| c.id == id) {
            c.state = "exited".to_string();
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> std::result::Result<(), DockerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("remove {}", id));
        state.containers.retain(|c| c.id != id);
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        body: serde_json::Value,
    ) -> std::result::Result<String, DockerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create {}", name));
        let id = format!("new-{}", name);
        let image = body
            .get("Image")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        state.containers.push(ContainerSummary {
            id: id.clone(),
            names: vec![format!("/{}", name)],
            image,
            image_id: format!("sha256:created-{}", name),
            labels: HashMap::new(),
            state: "created".to_string(),
            status: String::new(),
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> std::result::Result<(), DockerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("start {}", id));
        if let Some(c) = state.containers.iter_mut().find(|c| c.id == id) {
            c.state = "running".to_string();
        }
        Ok(())
    }

    async fn inspect_image(&self, reference: &str) -> std::result::Result<ImageInspect, DockerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("inspect_image {}", reference));
        state
            .images
            .get(reference)
            .cloned()
            .ok_or_else(|| DockerError::NotFound(reference.to_string()))
    }

    async fn pull_image(&self, repository: &str, tag: &str) -> std::result::Result<(), DockerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("pull {}:{}", repository, tag));
        if state.fail_pull.contains(repository) {
            return Err(DockerError::Api {
                status: 500,
                message: "injected pull failure".to_string(),
            });
        }
        Ok(())
    }

    async fn list_images(&self) -> std::result::Result<Vec<ImageSummary>, DockerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list_images".to_string());
        Ok(state.image_list.clone())
    }
}

/// In-memory [`UpdateRecordStore`].
#[derive(Default)]
pub struct MemoryRecordStore {
    rows: Mutex<HashMap<String, ImageUpdateRecord>>,
}

impl MemoryRecordStore {
    pub fn put(&self, record: ImageUpdateRecord) {
        self.rows
            .lock()
            .unwrap()
            .insert(record.image_id.clone(), record);
    }

    pub fn all(&self) -> Vec<ImageUpdateRecord> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl UpdateRecordStore for MemoryRecordStore {
    async fn upsert(&self, record: &ImageUpdateRecord) -> Result<()> {
        self.put(record.clone());
        Ok(())
    }

    async fn get(&self, image_id: &str) -> Result<Option<ImageUpdateRecord>> {
        Ok(self.rows.lock().unwrap().get(image_id).cloned())
    }

    async fn list(&self) -> Result<Vec<ImageUpdateRecord>> {
        Ok(self.all())
    }

    async fn list_pending(&self) -> Result<Vec<ImageUpdateRecord>> {
        Ok(self.all().into_iter().filter(|r| r.has_update).collect())
    }

    async fn clear_update(&self, image_id: &str) -> Result<()> {
        if let Some(row) = self.rows.lock().unwrap().get_mut(image_id) {
            row.has_update = false;
        }
        Ok(())
    }

    async fn delete(&self, image_id: &str) -> Result<()> {
        self.rows.lock().unwrap().remove(image_id);
        Ok(())
    }

    async fn prune(&self, live_image_ids: &[String]) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|id, _| live_image_ids.contains(id));
        Ok((before - rows.len()) as u64)
    }
}

/// In-memory [`AuditStore`].
#[derive(Default)]
pub struct MemoryAuditStore {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditStore {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, run_id: &str, phase: RunPhase, item: &UpdaterItem) -> Result<()> {
        self.entries.lock().unwrap().push(AuditEntry {
            run_id: run_id.to_string(),
            phase,
            item: item.clone(),
            created_at: 0,
        });
        Ok(())
    }

    async fn history(&self, limit: i64, offset: i64) -> Result<Vec<AuditEntry>> {
        let entries = self.entries();
        Ok(entries
            .into_iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

/// Bundle of stores most tests need.
#[derive(Default)]
pub struct MemoryStores {
    pub records: Arc<MemoryRecordStore>,
    pub audit: Arc<MemoryAuditStore>,
}

/// Stack provider that records operations instead of running compose.
#[derive(Default)]
pub struct FakeStacks {
    ops: Mutex<Vec<String>>,
    fail: Mutex<HashSet<String>>,
}

impl FakeStacks {
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn fail_stack(&self, stack: &str) {
        self.fail.lock().unwrap().insert(stack.to_string());
    }

    fn record(&self, op: &str, stack: &str) -> anyhow::Result<()> {
        self.ops.lock().unwrap().push(format!("{} {}", op, stack));
        if self.fail.lock().unwrap().contains(stack) {
            anyhow::bail!("injected {} failure for {}", op, stack);
        }
        Ok(())
    }
}

#[async_trait]
impl tsugi_compose::StackProvider for FakeStacks {
    async fn pull(&self, stack: &str) -> anyhow::Result<()> {
        self.record("pull", stack)
    }

    async fn down(&self, stack: &str) -> anyhow::Result<()> {
        self.record("down", stack)
    }

    async fn up(&self, stack: &str) -> anyhow::Result<()> {
        self.record("up", stack)
    }

    async fn list_services(&self, stack: &str) -> anyhow::Result<Vec<String>> {
        self.ops.lock().unwrap().push(format!("services {}", stack));
        Ok(vec![])
    }
}
