use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use tsugi_common::Result;
use tsugi_domain::image::{parse_image_ref, ImageRef};
use tsugi_domain::policy::{stack_name, UpdatePolicy};
use tsugi_domain::store::UpdateRecordStore;
use tsugi_domain::update::{ImageUpdateRecord, UpdatePlan, UpdateType};
use tsugi_infra_docker::v1_45::ContainerSummary;
use tsugi_infra_docker::ContainerEngine;

/// An [`UpdatePlan`] tied back to the record it came from, so post-apply
/// cleanup can clear the right row.
#[derive(Debug, Clone)]
pub struct PlannedUpdate {
    pub record_image_id: String,
    pub plan: UpdatePlan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    Running,
    PartiallyRunning,
    Stopped,
}

/// A stack derived from container labels: compose project or swarm
/// namespace.
#[derive(Debug, Clone)]
pub struct StackInfo {
    pub name: String,
    pub status: StackStatus,
    pub containers: Vec<ContainerSummary>,
}

/// Group containers into stacks by their stack label and derive each
/// stack's status from its members.
pub fn group_stacks(containers: &[ContainerSummary]) -> Vec<StackInfo> {
    let mut stacks: Vec<StackInfo> = Vec::new();
    for container in containers {
        let Some(name) = stack_name(&container.labels) else {
            continue;
        };
        match stacks.iter_mut().find(|s| s.name == name) {
            Some(stack) => stack.containers.push(container.clone()),
            None => stacks.push(StackInfo {
                name: name.to_string(),
                status: StackStatus::Stopped,
                containers: vec![container.clone()],
            }),
        }
    }
    for stack in &mut stacks {
        let running = stack.containers.iter().filter(|c| c.is_running()).count();
        stack.status = if running == stack.containers.len() {
            StackStatus::Running
        } else if running > 0 {
            StackStatus::PartiallyRunning
        } else {
            StackStatus::Stopped
        };
    }
    stacks
}

/// Container path eligibility: running, not stack-managed (those go
/// through the stack path only), not opted out, and its image id is in the
/// stale set.
pub fn eligible_container(container: &ContainerSummary, stale_ids: &HashSet<String>) -> bool {
    container.is_running()
        && stack_name(&container.labels).is_none()
        && !UpdatePolicy::from_labels(&container.labels).opted_out()
        && stale_ids.contains(&container.image_id)
}

/// Stack path eligibility: at least partially running, no opted-out
/// member, and some member's image id is in the stale set.
pub fn eligible_stack(stack: &StackInfo, stale_ids: &HashSet<String>) -> bool {
    matches!(
        stack.status,
        StackStatus::Running | StackStatus::PartiallyRunning
    ) && !stack
        .containers
        .iter()
        .any(|c| UpdatePolicy::from_labels(&c.labels).opted_out())
        && stack
            .containers
            .iter()
            .any(|c| stale_ids.contains(&c.image_id))
}

/// Builds apply plans from pending records and live Docker state.
pub struct UpdatePlanner {
    engine: Arc<dyn ContainerEngine>,
    records: Arc<dyn UpdateRecordStore>,
}

impl UpdatePlanner {
    pub fn new(engine: Arc<dyn ContainerEngine>, records: Arc<dyn UpdateRecordStore>) -> Self {
        Self { engine, records }
    }

    /// Build one plan per pending record. With `used_filter`, plans whose
    /// images no running container or stack references are dropped
    /// (stale-but-unused cached images are skipped, their records left for
    /// garbage collection).
    pub async fn build(&self, used_filter: bool) -> Result<Vec<PlannedUpdate>> {
        let pending = self.records.list_pending().await?;
        let mut planned = Vec::new();

        for record in &pending {
            match self.plan_for(record).await {
                Some(plan) => planned.push(plan),
                None => debug!(
                    "Dropping unplannable record for {}:{}",
                    record.repository, record.tag
                ),
            }
        }

        if used_filter {
            let used = self.used_image_ids().await?;
            planned.retain(|p| p.plan.old_image_ids.iter().any(|id| used.contains(id)));
        }

        Ok(planned)
    }

    /// All image ids currently referenced by running containers (stack
    /// members included; the stack phase needs their ids too).
    async fn used_image_ids(&self) -> Result<HashSet<String>> {
        let containers = self.engine.list_containers(false).await.map_err(|e| {
            tsugi_common::diagnostic::Error::new(crate::error::UpdaterError::from(e))
        })?;
        Ok(containers.into_iter().map(|c| c.image_id).collect())
    }

    async fn plan_for(&self, record: &ImageUpdateRecord) -> Option<PlannedUpdate> {
        let old_ref = match parse_image_ref(&format!("{}:{}", record.repository, record.tag)) {
            Ok(r) => r,
            Err(e) => {
                warn!("Pending record carries unparsable ref: {}", e);
                return None;
            }
        };

        let new_ref = new_ref_for(record, &old_ref);

        // Capture the old image ids BEFORE any pull happens: the pull can
        // silently move the tag onto a new digest.
        let mut old_image_ids = vec![record.image_id.clone()];
        match self.engine.inspect_image(&old_ref.local_name()).await {
            Ok(inspect) => {
                if inspect.id != record.image_id {
                    old_image_ids.push(inspect.id);
                }
            }
            Err(e) if e.is_not_found() => {
                // Image already gone; the record will be garbage-collected.
                return None;
            }
            Err(e) => {
                warn!("Failed to resolve local ids for {}: {}", old_ref, e);
            }
        }

        Some(PlannedUpdate {
            record_image_id: record.image_id.clone(),
            plan: UpdatePlan {
                old_ref,
                new_ref,
                old_image_ids,
            },
        })
    }
}

/// Tag-level updates move to the newer tag; digest-level updates re-pull
/// the same tag.
fn new_ref_for(record: &ImageUpdateRecord, old_ref: &ImageRef) -> ImageRef {
    match (&record.update_type, &record.latest_version) {
        (Some(UpdateType::Tag), Some(latest)) => old_ref.with_tag(latest.clone()),
        _ => old_ref.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{container, image_inspect, MemoryStores, FakeEngine};
    use tsugi_domain::policy::{AUTO_UPDATE_LABEL, COMPOSE_PROJECT_LABEL};

    fn record(image_id: &str, repo: &str, tag: &str) -> ImageUpdateRecord {
        ImageUpdateRecord {
            image_id: image_id.to_string(),
            repository: repo.to_string(),
            tag: tag.to_string(),
            has_update: true,
            update_type: Some(UpdateType::Digest),
            current_digest: "sha256:old".to_string(),
            latest_digest: "sha256:new".to_string(),
            latest_version: None,
            check_time: 0,
            response_time_ms: 0,
            auth_method: tsugi_domain::credential::AuthMethod::Anonymous,
            auth_username: None,
            auth_registry: None,
            used_credential: false,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn plan_captures_ids_before_pull_and_same_tag_for_digest_updates() {
        let stores = MemoryStores::default();
        stores.records.put(record("sha256:recid", "library/redis", "7"));

        let engine = FakeEngine::default();
        engine.add_image("redis:7", image_inspect("sha256:liveid", &[]));
        engine.add_container(container("c1", "redis:7", "sha256:recid", true, &[]));

        let planner = UpdatePlanner::new(Arc::new(engine), stores.records.clone());
        let planned = planner.build(true).await.unwrap();

        assert_eq!(planned.len(), 1);
        let plan = &planned[0].plan;
        assert_eq!(plan.old_ref.repo_tag(), "library/redis:7");
        assert_eq!(plan.new_ref, plan.old_ref, "digest update keeps the tag");
        assert!(plan.old_image_ids.contains(&"sha256:recid".to_string()));
        assert!(plan.old_image_ids.contains(&"sha256:liveid".to_string()));
    }

    #[tokio::test]
    async fn tag_update_switches_tag() {
        let stores = MemoryStores::default();
        let mut rec = record("sha256:recid", "traefik/traefik", "v2.10");
        rec.update_type = Some(UpdateType::Tag);
        rec.latest_version = Some("v2.11".to_string());
        stores.records.put(rec);

        let engine = FakeEngine::default();
        engine.add_image("traefik/traefik:v2.10", image_inspect("sha256:recid", &[]));
        engine.add_container(container("c1", "traefik/traefik:v2.10", "sha256:recid", true, &[]));

        let planner = UpdatePlanner::new(Arc::new(engine), stores.records.clone());
        let planned = planner.build(true).await.unwrap();

        assert_eq!(planned[0].plan.new_ref.tag, "v2.11");
        assert_eq!(planned[0].plan.old_ref.tag, "v2.10");
    }

    #[tokio::test]
    async fn used_filter_drops_unreferenced_images() {
        let stores = MemoryStores::default();
        stores.records.put(record("sha256:unused", "library/nginx", "1.25"));

        let engine = FakeEngine::default();
        engine.add_image("nginx:1.25", image_inspect("sha256:unused", &[]));
        // No running container references it.

        let planner = UpdatePlanner::new(Arc::new(engine), stores.records.clone());
        assert!(planner.build(true).await.unwrap().is_empty());

        // Without the filter the plan survives.
        assert_eq!(planner.build(false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn vanished_image_yields_no_plan() {
        let stores = MemoryStores::default();
        stores.records.put(record("sha256:gone", "library/nginx", "1.25"));

        let planner = UpdatePlanner::new(Arc::new(FakeEngine::default()), stores.records.clone());
        assert!(planner.build(false).await.unwrap().is_empty());
    }

    #[test]
    fn container_eligibility_rules() {
        let stale: HashSet<String> = ["sha256:stale".to_string()].into();

        let plain = container("c1", "redis:7", "sha256:stale", true, &[]);
        assert!(eligible_container(&plain, &stale));

        let stopped = container("c2", "redis:7", "sha256:stale", false, &[]);
        assert!(!eligible_container(&stopped, &stale));

        let stack_managed = container(
            "c3",
            "redis:7",
            "sha256:stale",
            true,
            &[(COMPOSE_PROJECT_LABEL, "webapp")],
        );
        assert!(
            !eligible_container(&stack_managed, &stale),
            "stack-managed containers only go through the stack path"
        );

        let opted_out = container(
            "c4",
            "redis:7",
            "sha256:stale",
            true,
            &[(AUTO_UPDATE_LABEL, "false")],
        );
        assert!(!eligible_container(&opted_out, &stale));

        let fresh = container("c5", "redis:7", "sha256:fresh", true, &[]);
        assert!(!eligible_container(&fresh, &stale));
    }

    #[test]
    fn stack_eligibility_rules() {
        let stale: HashSet<String> = ["sha256:stale".to_string()].into();
        let member = |id: &str, image_id: &str, running: bool, labels: &[(&str, &str)]| {
            let mut labels = labels.to_vec();
            labels.push((COMPOSE_PROJECT_LABEL, "webapp"));
            container(id, "app:1", image_id, running, &labels)
        };

        let healthy = group_stacks(&[
            member("c1", "sha256:stale", true, &[]),
            member("c2", "sha256:fresh", true, &[]),
        ]);
        assert!(eligible_stack(&healthy[0], &stale));
        assert_eq!(healthy[0].status, StackStatus::Running);

        let partial = group_stacks(&[
            member("c1", "sha256:stale", true, &[]),
            member("c2", "sha256:fresh", false, &[]),
        ]);
        assert_eq!(partial[0].status, StackStatus::PartiallyRunning);
        assert!(eligible_stack(&partial[0], &stale));

        let with_optout = group_stacks(&[
            member("c1", "sha256:stale", true, &[]),
            member("c2", "sha256:fresh", true, &[(AUTO_UPDATE_LABEL, "no")]),
        ]);
        assert!(
            !eligible_stack(&with_optout[0], &stale),
            "one opted-out member excludes the whole stack"
        );

        let untouched = group_stacks(&[member("c1", "sha256:fresh", true, &[])]);
        assert!(!eligible_stack(&untouched[0], &stale));
    }
}
