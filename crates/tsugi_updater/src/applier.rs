use crate::error::UpdaterError;
use crate::planner::{eligible_stack, group_stacks, PlannedUpdate, StackInfo, StackStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tsugi_common::Result;
use tsugi_compose::StackProvider;
use tsugi_domain::policy::{stack_name, UpdatePolicy};
use tsugi_domain::store::{AuditStore, UpdateRecordStore};
use tsugi_domain::update::{ItemStatus, ResourceType, RunPhase, RunSummary, UpdaterItem};
use tsugi_infra_docker::v1_45::ContainerSummary;
use tsugi_infra_docker::ContainerEngine;
use uuid::Uuid;

/// Applies planned updates: pulls images, recreates eligible containers,
/// redeploys impacted stacks, and performs the idempotent cleanup pass.
/// All mutation is sequential by design, to keep the daemon load sane and
/// each recreate sequence observable.
pub struct UpdateApplier {
    engine: Arc<dyn ContainerEngine>,
    stacks: Arc<dyn StackProvider>,
    records: Arc<dyn UpdateRecordStore>,
    audit: Arc<dyn AuditStore>,
}

impl UpdateApplier {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        stacks: Arc<dyn StackProvider>,
        records: Arc<dyn UpdateRecordStore>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            engine,
            stacks,
            records,
            audit,
        }
    }

    pub async fn apply(&self, planned: Vec<PlannedUpdate>, dry_run: bool) -> Result<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut summary = RunSummary::new(run_id.clone());

        info!(run_id = %run_id, plans = planned.len(), dry_run, "Starting apply run");
        let run_item = UpdaterItem::new(ResourceType::Run, &run_id, "apply", ItemStatus::Checked);
        self.record_audit(&run_id, RunPhase::Start, &run_item).await;

        // Image phase: sequential pulls. Failed pulls drop out of the
        // stale set so later phases never move a container onto an image
        // that is not there.
        let mut pulled: Vec<PlannedUpdate> = Vec::new();
        for planned_update in &planned {
            let plan = &planned_update.plan;
            let base = UpdaterItem::new(
                ResourceType::Image,
                &planned_update.record_image_id,
                plan.new_ref.local_name(),
                ItemStatus::Skipped,
            )
            .with_images(vec![plan.old_ref.local_name()], vec![plan.new_ref.local_name()]);

            let item = if dry_run {
                base
            } else {
                match self
                    .engine
                    .pull_image(&plan.new_ref.pull_name(), &plan.new_ref.tag)
                    .await
                {
                    Ok(()) => {
                        pulled.push(planned_update.clone());
                        let mut it = base.applied();
                        it.status = ItemStatus::Updated;
                        it
                    }
                    Err(e) => {
                        let mut it = base.with_error(UpdaterError::from(e).to_string());
                        it.status = ItemStatus::Failed;
                        it
                    }
                }
            };
            self.record_audit(&run_id, RunPhase::ImagePull, &item).await;
            summary.push(item);
        }

        if !dry_run {
            let stale: HashMap<String, PlannedUpdate> = pulled
                .iter()
                .flat_map(|p| {
                    p.plan
                        .old_image_ids
                        .iter()
                        .map(move |id| (id.clone(), p.clone()))
                })
                .collect();
            let stale_ids: HashSet<String> = stale.keys().cloned().collect();

            self.container_phase(&run_id, &stale, &pulled, &mut summary).await?;
            self.stack_phase(&run_id, &stale, &stale_ids, &mut summary).await?;
            self.cleanup(&planned).await?;
        }

        summary.duration_ms = started.elapsed().as_millis() as i64;
        let mut done = UpdaterItem::new(ResourceType::Run, &run_id, "apply", ItemStatus::Checked);
        done.update_applied = summary.updated > 0;
        self.record_audit(&run_id, RunPhase::Complete, &done).await;
        info!(
            run_id = %run_id,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            "Apply run finished"
        );
        Ok(summary)
    }

    /// Recreate every eligible standalone container whose image is stale.
    /// A failure stops only that container's sequence.
    async fn container_phase(
        &self,
        run_id: &str,
        stale: &HashMap<String, PlannedUpdate>,
        pulled: &[PlannedUpdate],
        summary: &mut RunSummary,
    ) -> Result<()> {
        // Re-list: the world may have moved since planning.
        let containers = self
            .engine
            .list_containers(false)
            .await
            .map_err(run_level)?;

        for container in containers {
            if stack_name(&container.labels).is_some() {
                // Stack-managed: only ever handled via the stack path.
                continue;
            }

            let matched = match self.match_plan(&container, stale, pulled).await {
                Some(p) => p,
                None => continue,
            };

            if UpdatePolicy::from_labels(&container.labels).opted_out() {
                let item = UpdaterItem::new(
                    ResourceType::Container,
                    &container.id,
                    container.name(),
                    ItemStatus::Skipped,
                )
                .with_error("auto-update disabled by label");
                self.record_audit(run_id, RunPhase::Container, &item).await;
                summary.push(item);
                continue;
            }

            let name = container.name();
            let old_image = matched.plan.old_ref.local_name();
            let new_image = matched.plan.new_ref.local_name();
            let item = match self.recreate(run_id, &container, &matched).await {
                Ok(()) => UpdaterItem::new(
                    ResourceType::Container,
                    &container.id,
                    &name,
                    ItemStatus::Updated,
                )
                .with_images(vec![old_image], vec![new_image])
                .applied(),
                Err(e) => {
                    warn!("Container {} update failed: {}", name, e);
                    UpdaterItem::new(
                        ResourceType::Container,
                        &container.id,
                        &name,
                        ItemStatus::Failed,
                    )
                    .with_images(vec![old_image], vec![new_image])
                    .with_error(e.to_string())
                }
            };
            self.record_audit(run_id, RunPhase::Container, &item).await;
            summary.push(item);
        }

        Ok(())
    }

    /// Match primarily by pre-pull image id, falling back to the tags the
    /// container's image resolves to.
    async fn match_plan(
        &self,
        container: &ContainerSummary,
        stale: &HashMap<String, PlannedUpdate>,
        pulled: &[PlannedUpdate],
    ) -> Option<PlannedUpdate> {
        if let Some(planned) = stale.get(&container.image_id) {
            return Some(planned.clone());
        }
        let inspect = self.engine.inspect_image(&container.image).await.ok()?;
        pulled
            .iter()
            .find(|p| inspect.repo_tags.contains(&p.plan.old_ref.local_name()))
            .cloned()
    }

    /// stop -> remove -> recreate (same config, host config and network
    /// endpoints, new image) -> start, one audit entry per completed step.
    /// No rollback: a failure mid-sequence leaves the container where the
    /// sequence stopped, surfaced via the failed item.
    async fn recreate(
        &self,
        run_id: &str,
        container: &ContainerSummary,
        planned: &PlannedUpdate,
    ) -> std::result::Result<(), UpdaterError> {
        let name = container.name();
        let inspect = self.engine.inspect_container(&container.id).await?;

        self.engine.stop_container(&container.id).await?;
        self.step_audit(run_id, &container.id, &name, "stop").await;

        self.engine.remove_container(&container.id).await?;
        self.step_audit(run_id, &container.id, &name, "remove").await;

        let mut body = inspect.config.clone();
        let map = body
            .as_object_mut()
            .ok_or_else(|| UpdaterError::Daemon("container config is not an object".to_string()))?;
        map.insert(
            "Image".to_string(),
            serde_json::Value::String(planned.plan.new_ref.local_name()),
        );
        map.insert("HostConfig".to_string(), inspect.host_config.clone());
        map.insert(
            "NetworkingConfig".to_string(),
            serde_json::json!({ "EndpointsConfig": inspect.network_settings.networks }),
        );

        let new_id = self.engine.create_container(&name, body).await?;
        self.step_audit(run_id, &new_id, &name, "create").await;

        self.engine.start_container(&new_id).await?;
        self.step_audit(run_id, &new_id, &name, "start").await;

        Ok(())
    }

    /// Redeploy each impacted stack whole: pull, down, up. Coarse on
    /// purpose, even when only one service changed.
    async fn stack_phase(
        &self,
        run_id: &str,
        stale: &HashMap<String, PlannedUpdate>,
        stale_ids: &HashSet<String>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let all = self.engine.list_containers(true).await.map_err(run_level)?;

        for stack in group_stacks(&all) {
            if !matches!(
                stack.status,
                StackStatus::Running | StackStatus::PartiallyRunning
            ) {
                continue;
            }
            let impacted = stack
                .containers
                .iter()
                .any(|c| stale_ids.contains(&c.image_id));
            if !impacted {
                continue;
            }

            if !eligible_stack(&stack, stale_ids) {
                let item = UpdaterItem::new(
                    ResourceType::Stack,
                    &stack.name,
                    &stack.name,
                    ItemStatus::Skipped,
                )
                .with_error("auto-update disabled by a member's label");
                self.record_audit(run_id, RunPhase::Stack, &item).await;
                summary.push(item);
                continue;
            }

            let (old_images, new_images) = stack_images(&stack, stale);
            let item = match self.redeploy(run_id, &stack.name).await {
                Ok(()) => UpdaterItem::new(
                    ResourceType::Stack,
                    &stack.name,
                    &stack.name,
                    ItemStatus::Updated,
                )
                .with_images(old_images, new_images)
                .applied(),
                Err(e) => {
                    warn!("Stack {} redeploy failed: {}", stack.name, e);
                    UpdaterItem::new(
                        ResourceType::Stack,
                        &stack.name,
                        &stack.name,
                        ItemStatus::Failed,
                    )
                    .with_images(old_images, new_images)
                    .with_error(e.to_string())
                }
            };
            self.record_audit(run_id, RunPhase::Stack, &item).await;
            summary.push(item);
        }

        Ok(())
    }

    async fn redeploy(&self, run_id: &str, stack: &str) -> anyhow::Result<()> {
        self.stacks.pull(stack).await?;
        self.step_audit(run_id, stack, stack, "pull").await;
        self.stacks.down(stack).await?;
        self.step_audit(run_id, stack, stack, "down").await;
        self.stacks.up(stack).await?;
        self.step_audit(run_id, stack, stack, "up").await;
        Ok(())
    }

    /// Clear `has_update` for plans whose old images are no longer
    /// referenced by any running container, then garbage-collect records
    /// for images gone from the local store. Both steps are idempotent.
    async fn cleanup(&self, planned: &[PlannedUpdate]) -> Result<()> {
        let running = self
            .engine
            .list_containers(false)
            .await
            .map_err(run_level)?;
        let referenced: HashSet<&str> = running.iter().map(|c| c.image_id.as_str()).collect();

        for planned_update in planned {
            let still_used = planned_update
                .plan
                .old_image_ids
                .iter()
                .any(|id| referenced.contains(id.as_str()));
            if !still_used {
                self.records
                    .clear_update(&planned_update.record_image_id)
                    .await?;
            }
        }

        let images = self.engine.list_images().await.map_err(run_level)?;
        let live: Vec<String> = images.into_iter().map(|i| i.id).collect();
        let removed = self.records.prune(&live).await?;
        if removed > 0 {
            info!("Garbage-collected {} records for removed images", removed);
        }
        Ok(())
    }

    async fn record_audit(&self, run_id: &str, phase: RunPhase, item: &UpdaterItem) {
        if let Err(e) = self.audit.append(run_id, phase, item).await {
            warn!("Failed to append audit entry: {}", e);
        }
    }

    /// One entry per completed step, so a mid-sequence failure is visible
    /// as the last step that made it into the trail.
    async fn step_audit(&self, run_id: &str, resource_id: &str, name: &str, step: &str) {
        let resource_type = if step == "pull" || step == "down" || step == "up" {
            ResourceType::Stack
        } else {
            ResourceType::Container
        };
        let item = UpdaterItem::new(
            resource_type,
            resource_id,
            format!("{}:{}", name, step),
            ItemStatus::Checked,
        );
        let phase = if resource_type == ResourceType::Stack {
            RunPhase::Stack
        } else {
            RunPhase::Container
        };
        self.record_audit(run_id, phase, &item).await;
    }
}

fn run_level(e: tsugi_infra_docker::DockerError) -> tsugi_common::diagnostic::Error {
    tsugi_common::diagnostic::Error::new(UpdaterError::from(e))
}

fn stack_images(
    stack: &StackInfo,
    stale: &HashMap<String, PlannedUpdate>,
) -> (Vec<String>, Vec<String>) {
    let mut old = Vec::new();
    let mut new = Vec::new();
    for member in &stack.containers {
        if let Some(planned) = stale.get(&member.image_id) {
            let old_name = planned.plan.old_ref.local_name();
            if !old.contains(&old_name) {
                old.push(old_name);
                new.push(planned.plan.new_ref.local_name());
            }
        }
    }
    (old, new)
}
