use crate::applier::UpdateApplier;
use crate::checker::UpdateChecker;
use crate::error::UpdaterError;
use crate::planner::{eligible_container, UpdatePlanner};
use crate::work::{WorkClaim, WorkRegistry};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;
use tsugi_common::Result;
use tsugi_domain::credential::RegistryCredential;
use tsugi_domain::update::{CheckResult, ItemStatus, ResourceType, RunSummary, UpdaterItem};
use tsugi_infra_docker::ContainerEngine;
use uuid::Uuid;

/// The daemon-facing surface: batch checks, apply runs and targeted
/// per-container updates, with in-flight tracking across all of them.
pub struct Updater {
    checker: UpdateChecker,
    planner: UpdatePlanner,
    applier: UpdateApplier,
    work: Arc<dyn WorkRegistry>,
    engine: Arc<dyn ContainerEngine>,
}

impl Updater {
    pub fn new(
        checker: UpdateChecker,
        planner: UpdatePlanner,
        applier: UpdateApplier,
        work: Arc<dyn WorkRegistry>,
        engine: Arc<dyn ContainerEngine>,
    ) -> Self {
        Self {
            checker,
            planner,
            applier,
            work,
            engine,
        }
    }

    /// Check the given refs, or every image a running container uses when
    /// none are given. A dry-run check reports results without persisting
    /// records.
    pub async fn check(
        &self,
        refs: Option<Vec<String>>,
        credentials: Option<Vec<RegistryCredential>>,
        dry_run: bool,
    ) -> Result<HashMap<String, CheckResult>> {
        let refs = match refs {
            Some(refs) => refs,
            None => self.running_image_refs().await?,
        };
        self.checker.check_images(&refs, credentials, dry_run).await
    }

    /// Plan from pending records and apply. The whole run holds one claim
    /// so overlapping apply requests queue up as no-ops instead of racing.
    pub async fn apply_pending(&self, dry_run: bool) -> Result<RunSummary> {
        let Some(_claim) = WorkClaim::acquire(self.work.clone(), "apply-run") else {
            return Ok(busy_summary("apply-run", "an apply run is already in progress"));
        };

        let planned = self.planner.build(true).await?;
        info!(plans = planned.len(), dry_run, "Planned apply run");
        self.applier.apply(planned, dry_run).await
    }

    /// Check and, if stale, update one container's image right away.
    pub async fn auto_update_container(&self, container_id: &str) -> Result<RunSummary> {
        let Some(_claim) = WorkClaim::acquire(self.work.clone(), container_id) else {
            return Ok(busy_summary(
                container_id,
                "an update of this container is already in progress",
            ));
        };

        let container = self
            .engine
            .list_containers(true)
            .await
            .map_err(|e| tsugi_common::diagnostic::Error::new(UpdaterError::from(e)))?
            .into_iter()
            .find(|c| c.id == container_id || c.name() == container_id)
            .ok_or_else(|| {
                tsugi_common::diagnostic::Error::new(UpdaterError::NotFound(
                    container_id.to_string(),
                ))
            })?;

        self.checker
            .check_images(&[container.image.clone()], None, false)
            .await?;

        // Only this container's image moves; other pending records wait for
        // the next full run.
        let planned = self.planner.build(false).await?;
        let targeted: Vec<_> = planned
            .into_iter()
            .filter(|p| p.plan.old_image_ids.contains(&container.image_id))
            .collect();

        if targeted.is_empty() {
            let mut summary = RunSummary::new(Uuid::new_v4().to_string());
            summary.push(UpdaterItem::new(
                ResourceType::Container,
                &container.id,
                container.name(),
                ItemStatus::UpToDate,
            ));
            return Ok(summary);
        }

        let stale_ids: HashSet<String> = targeted
            .iter()
            .flat_map(|p| p.plan.old_image_ids.iter().cloned())
            .collect();
        if !eligible_container(&container, &stale_ids) {
            let mut summary = RunSummary::new(Uuid::new_v4().to_string());
            summary.push(
                UpdaterItem::new(
                    ResourceType::Container,
                    &container.id,
                    container.name(),
                    ItemStatus::Skipped,
                )
                .with_error("container is stopped, stack-managed, or opted out"),
            );
            return Ok(summary);
        }

        self.applier.apply(targeted, false).await
    }

    pub fn in_flight(&self) -> Vec<String> {
        self.work.in_flight()
    }

    /// Distinct image refs of all running containers, in first-seen order.
    async fn running_image_refs(&self) -> Result<Vec<String>> {
        let containers = self
            .engine
            .list_containers(false)
            .await
            .map_err(|e| tsugi_common::diagnostic::Error::new(UpdaterError::from(e)))?;

        let mut refs = Vec::new();
        for container in containers {
            if !refs.contains(&container.image) {
                refs.push(container.image);
            }
        }
        Ok(refs)
    }
}

fn busy_summary(resource_id: &str, reason: &str) -> RunSummary {
    let mut summary = RunSummary::new(Uuid::new_v4().to_string());
    summary.push(
        UpdaterItem::new(ResourceType::Run, resource_id, resource_id, ItemStatus::Skipped)
            .with_error(reason),
    );
    summary
}
