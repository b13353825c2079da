use crate::digest;
use crate::error::UpdaterError;
use crate::tags;
use futures_util::FutureExt;
use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use tsugi_common::Result;
use tsugi_domain::credential::{CredentialProvider, RegistryCredential};
use tsugi_domain::image::{parse_image_ref, Digest, ImageRef};
use tsugi_domain::store::UpdateRecordStore;
use tsugi_domain::update::{CheckResult, ImageUpdateRecord, UpdateType};
use tsugi_infra_docker::ContainerEngine;
use tsugi_infra_registry::{AuthResolver, RegistryClient, RegistryError, ResolvedAuth};

#[derive(Debug, Clone)]
pub struct CheckerOptions {
    /// Fixed worker count for the check fan-out. Bounded so a run over
    /// thousands of images cannot saturate a registry or the daemon.
    pub concurrency: usize,
    /// Enable the secondary tag-version heuristic.
    pub tag_heuristic: bool,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            tag_heuristic: true,
        }
    }
}

/// One shared auth decision per registry host.
#[derive(Clone)]
enum HostAuth {
    Open,
    Token(ResolvedAuth),
    Failed(String),
}

/// Batch coordinator: groups refs by registry, makes one auth decision per
/// host, fans digest checks out over a bounded worker pool, and persists
/// each record as its result arrives.
pub struct UpdateChecker {
    engine: Arc<dyn ContainerEngine>,
    registry: RegistryClient,
    resolver: AuthResolver,
    records: Arc<dyn UpdateRecordStore>,
    credentials: Arc<dyn CredentialProvider>,
    options: CheckerOptions,
}

impl UpdateChecker {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        registry: RegistryClient,
        resolver: AuthResolver,
        records: Arc<dyn UpdateRecordStore>,
        credentials: Arc<dyn CredentialProvider>,
        options: CheckerOptions,
    ) -> Self {
        Self {
            engine,
            registry,
            resolver,
            records,
            credentials,
            options,
        }
    }

    /// Check every ref against its source registry. Invalid refs get an
    /// immediate parse-error result; everything else is keyed by the raw
    /// input string. With `dry_run` nothing is persisted. Only total
    /// inability to run is an error.
    pub async fn check_images(
        &self,
        refs: &[String],
        external_credentials: Option<Vec<RegistryCredential>>,
        dry_run: bool,
    ) -> Result<HashMap<String, CheckResult>> {
        let mut results = HashMap::new();

        let mut valid: Vec<(String, ImageRef)> = Vec::new();
        for raw in refs {
            match parse_image_ref(raw) {
                Ok(reference) => valid.push((raw.clone(), reference)),
                Err(e) => {
                    results.insert(
                        raw.clone(),
                        CheckResult::failed(UpdaterError::from(e).to_string()),
                    );
                }
            }
        }
        if valid.is_empty() {
            return Ok(results);
        }

        // Externally supplied credentials take priority over stored ones;
        // order decides which matching credential is tried first.
        let mut credentials = external_credentials.unwrap_or_default();
        match self.credentials.list_enabled().await {
            Ok(stored) => credentials.extend(stored),
            Err(e) => warn!("Credential provider unavailable, continuing anonymous: {}", e),
        }

        let auth = self.resolve_host_auth(&valid, &credentials).await;

        let ctx = Arc::new(CheckContext {
            engine: self.engine.clone(),
            registry: self.registry.clone(),
            resolver: self.resolver.clone(),
            credentials,
            auth,
            tag_heuristic: self.options.tag_heuristic,
        });

        let workers = self.options.concurrency.max(1);
        let (task_tx, task_rx) = mpsc::channel::<(String, ImageRef)>(workers);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        // Workers live in a JoinSet owned by this future, so cancelling a
        // check run aborts its in-flight registry calls instead of leaving
        // them running detached.
        let mut pool = tokio::task::JoinSet::new();
        for _ in 0..workers {
            let task_rx = Arc::clone(&task_rx);
            let result_tx = result_tx.clone();
            let ctx = Arc::clone(&ctx);
            pool.spawn(async move {
                loop {
                    let task = { task_rx.lock().await.recv().await };
                    let Some((raw, reference)) = task else { break };

                    // A panic inside one check becomes that unit's failed
                    // result instead of taking the run down.
                    let outcome = AssertUnwindSafe(ctx.check_one(&reference))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            (None, CheckResult::failed("internal panic during check"))
                        });

                    let (image_id, check) = outcome;
                    if result_tx.send((raw, reference, image_id, check)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        for task in valid {
            if task_tx.send(task).await.is_err() {
                break;
            }
        }
        drop(task_tx);

        // Persist as results arrive, so a crash mid-run leaves partial
        // progress durable.
        while let Some((raw, reference, image_id, check)) = result_rx.recv().await {
            if let Some(image_id) = image_id.as_ref().filter(|_| !dry_run) {
                let record = ImageUpdateRecord::from_check(image_id, &reference, &check);
                if let Err(e) = self.records.upsert(&record).await {
                    warn!("Failed to persist check result for {}: {}", raw, e);
                }
            }
            results.insert(raw, check);
        }

        while pool.join_next().await.is_some() {}

        info!("Checked {} image refs", results.len());
        Ok(results)
    }

    async fn resolve_host_auth(
        &self,
        valid: &[(String, ImageRef)],
        credentials: &[RegistryCredential],
    ) -> HashMap<String, HostAuth> {
        let mut by_host: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (_, reference) in valid {
            by_host
                .entry(reference.registry.clone())
                .or_default()
                .insert(reference.repository.clone());
        }

        let mut auth = HashMap::new();
        for (host, repos) in by_host {
            let decision = match self.resolver.check_auth(&host).await {
                Ok(None) => HostAuth::Open,
                Ok(Some(challenge)) => {
                    let repos: Vec<String> = repos.into_iter().collect();
                    match self
                        .resolver
                        .get_token_multi(&challenge, &host, &repos, credentials)
                        .await
                    {
                        Ok(resolved) => HostAuth::Token(resolved),
                        Err(e) => HostAuth::Failed(UpdaterError::from(e).to_string()),
                    }
                }
                Err(e) => HostAuth::Failed(UpdaterError::from(e).to_string()),
            };
            auth.insert(host, decision);
        }
        auth
    }
}

struct CheckContext {
    engine: Arc<dyn ContainerEngine>,
    registry: RegistryClient,
    resolver: AuthResolver,
    credentials: Vec<RegistryCredential>,
    auth: HashMap<String, HostAuth>,
    tag_heuristic: bool,
}

impl CheckContext {
    async fn check_one(&self, reference: &ImageRef) -> (Option<String>, CheckResult) {
        let started = Instant::now();

        let (image_id, local) = match digest::local_digests(self.engine.as_ref(), reference).await
        {
            Ok(v) => v,
            Err(e) => return (None, CheckResult::failed(e.to_string())),
        };

        let resolved = match self.auth.get(&reference.registry) {
            Some(HostAuth::Open) => ResolvedAuth::open(),
            Some(HostAuth::Token(resolved)) => resolved.clone(),
            Some(HostAuth::Failed(message)) => {
                let mut check = CheckResult::failed(message.clone());
                check.current_digest = local.primary;
                check.response_time_ms = started.elapsed().as_millis() as i64;
                return (Some(image_id), check);
            }
            None => {
                return (
                    Some(image_id),
                    CheckResult::failed("no auth decision for registry host"),
                )
            }
        };
        let bearer = resolved.bearer();

        let remote = match self
            .fetch_digest_with_retry(reference, bearer.as_deref())
            .await
        {
            Ok(digest) => digest,
            Err(e) => {
                let mut check = CheckResult::failed(e.to_string());
                check.current_digest = local.primary;
                check.auth_method = resolved.method;
                check.auth_username = resolved.username;
                check.auth_registry = resolved.registry;
                check.used_credential = resolved.used_credential;
                check.response_time_ms = started.elapsed().as_millis() as i64;
                return (Some(image_id), check);
            }
        };

        let mut has_update = digest::has_update(&remote, &local);
        let mut update_type = has_update.then_some(UpdateType::Digest);

        // Secondary heuristic; never overrides the digest verdict.
        let mut latest_version = None;
        if self.tag_heuristic {
            if let Ok(available) = self
                .registry
                .list_tags(&reference.registry, &reference.repository, bearer.as_deref())
                .await
            {
                if let Some(newer) = tags::latest_matching_tag(&reference.tag, &available) {
                    latest_version = Some(newer);
                    if !has_update {
                        has_update = true;
                        update_type = Some(UpdateType::Tag);
                    }
                }
            }
        }

        let check = CheckResult {
            has_update,
            update_type,
            current_digest: local.primary,
            latest_digest: remote,
            latest_version,
            check_time: time::OffsetDateTime::now_utc().unix_timestamp(),
            response_time_ms: started.elapsed().as_millis() as i64,
            auth_method: resolved.method,
            auth_username: resolved.username,
            auth_registry: resolved.registry,
            used_credential: resolved.used_credential,
            error: None,
        };
        (Some(image_id), check)
    }

    /// One re-auth retry, only for a 401: resolve a fresh header through
    /// the full credential list, then try once more.
    async fn fetch_digest_with_retry(
        &self,
        reference: &ImageRef,
        bearer: Option<&str>,
    ) -> std::result::Result<String, UpdaterError> {
        let first = self
            .registry
            .get_latest_digest(
                &reference.registry,
                &reference.repository,
                &reference.tag,
                bearer,
            )
            .await;

        let raw = match first {
            Err(RegistryError::Unauthorized) => {
                let fresh = self
                    .resolver
                    .authorization_for(&reference.registry, &reference.repository, &self.credentials)
                    .await?;
                self.registry
                    .get_latest_digest(
                        &reference.registry,
                        &reference.repository,
                        &reference.tag,
                        fresh.as_deref(),
                    )
                    .await?
            }
            other => other?,
        };

        // A malformed Docker-Content-Digest would poison the comparison, so
        // it fails the check instead.
        Digest::new(raw.trim())
            .map(|d| d.as_str().to_string())
            .map_err(|e| UpdaterError::Parse(e.to_string()))
    }
}
