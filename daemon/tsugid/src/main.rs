use std::sync::Arc;
use tracing::info;
use tsugi_common::telemetry;
use tsugi_updater::{
    CheckerOptions, InProcessWorkRegistry, UpdateApplier, UpdateChecker, UpdatePlanner, Updater,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing("tsugid")?;

    let settings = settings::Settings::from_env()?;
    info!(
        bind = %settings.bind,
        docker_host = %settings.docker_host,
        concurrency = settings.concurrency,
        "Starting tsugid"
    );

    let store = Arc::new(tsugi_infra_db::SqliteStore::new(&settings.database_url).await?);
    let http = reqwest::Client::builder()
        .timeout(settings.http_timeout)
        .build()?;

    let engine: Arc<dyn tsugi_infra_docker::ContainerEngine> = Arc::new(
        tsugi_infra_docker::DockerClient::new(http.clone(), settings.docker_host.clone()),
    );
    let stacks = Arc::new(tsugi_compose::ComposeCli::default());
    let credentials = Arc::new(tsugi_domain::credential::StaticCredentialProvider::new(
        settings.load_credentials()?,
    ));

    let checker = UpdateChecker::new(
        engine.clone(),
        tsugi_infra_registry::RegistryClient::new(http.clone()),
        tsugi_infra_registry::AuthResolver::new(http),
        store.clone(),
        credentials,
        CheckerOptions {
            concurrency: settings.concurrency,
            ..CheckerOptions::default()
        },
    );
    let planner = UpdatePlanner::new(engine.clone(), store.clone());
    let applier = UpdateApplier::new(engine.clone(), stacks, store.clone(), store.clone());
    let updater = Updater::new(
        checker,
        planner,
        applier,
        Arc::new(InProcessWorkRegistry::default()),
        engine,
    );

    let state = state::AppState::new(updater, store);

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&settings.bind).await?;
    info!("API server listening on {}", settings.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

mod api;
mod settings;
mod state;
