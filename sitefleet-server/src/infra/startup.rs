use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sitefleet_core::{
    ContainerEngine, DeploymentCoordinator, InMemorySiteStore, SiteStore,
};
use tracing::{info, warn};

use crate::{
    infra::{
        app_state::{AppState, StoreBackend},
        config::Config,
    },
    persistence::PostgresSiteStore,
};

/// Wire the engine and store selected by `config` into an [`AppState`].
///
/// With a database URL the PostgreSQL store is connected and migrated;
/// without one records are kept in memory.
pub async fn build_state(config: Arc<Config>) -> Result<AppState> {
    let engine: Arc<dyn ContainerEngine> = Arc::new(config.engine.docker_cli());

    let (store, backend): (Arc<dyn SiteStore>, StoreBackend) =
        match config.database.primary_url.as_deref() {
            Some(url) => {
                info!(
                    database = config.database.redacted_url().as_deref().unwrap_or_default(),
                    "connecting to PostgreSQL site store"
                );
                let store = PostgresSiteStore::connect(url)
                    .await
                    .context("failed to connect to PostgreSQL")?;
                store
                    .migrate()
                    .await
                    .context("failed to apply site store migrations")?;
                (Arc::new(store), StoreBackend::Postgres)
            }
            None => {
                warn!("no database configured; site records will not survive a restart");
                (Arc::new(InMemorySiteStore::new()), StoreBackend::Memory)
            }
        };

    Ok(assemble_state(config, engine, store, backend))
}

pub fn assemble_state(
    config: Arc<Config>,
    engine: Arc<dyn ContainerEngine>,
    store: Arc<dyn SiteStore>,
    backend: StoreBackend,
) -> AppState {
    let coordinator =
        DeploymentCoordinator::new(engine, store, config.orchestrator.clone());
    AppState::new(coordinator, config, backend)
}

#[async_trait]
pub trait StartupHooks: Send + Sync {
    async fn run(&self, state: &AppState) -> Result<()>;
}

/// Probes the engine and fails deployments a previous process left behind.
#[derive(Debug, Default)]
pub struct ProdStartupHooks;

#[async_trait]
impl StartupHooks for ProdStartupHooks {
    async fn run(&self, state: &AppState) -> Result<()> {
        let connectivity = state.coordinator.check_engine_connectivity().await;
        match (&connectivity.info, &connectivity.error) {
            (Some(info), _) => info!(
                engine.version = %info.server_version,
                engine.os = %info.operating_system,
                engine.containers = info.containers,
                "container engine reachable"
            ),
            (None, error) => {
                let error = error.as_deref().unwrap_or("unknown error");
                if state.config().engine.required {
                    anyhow::bail!("container engine unreachable: {error}");
                }
                warn!(error, "container engine unreachable; deployments will fail until it is");
            }
        }

        let recovered = state
            .coordinator
            .recover_interrupted()
            .await
            .context("failed to recover interrupted deployments")?;
        if !recovered.is_empty() {
            warn!(count = recovered.len(), "marked interrupted deployments as failed");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopStartupHooks;

#[async_trait]
impl StartupHooks for NoopStartupHooks {
    async fn run(&self, _state: &AppState) -> Result<()> {
        Ok(())
    }
}
