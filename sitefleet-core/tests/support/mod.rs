use std::{sync::Arc, time::Duration};

use sitefleet_core::{
    DeploymentCoordinator, InMemorySiteStore, OrchestratorSettings, SiteRecord,
    engine::memory::InMemoryEngine, naming::NAME_SEPARATOR,
};
use uuid::Uuid;

// Code is used by test modules, but not in this scope
#[allow(unused)]
pub struct Harness {
    pub engine: Arc<InMemoryEngine>,
    pub store: Arc<InMemorySiteStore>,
    pub coordinator: DeploymentCoordinator,
}

#[allow(unused)]
impl Harness {
    pub fn new() -> Self {
        let engine = Arc::new(InMemoryEngine::new());
        let store = Arc::new(InMemorySiteStore::new());
        let coordinator = DeploymentCoordinator::new(
            engine.clone(),
            store.clone(),
            OrchestratorSettings::fast(),
        );
        Self {
            engine,
            store,
            coordinator,
        }
    }

    pub async fn create(&self, name: &str) -> SiteRecord {
        self.coordinator
            .create_deployment_config(name, &format!("{name}.test"), "ops@sitefleet.test")
            .await
            .expect("create site")
            .record
    }

    pub async fn deploy_and_wait(&self, id: Uuid) -> SiteRecord {
        self.coordinator.deploy(id).await.expect("deploy accepted");
        self.coordinator
            .wait_for_deployment(id)
            .await
            .expect("record after deployment")
    }

    /// Engine resources named after `prefix`.
    pub fn owned(&self, prefix: &str) -> (Vec<String>, Vec<String>, Vec<String>) {
        let owned = |names: Vec<String>| {
            names
                .into_iter()
                .filter(|n| n.starts_with(&format!("{prefix}{NAME_SEPARATOR}")))
                .collect::<Vec<_>>()
        };
        (
            owned(self.engine.container_names()),
            owned(self.engine.volume_names()),
            owned(self.engine.network_names()),
        )
    }
}

/// Poll `condition` until it holds or a second has passed.
#[allow(unused)]
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
