use std::{sync::Arc, time::Duration};

use axum_test::TestServer;
use serde_json::{Value, json};
use sitefleet_config::{ConfigLoader, EnvConfig};
use sitefleet_core::{
    InMemorySiteStore, OrchestratorSettings, engine::memory::InMemoryEngine,
};
use sitefleet_server::{
    AppState, create_app,
    infra::{app_state::StoreBackend, config::Config, startup::assemble_state},
};
use uuid::Uuid;

// Code is used by test modules, but not in this scope
#[allow(unused)]
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub engine: Arc<InMemoryEngine>,
    pub store: Arc<InMemorySiteStore>,
}

#[allow(unused)]
pub fn test_config() -> Config {
    let mut config = ConfigLoader::new()
        .load_with_env(EnvConfig::default())
        .expect("default configuration")
        .config;
    config.orchestrator = OrchestratorSettings::fast();
    config
}

#[allow(unused)]
pub fn build_state(engine: Arc<InMemoryEngine>, store: Arc<InMemorySiteStore>) -> AppState {
    assemble_state(
        Arc::new(test_config()),
        engine,
        store,
        StoreBackend::Memory,
    )
}

#[allow(unused)]
pub fn build_test_app() -> TestApp {
    let engine = Arc::new(InMemoryEngine::new());
    let store = Arc::new(InMemorySiteStore::new());
    let state = build_state(Arc::clone(&engine), Arc::clone(&store));
    let server = TestServer::new(create_app(state.clone())).expect("test server");
    TestApp {
        server,
        state,
        engine,
        store,
    }
}

#[allow(unused)]
impl TestApp {
    /// Create a site through the API and return the response body.
    pub async fn create_site(&self, name: &str) -> Value {
        let response = self
            .server
            .post("/api/v1/sites")
            .json(&json!({
                "name": name,
                "domain": format!("{name}.test"),
                "admin_email": "ops@sitefleet.test",
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json::<Value>()
    }

    pub async fn deploy_and_wait(&self, id: Uuid) {
        self.server
            .post(&format!("/api/v1/sites/{id}/deploy"))
            .await
            .assert_status(axum::http::StatusCode::ACCEPTED);
        tokio::time::timeout(
            Duration::from_secs(10),
            self.state.coordinator.wait_for_deployment(id),
        )
        .await
        .expect("deployment finishes")
        .expect("record after deployment");
    }
}

#[allow(unused)]
pub fn site_id(body: &Value) -> Uuid {
    body["site"]["id"]
        .as_str()
        .and_then(|id| id.parse().ok())
        .expect("site id in response")
}
