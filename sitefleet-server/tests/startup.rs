use std::sync::Arc;

use sitefleet_core::{
    DeploymentConfig, InMemorySiteStore, SiteRecord, SiteStatus, SiteStore,
    engine::memory::InMemoryEngine,
};
use sitefleet_server::infra::{
    app_state::StoreBackend,
    startup::{NoopStartupHooks, ProdStartupHooks, StartupHooks, assemble_state},
};

mod common;
use common::{build_state, test_config};

fn interrupted_record() -> SiteRecord {
    let mut record = SiteRecord::new(
        DeploymentConfig::generate("acme", "acme.test", "ops@acme.test").unwrap(),
    );
    record.transition(SiteStatus::Deploying).unwrap();
    record
}

#[tokio::test]
async fn prod_hooks_fail_interrupted_deployments() {
    let engine = Arc::new(InMemoryEngine::new());
    let store = Arc::new(InMemorySiteStore::new());
    let record = interrupted_record();
    store.insert(&record).await.unwrap();

    let state = build_state(engine, Arc::clone(&store));
    NoopStartupHooks.run(&state).await.unwrap();
    assert_eq!(
        store.get(record.id).await.unwrap().unwrap().status,
        SiteStatus::Deploying
    );

    ProdStartupHooks.run(&state).await.unwrap();
    let recovered = store.get(record.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, SiteStatus::Error);
    assert_eq!(recovered.error.as_deref(), Some("deployment interrupted"));
}

#[tokio::test]
async fn unreachable_engine_is_fatal_only_when_required() {
    let engine = Arc::new(InMemoryEngine::new());
    engine.set_unreachable(true);
    let store = Arc::new(InMemorySiteStore::new());

    let state = build_state(Arc::clone(&engine), Arc::clone(&store));
    ProdStartupHooks.run(&state).await.unwrap();

    let mut config = test_config();
    config.engine.required = true;
    let state = assemble_state(Arc::new(config), engine, store, StoreBackend::Memory);
    let err = ProdStartupHooks.run(&state).await.unwrap_err();
    assert!(err.to_string().contains("unreachable"), "{err}");
}
