mod support;

use std::collections::BTreeSet;

use sitefleet_core::{
    OrchestratorError, PortRole, ServiceKind, SiteRecord, SiteStatus, SiteStore,
    engine::EngineHealth, naming::StackNames, stack::DeploymentConfig,
};
use support::{Harness, eventually};

#[tokio::test]
async fn acme_deploys_with_five_ports_and_seven_containers() {
    let h = Harness::new();
    let site = h.create("acme").await;

    let accepted = h.coordinator.deploy(site.id).await.unwrap();
    assert_eq!(accepted.status, SiteStatus::Deploying);

    let done = h.coordinator.wait_for_deployment(site.id).await.unwrap();
    assert_eq!(done.status, SiteStatus::Running, "{:?}", done.error);
    assert!(done.deployed_at.is_some());
    assert_eq!(done.containers.len(), 7);

    let ports: BTreeSet<u16> = done.ports.values().copied().collect();
    assert_eq!(ports.len(), 5);
    assert!(ports.iter().all(|p| (8100..8105).contains(p)));
    assert_eq!(done.ports[&PortRole::Web], 8100);

    let (containers, volumes, networks) = h.owned("site-acme");
    assert_eq!(containers.len(), 7);
    assert_eq!(volumes.len(), 7);
    assert_eq!(networks, vec!["site-acme_net"]);
    assert!(h.coordinator.in_flight().is_empty());
}

#[tokio::test]
async fn second_deploy_while_deploying_is_rejected() {
    let h = Harness::new();
    let site = h.create("acme").await;
    let gate = h.engine.hold_start("site-acme_db");

    h.coordinator.deploy(site.id).await.unwrap();
    assert!(eventually(|| h.engine.create_count() == 1).await);
    assert_eq!(h.coordinator.in_flight(), vec![site.id]);

    let err = h.coordinator.deploy(site.id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvalidState {
            action: "deploy",
            status: SiteStatus::Deploying
        }
    ));
    assert_eq!(h.engine.create_count(), 1);

    gate.notify_one();
    let done = h.coordinator.wait_for_deployment(site.id).await.unwrap();
    assert_eq!(done.status, SiteStatus::Running);
    assert_eq!(h.engine.create_count(), 7);
}

#[tokio::test]
async fn running_site_cannot_be_redeployed() {
    let h = Harness::new();
    let site = h.create("acme").await;
    h.deploy_and_wait(site.id).await;

    let err = h.coordinator.deploy(site.id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvalidState {
            status: SiteStatus::Running,
            ..
        }
    ));
}

#[tokio::test]
async fn create_failure_at_every_step_rolls_back_all_but_the_network() {
    for (step, service) in ServiceKind::ALL.into_iter().enumerate() {
        let h = Harness::new();
        let site = h.create("acme").await;
        let names = StackNames::new(&site.prefix);
        h.engine.fail_create(names.container(service));

        let done = h.deploy_and_wait(site.id).await;
        assert_eq!(done.status, SiteStatus::Error, "step {}", step + 1);
        assert!(done.error.is_some());
        assert!(done.containers.is_empty());

        let (containers, volumes, networks) = h.owned(&site.prefix);
        assert!(containers.is_empty(), "step {}: {containers:?}", step + 1);
        assert!(volumes.is_empty(), "step {}: {volumes:?}", step + 1);
        assert_eq!(networks, vec!["site-acme_net"]);
    }
}

#[tokio::test]
async fn start_failure_rolls_back_created_containers() {
    let h = Harness::new();
    let site = h.create("acme").await;
    h.engine.fail_start("site-acme_proxy");

    let done = h.deploy_and_wait(site.id).await;
    assert_eq!(done.status, SiteStatus::Error);
    let (containers, volumes, _) = h.owned(&site.prefix);
    assert!(containers.is_empty());
    assert!(volumes.is_empty());
}

#[tokio::test]
async fn unhealthy_database_fails_with_logs_in_message() {
    let h = Harness::new();
    let site = h.create("acme").await;
    h.engine.script_health("site-acme_db", [EngineHealth::Unhealthy]);

    let done = h.deploy_and_wait(site.id).await;
    assert_eq!(done.status, SiteStatus::Error);
    let message = done.error.unwrap();
    assert!(message.contains("site-acme_db"), "{message}");
    assert!(h.owned(&site.prefix).0.is_empty());
}

#[tokio::test]
async fn retry_after_failure_uses_fresh_secrets() {
    let h = Harness::new();
    let site = h.create("acme").await;
    h.engine.fail_create("site-acme_backend");

    let failed = h.deploy_and_wait(site.id).await;
    assert_eq!(failed.status, SiteStatus::Error);

    h.engine.heal();
    let done = h.deploy_and_wait(site.id).await;
    assert_eq!(done.status, SiteStatus::Running);
    assert_eq!(done.error, None);
    assert_ne!(done.config.database_password, failed.config.database_password);
    assert_eq!(done.config.admin_password, site.config.admin_password);

    let backend = h.engine.spec_of("site-acme_backend").unwrap();
    assert!(backend.env["DATABASE_URL"].contains(&done.config.database_password));
}

#[tokio::test]
async fn unreachable_engine_fails_before_creating_anything() {
    let h = Harness::new();
    let site = h.create("acme").await;
    h.engine.set_unreachable(true);

    let done = h.deploy_and_wait(site.id).await;
    assert_eq!(done.status, SiteStatus::Error);
    h.engine.set_unreachable(false);
    assert_eq!(h.engine.create_count(), 0);
    assert!(h.engine.network_names().is_empty());
}

#[tokio::test]
async fn allocation_skips_ports_of_other_stacks() {
    let h = Harness::new();
    h.engine.seed_container("legacy-app", &[8100, 8102]);
    let first = h.create("acme").await;
    let first = h.deploy_and_wait(first.id).await;
    let second = h.create("globex").await;
    let second = h.deploy_and_wait(second.id).await;

    assert_eq!(first.ports[&PortRole::Web], 8101);
    let taken: BTreeSet<u16> = first.ports.values().copied().collect();
    assert!(second.ports.values().all(|p| !taken.contains(p) && *p != 8100 && *p != 8102));
    assert_eq!(second.status, SiteStatus::Running);
}

#[tokio::test]
async fn interrupted_deployments_are_marked_failed() {
    let h = Harness::new();
    let mut stale = SiteRecord::new(
        DeploymentConfig::generate("acme", "acme.test", "ops@acme.test").unwrap(),
    );
    stale.transition(SiteStatus::Deploying).unwrap();
    h.store.insert(&stale).await.unwrap();

    let recovered = h.coordinator.recover_interrupted().await.unwrap();
    assert_eq!(recovered, vec![stale.id]);

    let record = h.store.get(stale.id).await.unwrap().unwrap();
    assert_eq!(record.status, SiteStatus::Error);
    assert_eq!(record.error.as_deref(), Some("deployment interrupted"));

    let done = h.deploy_and_wait(stale.id).await;
    assert_eq!(done.status, SiteStatus::Running);
}

#[tokio::test]
async fn available_ports_reflect_engine_state() {
    let h = Harness::new();
    h.engine.seed_container("legacy-app", &[9000, 9001]);
    let ports = h.coordinator.list_available_ports(3, Some(9000)).await.unwrap();
    assert_eq!(ports, vec![9002, 9003, 9004]);

    let defaults = h.coordinator.list_available_ports(2, None).await.unwrap();
    assert_eq!(defaults, vec![8100, 8101]);

    assert!(h.coordinator.list_available_ports(5000, None).await.is_err());
}

#[tokio::test]
async fn overlapping_slugs_keep_stacks_apart() {
    let h = Harness::new();
    let acme = h.create("acme").await;
    let acme = h.deploy_and_wait(acme.id).await;
    assert_eq!(acme.status, SiteStatus::Running);
    h.engine.write_volume("site-acme_proxy-db-data", b"proxy hosts");
    let acme_proxy_db = h.engine.spec_of("site-acme_proxy-db").unwrap();

    let neighbour = h.create("acme-proxy").await;
    assert_eq!(neighbour.prefix, "site-acme-proxy");
    let neighbour = h.deploy_and_wait(neighbour.id).await;
    assert_eq!(neighbour.status, SiteStatus::Running, "{:?}", neighbour.error);
    assert_eq!(h.owned("site-acme-proxy").0.len(), 7);

    let removal = h.coordinator.remove(neighbour.id).await.unwrap();
    assert!(removal.deleted);
    assert_eq!(h.owned("site-acme-proxy"), (vec![], vec![], vec![]));

    let (containers, volumes, networks) = h.owned("site-acme");
    assert_eq!(containers.len(), 7);
    assert_eq!(volumes.len(), 7);
    assert_eq!(networks, vec!["site-acme_net"]);
    assert_eq!(h.engine.spec_of("site-acme_proxy-db"), Some(acme_proxy_db));
    assert_eq!(
        h.engine.read_volume("site-acme_proxy-db-data").as_deref(),
        Some(&b"proxy hosts"[..])
    );
    let detail = h.coordinator.get_status(acme.id).await.unwrap();
    assert!(detail.services.iter().all(|s| s.running));
}
