mod support;

use sitefleet_core::{
    OrchestratorError, ServiceKind, SiteStatus,
    engine::EngineHealth,
    health::HealthReading,
    lifecycle::{ServiceOutcome, failed_services},
};
use support::{Harness, eventually};

#[tokio::test]
async fn stop_then_start_keeps_database_volume() {
    let h = Harness::new();
    let site = h.create("acme").await;
    h.deploy_and_wait(site.id).await;
    h.engine.write_volume("site-acme_db-data", b"orders table");

    let stopped = h.coordinator.stop(site.id).await.unwrap();
    assert!(stopped.values().all(|o| *o == ServiceOutcome::Ok));
    assert!(!h.engine.is_running("site-acme_db"));
    let record = h.coordinator.get_status(site.id).await.unwrap().record;
    assert_eq!(record.status, SiteStatus::Stopped);
    assert_eq!(h.owned(&site.prefix).0.len(), 7);

    let started = h.coordinator.start(site.id).await.unwrap();
    assert!(failed_services(&started).is_empty());
    let detail = h.coordinator.get_status(site.id).await.unwrap();
    assert_eq!(detail.record.status, SiteStatus::Running);
    assert!(detail.services.iter().all(|s| s.running));
    assert_eq!(
        h.engine.read_volume("site-acme_db-data").as_deref(),
        Some(&b"orders table"[..])
    );
}

#[tokio::test]
async fn partial_stop_failure_moves_site_to_error() {
    let h = Harness::new();
    let site = h.create("acme").await;
    h.deploy_and_wait(site.id).await;
    h.engine.fail_stop("site-acme_proxy");

    let report = h.coordinator.stop(site.id).await.unwrap();
    assert_eq!(failed_services(&report), vec![ServiceKind::Proxy]);
    assert_eq!(report[&ServiceKind::Db], ServiceOutcome::Ok);

    let record = h.coordinator.get_status(site.id).await.unwrap().record;
    assert_eq!(record.status, SiteStatus::Error);
    assert_eq!(record.error.as_deref(), Some("stop failed for: proxy"));

    // Operators recover from error by retrying.
    h.engine.heal();
    h.coordinator.stop(site.id).await.unwrap();
    let record = h.coordinator.get_status(site.id).await.unwrap().record;
    assert_eq!(record.status, SiteStatus::Stopped);
    assert_eq!(record.error, None);
}

#[tokio::test]
async fn start_regates_backend_health() {
    let h = Harness::new();
    let site = h.create("acme").await;
    h.deploy_and_wait(site.id).await;
    h.coordinator.stop(site.id).await.unwrap();
    h.engine
        .script_health("site-acme_backend", [EngineHealth::Unhealthy]);

    let report = h.coordinator.start(site.id).await.unwrap();
    assert_eq!(failed_services(&report), vec![ServiceKind::Backend]);

    let detail = h.coordinator.get_status(site.id).await.unwrap();
    assert_eq!(detail.record.status, SiteStatus::Error);
    let backend = detail
        .services
        .iter()
        .find(|s| s.service == ServiceKind::Backend)
        .unwrap();
    assert_eq!(backend.health, Some(HealthReading::Unhealthy));
}

#[tokio::test]
async fn start_and_stop_respect_preconditions() {
    let h = Harness::new();
    let site = h.create("acme").await;
    h.deploy_and_wait(site.id).await;

    assert!(matches!(
        h.coordinator.start(site.id).await,
        Err(OrchestratorError::InvalidState {
            action: "start",
            status: SiteStatus::Running
        })
    ));
    h.coordinator.stop(site.id).await.unwrap();
    assert!(matches!(
        h.coordinator.stop(site.id).await,
        Err(OrchestratorError::InvalidState {
            action: "stop",
            status: SiteStatus::Stopped
        })
    ));
}

#[tokio::test]
async fn remove_leaves_no_resources_and_deletes_record() {
    let h = Harness::new();
    let site = h.create("acme").await;
    h.deploy_and_wait(site.id).await;
    let other = h.create("globex").await;
    h.deploy_and_wait(other.id).await;

    let removal = h.coordinator.remove(site.id).await.unwrap();
    assert!(removal.deleted);
    assert!(!removal.report.has_failures());

    let (containers, volumes, networks) = h.owned(&site.prefix);
    assert!(containers.is_empty() && volumes.is_empty() && networks.is_empty());
    assert!(matches!(
        h.coordinator.get_status(site.id).await,
        Err(OrchestratorError::SiteNotFound(_))
    ));

    // The neighbouring tenant is untouched.
    let (containers, volumes, networks) = h.owned(&other.prefix);
    assert_eq!(containers.len(), 7);
    assert_eq!(volumes.len(), 7);
    assert_eq!(networks.len(), 1);
    assert!(containers.iter().all(|c| h.engine.is_running(c)));
}

#[tokio::test]
async fn remove_of_pending_site_is_clean() {
    let h = Harness::new();
    let site = h.create("acme").await;
    let removal = h.coordinator.remove(site.id).await.unwrap();
    assert!(removal.deleted);
    assert_eq!(removal.report.network, Some(ServiceOutcome::Absent));
    assert!(h.coordinator.list_sites().await.unwrap().is_empty());
}

#[tokio::test]
async fn remove_is_rejected_while_deploying() {
    let h = Harness::new();
    let site = h.create("acme").await;
    let gate = h.engine.hold_start("site-acme_db");
    h.coordinator.deploy(site.id).await.unwrap();
    assert!(eventually(|| h.engine.create_count() == 1).await);

    assert!(matches!(
        h.coordinator.remove(site.id).await,
        Err(OrchestratorError::InvalidState {
            action: "remove",
            status: SiteStatus::Deploying
        })
    ));

    gate.notify_one();
    h.coordinator.wait_for_deployment(site.id).await.unwrap();
    assert!(h.coordinator.remove(site.id).await.unwrap().deleted);
}

#[tokio::test]
async fn pending_site_reports_no_live_services() {
    let h = Harness::new();
    let site = h.create("acme").await;
    let detail = h.coordinator.get_status(site.id).await.unwrap();
    assert_eq!(detail.record.status, SiteStatus::Pending);
    assert!(detail.services.is_empty());
}

#[tokio::test]
async fn stop_of_empty_failed_stack_stays_redeployable() {
    let h = Harness::new();
    let site = h.create("acme").await;
    h.engine.fail_create("site-acme_db");
    let failed = h.deploy_and_wait(site.id).await;
    assert_eq!(failed.status, SiteStatus::Error);

    let report = h.coordinator.stop(site.id).await.unwrap();
    assert!(report.values().all(|o| *o == ServiceOutcome::Absent));
    let record = h.coordinator.get_record(site.id).await.unwrap();
    assert_eq!(record.status, SiteStatus::Error);
    assert_eq!(record.error.as_deref(), Some("no containers to stop"));

    h.engine.heal();
    let done = h.deploy_and_wait(site.id).await;
    assert_eq!(done.status, SiteStatus::Running);
}
