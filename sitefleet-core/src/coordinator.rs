//! Top-level entry point tying the engine, the store and the stack
//! components together.
//!
//! Status changes go through a coordinator-wide async mutex so that the
//! check-and-set of a transition is atomic within the process. Long running
//! lifecycle operations additionally claim the site in a busy map, which keeps
//! two operations on the same tenant from interleaving.

use std::{
    any::type_name_of_val,
    collections::BTreeMap,
    fmt,
    sync::{Arc, LazyLock},
};

use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};
use regex::Regex;
use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{Instrument, error, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::{
    engine::{ContainerEngine, EngineInfo},
    error::{OrchestratorError, Result},
    lifecycle::{
        LifecycleManager, OperationReport, RemovalReport, ServiceOutcome, failed_services,
    },
    naming::StackNames,
    network::ensure_network,
    ports::{allocate_stack_ports, find_available_ports},
    settings::OrchestratorSettings,
    site::{SiteRecord, SiteStatus, store::SiteStore},
    stack::{
        DeploymentConfig, DeploymentResult,
        deployer::{DeployProgress, StackDeployer},
    },
    status::{ServiceState, StatusReporter},
};

const MAX_PORT_QUERY: usize = 1000;

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*$")
        .expect("domain pattern compiles")
});
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

/// A freshly created site and its one-time admin password.
#[derive(Debug, Clone)]
pub struct CreatedSite {
    pub record: SiteRecord,
    pub admin_password: String,
}

/// Stored record plus live per-service state.
#[derive(Debug, Clone)]
pub struct SiteDetail {
    pub record: SiteRecord,
    pub services: Vec<ServiceState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineConnectivity {
    pub reachable: bool,
    pub info: Option<EngineInfo>,
    pub error: Option<String>,
}

/// Result of removing a site. The record is only deleted when every
/// resource was removed.
#[derive(Debug, Clone, Serialize)]
pub struct SiteRemoval {
    pub report: RemovalReport,
    pub deleted: bool,
}

#[derive(Clone)]
pub struct DeploymentCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<dyn ContainerEngine>,
    store: Arc<dyn SiteStore>,
    settings: Arc<OrchestratorSettings>,
    deployer: StackDeployer,
    lifecycle: LifecycleManager,
    reporter: StatusReporter,
    transitions: Mutex<()>,
    busy: DashMap<Uuid, &'static str>,
    tasks: DashMap<Uuid, JoinHandle<()>>,
}

impl fmt::Debug for DeploymentCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentCoordinator")
            .field("engine", &type_name_of_val(self.inner.engine.as_ref()))
            .field("store", &type_name_of_val(self.inner.store.as_ref()))
            .field("in_flight", &self.inner.tasks.len())
            .finish()
    }
}

/// Releases a busy claim on drop.
struct BusyClaim<'a> {
    busy: &'a DashMap<Uuid, &'static str>,
    id: Uuid,
}

impl Drop for BusyClaim<'_> {
    fn drop(&mut self) {
        self.busy.remove(&self.id);
    }
}

impl DeploymentCoordinator {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        store: Arc<dyn SiteStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        Self {
            inner: Arc::new(Inner {
                deployer: StackDeployer::new(Arc::clone(&engine), Arc::clone(&settings)),
                lifecycle: LifecycleManager::new(Arc::clone(&engine), Arc::clone(&settings)),
                reporter: StatusReporter::new(Arc::clone(&engine)),
                engine,
                store,
                settings,
                transitions: Mutex::new(()),
                busy: DashMap::new(),
                tasks: DashMap::new(),
            }),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    /// Validate input and store a new `pending` site.
    #[instrument(skip(self))]
    pub async fn create_deployment_config(
        &self,
        name: &str,
        domain: &str,
        admin_email: &str,
    ) -> Result<CreatedSite> {
        let config = DeploymentConfig::generate(name, domain, admin_email)?;
        if !DOMAIN_RE.is_match(&config.domain) {
            return Err(OrchestratorError::InvalidInput(format!(
                "invalid domain {:?}",
                config.domain
            )));
        }
        if !EMAIL_RE.is_match(&config.admin_email) {
            return Err(OrchestratorError::InvalidInput(format!(
                "invalid admin email {:?}",
                config.admin_email
            )));
        }

        let _guard = self.inner.transitions.lock().await;
        if self
            .inner
            .store
            .find_by_prefix(&config.prefix)
            .await?
            .is_some()
        {
            return Err(OrchestratorError::PrefixInUse(config.prefix));
        }

        let admin_password = config.admin_password.clone();
        let record = SiteRecord::new(config);
        self.inner.store.insert(&record).await?;
        info!(site = %record.id, prefix = %record.prefix, "site created");
        Ok(CreatedSite {
            record,
            admin_password,
        })
    }

    /// Move the site to `deploying` and run the deployment in the background.
    ///
    /// Returns as soon as the status is written. A supervisor task writes the
    /// terminal status when the deployment future completes, fails or panics.
    #[instrument(skip(self))]
    pub async fn deploy(&self, id: Uuid) -> Result<SiteRecord> {
        let record = {
            let _guard = self.inner.transitions.lock().await;
            if let Some(operation) = self.inner.busy.get(&id) {
                return Err(OrchestratorError::Busy {
                    id,
                    operation: *operation,
                });
            }
            let mut record = self.inner.load(id).await?;
            if !record.status.can_deploy() {
                return Err(OrchestratorError::InvalidState {
                    action: "deploy",
                    status: record.status,
                });
            }
            // Surviving volumes of a stack that once ran still hold the old
            // credentials.
            if record.deployed_at.is_none() {
                record.config.refresh_attempt_secrets();
            }
            record.transition(SiteStatus::Deploying)?;
            self.inner.store.update(&record).await?;
            record
        };

        self.inner.tasks.retain(|_, handle| !handle.is_finished());

        let span = info_span!("deployment", site = %id, prefix = %record.prefix);
        let worker = {
            let inner = Arc::clone(&self.inner);
            let config = record.config.clone();
            tokio::spawn(async move { inner.run_deployment(&config).await }.instrument(span.clone()))
        };
        let supervisor = {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(
                async move {
                    let outcome = match worker.await {
                        Ok(outcome) => outcome,
                        Err(join_error) => {
                            error!(error = %join_error, "deployment task did not complete");
                            Err(OrchestratorError::TaskAborted(join_error.to_string()))
                        }
                    };
                    inner.finish_deployment(id, outcome).await;
                }
                .instrument(span),
            )
        };
        self.inner.tasks.insert(id, supervisor);

        info!(site = %id, "deployment started");
        Ok(record)
    }

    /// Await the background deployment of `id`, if any, and return the
    /// record afterwards.
    pub async fn wait_for_deployment(&self, id: Uuid) -> Result<SiteRecord> {
        if let Some((_, handle)) = self.inner.tasks.remove(&id)
            && let Err(err) = handle.await
        {
            warn!(site = %id, error = %err, "deployment supervisor failed");
        }
        self.inner.load(id).await
    }

    /// Sites with a deployment currently running.
    pub fn in_flight(&self) -> Vec<Uuid> {
        self.inner
            .tasks
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .map(|entry| *entry.key())
            .collect()
    }

    #[instrument(skip(self))]
    pub async fn stop(&self, id: Uuid) -> Result<OperationReport> {
        let _claim = self.inner.claim(id, "stop")?;
        let record = self
            .inner
            .check(id, "stop", SiteStatus::can_stop)
            .await?;
        let report = self.inner.lifecycle.stop_site(&record.prefix).await;
        // Nothing stopped: the site stays redeployable in `error`.
        let failure = if report.values().all(|o| *o == ServiceOutcome::Absent) {
            Some("no containers to stop".to_string())
        } else {
            report_failure("stop", &report)
        };
        self.inner.conclude(id, SiteStatus::Stopped, failure).await?;
        Ok(report)
    }

    #[instrument(skip(self))]
    pub async fn start(&self, id: Uuid) -> Result<OperationReport> {
        let _claim = self.inner.claim(id, "start")?;
        let record = self
            .inner
            .check(id, "start", SiteStatus::can_start)
            .await?;
        let report = self.inner.lifecycle.start_site(&record.prefix).await;
        self.inner
            .conclude(id, SiteStatus::Running, report_failure("start", &report))
            .await?;
        Ok(report)
    }

    /// Remove every resource of the site and, when that fully succeeds,
    /// delete its record. Otherwise the record moves to `error`.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: Uuid) -> Result<SiteRemoval> {
        let _claim = self.inner.claim(id, "remove")?;
        let record = self
            .inner
            .check(id, "remove", SiteStatus::can_remove)
            .await?;
        let report = self.inner.lifecycle.remove_site(&record.prefix).await;

        let _guard = self.inner.transitions.lock().await;
        if report.has_failures() {
            let mut record = self.inner.load(id).await?;
            record.fail("remove incomplete; see removal report")?;
            self.inner.store.update(&record).await?;
            return Ok(SiteRemoval {
                report,
                deleted: false,
            });
        }
        self.inner.store.delete(id).await?;
        info!(site = %id, "site removed");
        Ok(SiteRemoval {
            report,
            deleted: true,
        })
    }

    /// Stored record plus live per-service state (skipped for `pending`
    /// sites, which own no containers yet).
    pub async fn get_status(&self, id: Uuid) -> Result<SiteDetail> {
        let record = self.inner.load(id).await?;
        let services = if record.status == SiteStatus::Pending {
            Vec::new()
        } else {
            self.inner.reporter.site_status(&record.prefix).await
        };
        Ok(SiteDetail { record, services })
    }

    /// Stored record only; no engine calls.
    pub async fn get_record(&self, id: Uuid) -> Result<SiteRecord> {
        self.inner.load(id).await
    }

    pub async fn list_sites(&self) -> Result<Vec<SiteRecord>> {
        Ok(self.inner.store.list().await?)
    }

    /// Free host ports right now; `base` defaults to the configured port base.
    pub async fn list_available_ports(
        &self,
        count: usize,
        base: Option<u16>,
    ) -> Result<Vec<u16>> {
        if count > MAX_PORT_QUERY {
            return Err(OrchestratorError::InvalidInput(format!(
                "count must be at most {MAX_PORT_QUERY}"
            )));
        }
        let base = base.unwrap_or(self.inner.settings.port_base);
        find_available_ports(self.inner.engine.as_ref(), count, base).await
    }

    pub async fn check_engine_connectivity(&self) -> EngineConnectivity {
        match self.inner.engine.engine_info().await {
            Ok(info) => EngineConnectivity {
                reachable: true,
                info: Some(info),
                error: None,
            },
            Err(err) => {
                warn!(error = %err, "container engine unreachable");
                EngineConnectivity {
                    reachable: false,
                    info: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Mark sites left in `deploying` by a previous process as failed.
    pub async fn recover_interrupted(&self) -> Result<Vec<Uuid>> {
        let _guard = self.inner.transitions.lock().await;
        let in_flight = self.in_flight();
        let mut recovered = Vec::new();
        for mut record in self.inner.store.list().await? {
            if record.status != SiteStatus::Deploying || in_flight.contains(&record.id) {
                continue;
            }
            record.fail("deployment interrupted")?;
            self.inner.store.update(&record).await?;
            warn!(site = %record.id, prefix = %record.prefix, "marked interrupted deployment as failed");
            recovered.push(record.id);
        }
        Ok(recovered)
    }
}

impl Inner {
    async fn load(&self, id: Uuid) -> Result<SiteRecord> {
        self.store
            .get(id)
            .await?
            .ok_or(OrchestratorError::SiteNotFound(id))
    }

    fn claim(&self, id: Uuid, operation: &'static str) -> Result<BusyClaim<'_>> {
        match self.busy.entry(id) {
            Entry::Occupied(entry) => Err(OrchestratorError::Busy {
                id,
                operation: *entry.get(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(operation);
                Ok(BusyClaim {
                    busy: &self.busy,
                    id,
                })
            }
        }
    }

    async fn check(
        &self,
        id: Uuid,
        action: &'static str,
        allowed: fn(SiteStatus) -> bool,
    ) -> Result<SiteRecord> {
        let _guard = self.transitions.lock().await;
        let record = self.load(id).await?;
        if !allowed(record.status) {
            return Err(OrchestratorError::InvalidState {
                action,
                status: record.status,
            });
        }
        Ok(record)
    }

    /// Write the status after a stop or start: `target`, or `error` with
    /// the given message.
    async fn conclude(
        &self,
        id: Uuid,
        target: SiteStatus,
        failure: Option<String>,
    ) -> Result<()> {
        let _guard = self.transitions.lock().await;
        let mut record = self.load(id).await?;
        match failure {
            None => record.transition(target)?,
            Some(message) => record.fail(message)?,
        }
        self.store.update(&record).await?;
        Ok(())
    }

    async fn run_deployment(&self, config: &DeploymentConfig) -> Result<DeploymentResult> {
        let names = StackNames::new(&config.prefix);
        let ports = allocate_stack_ports(self.engine.as_ref(), self.settings.port_base).await?;
        ensure_network(
            self.engine.as_ref(),
            &names.network(),
            &self.settings.network_driver,
        )
        .await?;

        let mut progress = DeployProgress::default();
        match self.deployer.deploy_site(config, &ports, &mut progress).await {
            Ok(result) => Ok(result),
            Err(err) => {
                error!(error = %err, "deployment failed, rolling back");
                self.lifecycle.rollback(&progress).await;
                Err(err)
            }
        }
    }

    async fn finish_deployment(&self, id: Uuid, outcome: Result<DeploymentResult>) {
        let _guard = self.transitions.lock().await;
        let mut record = match self.load(id).await {
            Ok(record) => record,
            Err(err) => {
                error!(site = %id, error = %err, "cannot record deployment outcome");
                return;
            }
        };

        let written = match outcome {
            Ok(result) => {
                record.ports = result.ports;
                record.containers = result.containers;
                record.deployed_at = Some(Utc::now());
                record.transition(SiteStatus::Running)
            }
            Err(err) => {
                record.ports = BTreeMap::new();
                record.containers = BTreeMap::new();
                record.fail(failure_message(&err))
            }
        };
        if let Err(err) = written {
            error!(site = %id, error = %err, "unexpected status at end of deployment");
            return;
        }
        match self.store.update(&record).await {
            Ok(()) => info!(site = %id, status = %record.status, "deployment finished"),
            Err(err) => error!(site = %id, error = %err, "failed to persist deployment outcome"),
        }
    }
}

fn failure_message(err: &OrchestratorError) -> String {
    match err {
        OrchestratorError::Unhealthy { logs, .. } if !logs.trim().is_empty() => {
            format!("{err}\nrecent logs:\n{logs}")
        }
        _ => err.to_string(),
    }
}

/// `"<action> failed for: a, b"` when any service failed.
fn report_failure(action: &str, report: &OperationReport) -> Option<String> {
    let failed = failed_services(report);
    if failed.is_empty() {
        return None;
    }
    let services: Vec<&str> = failed.iter().map(|s| s.as_str()).collect();
    Some(format!("{action} failed for: {}", services.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::memory::InMemoryEngine, site::store::InMemorySiteStore};

    fn coordinator() -> (Arc<InMemoryEngine>, DeploymentCoordinator) {
        let engine = Arc::new(InMemoryEngine::new());
        let coordinator = DeploymentCoordinator::new(
            engine.clone(),
            Arc::new(InMemorySiteStore::new()),
            OrchestratorSettings::fast(),
        );
        (engine, coordinator)
    }

    #[tokio::test]
    async fn create_validates_input() {
        let (_, coordinator) = coordinator();
        for (name, domain, email) in [
            ("acme", "not a domain", "ops@acme.test"),
            ("acme", "acme.test", "nope"),
            ("???", "acme.test", "ops@acme.test"),
        ] {
            let err = coordinator
                .create_deployment_config(name, domain, email)
                .await
                .unwrap_err();
            assert!(matches!(err, OrchestratorError::InvalidInput(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn duplicate_prefix_is_rejected() {
        let (_, coordinator) = coordinator();
        coordinator
            .create_deployment_config("Acme", "acme.test", "ops@acme.test")
            .await
            .unwrap();
        let err = coordinator
            .create_deployment_config("ACME!", "other.test", "ops@acme.test")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::PrefixInUse(p) if p == "site-acme"));
    }

    #[tokio::test]
    async fn stop_requires_running_or_error() {
        let (_, coordinator) = coordinator();
        let created = coordinator
            .create_deployment_config("acme", "acme.test", "ops@acme.test")
            .await
            .unwrap();
        let err = coordinator.stop(created.record.id).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidState {
                action: "stop",
                status: SiteStatus::Pending
            }
        ));
    }

    #[tokio::test]
    async fn unknown_site_is_not_found() {
        let (_, coordinator) = coordinator();
        let id = Uuid::new_v4();
        assert!(matches!(
            coordinator.deploy(id).await,
            Err(OrchestratorError::SiteNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn connectivity_reports_unreachable_engine() {
        let (engine, coordinator) = coordinator();
        assert!(coordinator.check_engine_connectivity().await.reachable);
        engine.set_unreachable(true);
        let status = coordinator.check_engine_connectivity().await;
        assert!(!status.reachable);
        assert!(status.error.is_some());
    }

    #[test]
    fn unhealthy_failures_carry_logs() {
        let err = OrchestratorError::Unhealthy {
            container: "site-acme_db".into(),
            observations: 3,
            logs: "FATAL".into(),
        };
        assert!(failure_message(&err).ends_with("recent logs:\nFATAL"));
    }
}
