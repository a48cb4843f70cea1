//! Stop, start, remove and roll back existing stacks.
//!
//! Every operation addresses containers by their derived names and records a
//! per-service outcome instead of aborting on the first failure.

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use crate::{
    engine::{ContainerEngine, EngineError},
    health::HealthMonitor,
    naming::{ServiceKind, StackNames},
    settings::OrchestratorSettings,
    stack::{catalog::HealthGate, catalog::restart_gate, deployer::DeployProgress},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ServiceOutcome {
    Ok,
    /// Nothing to act on; the resource does not exist.
    Absent,
    Failed { error: String },
}

impl ServiceOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ServiceOutcome::Failed { .. })
    }

    fn from_engine(result: Result<(), EngineError>) -> Self {
        match result {
            Ok(()) => ServiceOutcome::Ok,
            Err(err) if err.is_not_found() => ServiceOutcome::Absent,
            Err(err) => ServiceOutcome::Failed {
                error: err.to_string(),
            },
        }
    }
}

pub type OperationReport = BTreeMap<ServiceKind, ServiceOutcome>;

/// Services whose outcome is a failure.
pub fn failed_services(report: &OperationReport) -> Vec<ServiceKind> {
    report
        .iter()
        .filter(|(_, outcome)| outcome.is_failed())
        .map(|(service, _)| *service)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub containers: OperationReport,
    pub volumes: BTreeMap<String, ServiceOutcome>,
    pub network: Option<ServiceOutcome>,
}

impl RemovalReport {
    pub fn has_failures(&self) -> bool {
        self.containers.values().any(ServiceOutcome::is_failed)
            || self.volumes.values().any(ServiceOutcome::is_failed)
            || self.network.as_ref().is_some_and(ServiceOutcome::is_failed)
    }
}

#[derive(Clone)]
pub struct LifecycleManager {
    engine: Arc<dyn ContainerEngine>,
    monitor: HealthMonitor,
    settings: Arc<OrchestratorSettings>,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl LifecycleManager {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        settings: Arc<OrchestratorSettings>,
    ) -> Self {
        let monitor = HealthMonitor::new(Arc::clone(&engine), settings.health);
        Self {
            engine,
            monitor,
            settings,
        }
    }

    /// Stop every service, dependents first. Containers and volumes stay.
    #[instrument(skip(self))]
    pub async fn stop_site(&self, prefix: &str) -> OperationReport {
        let names = StackNames::new(prefix);
        let grace = self.settings.timings.stop_grace;
        let mut report = OperationReport::new();
        for service in ServiceKind::ALL.into_iter().rev() {
            let container = names.container(service);
            let outcome = ServiceOutcome::from_engine(
                self.engine.stop_container(&container, grace).await,
            );
            if let ServiceOutcome::Failed { error } = &outcome {
                warn!(%service, %error, "failed to stop service");
            }
            report.insert(service, outcome);
        }
        info!(failed = failed_services(&report).len(), "stack stopped");
        report
    }

    /// Start every service in dependency order, re-gating db, cache and
    /// backend on the health monitor. A missing container counts as failed.
    #[instrument(skip(self))]
    pub async fn start_site(&self, prefix: &str) -> OperationReport {
        let names = StackNames::new(prefix);
        let mut report = OperationReport::new();
        for service in ServiceKind::ALL {
            let container = names.container(service);
            let outcome = match self.start_one(service, &container).await {
                Ok(()) => ServiceOutcome::Ok,
                Err(error) => {
                    warn!(%service, %error, "failed to start service");
                    ServiceOutcome::Failed { error }
                }
            };
            report.insert(service, outcome);
        }
        info!(failed = failed_services(&report).len(), "stack started");
        report
    }

    async fn start_one(&self, service: ServiceKind, container: &str) -> Result<(), String> {
        self.engine
            .start_container(container)
            .await
            .map_err(|err| err.to_string())?;
        if let HealthGate::Wait { timeout, settle } = restart_gate(service, &self.settings) {
            self.monitor
                .wait_for_healthy(container, timeout)
                .await
                .map_err(|err| err.to_string())?;
            if !settle.is_zero() {
                sleep(settle).await;
            }
        }
        Ok(())
    }

    /// Tear the whole stack down: containers, volumes and the network.
    /// Containers carrying another stack's ownership label are left alone.
    #[instrument(skip(self))]
    pub async fn remove_site(&self, prefix: &str) -> RemovalReport {
        let names = StackNames::new(prefix);
        let grace = self.settings.timings.stop_grace;
        let mut report = RemovalReport::default();

        let listing = match self.engine.list_containers().await {
            Ok(listing) => listing,
            Err(err) => {
                warn!(error = %err, "cannot list containers; nothing removed");
                for service in ServiceKind::ALL {
                    report.containers.insert(
                        service,
                        ServiceOutcome::Failed {
                            error: err.to_string(),
                        },
                    );
                }
                return report;
            }
        };

        for service in ServiceKind::ALL.into_iter().rev() {
            let container = names.container(service);
            let outcome = match listing.iter().find(|c| c.name == container) {
                None => ServiceOutcome::Absent,
                Some(existing) if !names.owns(existing) => ServiceOutcome::Failed {
                    error: format!("{container} is not owned by {}", names.prefix()),
                },
                Some(_) => {
                    let _ = self.engine.stop_container(&container, grace).await;
                    ServiceOutcome::from_engine(self.engine.remove_container(&container).await)
                }
            };
            if let ServiceOutcome::Failed { error } = &outcome {
                warn!(%service, %error, "failed to remove container");
            }
            report.containers.insert(service, outcome);
        }

        for volume in names.all_volumes() {
            let outcome = ServiceOutcome::from_engine(self.engine.remove_volume(&volume).await);
            if let ServiceOutcome::Failed { error } = &outcome {
                warn!(%volume, %error, "failed to remove volume");
            }
            report.volumes.insert(volume, outcome);
        }

        let network = names.network();
        let outcome = ServiceOutcome::from_engine(self.engine.remove_network(&network).await);
        if let ServiceOutcome::Failed { error } = &outcome {
            warn!(%network, %error, "failed to remove network");
        }
        report.network = Some(outcome);

        info!(failures = report.has_failures(), "stack removed");
        report
    }

    /// Undo a failed deployment attempt: remove the containers and volumes it
    /// created. The tenant network is left for the next attempt.
    #[instrument(skip_all, fields(containers = progress.containers.len(), volumes = progress.volumes.len()))]
    pub async fn rollback(&self, progress: &DeployProgress) {
        let grace = self.settings.timings.stop_grace;
        for (service, container) in progress.containers.iter().rev() {
            let _ = self.engine.stop_container(container, grace).await;
            match self.engine.remove_container(container).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => warn!(%service, error = %err, "rollback could not remove container"),
            }
        }
        for volume in &progress.volumes {
            if let Err(err) = self.engine.remove_volume(volume).await {
                warn!(%volume, error = %err, "rollback could not remove volume");
            }
        }
        info!("rolled back partial deployment");
    }
}
