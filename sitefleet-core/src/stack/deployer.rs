//! Generic create, start, gate pipeline.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use tokio::time::sleep;
use tracing::{info, instrument, warn};

use super::{
    DeploymentConfig, DeploymentResult,
    catalog::{HealthGate, ServiceStep, build_stack_plan},
};
use crate::{
    engine::{ContainerEngine, ContainerSummary},
    error::{OrchestratorError, Result},
    health::HealthMonitor,
    naming::{PREFIX_LABEL, ServiceKind, StackNames},
    ports::PortAssignment,
    settings::OrchestratorSettings,
};

/// Resources created by the current attempt, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployProgress {
    pub containers: Vec<(ServiceKind, String)>,
    pub volumes: BTreeSet<String>,
}

impl DeployProgress {
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.volumes.is_empty()
    }
}

#[derive(Clone)]
pub struct StackDeployer {
    engine: Arc<dyn ContainerEngine>,
    monitor: HealthMonitor,
    settings: Arc<OrchestratorSettings>,
}

impl std::fmt::Debug for StackDeployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackDeployer")
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl StackDeployer {
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

    /// Build the plan for `config` and run it.
    ///
    /// Everything created is recorded in `progress` as it happens, so on error
    /// the caller can roll back exactly what this attempt left behind.
    #[instrument(skip_all, fields(prefix = %config.prefix))]
    pub async fn deploy_site(
        &self,
        config: &DeploymentConfig,
        ports: &PortAssignment,
        progress: &mut DeployProgress,
    ) -> Result<DeploymentResult> {
        let plan = build_stack_plan(config, ports, &self.settings)?;
        let names = StackNames::new(&config.prefix);
        let containers = self.run_plan(&names, &plan, progress).await?;
        info!(services = containers.len(), "stack deployed");
        Ok(DeploymentResult {
            containers,
            ports: ports.clone(),
            credentials: config.credentials_echo(),
        })
    }

    pub async fn run_plan(
        &self,
        names: &StackNames,
        plan: &[ServiceStep],
        progress: &mut DeployProgress,
    ) -> Result<BTreeMap<ServiceKind, String>> {
        let mut containers = BTreeMap::new();
        for step in plan {
            let id = self.run_step(names, step, progress).await?;
            containers.insert(step.spec.service, id);
        }
        Ok(containers)
    }

    #[instrument(skip_all, fields(service = %step.spec.service, container = %step.spec.name))]
    async fn run_step(
        &self,
        names: &StackNames,
        step: &ServiceStep,
        progress: &mut DeployProgress,
    ) -> Result<String> {
        let spec = &step.spec;

        // Ownership is settled before any volume is created.
        let stale = self.existing_container(&spec.name).await?;
        if let Some(existing) = &stale
            && !names.owns(existing)
        {
            return Err(OrchestratorError::ForeignContainer {
                name: spec.name.clone(),
                owner: existing
                    .labels
                    .get(PREFIX_LABEL)
                    .cloned()
                    .unwrap_or_else(|| "an unmanaged workload".into()),
            });
        }

        for volume in spec.named_volumes() {
            self.engine.create_volume(volume).await?;
            progress.volumes.insert(volume.to_string());
        }

        // Leftover from an interrupted attempt of this stack.
        if stale.is_some() {
            match self.engine.remove_container(&spec.name).await {
                Ok(()) => warn!("removed stale container before create"),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err.into()),
            }
        }

        let id = self.engine.create_container(spec).await?;
        progress
            .containers
            .push((spec.service, spec.name.clone()));
        self.engine.start_container(&spec.name).await?;

        match step.gate {
            HealthGate::Wait { timeout, settle } => {
                self.monitor.wait_for_healthy(&spec.name, timeout).await?;
                if !settle.is_zero() {
                    sleep(settle).await;
                }
            }
            HealthGate::Settle(delay) => sleep(delay).await,
            HealthGate::None => {}
        }

        info!("service ready");
        Ok(id)
    }

    async fn existing_container(&self, name: &str) -> Result<Option<ContainerSummary>> {
        Ok(self
            .engine
            .list_containers()
            .await?
            .into_iter()
            .find(|container| container.name == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{EngineHealth, memory::InMemoryEngine},
        naming::StackNames,
        network::ensure_network,
        ports::PortRole,
    };

    async fn setup() -> (Arc<InMemoryEngine>, StackDeployer, DeploymentConfig, PortAssignment) {
        let engine = Arc::new(InMemoryEngine::new());
        let config = DeploymentConfig::generate("acme", "acme.test", "ops@acme.test").unwrap();
        ensure_network(engine.as_ref(), &StackNames::new(&config.prefix).network(), "bridge")
            .await
            .unwrap();
        let deployer = StackDeployer::new(
            engine.clone(),
            Arc::new(OrchestratorSettings::fast()),
        );
        let ports = PortRole::ALL.into_iter().zip(8100..).collect();
        (engine, deployer, config, ports)
    }

    #[tokio::test]
    async fn deploys_all_services_running() {
        let (engine, deployer, config, ports) = setup().await;
        let mut progress = DeployProgress::default();
        let result = deployer.deploy_site(&config, &ports, &mut progress).await.unwrap();

        assert_eq!(result.containers.len(), 7);
        assert_eq!(progress.containers.len(), 7);
        assert_eq!(progress.volumes.len(), 7);
        assert!(engine.container_names().iter().all(|name| engine.is_running(name)));
        assert_eq!(result.credentials["admin_password"], config.admin_password);
    }

    #[tokio::test]
    async fn unhealthy_cache_stops_the_pipeline() {
        let (engine, deployer, config, ports) = setup().await;
        engine.script_health("site-acme_cache", [EngineHealth::Unhealthy]);
        let mut progress = DeployProgress::default();

        let err = deployer
            .deploy_site(&config, &ports, &mut progress)
            .await
            .unwrap_err();
        assert!(err.is_health_failure());
        let created: Vec<ServiceKind> = progress.containers.iter().map(|(s, _)| *s).collect();
        assert_eq!(created, vec![ServiceKind::Db, ServiceKind::Cache]);
        assert!(engine.spec_of("site-acme_backend").is_none());
    }

    #[tokio::test]
    async fn volumes_are_tracked_even_when_create_fails() {
        let (engine, deployer, config, ports) = setup().await;
        engine.fail_create("site-acme_db");
        let mut progress = DeployProgress::default();

        assert!(deployer.deploy_site(&config, &ports, &mut progress).await.is_err());
        assert!(progress.containers.is_empty());
        assert_eq!(
            progress.volumes.iter().collect::<Vec<_>>(),
            vec!["site-acme_db-data"]
        );
    }

    #[tokio::test]
    async fn stale_container_is_replaced() {
        let (engine, deployer, config, ports) = setup().await;
        let mut first = DeployProgress::default();
        engine.fail_start("site-acme_cache");
        assert!(deployer.deploy_site(&config, &ports, &mut first).await.is_err());
        engine.heal();

        let mut second = DeployProgress::default();
        deployer.deploy_site(&config, &ports, &mut second).await.unwrap();
        assert_eq!(engine.container_names().len(), 7);
    }

    #[tokio::test]
    async fn container_of_another_stack_is_never_replaced() {
        let (engine, deployer, config, ports) = setup().await;
        let other = DeploymentConfig::generate("globex", "globex.test", "ops@globex.test").unwrap();
        ensure_network(engine.as_ref(), &StackNames::new(&other.prefix).network(), "bridge")
            .await
            .unwrap();
        let plan = build_stack_plan(&other, &ports, &OrchestratorSettings::fast()).unwrap();
        let mut squatter = plan[0].spec.clone();
        squatter.name = "site-acme_db".into();
        engine.create_container(&squatter).await.unwrap();

        let mut progress = DeployProgress::default();
        let err = deployer
            .deploy_site(&config, &ports, &mut progress)
            .await
            .unwrap_err();
        assert!(
            matches!(&err, OrchestratorError::ForeignContainer { name, owner }
                if name == "site-acme_db" && owner == "site-globex"),
            "{err}"
        );
        assert!(progress.is_empty());
        assert!(
            !engine
                .volume_names()
                .iter()
                .any(|volume| volume.starts_with("site-acme_"))
        );
        let kept = engine.spec_of("site-acme_db").unwrap();
        assert_eq!(kept.labels[PREFIX_LABEL], "site-globex");
    }
}
