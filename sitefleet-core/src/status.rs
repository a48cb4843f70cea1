use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    engine::ContainerEngine,
    health::HealthReading,
    naming::{ServiceKind, StackNames},
};

/// Live state of one service container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceState {
    pub service: ServiceKind,
    pub container: String,
    pub running: bool,
    /// `None` when the container could not be inspected.
    pub health: Option<HealthReading>,
    pub started_at: Option<DateTime<Utc>>,
    /// Inspection error, e.g. for a missing container.
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct StatusReporter {
    engine: Arc<dyn ContainerEngine>,
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter").finish_non_exhaustive()
    }
}

impl StatusReporter {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Inspect all seven expected containers of the stack. Inspection errors
    /// are reported per service, never returned.
    pub async fn site_status(&self, prefix: &str) -> Vec<ServiceState> {
        let names = StackNames::new(prefix);
        let mut states = Vec::with_capacity(ServiceKind::ALL.len());
        for service in ServiceKind::ALL {
            let container = names.container(service);
            let state = match self.engine.inspect_container(&container).await {
                Ok(inspection) => ServiceState {
                    service,
                    running: inspection.running,
                    health: Some(HealthReading::from(&inspection)),
                    started_at: inspection.started_at,
                    error: None,
                    container,
                },
                Err(err) => ServiceState {
                    service,
                    container,
                    running: false,
                    health: None,
                    started_at: None,
                    error: Some(err.to_string()),
                },
            };
            states.push(state);
        }
        states
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, time::Duration};

    use super::*;
    use crate::{
        engine::memory::InMemoryEngine,
        stack::spec::{ContainerSpec, RestartPolicy},
    };

    #[tokio::test]
    async fn partial_stack_stays_observable() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.create_network("site-acme_net", "bridge").await.unwrap();
        let spec = ContainerSpec {
            service: ServiceKind::Edge,
            name: "site-acme_edge".into(),
            image: "nginx".into(),
            env: BTreeMap::new(),
            ports: vec![],
            volumes: vec![],
            network: "site-acme_net".into(),
            restart: RestartPolicy::UnlessStopped,
            health_check: None,
            labels: BTreeMap::new(),
            command: vec![],
        };
        engine.create_container(&spec).await.unwrap();
        engine.start_container("site-acme_edge").await.unwrap();
        engine
            .stop_container("site-acme_edge", Duration::ZERO)
            .await
            .unwrap();

        let states = StatusReporter::new(engine).site_status("site-acme").await;
        assert_eq!(states.len(), 7);

        let edge = states.iter().find(|s| s.service == ServiceKind::Edge).unwrap();
        assert!(!edge.running);
        assert_eq!(edge.health, Some(HealthReading::NoSignal));
        assert!(edge.started_at.is_some());
        assert!(edge.error.is_none());

        let missing = states.iter().filter(|s| s.error.is_some()).count();
        assert_eq!(missing, 6);
    }
}
