//! Health gating between deployment steps.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};

use crate::{
    engine::{ContainerEngine, ContainerInspection, EngineHealth},
    error::{OrchestratorError, Result},
    settings::HealthPolicy,
};

/// Operator-facing classification of a container's health signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthReading {
    Healthy,
    Unhealthy,
    Starting,
    /// The container declares no health check.
    #[serde(rename = "none")]
    NoSignal,
}

impl From<&ContainerInspection> for HealthReading {
    fn from(inspection: &ContainerInspection) -> Self {
        match inspection.health {
            Some(EngineHealth::Healthy) => HealthReading::Healthy,
            Some(EngineHealth::Unhealthy) => HealthReading::Unhealthy,
            Some(EngineHealth::Starting) => HealthReading::Starting,
            None => HealthReading::NoSignal,
        }
    }
}

/// How a successful wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    Healthy,
    /// No health check declared; accepted after the grace delay.
    NoHealthCheck,
}

#[derive(Clone)]
pub struct HealthMonitor {
    engine: Arc<dyn ContainerEngine>,
    policy: HealthPolicy,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl HealthMonitor {
    pub fn new(engine: Arc<dyn ContainerEngine>, policy: HealthPolicy) -> Self {
        Self { engine, policy }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    /// Poll `container` until it reports healthy.
    ///
    /// Fails once `unhealthy_threshold` consecutive `unhealthy` readings have
    /// been observed (a `starting` reading resets the streak) or when
    /// `timeout` elapses first.
    #[instrument(skip(self), fields(threshold = self.policy.unhealthy_threshold))]
    pub async fn wait_for_healthy(
        &self,
        container: &str,
        timeout: Duration,
    ) -> Result<HealthOutcome> {
        let deadline = Instant::now() + timeout;
        let mut streak = 0u32;

        loop {
            let inspection = self.engine.inspect_container(container).await?;
            match HealthReading::from(&inspection) {
                HealthReading::Healthy => {
                    debug!("container healthy");
                    return Ok(HealthOutcome::Healthy);
                }
                HealthReading::NoSignal => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    sleep(self.policy.no_health_grace.min(remaining)).await;
                    debug!("no health check declared, accepted after grace");
                    return Ok(HealthOutcome::NoHealthCheck);
                }
                HealthReading::Unhealthy => {
                    streak += 1;
                    warn!(streak, "container reported unhealthy");
                    if streak >= self.policy.unhealthy_threshold {
                        let logs = self
                            .engine
                            .container_logs(container, self.policy.log_tail)
                            .await
                            .unwrap_or_else(|err| format!("<logs unavailable: {err}>"));
                        return Err(OrchestratorError::Unhealthy {
                            container: container.to_string(),
                            observations: streak,
                            logs,
                        });
                    }
                }
                HealthReading::Starting => streak = 0,
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(OrchestratorError::HealthTimeout {
                    container: container.to_string(),
                    timeout,
                });
            }
            sleep(self.policy.poll_interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        engine::memory::InMemoryEngine,
        naming::ServiceKind,
        stack::spec::{ContainerSpec, HealthCheck, RestartPolicy},
    };

    use EngineHealth::{Healthy, Starting, Unhealthy};

    fn policy() -> HealthPolicy {
        HealthPolicy {
            poll_interval: Duration::from_millis(2),
            unhealthy_threshold: 3,
            no_health_grace: Duration::from_millis(1),
            log_tail: 2,
        }
    }

    async fn engine_with(name: &str, with_check: bool) -> Arc<InMemoryEngine> {
        let engine = Arc::new(InMemoryEngine::new());
        engine.create_network("net", "bridge").await.unwrap();
        let spec = ContainerSpec {
            service: ServiceKind::Db,
            name: name.into(),
            image: "postgres".into(),
            env: BTreeMap::new(),
            ports: vec![],
            volumes: vec![],
            network: "net".into(),
            restart: RestartPolicy::UnlessStopped,
            health_check: with_check.then(|| HealthCheck {
                command: "pg_isready".into(),
                interval: Duration::from_secs(5),
                timeout: Duration::from_secs(5),
                retries: 5,
                start_period: Duration::from_secs(10),
            }),
            labels: BTreeMap::new(),
            command: vec![],
        };
        engine.create_container(&spec).await.unwrap();
        engine.start_container(name).await.unwrap();
        engine
    }

    #[tokio::test]
    async fn healthy_after_transient_unhealthy_readings() {
        let engine = engine_with("db", true).await;
        engine.script_health("db", [Unhealthy, Unhealthy, Healthy]);
        let monitor = HealthMonitor::new(engine, policy());
        let outcome = monitor
            .wait_for_healthy("db", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome, HealthOutcome::Healthy);
    }

    #[tokio::test]
    async fn starting_resets_the_unhealthy_streak() {
        let engine = engine_with("db", true).await;
        engine.script_health(
            "db",
            [Unhealthy, Unhealthy, Starting, Unhealthy, Unhealthy, Healthy],
        );
        let monitor = HealthMonitor::new(engine, policy());
        assert!(monitor.wait_for_healthy("db", Duration::from_secs(5)).await.is_ok());
    }

    #[tokio::test]
    async fn threshold_fails_with_captured_logs() {
        let engine = engine_with("db", true).await;
        engine.set_logs("db", "boot\nFATAL: bad password\nshutting down");
        engine.script_health("db", [Unhealthy]);
        let monitor = HealthMonitor::new(engine, policy());

        let err = monitor
            .wait_for_healthy("db", Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            OrchestratorError::Unhealthy {
                observations, logs, ..
            } => {
                assert_eq!(observations, 3);
                assert_eq!(logs, "FATAL: bad password\nshutting down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn never_healthy_times_out() {
        let engine = engine_with("db", true).await;
        engine.script_health("db", [Starting]);
        let monitor = HealthMonitor::new(engine, policy());
        let err = monitor
            .wait_for_healthy("db", Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::HealthTimeout { .. }));
        assert!(err.is_health_failure());
    }

    #[tokio::test]
    async fn missing_health_check_is_accepted_after_grace() {
        let engine = engine_with("edge", false).await;
        let monitor = HealthMonitor::new(engine, policy());
        let outcome = monitor
            .wait_for_healthy("edge", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, HealthOutcome::NoHealthCheck);
    }

    #[tokio::test]
    async fn missing_container_is_an_engine_error() {
        let engine = engine_with("db", true).await;
        let monitor = HealthMonitor::new(engine, policy());
        let err = monitor
            .wait_for_healthy("ghost", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Engine(e) if e.is_not_found()));
    }
}
