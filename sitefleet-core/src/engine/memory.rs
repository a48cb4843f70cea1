//! In-memory [`ContainerEngine`] for tests.
//!
//! Behaves like a single-host engine closely enough for the orchestrator:
//! names are unique, containers need an existing network, volumes are created
//! on first mount and cannot be removed while mounted, and starting a
//! container fails when another running container already publishes one of
//! its host ports. Tests can script health readings, inject failures and park
//! a container's start until released.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{
    ContainerEngine, ContainerInspection, ContainerSummary, EngineError,
    EngineHealth, EngineInfo,
};
use crate::stack::spec::ContainerSpec;

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    spec: ContainerSpec,
    running: bool,
    started_at: Option<DateTime<Utc>>,
    logs: String,
}

#[derive(Debug, Default)]
struct State {
    containers: BTreeMap<String, FakeContainer>,
    // Containers not created through this engine, only visible in listings.
    seeded: BTreeMap<String, Vec<u16>>,
    networks: BTreeSet<String>,
    volumes: BTreeMap<String, Vec<u8>>,
    health_scripts: HashMap<String, VecDeque<EngineHealth>>,
    fail_create: HashSet<String>,
    fail_start: HashSet<String>,
    fail_stop: HashSet<String>,
    start_gates: HashMap<String, Arc<Notify>>,
    unreachable: bool,
    next_id: u64,
    creates: usize,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryEngine {
    state: Arc<Mutex<State>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a foreign container publishing `ports`.
    pub fn seed_container(&self, name: impl Into<String>, ports: &[u16]) {
        self.state.lock().seeded.insert(name.into(), ports.to_vec());
    }

    /// Queue health readings for `container`. The last reading sticks.
    pub fn script_health(
        &self,
        container: impl Into<String>,
        readings: impl IntoIterator<Item = EngineHealth>,
    ) {
        self.state
            .lock()
            .health_scripts
            .insert(container.into(), readings.into_iter().collect());
    }

    pub fn fail_create(&self, container: impl Into<String>) {
        self.state.lock().fail_create.insert(container.into());
    }

    pub fn fail_start(&self, container: impl Into<String>) {
        self.state.lock().fail_start.insert(container.into());
    }

    pub fn fail_stop(&self, container: impl Into<String>) {
        self.state.lock().fail_stop.insert(container.into());
    }

    /// Clear every injected failure.
    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.fail_create.clear();
        state.fail_start.clear();
        state.fail_stop.clear();
    }

    /// Park the next start of `container` until the returned handle is
    /// notified.
    pub fn hold_start(&self, container: impl Into<String>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state
            .lock()
            .start_gates
            .insert(container.into(), Arc::clone(&gate));
        gate
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    pub fn set_logs(&self, container: &str, logs: impl Into<String>) {
        if let Some(c) = self.state.lock().containers.get_mut(container) {
            c.logs = logs.into();
        }
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state.lock().containers.keys().cloned().collect()
    }

    pub fn volume_names(&self) -> Vec<String> {
        self.state.lock().volumes.keys().cloned().collect()
    }

    pub fn network_names(&self) -> Vec<String> {
        self.state.lock().networks.iter().cloned().collect()
    }

    pub fn is_running(&self, container: &str) -> bool {
        self.state
            .lock()
            .containers
            .get(container)
            .is_some_and(|c| c.running)
    }

    /// Total successful `create_container` calls.
    pub fn create_count(&self) -> usize {
        self.state.lock().creates
    }

    pub fn spec_of(&self, container: &str) -> Option<ContainerSpec> {
        self.state
            .lock()
            .containers
            .get(container)
            .map(|c| c.spec.clone())
    }

    pub fn write_volume(&self, volume: &str, data: &[u8]) {
        self.state
            .lock()
            .volumes
            .insert(volume.to_string(), data.to_vec());
    }

    pub fn read_volume(&self, volume: &str) -> Option<Vec<u8>> {
        self.state.lock().volumes.get(volume).cloned()
    }

    fn check_reachable(state: &State) -> Result<(), EngineError> {
        if state.unreachable {
            Err(EngineError::Rejected(
                "cannot connect to the container engine".into(),
            ))
        } else {
            Ok(())
        }
    }

    fn missing(kind: &'static str, name: &str) -> EngineError {
        EngineError::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl ContainerEngine for InMemoryEngine {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, EngineError> {
        let state = self.state.lock();
        Self::check_reachable(&state)?;
        let mut rows: Vec<ContainerSummary> = state
            .containers
            .iter()
            .map(|(name, c)| ContainerSummary {
                id: c.id.clone(),
                name: name.clone(),
                state: if c.running {
                    "running".into()
                } else if c.started_at.is_some() {
                    "exited".into()
                } else {
                    "created".into()
                },
                published_ports: c.spec.published_ports().collect(),
                labels: c.spec.labels.clone(),
            })
            .collect();
        rows.extend(state.seeded.iter().map(|(name, ports)| ContainerSummary {
            id: format!("seeded-{name}"),
            name: name.clone(),
            state: "running".into(),
            published_ports: ports.clone(),
            labels: BTreeMap::new(),
        }));
        Ok(rows)
    }

    async fn create_container(
        &self,
        spec: &ContainerSpec,
    ) -> Result<String, EngineError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        if state.fail_create.contains(&spec.name) {
            return Err(EngineError::Rejected(format!(
                "simulated create failure for {}",
                spec.name
            )));
        }
        if state.containers.contains_key(&spec.name) {
            return Err(EngineError::Rejected(format!(
                "container name {} is already in use",
                spec.name
            )));
        }
        if !state.networks.contains(&spec.network) {
            return Err(Self::missing("network", &spec.network));
        }
        for volume in spec.named_volumes() {
            state.volumes.entry(volume.to_string()).or_default();
        }
        state.next_id += 1;
        state.creates += 1;
        let id = format!("{:064x}", state.next_id);
        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                id: id.clone(),
                spec: spec.clone(),
                running: false,
                started_at: None,
                logs: String::new(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, name: &str) -> Result<(), EngineError> {
        let gate = {
            let mut state = self.state.lock();
            Self::check_reachable(&state)?;
            state.start_gates.remove(name)
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock();
        if state.fail_start.contains(name) {
            return Err(EngineError::Rejected(format!(
                "simulated start failure for {name}"
            )));
        }
        let ports: Vec<u16> = state
            .containers
            .get(name)
            .ok_or_else(|| Self::missing("container", name))?
            .spec
            .published_ports()
            .collect();
        let clash = state.containers.iter().any(|(other, c)| {
            other != name
                && c.running
                && c.spec.published_ports().any(|p| ports.contains(&p))
        }) || state
            .seeded
            .values()
            .any(|seeded| seeded.iter().any(|p| ports.contains(p)));
        if clash {
            return Err(EngineError::Rejected(format!(
                "{name}: port is already allocated"
            )));
        }

        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| Self::missing("container", name))?;
        if !container.running {
            container.running = true;
            container.started_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn stop_container(
        &self,
        name: &str,
        _grace: Duration,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        if state.fail_stop.contains(name) {
            return Err(EngineError::Rejected(format!(
                "simulated stop failure for {name}"
            )));
        }
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| Self::missing("container", name))?;
        container.running = false;
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        state
            .containers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Self::missing("container", name))
    }

    async fn inspect_container(
        &self,
        name: &str,
    ) -> Result<ContainerInspection, EngineError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        let (id, running, started_at, has_check) = {
            let c = state
                .containers
                .get(name)
                .ok_or_else(|| Self::missing("container", name))?;
            (
                c.id.clone(),
                c.running,
                c.started_at,
                c.spec.health_check.is_some(),
            )
        };

        let health = if has_check {
            let reading = match state.health_scripts.get_mut(name) {
                Some(script) if script.len() > 1 => script.pop_front(),
                Some(script) => script.front().copied(),
                None => None,
            };
            Some(reading.unwrap_or(EngineHealth::Healthy))
        } else {
            None
        };

        let status = if running {
            "running"
        } else if started_at.is_some() {
            "exited"
        } else {
            "created"
        };

        Ok(ContainerInspection {
            id,
            name: name.to_string(),
            running,
            status: status.to_string(),
            health,
            started_at,
        })
    }

    async fn container_logs(
        &self,
        name: &str,
        tail: usize,
    ) -> Result<String, EngineError> {
        let state = self.state.lock();
        Self::check_reachable(&state)?;
        let c = state
            .containers
            .get(name)
            .ok_or_else(|| Self::missing("container", name))?;
        let lines: Vec<&str> = c.logs.lines().collect();
        let start = lines.len().saturating_sub(tail);
        Ok(lines[start..].join("\n"))
    }

    async fn list_networks(&self) -> Result<Vec<String>, EngineError> {
        let state = self.state.lock();
        Self::check_reachable(&state)?;
        Ok(state.networks.iter().cloned().collect())
    }

    async fn create_network(
        &self,
        name: &str,
        _driver: &str,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        if !state.networks.insert(name.to_string()) {
            return Err(EngineError::Rejected(format!(
                "network with name {name} already exists"
            )));
        }
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        if state.containers.values().any(|c| c.spec.network == name) {
            return Err(EngineError::Rejected(format!(
                "network {name} has active endpoints"
            )));
        }
        if state.networks.remove(name) {
            Ok(())
        } else {
            Err(Self::missing("network", name))
        }
    }

    async fn create_volume(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        state.volumes.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        let in_use = state
            .containers
            .values()
            .any(|c| c.spec.named_volumes().any(|v| v == name));
        if in_use {
            return Err(EngineError::Rejected(format!(
                "volume {name} is in use"
            )));
        }
        state.volumes.remove(name);
        Ok(())
    }

    async fn engine_info(&self) -> Result<EngineInfo, EngineError> {
        let state = self.state.lock();
        Self::check_reachable(&state)?;
        Ok(EngineInfo {
            server_version: "in-memory".into(),
            operating_system: std::env::consts::OS.into(),
            architecture: std::env::consts::ARCH.into(),
            containers: state.containers.len() as u64,
            containers_running: state
                .containers
                .values()
                .filter(|c| c.running)
                .count() as u64,
        })
    }
}
