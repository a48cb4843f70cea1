//! Container engine port.
//!
//! Everything the orchestrator needs from the engine goes through
//! [`ContainerEngine`], which is injected as an `Arc<dyn ContainerEngine>` so
//! the same code runs against the docker CLI in production and against an
//! in-memory engine in tests.

pub mod command;
pub mod docker;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stack::spec::ContainerSpec;

/// One row of the engine's container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub state: String,
    pub published_ports: Vec<u16>,
    pub labels: BTreeMap<String, String>,
}

/// Health status as reported by the engine for containers that declare a
/// health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineHealth {
    Starting,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInspection {
    pub id: String,
    pub name: String,
    pub running: bool,
    /// Engine status string (`running`, `exited`, `created`, ...).
    pub status: String,
    /// `None` when the container declares no health check.
    pub health: Option<EngineHealth>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineInfo {
    pub server_version: String,
    pub operating_system: String,
    pub architecture: String,
    pub containers: u64,
    pub containers_running: u64,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine command `{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("engine command `{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("no such {kind}: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("failed to parse engine output: {0}")]
    Parse(String),

    #[error("engine rejected request: {0}")]
    Rejected(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// All containers, running and stopped.
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, EngineError>;

    /// Create (but do not start) a container, returning its identifier.
    async fn create_container(
        &self,
        spec: &ContainerSpec,
    ) -> Result<String, EngineError>;

    async fn start_container(&self, name: &str) -> Result<(), EngineError>;

    async fn stop_container(
        &self,
        name: &str,
        grace: Duration,
    ) -> Result<(), EngineError>;

    /// Force-remove a container, running or not.
    async fn remove_container(&self, name: &str) -> Result<(), EngineError>;

    async fn inspect_container(
        &self,
        name: &str,
    ) -> Result<ContainerInspection, EngineError>;

    async fn container_logs(
        &self,
        name: &str,
        tail: usize,
    ) -> Result<String, EngineError>;

    async fn list_networks(&self) -> Result<Vec<String>, EngineError>;

    async fn create_network(
        &self,
        name: &str,
        driver: &str,
    ) -> Result<(), EngineError>;

    async fn remove_network(&self, name: &str) -> Result<(), EngineError>;

    async fn create_volume(&self, name: &str) -> Result<(), EngineError>;

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError>;

    async fn engine_info(&self) -> Result<EngineInfo, EngineError>;
}
