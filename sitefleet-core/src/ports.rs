//! Host port allocation.
//!
//! Allocation is a snapshot of the ports published by every container on
//! the engine at call time. Nothing is reserved, so two allocations running
//! concurrently can hand out the same ports.

use std::{collections::BTreeMap, collections::HashSet, fmt};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    engine::ContainerEngine,
    error::{OrchestratorError, Result},
};

/// Public endpoints of a stack, in allocation order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PortRole {
    /// Edge proxy in front of the backend.
    Web,
    /// Direct backend access.
    Backend,
    ProxyHttp,
    ProxyAdmin,
    Console,
}

impl PortRole {
    pub const ALL: [PortRole; 5] = [
        PortRole::Web,
        PortRole::Backend,
        PortRole::ProxyHttp,
        PortRole::ProxyAdmin,
        PortRole::Console,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PortRole::Web => "web",
            PortRole::Backend => "backend",
            PortRole::ProxyHttp => "proxy_http",
            PortRole::ProxyAdmin => "proxy_admin",
            PortRole::Console => "console",
        }
    }

    /// Port the service listens on inside its container.
    pub fn container_port(self) -> u16 {
        match self {
            PortRole::Web | PortRole::ProxyHttp => 80,
            PortRole::Backend => 3000,
            PortRole::ProxyAdmin => 81,
            PortRole::Console => 9000,
        }
    }
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type PortAssignment = BTreeMap<PortRole, u16>;

/// First `count` ports at or above `start` that are not in `used`, ascending.
pub fn pick_free_ports(
    used: &HashSet<u16>,
    count: usize,
    start: u16,
) -> Result<Vec<u16>> {
    let ports: Vec<u16> = (start..=u16::MAX)
        .filter(|port| !used.contains(port))
        .take(count)
        .collect();
    if ports.len() < count {
        return Err(OrchestratorError::PortsExhausted {
            count,
            start_port: start,
        });
    }
    Ok(ports)
}

/// Scan every container (running or stopped) and pick `count` free ports.
pub async fn find_available_ports(
    engine: &dyn ContainerEngine,
    count: usize,
    start: u16,
) -> Result<Vec<u16>> {
    let used: HashSet<u16> = engine
        .list_containers()
        .await?
        .into_iter()
        .flat_map(|c| c.published_ports)
        .collect();
    let ports = pick_free_ports(&used, count, start)?;
    debug!(?ports, in_use = used.len(), "allocated host ports");
    Ok(ports)
}

/// Allocate one port per [`PortRole`].
pub async fn allocate_stack_ports(
    engine: &dyn ContainerEngine,
    start: u16,
) -> Result<PortAssignment> {
    let ports = find_available_ports(engine, PortRole::ALL.len(), start).await?;
    Ok(PortRole::ALL.into_iter().zip(ports).collect())
}
