//! Tunables of the orchestrator.
//!
//! Defaults match production; tests shrink the timings to milliseconds.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT_BASE: u16 = 8100;
pub const DEFAULT_NETWORK_DRIVER: &str = "bridge";
pub const DEFAULT_ENGINE_SOCKET: &str = "/var/run/docker.sock";

/// How the health monitor polls a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPolicy {
    pub poll_interval: Duration,
    /// Consecutive `unhealthy` readings tolerated before giving up.
    pub unhealthy_threshold: u32,
    /// Wait applied to containers that declare no health check.
    pub no_health_grace: Duration,
    /// Log lines captured when a container is declared unhealthy.
    pub log_tail: usize,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            unhealthy_threshold: 3,
            no_health_grace: Duration::from_secs(5),
            log_tail: 50,
        }
    }
}

/// Per-service gate budgets and settle delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTimings {
    pub db_timeout: Duration,
    pub db_settle: Duration,
    pub cache_timeout: Duration,
    pub backend_timeout: Duration,
    pub proxy_db_settle: Duration,
    /// Grace period handed to the engine when stopping a container.
    pub stop_grace: Duration,
}

impl Default for ServiceTimings {
    fn default() -> Self {
        Self {
            db_timeout: Duration::from_secs(120),
            db_settle: Duration::from_secs(5),
            cache_timeout: Duration::from_secs(60),
            backend_timeout: Duration::from_secs(900),
            proxy_db_settle: Duration::from_secs(10),
            stop_grace: Duration::from_secs(10),
        }
    }
}

impl ServiceTimings {
    /// Millisecond-scale timings for tests.
    pub fn fast() -> Self {
        Self {
            db_timeout: Duration::from_millis(500),
            db_settle: Duration::from_millis(1),
            cache_timeout: Duration::from_millis(500),
            backend_timeout: Duration::from_millis(500),
            proxy_db_settle: Duration::from_millis(1),
            stop_grace: Duration::from_millis(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSet {
    pub db: String,
    pub cache: String,
    pub backend: String,
    pub edge: String,
    pub proxy_db: String,
    pub proxy: String,
    pub console: String,
}

impl Default for ImageSet {
    fn default() -> Self {
        Self {
            db: "postgres:16-alpine".into(),
            cache: "redis:7-alpine".into(),
            backend: "ghcr.io/sitefleet/backend:latest".into(),
            edge: "nginx:1.27-alpine".into(),
            proxy_db: "jc21/mariadb-aria:latest".into(),
            proxy: "jc21/nginx-proxy-manager:latest".into(),
            console: "portainer/portainer-ce:latest".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// First host port considered by the allocator.
    pub port_base: u16,
    pub network_driver: String,
    /// Engine control socket mounted into the management console.
    pub engine_socket: PathBuf,
    pub database_user: String,
    pub database_name: String,
    pub health: HealthPolicy,
    pub timings: ServiceTimings,
    pub images: ImageSet,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            port_base: DEFAULT_PORT_BASE,
            network_driver: DEFAULT_NETWORK_DRIVER.into(),
            engine_socket: PathBuf::from(DEFAULT_ENGINE_SOCKET),
            database_user: "sitefleet".into(),
            database_name: "sitefleet".into(),
            health: HealthPolicy::default(),
            timings: ServiceTimings::default(),
            images: ImageSet::default(),
        }
    }
}

impl OrchestratorSettings {
    /// Settings suitable for driving the in-memory engine in tests.
    pub fn fast() -> Self {
        Self {
            health: HealthPolicy {
                poll_interval: Duration::from_millis(5),
                unhealthy_threshold: 3,
                no_health_grace: Duration::from_millis(1),
                log_tail: 50,
            },
            timings: ServiceTimings::fast(),
            ..Self::default()
        }
    }
}
