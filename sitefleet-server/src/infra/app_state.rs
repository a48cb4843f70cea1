use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use sitefleet_core::DeploymentCoordinator;

use crate::infra::config::Config;

/// Where site records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackend::Postgres => "postgres",
            StoreBackend::Memory => "memory",
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: DeploymentCoordinator,
    pub config: Arc<Config>,
    pub store_backend: StoreBackend,
    pub started_at: DateTime<Utc>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("coordinator", &self.coordinator)
            .field("store_backend", &self.store_backend)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        coordinator: DeploymentCoordinator,
        config: Arc<Config>,
        store_backend: StoreBackend,
    ) -> Self {
        Self {
            coordinator,
            config,
            store_backend,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
