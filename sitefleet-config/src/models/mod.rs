pub mod sources;

use std::{fmt, path::PathBuf, time::Duration};

use sitefleet_core::{OrchestratorSettings, engine::docker::DockerCliEngine};
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub orchestrator: OrchestratorSettings,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by the CORS layer; empty disables cross-origin access.
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Clone, Default)]
pub struct DatabaseConfig {
    pub primary_url: Option<String>,
}

impl DatabaseConfig {
    /// The connection URL with any password masked, for logs.
    pub fn redacted_url(&self) -> Option<String> {
        let raw = self.primary_url.as_deref()?;
        match Url::parse(raw) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                Some(url.to_string())
            }
            Err(_) => Some("<unparseable>".to_string()),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("primary_url", &self.redacted_url())
            .finish()
    }
}

/// How the server reaches the container engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub program: String,
    /// Engine endpoint handed to the CLI as `DOCKER_HOST`.
    pub host: Option<String>,
    pub command_timeout: Duration,
    pub create_timeout: Duration,
    /// Refuse to start the server when the engine is unreachable.
    pub required: bool,
}

impl EngineConfig {
    pub fn docker_cli(&self) -> DockerCliEngine {
        DockerCliEngine::new(&self.program)
            .with_host(self.host.clone())
            .with_timeouts(self.command_timeout, self.create_timeout)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
