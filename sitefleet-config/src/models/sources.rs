use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::env;

/// Raw configuration as defined in a TOML file.
///
/// Durations are humantime strings (`"90s"`, `"15m"`) and are parsed by the
/// loader so errors can name the offending key.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub engine: FileEngineConfig,
    #[serde(default)]
    pub orchestrator: FileOrchestratorConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_file: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileEngineConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileOrchestratorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_base: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_driver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_socket: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default)]
    pub health: FileHealthConfig,
    #[serde(default)]
    pub timings: FileTimingsConfig,
    #[serde(default)]
    pub images: FileImagesConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileHealthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unhealthy_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_health_grace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_tail: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileTimingsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_settle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_db_settle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_grace: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileImagesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_db: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console: Option<String>,
}

/// Environment-derived configuration values.
///
/// Values are kept raw; the loader parses them so a malformed variable is
/// reported instead of silently ignored.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<String>,
    pub cors_allowed_origins: Option<String>,
    pub database_url: Option<String>,
    pub database_url_file: Option<PathBuf>,
    pub database_password: Option<String>,
    pub engine_program: Option<String>,
    pub engine_host: Option<String>,
    pub engine_command_timeout: Option<String>,
    pub engine_create_timeout: Option<String>,
    pub engine_required: Option<String>,
    pub port_base: Option<String>,
    pub network_driver: Option<String>,
    pub engine_socket: Option<PathBuf>,
    pub health_poll_interval: Option<String>,
    pub unhealthy_threshold: Option<String>,
    pub backend_timeout: Option<String>,
    pub backend_image: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let path = |key: &str| var(key).map(PathBuf::from);

        Self {
            config_path: path(env::CONFIG_PATH),
            server_host: var(env::SERVER_HOST),
            server_port: var(env::SERVER_PORT),
            cors_allowed_origins: var(env::CORS_ALLOWED_ORIGINS),
            database_url: var(env::DATABASE_URL),
            database_url_file: path(env::DATABASE_URL_FILE),
            database_password: var(env::DATABASE_PASSWORD),
            engine_program: var(env::ENGINE_PROGRAM),
            engine_host: var(env::ENGINE_HOST),
            engine_command_timeout: var(env::ENGINE_COMMAND_TIMEOUT),
            engine_create_timeout: var(env::ENGINE_CREATE_TIMEOUT),
            engine_required: var(env::ENGINE_REQUIRED),
            port_base: var(env::PORT_BASE),
            network_driver: var(env::NETWORK_DRIVER),
            engine_socket: path(env::ENGINE_SOCKET),
            health_poll_interval: var(env::HEALTH_POLL_INTERVAL),
            unhealthy_threshold: var(env::UNHEALTHY_THRESHOLD),
            backend_timeout: var(env::BACKEND_TIMEOUT),
            backend_image: var(env::BACKEND_IMAGE),
        }
    }
}
