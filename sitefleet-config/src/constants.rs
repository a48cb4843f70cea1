use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "sitefleet.toml";
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

pub const DEFAULT_ENGINE_PROGRAM: &str = "docker";
pub const DEFAULT_ENGINE_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_ENGINE_CREATE_TIMEOUT: Duration = Duration::from_secs(600);

/// Start period the backend image declares for its own health check. Gate
/// budgets shorter than this fail healthy-but-slow first boots.
pub const BACKEND_HEALTH_START_PERIOD: Duration = Duration::from_secs(300);

/// Host ports allocated per stack.
pub const PORTS_PER_STACK: u32 = 5;

/// Environment variable names read by [`crate::EnvConfig::gather`].
pub mod env {
    pub const CONFIG_PATH: &str = "SITEFLEET_CONFIG";
    pub const ENV_FILE: &str = "SITEFLEET_ENV_FILE";

    pub const SERVER_HOST: &str = "SITEFLEET_HOST";
    pub const SERVER_PORT: &str = "SITEFLEET_PORT";
    pub const CORS_ALLOWED_ORIGINS: &str = "SITEFLEET_CORS_ALLOWED_ORIGINS";

    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const DATABASE_URL_FILE: &str = "DATABASE_URL_FILE";
    pub const DATABASE_PASSWORD: &str = "DATABASE_PASSWORD";

    pub const ENGINE_PROGRAM: &str = "SITEFLEET_ENGINE_PROGRAM";
    pub const ENGINE_HOST: &str = "DOCKER_HOST";
    pub const ENGINE_COMMAND_TIMEOUT: &str = "SITEFLEET_ENGINE_TIMEOUT";
    pub const ENGINE_CREATE_TIMEOUT: &str = "SITEFLEET_ENGINE_CREATE_TIMEOUT";
    pub const ENGINE_REQUIRED: &str = "SITEFLEET_REQUIRE_ENGINE";

    pub const PORT_BASE: &str = "SITEFLEET_PORT_BASE";
    pub const NETWORK_DRIVER: &str = "SITEFLEET_NETWORK_DRIVER";
    pub const ENGINE_SOCKET: &str = "SITEFLEET_ENGINE_SOCKET";
    pub const HEALTH_POLL_INTERVAL: &str = "SITEFLEET_HEALTH_POLL_INTERVAL";
    pub const UNHEALTHY_THRESHOLD: &str = "SITEFLEET_UNHEALTHY_THRESHOLD";
    pub const BACKEND_TIMEOUT: &str = "SITEFLEET_BACKEND_TIMEOUT";
    pub const BACKEND_IMAGE: &str = "SITEFLEET_BACKEND_IMAGE";
}
