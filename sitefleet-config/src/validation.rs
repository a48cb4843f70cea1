use std::time::Duration;

use thiserror::Error;

use crate::{
    constants::{BACKEND_HEALTH_START_PERIOD, PORTS_PER_STACK},
    models::Config,
};

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("port base {port_base} leaves no room for a five-port stack")]
    InvalidPortBase { port_base: u16 },
    #[error("unhealthy threshold must be at least 1")]
    ZeroUnhealthyThreshold,
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("{field} must not be empty")]
    EmptyValue { field: &'static str },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    /// Emit every warning through `tracing`.
    pub fn log(&self) {
        for warning in &self.items {
            match &warning.hint {
                Some(hint) => tracing::warn!(hint = %hint, "{}", warning.message),
                None => tracing::warn!("{}", warning.message),
            }
        }
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();
    let settings = &config.orchestrator;

    let port_base = settings.port_base;
    if port_base == 0 || u32::from(port_base) + PORTS_PER_STACK > 65_536 {
        return Err(ConfigGuardRailError::InvalidPortBase { port_base });
    }
    if settings.health.unhealthy_threshold == 0 {
        return Err(ConfigGuardRailError::ZeroUnhealthyThreshold);
    }

    for (field, value) in [
        ("orchestrator.health.poll_interval", settings.health.poll_interval),
        ("orchestrator.timings.db_timeout", settings.timings.db_timeout),
        ("orchestrator.timings.cache_timeout", settings.timings.cache_timeout),
        (
            "orchestrator.timings.backend_timeout",
            settings.timings.backend_timeout,
        ),
        ("engine.command_timeout", config.engine.command_timeout),
        ("engine.create_timeout", config.engine.create_timeout),
    ] {
        if value == Duration::ZERO {
            return Err(ConfigGuardRailError::ZeroDuration { field });
        }
    }

    let images = &settings.images;
    for (field, value) in [
        ("engine.program", config.engine.program.as_str()),
        ("orchestrator.network_driver", settings.network_driver.as_str()),
        ("orchestrator.database_user", settings.database_user.as_str()),
        ("orchestrator.database_name", settings.database_name.as_str()),
        ("orchestrator.images.db", images.db.as_str()),
        ("orchestrator.images.cache", images.cache.as_str()),
        ("orchestrator.images.backend", images.backend.as_str()),
        ("orchestrator.images.edge", images.edge.as_str()),
        ("orchestrator.images.proxy_db", images.proxy_db.as_str()),
        ("orchestrator.images.proxy", images.proxy.as_str()),
        ("orchestrator.images.console", images.console.as_str()),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigGuardRailError::EmptyValue { field });
        }
    }

    if config.database.primary_url.is_none() {
        warnings.push_with_hint(
            "DATABASE_URL not configured; site records are kept in memory and lost on restart",
            "Set DATABASE_URL or [database].url to persist sites in PostgreSQL",
        );
    }

    if port_base < 1024 {
        warnings.push_with_hint(
            format!("Port base {port_base} is in the privileged range"),
            "Stacks will fail to publish ports unless the engine runs with elevated rights",
        );
    }

    if settings.timings.backend_timeout < BACKEND_HEALTH_START_PERIOD {
        warnings.push(format!(
            "Backend health timeout {} is shorter than the backend's {} start period; slow first boots will be rolled back",
            humantime::format_duration(settings.timings.backend_timeout),
            humantime::format_duration(BACKEND_HEALTH_START_PERIOD),
        ));
    }

    if settings.health.poll_interval >= settings.timings.cache_timeout {
        warnings.push(
            "Health poll interval is not shorter than the cache timeout; the cache gets a single health reading",
        );
    }

    Ok(warnings)
}
