pub mod error;

use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::LazyLock,
    time::Duration,
};

use sitefleet_core::{
    HealthPolicy, ImageSet, OrchestratorSettings, ServiceTimings,
};
use tracing::debug;
use url::Url;

use self::error::ConfigLoadError;
use crate::{
    constants::{self, env as keys},
    models::{
        Config, ConfigMetadata, DatabaseConfig, EngineConfig, ServerConfig,
        sources::{
            EnvConfig, FileConfig, FileDatabaseConfig, FileOrchestratorConfig,
        },
    },
    util::{parse_bool, parse_csv, parse_duration},
    validation::{self, ConfigWarnings},
};

static DEFAULT_CONFIG_LOCATIONS: LazyLock<Vec<PathBuf>> = LazyLock::new(|| {
    vec![
        PathBuf::from(constants::DEFAULT_CONFIG_FILE),
        PathBuf::from("config").join(constants::DEFAULT_CONFIG_FILE),
    ]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Apply the `.env` file, then layer the process environment over the
    /// config file and defaults.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file = self
            .options
            .env_file
            .clone()
            .or_else(|| std::env::var_os(keys::ENV_FILE).map(PathBuf::from));
        let env_file_loaded = match env_file {
            Some(path) => dotenvy::from_path(&path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Layer an already gathered environment over the config file and
    /// defaults. No `.env` file is read.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let (config, warnings) =
            self.compose_config(file_config, env, config_path)?;
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env_config.config_path {
            source.env = Some(from_env.clone());
        } else {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .cloned();
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents = fs::read_to_string(&path).map_err(|err| {
            ConfigLoadError::Io {
                path: path.clone(),
                source: err,
            }
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;
        debug!(path = %path.display(), ?provenance, "loaded config file");

        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
    ) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if config_path.is_none() {
            warnings.push_with_hint(
                "No sitefleet.toml detected; using environment variables and defaults",
                "Set SITEFLEET_CONFIG or pass --config to load a configuration file",
            );
        }

        let FileConfig {
            server: file_server,
            database: file_database,
            engine: file_engine,
            orchestrator: file_orchestrator,
        } = file_config.unwrap_or_default();

        let server = ServerConfig {
            host: env
                .server_host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| constants::DEFAULT_SERVER_HOST.to_string()),
            port: parse_env(keys::SERVER_PORT, env.server_port.as_deref())?
                .or(file_server.port)
                .unwrap_or(constants::DEFAULT_SERVER_PORT),
            cors_allowed_origins: env
                .cors_allowed_origins
                .as_deref()
                .map(parse_csv)
                .or(file_server.cors_allowed_origins)
                .unwrap_or_default(),
        };

        let database = DatabaseConfig {
            primary_url: self.resolve_database_url(&env, &file_database)?,
        };

        let engine_required = match env.engine_required.as_deref() {
            Some(raw) => Some(parse_bool(raw).ok_or_else(|| {
                ConfigLoadError::InvalidValue {
                    key: keys::ENGINE_REQUIRED,
                    value: raw.to_string(),
                    reason: "expected a boolean".into(),
                }
            })?),
            None => None,
        };

        let engine = EngineConfig {
            program: env
                .engine_program
                .clone()
                .or(file_engine.program)
                .unwrap_or_else(|| constants::DEFAULT_ENGINE_PROGRAM.to_string()),
            host: env.engine_host.clone().or(file_engine.host),
            command_timeout: duration_setting(
                keys::ENGINE_COMMAND_TIMEOUT,
                env.engine_command_timeout.as_deref(),
                "engine.command_timeout",
                file_engine.command_timeout.as_deref(),
                constants::DEFAULT_ENGINE_COMMAND_TIMEOUT,
            )?,
            create_timeout: duration_setting(
                keys::ENGINE_CREATE_TIMEOUT,
                env.engine_create_timeout.as_deref(),
                "engine.create_timeout",
                file_engine.create_timeout.as_deref(),
                constants::DEFAULT_ENGINE_CREATE_TIMEOUT,
            )?,
            required: engine_required.or(file_engine.required).unwrap_or(false),
        };

        let orchestrator = compose_orchestrator(&env, file_orchestrator)?;

        let config = Config {
            server,
            database,
            engine,
            orchestrator,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: false,
            },
        };

        let guard_warnings = validation::apply_guard_rails(&config)?;
        warnings.extend(guard_warnings);

        Ok((config, warnings))
    }

    fn resolve_database_url(
        &self,
        env: &EnvConfig,
        file_database: &FileDatabaseConfig,
    ) -> Result<Option<String>, ConfigLoadError> {
        if let Some(url) = env.database_url.clone() {
            Url::parse(&url).map_err(|source| {
                ConfigLoadError::InvalidDatabaseUrl { source }
            })?;
            return Ok(Some(url));
        }

        if let Some(path) = env.database_url_file.as_ref()
            && let Some(url) = read_secret_file(path)?
        {
            return Ok(Some(url));
        }

        let Some(stored_url) = file_database.url.as_deref() else {
            return Ok(None);
        };
        let trimmed = stored_url.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let mut parsed = Url::parse(trimmed)
            .map_err(|source| ConfigLoadError::InvalidDatabaseUrl { source })?;
        if parsed.password().is_none() {
            let password = match env.database_password.clone() {
                Some(password) => Some(password),
                None => match file_database.password_file.as_ref() {
                    Some(path) => read_secret_file(path)?,
                    None => None,
                },
            };
            if let Some(password) = password {
                parsed
                    .set_password(Some(&password))
                    .map_err(|_| ConfigLoadError::InvalidDatabasePassword)?;
            }
        }
        Ok(Some(parsed.to_string()))
    }
}

fn compose_orchestrator(
    env: &EnvConfig,
    file: FileOrchestratorConfig,
) -> Result<OrchestratorSettings, ConfigLoadError> {
    let defaults = OrchestratorSettings::default();
    let FileOrchestratorConfig {
        port_base,
        network_driver,
        engine_socket,
        database_user,
        database_name,
        health,
        timings,
        images,
    } = file;

    let health = HealthPolicy {
        poll_interval: duration_setting(
            keys::HEALTH_POLL_INTERVAL,
            env.health_poll_interval.as_deref(),
            "orchestrator.health.poll_interval",
            health.poll_interval.as_deref(),
            defaults.health.poll_interval,
        )?,
        unhealthy_threshold: parse_env(
            keys::UNHEALTHY_THRESHOLD,
            env.unhealthy_threshold.as_deref(),
        )?
        .or(health.unhealthy_threshold)
        .unwrap_or(defaults.health.unhealthy_threshold),
        no_health_grace: file_duration(
            "orchestrator.health.no_health_grace",
            health.no_health_grace.as_deref(),
            defaults.health.no_health_grace,
        )?,
        log_tail: health.log_tail.unwrap_or(defaults.health.log_tail),
    };

    let timings = ServiceTimings {
        db_timeout: file_duration(
            "orchestrator.timings.db_timeout",
            timings.db_timeout.as_deref(),
            defaults.timings.db_timeout,
        )?,
        db_settle: file_duration(
            "orchestrator.timings.db_settle",
            timings.db_settle.as_deref(),
            defaults.timings.db_settle,
        )?,
        cache_timeout: file_duration(
            "orchestrator.timings.cache_timeout",
            timings.cache_timeout.as_deref(),
            defaults.timings.cache_timeout,
        )?,
        backend_timeout: duration_setting(
            keys::BACKEND_TIMEOUT,
            env.backend_timeout.as_deref(),
            "orchestrator.timings.backend_timeout",
            timings.backend_timeout.as_deref(),
            defaults.timings.backend_timeout,
        )?,
        proxy_db_settle: file_duration(
            "orchestrator.timings.proxy_db_settle",
            timings.proxy_db_settle.as_deref(),
            defaults.timings.proxy_db_settle,
        )?,
        stop_grace: file_duration(
            "orchestrator.timings.stop_grace",
            timings.stop_grace.as_deref(),
            defaults.timings.stop_grace,
        )?,
    };

    let default_images = defaults.images;
    let images = ImageSet {
        db: images.db.unwrap_or(default_images.db),
        cache: images.cache.unwrap_or(default_images.cache),
        backend: env
            .backend_image
            .clone()
            .or(images.backend)
            .unwrap_or(default_images.backend),
        edge: images.edge.unwrap_or(default_images.edge),
        proxy_db: images.proxy_db.unwrap_or(default_images.proxy_db),
        proxy: images.proxy.unwrap_or(default_images.proxy),
        console: images.console.unwrap_or(default_images.console),
    };

    Ok(OrchestratorSettings {
        port_base: parse_env(keys::PORT_BASE, env.port_base.as_deref())?
            .or(port_base)
            .unwrap_or(defaults.port_base),
        network_driver: env
            .network_driver
            .clone()
            .or(network_driver)
            .unwrap_or(defaults.network_driver),
        engine_socket: env
            .engine_socket
            .clone()
            .or(engine_socket)
            .unwrap_or(defaults.engine_socket),
        database_user: database_user.unwrap_or(defaults.database_user),
        database_name: database_name.unwrap_or(defaults.database_name),
        health,
        timings,
        images,
    })
}

fn parse_env<T>(
    key: &'static str,
    raw: Option<&str>,
) -> Result<Option<T>, ConfigLoadError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.map(|value| {
        value.trim().parse().map_err(|err: T::Err| {
            ConfigLoadError::InvalidValue {
                key,
                value: value.to_string(),
                reason: err.to_string(),
            }
        })
    })
    .transpose()
}

fn duration_setting(
    env_key: &'static str,
    env_value: Option<&str>,
    file_key: &'static str,
    file_value: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match env_value {
        Some(raw) => parse_duration(raw).map_err(|source| {
            ConfigLoadError::InvalidDuration {
                key: env_key,
                value: raw.to_string(),
                source,
            }
        }),
        None => file_duration(file_key, file_value, default),
    }
}

fn file_duration(
    key: &'static str,
    raw: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match raw {
        Some(raw) => parse_duration(raw).map_err(|source| {
            ConfigLoadError::InvalidDuration {
                key,
                value: raw.to_string(),
                source,
            }
        }),
        None => Ok(default),
    }
}

fn read_secret_file(path: &Path) -> Result<Option<String>, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| {
        ConfigLoadError::SecretFileIo {
            path: path.to_path_buf(),
            source,
        }
    })?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(
            self,
            ConfigPathProvenance::Explicit | ConfigPathProvenance::Env
        )
    }
}
