pub use sitefleet_config::{
    Config, ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions,
    ConfigMetadata, ConfigWarnings, DatabaseConfig, EngineConfig, ServerConfig,
};
