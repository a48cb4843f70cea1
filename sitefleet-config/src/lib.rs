//! Shared configuration library for Sitefleet.
//!
//! Configuration is layered: environment variables (after an optional `.env`
//! file has been applied) win over `sitefleet.toml`, which wins over built-in
//! defaults. [`ConfigLoader`] performs the layering, then runs the guard rails
//! in [`validation`], returning hard errors for unusable settings and
//! [`ConfigWarnings`] for merely suspicious ones.

#![allow(missing_docs)]

pub mod constants;
pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError};
pub use models::{
    Config, ConfigMetadata, DatabaseConfig, EngineConfig, ServerConfig,
    sources::{EnvConfig, FileConfig},
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
