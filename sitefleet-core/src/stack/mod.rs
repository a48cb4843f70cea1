//! Stack definition and deployment.
//!
//! [`catalog`] turns a [`DeploymentConfig`] into the ordered list of
//! services, [`deployer`] runs that list against the engine.

pub mod catalog;
pub mod deployer;
pub mod spec;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    credentials::{generate_password, generate_secret},
    error::{OrchestratorError, Result},
    naming::{ServiceKind, container_prefix, slugify},
    ports::PortAssignment,
};

const ADMIN_PASSWORD_LEN: usize = 20;
const DATABASE_PASSWORD_LEN: usize = 32;
const SESSION_SECRET_LEN: usize = 64;

/// Login the proxy-manager image ships with until changed in its UI.
pub const PROXY_DEFAULT_EMAIL: &str = "admin@example.com";
pub const PROXY_DEFAULT_PASSWORD: &str = "changeme";

/// Everything needed to deploy one tenant stack.
///
/// Serialised with the site record so a deployment can be retried; the
/// `Debug` output never shows secrets.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub name: String,
    pub slug: String,
    pub domain: String,
    pub prefix: String,
    pub admin_email: String,
    pub admin_password: String,
    pub database_password: String,
    pub session_secret: String,
    pub proxy_db_password: String,
    pub proxy_db_root_password: String,
}

impl std::fmt::Debug for DeploymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentConfig")
            .field("name", &self.name)
            .field("slug", &self.slug)
            .field("domain", &self.domain)
            .field("prefix", &self.prefix)
            .field("admin_email", &self.admin_email)
            .field("secrets", &"<redacted>")
            .finish()
    }
}

impl DeploymentConfig {
    /// Derive slug and prefix from `name` and generate every credential.
    pub fn generate(name: &str, domain: &str, admin_email: &str) -> Result<Self> {
        let name = name.trim();
        let slug = slugify(name).ok_or_else(|| {
            OrchestratorError::InvalidInput(format!(
                "site name {name:?} has no usable characters"
            ))
        })?;
        let mut config = Self {
            name: name.to_string(),
            prefix: container_prefix(&slug),
            slug,
            domain: domain.trim().to_ascii_lowercase(),
            admin_email: admin_email.trim().to_string(),
            admin_password: generate_password(ADMIN_PASSWORD_LEN),
            database_password: String::new(),
            session_secret: String::new(),
            proxy_db_password: String::new(),
            proxy_db_root_password: String::new(),
        };
        config.refresh_attempt_secrets();
        Ok(config)
    }

    /// Regenerate the secrets that get baked into service volumes. The admin
    /// password is kept; it was handed to the caller once at creation.
    pub fn refresh_attempt_secrets(&mut self) {
        self.database_password = generate_password(DATABASE_PASSWORD_LEN);
        self.session_secret = generate_secret(SESSION_SECRET_LEN);
        self.proxy_db_password = generate_password(DATABASE_PASSWORD_LEN);
        self.proxy_db_root_password = generate_password(DATABASE_PASSWORD_LEN);
    }

    /// Credentials an operator needs to log in after deployment.
    pub fn credentials_echo(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("admin_email".to_string(), self.admin_email.clone()),
            ("admin_password".to_string(), self.admin_password.clone()),
            ("proxy_admin_email".to_string(), PROXY_DEFAULT_EMAIL.to_string()),
            (
                "proxy_admin_password".to_string(),
                PROXY_DEFAULT_PASSWORD.to_string(),
            ),
        ])
    }
}

/// Outcome of a successful deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Service -> container id.
    pub containers: BTreeMap<ServiceKind, String>,
    pub ports: PortAssignment,
    pub credentials: BTreeMap<String, String>,
}
