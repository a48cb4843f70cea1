//! Request and response bodies of the v1 API.
//!
//! Response types are built from [`SiteRecord`] field by field so generated
//! secrets never reach the wire. The admin password is only ever returned by
//! the create endpoint.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitefleet_core::{
    EngineConnectivity, PortRole, ServiceKind, SiteRecord, SiteStatus,
    lifecycle::{OperationReport, RemovalReport},
    status::ServiceState,
};
use uuid::Uuid;

pub mod routes {
    pub const HEALTH: &str = "/health";
    pub const SITES: &str = "/sites";
    pub const SITE: &str = "/sites/{id}";
    pub const SITE_DEPLOY: &str = "/sites/{id}/deploy";
    pub const SITE_STOP: &str = "/sites/{id}/stop";
    pub const SITE_START: &str = "/sites/{id}/start";
    pub const PORTS_AVAILABLE: &str = "/ports/available";
    pub const ENGINE: &str = "/engine";
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSiteRequest {
    pub name: String,
    pub domain: String,
    pub admin_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub domain: String,
    pub prefix: String,
    pub admin_email: String,
    pub status: SiteStatus,
    pub ports: BTreeMap<PortRole, u16>,
    pub containers: BTreeMap<ServiceKind, String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deployed_at: Option<DateTime<Utc>>,
}

impl From<&SiteRecord> for SiteResponse {
    fn from(record: &SiteRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            slug: record.slug.clone(),
            domain: record.domain.clone(),
            prefix: record.prefix.clone(),
            admin_email: record.admin_email.clone(),
            status: record.status,
            ports: record.ports.clone(),
            containers: record.containers.clone(),
            error: record.error.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            deployed_at: record.deployed_at,
        }
    }
}

/// Returned once, on creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSiteResponse {
    pub site: SiteResponse,
    /// Admin login plus the proxy manager's factory login.
    pub credentials: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteDetailResponse {
    pub site: SiteResponse,
    pub services: Vec<ServiceState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployAccepted {
    pub id: Uuid,
    pub status: SiteStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationResponse {
    pub id: Uuid,
    pub status: SiteStatus,
    pub error: Option<String>,
    pub services: OperationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovalResponse {
    pub id: Uuid,
    pub deleted: bool,
    #[serde(flatten)]
    pub report: RemovalReport,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortsQuery {
    pub count: Option<usize>,
    pub base: Option<u16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortsResponse {
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineResponse {
    #[serde(flatten)]
    pub connectivity: EngineConnectivity,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub in_flight_deployments: usize,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use sitefleet_core::DeploymentConfig;

    use super::*;

    #[test]
    fn site_response_carries_no_secrets() {
        let config =
            DeploymentConfig::generate("Acme Shop", "acme.test", "ops@acme.test")
                .unwrap();
        let secrets = [
            config.admin_password.clone(),
            config.database_password.clone(),
            config.session_secret.clone(),
            config.proxy_db_password.clone(),
            config.proxy_db_root_password.clone(),
        ];
        let record = SiteRecord::new(config);

        let body = serde_json::to_string(&SiteResponse::from(&record)).unwrap();
        for secret in secrets.iter().filter(|s| !s.is_empty()) {
            assert!(!body.contains(secret.as_str()));
        }
        assert!(body.contains("\"prefix\":\"site-acme-shop\""));
        assert!(body.contains("\"status\":\"pending\""));
    }
}
