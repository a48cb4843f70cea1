//! Site records and their status machine.

pub mod store;

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{naming::ServiceKind, ports::PortAssignment, stack::DeploymentConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Pending,
    Deploying,
    Running,
    Stopped,
    Error,
}

impl SiteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SiteStatus::Pending => "pending",
            SiteStatus::Deploying => "deploying",
            SiteStatus::Running => "running",
            SiteStatus::Stopped => "stopped",
            SiteStatus::Error => "error",
        }
    }

    pub fn can_transition(self, to: SiteStatus) -> bool {
        use SiteStatus::*;
        matches!(
            (self, to),
            (Pending, Deploying)
                | (Error, Deploying)
                | (Deploying, Running)
                | (Deploying, Error)
                | (Running, Stopped)
                | (Running, Error)
                | (Stopped, Running)
                | (Stopped, Error)
                | (Error, Stopped)
                | (Error, Running)
        )
    }

    pub fn can_deploy(self) -> bool {
        matches!(self, SiteStatus::Pending | SiteStatus::Error)
    }

    pub fn can_stop(self) -> bool {
        matches!(self, SiteStatus::Running | SiteStatus::Error)
    }

    pub fn can_start(self) -> bool {
        matches!(self, SiteStatus::Stopped | SiteStatus::Error)
    }

    pub fn can_remove(self) -> bool {
        self != SiteStatus::Deploying
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SiteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SiteStatus::Pending),
            "deploying" => Ok(SiteStatus::Deploying),
            "running" => Ok(SiteStatus::Running),
            "stopped" => Ok(SiteStatus::Stopped),
            "error" => Ok(SiteStatus::Error),
            other => Err(format!("unknown site status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal site status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: SiteStatus,
    pub to: SiteStatus,
}

/// Persisted state of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub domain: String,
    pub prefix: String,
    pub admin_email: String,
    pub status: SiteStatus,
    pub ports: PortAssignment,
    pub containers: BTreeMap<ServiceKind, String>,
    pub error: Option<String>,
    pub config: DeploymentConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deployed_at: Option<DateTime<Utc>>,
}

impl SiteRecord {
    pub fn new(config: DeploymentConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: config.name.clone(),
            slug: config.slug.clone(),
            domain: config.domain.clone(),
            prefix: config.prefix.clone(),
            admin_email: config.admin_email.clone(),
            status: SiteStatus::Pending,
            ports: PortAssignment::new(),
            containers: BTreeMap::new(),
            error: None,
            config,
            created_at: now,
            updated_at: now,
            deployed_at: None,
        }
    }

    /// Move to `to`, clearing the error message unless entering `Error`.
    pub fn transition(&mut self, to: SiteStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        if to != SiteStatus::Error {
            self.error = None;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Enter (or stay in) `Error` with `message`.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        if self.status == SiteStatus::Error {
            self.updated_at = Utc::now();
        } else {
            self.transition(SiteStatus::Error)?;
        }
        self.error = Some(message.into());
        Ok(())
    }
}
