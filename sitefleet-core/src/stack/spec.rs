//! Declarative description of one service container.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use serde::Serialize;

use crate::naming::ServiceKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountSource {
    /// Named engine volume owned by the stack.
    Volume(String),
    /// Host path bind (used for the engine control socket).
    HostPath(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeMount {
    pub source: MountSource,
    pub target: String,
    pub read_only: bool,
}

impl VolumeMount {
    pub fn volume(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: MountSource::Volume(name.into()),
            target: target.into(),
            read_only: false,
        }
    }

    pub fn host_read_only(
        path: impl Into<PathBuf>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: MountSource::HostPath(path.into()),
            target: target.into(),
            read_only: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    UnlessStopped,
    Always,
}

impl RestartPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::UnlessStopped => "unless-stopped",
            RestartPolicy::Always => "always",
        }
    }
}

/// Engine-side health check, run inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    /// Shell command; exit status 0 means healthy.
    pub command: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
    pub start_period: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSpec {
    pub service: ServiceKind,
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub ports: Vec<PortBinding>,
    pub volumes: Vec<VolumeMount>,
    pub network: String,
    pub restart: RestartPolicy,
    pub health_check: Option<HealthCheck>,
    pub labels: BTreeMap<String, String>,
    /// Arguments appended after the image (empty keeps the image default).
    pub command: Vec<String>,
}

impl ContainerSpec {
    /// Names of the engine volumes this container mounts.
    pub fn named_volumes(&self) -> impl Iterator<Item = &str> {
        self.volumes.iter().filter_map(|mount| match &mount.source {
            MountSource::Volume(name) => Some(name.as_str()),
            MountSource::HostPath(_) => None,
        })
    }

    pub fn published_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports.iter().map(|binding| binding.host)
    }
}
