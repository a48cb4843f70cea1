//! [`ContainerEngine`] backed by the docker CLI.
//!
//! Every call is expressed as a [`CommandSpec`] so argument construction can
//! be tested without a daemon. Listing commands use `--format '{{json .}}'`
//! and are decoded with serde. Container environment values are handed to the
//! CLI through its own process environment (`-e KEY`), which keeps generated
//! secrets out of the process table.

use std::{collections::BTreeMap, collections::BTreeSet, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{
    ContainerEngine, ContainerInspection, ContainerSummary, EngineError,
    EngineHealth, EngineInfo,
    command::{CommandOutput, CommandSpec, run_spec_with_output},
};
use crate::stack::spec::{ContainerSpec, MountSource};

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
// Creation may pull the image first.
const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct DockerCliEngine {
    program: String,
    host: Option<String>,
    timeout: Duration,
    create_timeout: Duration,
}

impl Default for DockerCliEngine {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCliEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            host: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            create_timeout: DEFAULT_CREATE_TIMEOUT,
        }
    }

    /// Point the CLI at a specific engine endpoint (`DOCKER_HOST`).
    pub fn with_host(mut self, host: Option<String>) -> Self {
        self.host = host.filter(|h| !h.trim().is_empty());
        self
    }

    pub fn with_timeouts(mut self, command: Duration, create: Duration) -> Self {
        self.timeout = command;
        self.create_timeout = create;
        self
    }

    fn base_spec(&self) -> CommandSpec {
        let spec = CommandSpec::new(&self.program);
        match &self.host {
            Some(host) => spec.env("DOCKER_HOST", host),
            None => spec,
        }
    }

    /// Full `create` invocation for a container spec.
    pub fn create_spec(&self, container: &ContainerSpec) -> CommandSpec {
        let mut spec = self
            .base_spec()
            .args(["create", "--name"])
            .arg(&container.name)
            .arg("--network")
            .arg(&container.network)
            .arg("--restart")
            .arg(container.restart.as_str());

        for (key, value) in &container.labels {
            spec = spec.arg("--label").arg(format!("{key}={value}"));
        }
        for (key, value) in &container.env {
            spec = spec.arg("-e").arg(key).env(key, value);
        }
        for binding in &container.ports {
            spec = spec
                .arg("-p")
                .arg(format!("{}:{}", binding.host, binding.container));
        }
        for mount in &container.volumes {
            let source = match &mount.source {
                MountSource::Volume(name) => name.clone(),
                MountSource::HostPath(path) => path.display().to_string(),
            };
            let mut value = format!("{source}:{}", mount.target);
            if mount.read_only {
                value.push_str(":ro");
            }
            spec = spec.arg("-v").arg(value);
        }
        if let Some(check) = &container.health_check {
            spec = spec
                .arg("--health-cmd")
                .arg(&check.command)
                .arg("--health-interval")
                .arg(go_duration(check.interval))
                .arg("--health-timeout")
                .arg(go_duration(check.timeout))
                .arg("--health-retries")
                .arg(check.retries.to_string())
                .arg("--health-start-period")
                .arg(go_duration(check.start_period));
        }

        spec.arg(&container.image).args(container.command.iter().cloned())
    }

    async fn run(&self, spec: CommandSpec) -> Result<String, EngineError> {
        self.run_with_timeout(spec, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        spec: CommandSpec,
        timeout: Duration,
    ) -> Result<String, EngineError> {
        let output = run_spec_with_output(&spec, timeout).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(classify_failure(&spec, &output))
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerCliEngine {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, EngineError> {
        let spec = self.base_spec().args([
            "ps",
            "-a",
            "--no-trunc",
            "--format",
            "{{json .}}",
        ]);
        let stdout = self.run(spec).await?;
        parse_ps_lines(&stdout)
    }

    async fn create_container(
        &self,
        container: &ContainerSpec,
    ) -> Result<String, EngineError> {
        let spec = self.create_spec(container);
        let stdout = self.run_with_timeout(spec, self.create_timeout).await?;
        let id = stdout.lines().last().unwrap_or_default().trim().to_string();
        if id.is_empty() {
            return Err(EngineError::Parse(format!(
                "create for {} returned no container id",
                container.name
            )));
        }
        debug!(container = %container.name, id = %id, "container created");
        Ok(id)
    }

    async fn start_container(&self, name: &str) -> Result<(), EngineError> {
        self.run(self.base_spec().args(["start", name])).await?;
        Ok(())
    }

    async fn stop_container(
        &self,
        name: &str,
        grace: Duration,
    ) -> Result<(), EngineError> {
        let spec = self
            .base_spec()
            .args(["stop", "-t"])
            .arg(grace.as_secs().to_string())
            .arg(name);
        // The CLI itself waits up to `grace` before killing.
        self.run_with_timeout(spec, self.timeout + grace).await?;
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<(), EngineError> {
        self.run(self.base_spec().args(["rm", "-f", name])).await?;
        Ok(())
    }

    async fn inspect_container(
        &self,
        name: &str,
    ) -> Result<ContainerInspection, EngineError> {
        let spec = self
            .base_spec()
            .args(["inspect", "--type", "container", name]);
        let stdout = self.run(spec).await?;
        parse_inspect(&stdout, name)
    }

    async fn container_logs(
        &self,
        name: &str,
        tail: usize,
    ) -> Result<String, EngineError> {
        let spec = self
            .base_spec()
            .args(["logs", "--tail"])
            .arg(tail.to_string())
            .arg(name);
        let output = run_spec_with_output(&spec, self.timeout).await?;
        if !output.success() {
            return Err(classify_failure(&spec, &output));
        }
        // The engine replays the container's stderr on ours.
        let mut logs = output.stdout;
        if !output.stderr.is_empty() {
            if !logs.is_empty() && !logs.ends_with('\n') {
                logs.push('\n');
            }
            logs.push_str(&output.stderr);
        }
        Ok(logs)
    }

    async fn list_networks(&self) -> Result<Vec<String>, EngineError> {
        let spec = self
            .base_spec()
            .args(["network", "ls", "--format", "{{.Name}}"]);
        Ok(non_empty_lines(&self.run(spec).await?))
    }

    async fn create_network(
        &self,
        name: &str,
        driver: &str,
    ) -> Result<(), EngineError> {
        let spec = self
            .base_spec()
            .args(["network", "create", "--driver", driver, name]);
        self.run(spec).await?;
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), EngineError> {
        self.run(self.base_spec().args(["network", "rm", name])).await?;
        Ok(())
    }

    async fn create_volume(&self, name: &str) -> Result<(), EngineError> {
        self.run(self.base_spec().args(["volume", "create", name]))
            .await?;
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError> {
        self.run(self.base_spec().args(["volume", "rm", "-f", name]))
            .await?;
        Ok(())
    }

    async fn engine_info(&self) -> Result<EngineInfo, EngineError> {
        let spec = self.base_spec().args(["info", "--format", "{{json .}}"]);
        let stdout = self.run(spec).await?;
        parse_info(&stdout)
    }
}

/// Render a duration the way the engine's Go flag parser expects.
fn go_duration(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}

fn non_empty_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn classify_failure(spec: &CommandSpec, output: &CommandOutput) -> EngineError {
    let stderr = output.stderr.trim().to_string();
    let lowered = stderr.to_ascii_lowercase();
    let missing_network =
        lowered.contains("network") && lowered.contains("not found");
    if lowered.contains("no such") || missing_network {
        let kind = if lowered.contains("network") {
            "network"
        } else if lowered.contains("volume") {
            "volume"
        } else {
            "container"
        };
        return EngineError::NotFound {
            kind,
            name: spec.subject().to_string(),
        };
    }
    EngineError::CommandFailed {
        command: spec.to_string(),
        status: output.status.to_string(),
        stderr,
    }
}

/// Extract host ports from a `docker ps` port column such as
/// `0.0.0.0:8100->80/tcp, :::8100->80/tcp, 9000/tcp`.
pub fn parse_published_ports(raw: &str) -> Vec<u16> {
    let mut ports = BTreeSet::new();
    for entry in raw.split(',') {
        let Some((host_side, _)) = entry.trim().split_once("->") else {
            continue;
        };
        let Some((_, port_part)) = host_side.rsplit_once(':') else {
            continue;
        };
        match port_part.split_once('-') {
            Some((low, high)) => {
                if let (Ok(low), Ok(high)) =
                    (low.parse::<u16>(), high.parse::<u16>())
                {
                    ports.extend(low..=high);
                }
            }
            None => {
                if let Ok(port) = port_part.parse::<u16>() {
                    ports.insert(port);
                }
            }
        }
    }
    ports.into_iter().collect()
}

fn parse_labels(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Ports", default)]
    ports: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

fn parse_ps_lines(stdout: &str) -> Result<Vec<ContainerSummary>, EngineError> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let row: PsLine = serde_json::from_str(line)
                .map_err(|err| EngineError::Parse(format!("ps row: {err}")))?;
            Ok(ContainerSummary {
                id: row.id,
                name: row
                    .names
                    .split(',')
                    .next()
                    .unwrap_or_default()
                    .to_string(),
                state: row.state,
                published_ports: parse_published_ports(&row.ports),
                labels: parse_labels(&row.labels),
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectDoc {
    id: String,
    name: String,
    state: InspectState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    status: String,
    #[serde(default)]
    running: bool,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    health: Option<InspectHealth>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealth {
    status: String,
}

fn parse_inspect(
    stdout: &str,
    name: &str,
) -> Result<ContainerInspection, EngineError> {
    let docs: Vec<InspectDoc> = serde_json::from_str(stdout)
        .map_err(|err| EngineError::Parse(format!("inspect {name}: {err}")))?;
    let doc = docs.into_iter().next().ok_or_else(|| EngineError::NotFound {
        kind: "container",
        name: name.to_string(),
    })?;

    let health = doc.state.health.and_then(|h| match h.status.as_str() {
        "healthy" => Some(EngineHealth::Healthy),
        "unhealthy" => Some(EngineHealth::Unhealthy),
        "starting" => Some(EngineHealth::Starting),
        _ => None,
    });

    // Never-started containers report the zero time (year 1).
    let started_at = doc
        .state
        .started_at
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .filter(|ts| ts.year() > 1);

    Ok(ContainerInspection {
        id: doc.id,
        name: doc.name.trim_start_matches('/').to_string(),
        running: doc.state.running,
        status: doc.state.status,
        health,
        started_at,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InfoDoc {
    #[serde(default)]
    server_version: String,
    #[serde(default)]
    operating_system: String,
    #[serde(default)]
    architecture: String,
    #[serde(default)]
    containers: u64,
    #[serde(default)]
    containers_running: u64,
    #[serde(default)]
    server_errors: Vec<String>,
}

fn parse_info(stdout: &str) -> Result<EngineInfo, EngineError> {
    let doc: InfoDoc = serde_json::from_str(stdout.trim())
        .map_err(|err| EngineError::Parse(format!("info: {err}")))?;
    if !doc.server_errors.is_empty() {
        return Err(EngineError::Rejected(doc.server_errors.join("; ")));
    }
    Ok(EngineInfo {
        server_version: doc.server_version,
        operating_system: doc.operating_system,
        architecture: doc.architecture,
        containers: doc.containers,
        containers_running: doc.containers_running,
    })
}
