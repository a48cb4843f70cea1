use std::{fmt::Display, path::PathBuf, process::ExitStatus, time::Duration};

use tokio::process::Command;
use tracing::trace;

use super::EngineError;

/// Abstract command representation so we can test without spawning processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

/// Display raw command string
impl Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Last positional argument; for engine commands this is the object the
    /// command acts on.
    pub fn subject(&self) -> &str {
        self.args.last().map(String::as_str).unwrap_or_default()
    }
}

pub fn to_command(spec: &CommandSpec) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    if !spec.env.is_empty() {
        cmd.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    cmd.kill_on_drop(true);
    cmd
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Run a command to completion, capturing stdout and stderr, and give up
/// after `timeout`.
pub async fn run_spec_with_output(
    spec: &CommandSpec,
    timeout: Duration,
) -> Result<CommandOutput, EngineError> {
    trace!(command = %spec, "running engine command");
    let output = tokio::time::timeout(timeout, to_command(spec).output())
        .await
        .map_err(|_| EngineError::Timeout {
            command: spec.to_string(),
            timeout,
        })?
        .map_err(|source| EngineError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_args_and_env() {
        let spec = CommandSpec::new("docker")
            .arg("volume")
            .args(["rm", "-f"])
            .arg("site-acme_db-data")
            .env("DOCKER_HOST", "unix:///run/docker.sock");

        assert_eq!(spec.program, "docker");
        assert_eq!(spec.args, vec!["volume", "rm", "-f", "site-acme_db-data"]);
        assert_eq!(spec.subject(), "site-acme_db-data");
        assert_eq!(
            spec.env,
            vec![("DOCKER_HOST".into(), "unix:///run/docker.sock".into())]
        );
        assert_eq!(spec.to_string(), "docker volume rm -f site-acme_db-data");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let spec = CommandSpec::new("sitefleet-definitely-not-installed");
        let err = run_spec_with_output(&spec, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_of_successful_command() {
        let spec = CommandSpec::new("echo").arg("hello");
        let output = run_spec_with_output(&spec, Duration::from_secs(5))
            .await
            .expect("echo runs");
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }
}
