//! Running the integration suite on a cluster node.
//!
//! How the command reaches the node (SSH tunnel, local shell, CI agent) is
//! left to the [`RemoteExecutor`]. This module only builds the command line
//! that points the suite at the cluster.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::RemoteError;
use crate::handle::ClusterHandle;

/// Variables with this prefix are forwarded to the suite without it.
pub const ADD_ENV_PREFIX: &str = "TEST_ADD_ENV_";

pub const DEFAULT_PYTEST_DIR: &str = "/opt/mesosphere/active/dcos-integration-test";
pub const DEFAULT_PYTEST_CMD: &str = "py.test -vv -rs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a shell command somewhere that can reach the cluster.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError>;
}

/// Runs commands with the local `sh`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

#[async_trait]
impl RemoteExecutor for ShellExecutor {
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        debug!(command, "Running command");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RemoteError::Spawn {
                command: command.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// One run of the integration suite against a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationTestRun {
    pub dir: String,
    pub cmd: String,
    pub add_env: BTreeMap<String, String>,
}

impl IntegrationTestRun {
    pub fn new(dir: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            cmd: cmd.into(),
            add_env: BTreeMap::new(),
        }
    }

    /// Add one variable. Names that are not valid shell identifiers are
    /// dropped with a warning.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert_env(name.into(), value.into());
        self
    }

    /// Pick up every `TEST_ADD_ENV_<NAME>` variable as `<NAME>`.
    #[must_use]
    pub fn with_add_env_from<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix(ADD_ENV_PREFIX) {
                self.insert_env(name.to_string(), value);
            }
        }
        self
    }

    fn insert_env(&mut self, name: String, value: String) {
        if is_env_name(&name) {
            self.add_env.insert(name, value);
        } else {
            warn!(name = %name, "Skipping variable with invalid name");
        }
    }

    /// Variables describing the cluster, followed by the extra ones.
    pub fn env(&self, cluster: &ClusterHandle) -> Vec<(String, String)> {
        let mut env = vec![
            ("DCOS_DNS_ADDRESS".to_string(), cluster.base_uri().to_string()),
            ("MASTER_HOSTS".to_string(), cluster.masters().join(",")),
            (
                "PUBLIC_MASTER_HOSTS".to_string(),
                cluster.public_masters().join(","),
            ),
            ("SLAVE_HOSTS".to_string(), cluster.private_agents().join(",")),
            (
                "PUBLIC_SLAVE_HOSTS".to_string(),
                cluster.public_agents().join(","),
            ),
            ("DNS_SEARCH".to_string(), cluster.dns_search().to_string()),
            ("DCOS_PROVIDER".to_string(), cluster.provider().to_string()),
            (
                "DCOS_AUTH_ENABLED".to_string(),
                cluster.auth_enabled().to_string(),
            ),
        ];
        env.extend(self.add_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// `cd <dir> && NAME=value ... <cmd>`
    pub fn command(&self, cluster: &ClusterHandle) -> String {
        let assignments: Vec<String> = self
            .env(cluster)
            .iter()
            .map(|(k, v)| format!("{k}={}", quote(v)))
            .collect();

        format!(
            "cd {} && {} {}",
            quote(&self.dir),
            assignments.join(" "),
            self.cmd
        )
    }

    pub async fn run(
        &self,
        cluster: &ClusterHandle,
        executor: &dyn RemoteExecutor,
    ) -> Result<CommandOutput, RemoteError> {
        info!(dir = %self.dir, cmd = %self.cmd, extra_env = self.add_env.len(), "Running integration tests");
        let output = executor.run(&self.command(cluster)).await?;
        info!(exit_code = ?output.exit_code, "Integration tests finished");
        Ok(output)
    }
}

/// Quote for POSIX `sh`, wherever the executor runs.
fn quote(value: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(value.into())
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_env_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
