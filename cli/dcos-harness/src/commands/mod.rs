//! CLI commands.

mod app;
mod job;
mod wait;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dcos_cluster::{authenticate, Cluster, HarnessConfig, HickoryResolver, Readiness};
use tracing::info;

/// Drive integration runs against a DC/OS cluster.
///
/// The cluster is described by DCOS_DNS_ADDRESS, MASTER_HOSTS,
/// PUBLIC_MASTER_HOSTS, SLAVE_HOSTS, PUBLIC_SLAVE_HOSTS, DNS_SEARCH and
/// DCOS_PROVIDER.
#[derive(Debug, Parser)]
#[command(name = "dcos-harness")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "DCOS_HARNESS_JSON_LOGS")]
    pub json_logs: bool,

    /// Skip the cluster-ready sequence and only log in.
    #[arg(long, global = true)]
    no_wait: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Wait until the cluster is ready.
    Wait(wait::WaitCommand),

    /// Deploy the test server app, verify it, remove it.
    DeployTestApp(app::DeployTestAppCommand),

    /// Run a one-off Metronome job to completion.
    RunJob(job::RunJobCommand),

    /// Run the integration test suite against the cluster.
    RunTests(tests::RunTestsCommand),
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let config = HarnessConfig::from_env()?;
        info!(
            base_uri = config.cluster.base_uri(),
            provider = %config.cluster.provider(),
            masters = config.cluster.masters().len(),
            agents = config.cluster.expected_agent_count(),
            auth_enabled = config.cluster.auth_enabled(),
            "Configuration loaded"
        );

        let ctx = CommandContext {
            cluster: config.connect()?,
            config,
            wait: !self.no_wait,
        };

        match self.command {
            Commands::Wait(cmd) => cmd.run(ctx).await,
            Commands::DeployTestApp(cmd) => cmd.run(ctx).await,
            Commands::RunJob(cmd) => cmd.run(ctx).await,
            Commands::RunTests(cmd) => cmd.run(ctx).await,
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: HarnessConfig,
    pub cluster: Cluster,
    pub wait: bool,
}

impl CommandContext {
    /// Make the cluster usable: the full ready sequence, or just login when
    /// waiting is disabled.
    pub async fn prepare(&self) -> Result<()> {
        if !self.wait {
            authenticate(&self.cluster, &self.config.credentials).await?;
            return Ok(());
        }

        let resolver = HickoryResolver::new(self.config.http_timeout);
        Readiness::new(&self.cluster, &resolver, &self.config.credentials)
            .with_policy(self.config.readiness)
            .wait()
            .await?;
        Ok(())
    }
}
