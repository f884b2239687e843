//! Deploy-test-app command - smoke test Marathon with the test server.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use dcos_cluster::{AppDefinition, Marathon};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct DeployTestAppCommand {
    /// Run the test server in a Docker container.
    #[arg(long)]
    docker: bool,

    /// Give the container its own IP on the overlay network.
    #[arg(long, requires = "docker")]
    ip_per_container: bool,
}

impl DeployTestAppCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        ctx.prepare().await?;

        let (app, token) = if self.docker {
            AppDefinition::test_app_in_docker(self.ip_per_container)
        } else {
            AppDefinition::test_app(false)
        };

        Marathon::new(&ctx.cluster)
            .deploy_test_app_and_check(&app, &token)
            .await
            .with_context(|| format!("test app {} failed", app.id))?;

        println!("{} test app {} deployed, verified and removed", "✓".green(), app.id);
        Ok(())
    }
}
