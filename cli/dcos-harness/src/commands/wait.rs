//! Wait command - block until the cluster is ready.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use dcos_cluster::ReadinessCheck;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct WaitCommand {}

impl WaitCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        ctx.prepare().await?;

        if ctx.wait {
            for check in ReadinessCheck::SEQUENCE {
                println!("{} {}", "✓".green(), check);
            }
        }
        println!("{} cluster at {} is ready", "✓".green(), ctx.cluster.handle().base_uri());
        Ok(())
    }
}
