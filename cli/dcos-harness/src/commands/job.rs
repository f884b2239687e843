//! Run-job command - run a one-off Metronome job.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use dcos_cluster::{JobDefinition, JobOptions, Metronome};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct RunJobCommand {
    /// Shell command the job runs.
    #[arg(long)]
    cmd: String,

    /// Seconds to wait for the run to succeed.
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    /// Keep waiting for a successful run after failed ones.
    #[arg(long)]
    ignore_failures: bool,
}

impl RunJobCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        ctx.prepare().await?;

        let job = JobDefinition::one_off(self.cmd);
        let options = JobOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            ignore_failures: self.ignore_failures,
        };

        Metronome::new(&ctx.cluster).run(&job, &options).await?;

        println!("{} job {} succeeded", "✓".green(), job.id);
        Ok(())
    }
}
