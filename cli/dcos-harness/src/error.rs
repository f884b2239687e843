//! Error handling and display for the CLI.

use colored::Colorize;
use dcos_cluster::{ConfigError, ReadinessCheck, ReadyError};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// The integration suite ran and reported failures.
    #[error("integration tests failed with exit code {}", exit_status(.0))]
    TestsFailed(Option<i32>),
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "<signal>".to_string(),
    }
}

/// Process exit code for an error.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::TestsFailed(Some(code))) if *code != 0 => *code,
        _ => 1,
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    for cause in err.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".dimmed(), cause);
    }

    if let Some(hint) = hint(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint(err: &anyhow::Error) -> Option<&'static str> {
    if err.downcast_ref::<ConfigError>().is_some() {
        return Some(
            "Set DCOS_DNS_ADDRESS, MASTER_HOSTS, PUBLIC_MASTER_HOSTS, SLAVE_HOSTS, \
             PUBLIC_SLAVE_HOSTS, DNS_SEARCH and DCOS_PROVIDER.",
        );
    }

    let ready = err.downcast_ref::<ReadyError>()?;
    let hint = match ready {
        ReadyError::Auth(_) => {
            "Login failed. Check DCOS_LOGIN_UNAME / DCOS_LOGIN_PW, or set DCOS_AUTH_ENABLED=false."
        }
        ReadyError::Check { source, .. } if source.is_timeout() => match ready.check() {
            ReadinessCheck::LeaderElected => {
                "Mesos-DNS must answer on port 61053 of every public master."
            }
            ReadinessCheck::FrontDoor => "Admin Router is not reachable at DCOS_DNS_ADDRESS.",
            _ => "The cluster may still be starting. Raise DCOS_READY_TIMEOUT_SECS to wait longer.",
        },
        ReadyError::Check { .. } => return None,
    };
    Some(hint)
}
