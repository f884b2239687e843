//! One-off Metronome jobs.

use std::collections::BTreeMap;
use std::time::Duration;

use dcos_converge::{poll, PollPolicy, ProbeOutcome};
use dcos_id::JobId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::{ApiRequest, Cluster};
use crate::error::{HttpError, JobError};
use crate::http::HttpResponse;

pub const JOBS_PATH: &str = "/service/metronome/v1/jobs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub run: JobRunSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRunSpec {
    pub cmd: String,
    pub cpus: f64,
    pub mem: f64,
    pub disk: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl JobDefinition {
    /// A small job with a fresh `integration-test-<token>` id.
    pub fn one_off(cmd: impl Into<String>) -> Self {
        Self {
            id: JobId::new().to_string(),
            description: Some("integration test one-off".to_string()),
            run: JobRunSpec {
                cmd: cmd.into(),
                cpus: 0.01,
                mem: 32.0,
                disk: 0.0,
                user: None,
                env: BTreeMap::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    pub timeout: Duration,
    /// Keep waiting for a success even after failed runs.
    pub ignore_failures: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            ignore_failures: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHistory {
    pub success_count: u32,
    pub failure_count: u32,
}

#[derive(Debug, Deserialize)]
struct JobWithHistory {
    history: JobHistory,
}

/// Classify one job history observation.
pub fn completion_outcome(history: &JobHistory, options: &JobOptions) -> ProbeOutcome<()> {
    if !options.ignore_failures && history.failure_count != 0 {
        return ProbeOutcome::fatal(format!(
            "job failed ({} failed runs)",
            history.failure_count
        ));
    }
    if history.success_count == 1 {
        ProbeOutcome::Satisfied(())
    } else {
        ProbeOutcome::not_yet(format!(
            "{} successful runs, {} failed",
            history.success_count, history.failure_count
        ))
    }
}

/// Runs one-off jobs on Metronome.
#[derive(Debug, Clone, Copy)]
pub struct Metronome<'a> {
    cluster: &'a Cluster,
    poll_interval: Duration,
}

impl<'a> Metronome<'a> {
    pub fn new(cluster: &'a Cluster) -> Self {
        Self {
            cluster,
            poll_interval: Duration::from_secs(2),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Create the job, start one run, wait for it to succeed, delete the job.
    ///
    /// Once created, the job is deleted whether or not the run succeeded. A
    /// delete failure after a failed run is logged and the run error wins.
    pub async fn run(&self, job: &JobDefinition, options: &JobOptions) -> Result<(), JobError> {
        let id = job.id.as_str();

        info!(job_id = id, "Creating job");
        let create = ApiRequest::post(JOBS_PATH)
            .json(job)
            .map_err(|source| JobError::Create {
                id: id.to_string(),
                source,
            })?;
        self.send_ok(create)
            .await
            .map_err(|source| JobError::Create {
                id: id.to_string(),
                source,
            })?;

        let result = self.start_and_wait(id, options).await;
        let cleanup = self.delete(id).await;

        match (result, cleanup) {
            (Ok(()), cleanup) => cleanup,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_error)) => {
                warn!(job_id = id, error = %cleanup_error, "Job delete failed after a failed run");
                Err(e)
            }
        }
    }

    async fn start_and_wait(&self, id: &str, options: &JobOptions) -> Result<(), JobError> {
        info!(job_id = id, "Starting job run");
        self.send_ok(ApiRequest::post(format!("{JOBS_PATH}/{id}/runs")))
            .await
            .map_err(|source| JobError::Start {
                id: id.to_string(),
                source,
            })?;

        let condition = format!("metronome job {id} succeeded");
        let policy = PollPolicy::new(self.poll_interval, options.timeout);
        poll(&policy, &condition, || self.observe_history(id, options))
            .await
            .map_err(JobError::Run)?;

        info!(job_id = id, "Job run succeeded");
        Ok(())
    }

    async fn observe_history(
        &self,
        id: &str,
        options: &JobOptions,
    ) -> Result<ProbeOutcome<()>, HttpError> {
        let request = ApiRequest::get(format!("{JOBS_PATH}/{id}")).query("embed", "history");
        let response = self.cluster.send(request).await?;
        if !response.is_success() {
            return Ok(ProbeOutcome::fatal(response.status_error().to_string()));
        }

        let outcome = match response.json::<JobWithHistory>() {
            Ok(job) => completion_outcome(&job.history, options),
            Err(e) => ProbeOutcome::fatal(e.to_string()),
        };
        if let ProbeOutcome::NotYet(reason) = &outcome {
            debug!(job_id = id, reason = %reason, "Waiting for job run");
        }
        Ok(outcome)
    }

    async fn delete(&self, id: &str) -> Result<(), JobError> {
        info!(job_id = id, "Deleting job");
        self.send_ok(ApiRequest::delete(format!("{JOBS_PATH}/{id}")))
            .await
            .map(drop)
            .map_err(|source| JobError::Delete {
                id: id.to_string(),
                source,
            })
    }

    async fn send_ok(&self, request: ApiRequest) -> Result<HttpResponse, HttpError> {
        self.cluster.send(request).await?.error_for_status()
    }
}
