//! Marathon app lifecycle: deploy, wait for healthy, tear down.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use dcos_converge::{poll, PollPolicy, ProbeOutcome};
use dcos_id::{AppId, TestToken};
use reqwest::header::ACCEPT;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::{ApiRequest, Cluster};
use crate::error::{HttpError, WorkloadError};
use crate::http::HttpResponse;

pub const APPS_PATH: &str = "/marathon/v2/apps";
pub const DEPLOYMENTS_PATH: &str = "/marathon/v2/deployments";

/// Marathon content negotiation quirk: without this, some versions answer
/// with HTML.
const MARATHON_ACCEPT: &str = "application/json, text/plain, */*";

/// Test server shipped with the integration test package.
const TEST_SERVER_CMD: &str = ". /opt/mesosphere/environment.export && \
     /opt/mesosphere/bin/python \
     /opt/mesosphere/active/dcos-integration-test/python_test_server.py ";

/// Port the test server binds to inside a container.
const CONTAINER_PORT: u16 = 9080;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDefinition {
    pub id: String,
    pub cpus: f64,
    pub mem: f64,
    pub instances: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub health_checks: Vec<HealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_definitions: Option<Vec<PortDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddressSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_index: Option<u32>,
    pub grace_period_seconds: u32,
    pub interval_seconds: u32,
    pub timeout_seconds: u32,
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDefinition {
    pub protocol: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerSpec {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_mappings: Vec<PortMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub container_path: String,
    pub host_path: String,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpAddressSpec {
    pub network_name: String,
}

impl AppDefinition {
    /// The integration test server as a Marathon app.
    ///
    /// With `custom_port` unset the app asks Marathon for one host port and
    /// binds to it; otherwise the caller must complete `cmd` with a port.
    /// The returned token is exported to the app as `DCOS_TEST_UUID`.
    pub fn test_app(custom_port: bool) -> (Self, TestToken) {
        let token = TestToken::new();
        let mut app = Self {
            id: AppId::from_token(token).to_string(),
            cpus: 0.1,
            mem: 32.0,
            instances: 1,
            cmd: Some(TEST_SERVER_CMD.to_string()),
            env: BTreeMap::from([("DCOS_TEST_UUID".to_string(), token.to_string())]),
            health_checks: vec![HealthCheck {
                protocol: "HTTP".to_string(),
                path: Some("/ping".to_string()),
                port_index: Some(0),
                grace_period_seconds: 5,
                interval_seconds: 10,
                timeout_seconds: 10,
                max_consecutive_failures: 3,
            }],
            port_definitions: None,
            container: None,
            ip_address: None,
        };

        if !custom_port {
            app.append_cmd("$PORT0");
            app.port_definitions = Some(vec![PortDefinition {
                protocol: "tcp".to_string(),
                port: 0,
                name: Some("test".to_string()),
            }]);
        }

        (app, token)
    }

    /// The test server inside a Docker container, on bridge networking or
    /// with an IP per container on the `dcos` overlay.
    pub fn test_app_in_docker(ip_per_container: bool) -> (Self, TestToken) {
        let (mut app, token) = Self::test_app(true);
        app.append_cmd(&CONTAINER_PORT.to_string());

        let network = if ip_per_container { "USER" } else { "BRIDGE" };
        app.container = Some(Container {
            kind: "DOCKER".to_string(),
            docker: Some(DockerSpec {
                image: "debian:jessie".to_string(),
                port_mappings: vec![PortMapping {
                    host_port: 0,
                    container_port: CONTAINER_PORT,
                    protocol: "tcp".to_string(),
                    name: Some("test".to_string()),
                    labels: BTreeMap::new(),
                }],
                network: Some(network.to_string()),
            }),
            volumes: vec![Volume {
                container_path: "/opt/mesosphere".to_string(),
                host_path: "/opt/mesosphere".to_string(),
                mode: "RO".to_string(),
            }],
        });
        if ip_per_container {
            app.ip_address = Some(IpAddressSpec {
                network_name: "dcos".to_string(),
            });
        }

        (app, token)
    }

    fn append_cmd(&mut self, suffix: &str) {
        self.cmd.get_or_insert_with(String::new).push_str(suffix);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    /// Deadline for the deploy wait and for the teardown wait.
    pub timeout: Duration,
    /// Also wait for every task to pass its health checks.
    pub check_health: bool,
    /// Keep waiting even if Marathon reports a failed task.
    pub ignore_failed_tasks: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            check_health: true,
            ignore_failed_tasks: false,
        }
    }
}

/// Where a deployed task can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: Option<u16>,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AppEnvelope {
    app: AppStatus,
}

/// The parts of `GET /v2/apps/<id>` the deploy wait looks at.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    #[serde(default)]
    pub tasks_running: u32,
    #[serde(default)]
    pub tasks_healthy: u32,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub last_task_failure: Option<TaskFailure>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub host: String,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub ip_addresses: Vec<TaskIpAddress>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskIpAddress {
    pub ip_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskFailure {
    #[serde(default)]
    pub message: Option<String>,
}

impl From<&Task> for Endpoint {
    fn from(task: &Task) -> Self {
        Self {
            host: task.host.clone(),
            port: task.ports.first().copied(),
            ip: task.ip_addresses.first().map(|a| a.ip_address.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    deployment_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Deployment {
    pub id: String,
}

/// Classify one app status observation.
pub fn deployment_outcome(
    status: &AppStatus,
    instances: u32,
    options: &DeployOptions,
) -> ProbeOutcome<Vec<Endpoint>> {
    if !options.ignore_failed_tasks {
        if let Some(failure) = &status.last_task_failure {
            let message = failure.message.as_deref().unwrap_or("no message");
            return ProbeOutcome::fatal(format!("application deployment failed: {message}"));
        }
    }

    let running = status.tasks_running == instances;
    let healthy = !options.check_health || status.tasks_healthy == instances;
    if running && healthy {
        ProbeOutcome::Satisfied(status.tasks.iter().map(Endpoint::from).collect())
    } else {
        ProbeOutcome::not_yet(format!(
            "{}/{instances} running, {}/{instances} healthy",
            status.tasks_running, status.tasks_healthy
        ))
    }
}

/// Satisfied once `deployment_id` is no longer listed.
pub fn deployment_gone(deployments: &[Deployment], deployment_id: &str) -> ProbeOutcome<()> {
    if deployments.iter().any(|d| d.id == deployment_id) {
        ProbeOutcome::not_yet(format!("deployment {deployment_id} still in progress"))
    } else {
        ProbeOutcome::Satisfied(())
    }
}

/// Turn a non-2xx poll response into a fatal outcome.
fn fatal_status<T>(response: &HttpResponse) -> Option<ProbeOutcome<T>> {
    (!response.is_success()).then(|| ProbeOutcome::fatal(response.status_error().to_string()))
}

/// Deploys and removes Marathon apps.
#[derive(Debug, Clone, Copy)]
pub struct Marathon<'a> {
    cluster: &'a Cluster,
    poll_interval: Duration,
}

impl<'a> Marathon<'a> {
    pub fn new(cluster: &'a Cluster) -> Self {
        Self {
            cluster,
            poll_interval: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Submit an app and wait until every instance is running (and healthy,
    /// unless disabled). The app is submitted exactly once.
    pub async fn deploy(
        &self,
        app: &AppDefinition,
        options: &DeployOptions,
    ) -> Result<Vec<Endpoint>, WorkloadError> {
        let submit = |source| WorkloadError::Submit {
            id: app.id.clone(),
            source,
        };

        info!(app_id = %app.id, instances = app.instances, "Deploying app");
        let request = ApiRequest::post(APPS_PATH)
            .header(ACCEPT.as_str(), MARATHON_ACCEPT)
            .json(app)
            .map_err(submit)?;
        let response = self.cluster.send(request).await.map_err(submit)?;
        debug!(app_id = %app.id, status = response.status, body = %response.text(), "Marathon accepted app");
        response.error_for_status().map_err(submit)?;

        let condition = if options.check_health {
            format!(
                "marathon app {} running {n}/{n} healthy",
                app.id,
                n = app.instances
            )
        } else {
            format!("marathon app {} running {n}/{n}", app.id, n = app.instances)
        };
        let policy = PollPolicy::new(self.poll_interval, options.timeout);

        let endpoints = poll(&policy, &condition, || self.observe_app(app, options))
            .await
            .map_err(WorkloadError::Deploy)?;

        info!(app_id = %app.id, endpoints = ?endpoints, "App deployed");
        Ok(endpoints)
    }

    async fn observe_app(
        &self,
        app: &AppDefinition,
        options: &DeployOptions,
    ) -> Result<ProbeOutcome<Vec<Endpoint>>, HttpError> {
        let request = ApiRequest::get(format!("{APPS_PATH}{}", app.id))
            .query("embed", "apps.lastTaskFailure")
            .query("embed", "apps.counts")
            .header(ACCEPT.as_str(), MARATHON_ACCEPT);
        let response = self.cluster.send(request).await?;
        if let Some(outcome) = fatal_status(&response) {
            return Ok(outcome);
        }

        let outcome = match response.json::<AppEnvelope>() {
            Ok(envelope) => deployment_outcome(&envelope.app, app.instances, options),
            Err(e) => ProbeOutcome::fatal(e.to_string()),
        };
        if let ProbeOutcome::NotYet(reason) = &outcome {
            debug!(app_id = %app.id, reason = %reason, "Waiting for app");
        }
        Ok(outcome)
    }

    /// Delete an app and wait for its removal deployment to finish.
    ///
    /// An app Marathon does not know is already gone.
    pub async fn destroy(&self, app_id: &str, timeout: Duration) -> Result<(), WorkloadError> {
        let delete = |source| WorkloadError::Delete {
            id: app_id.to_string(),
            source,
        };

        info!(app_id, "Destroying app");
        let request = ApiRequest::delete(format!("{APPS_PATH}{app_id}"))
            .header(ACCEPT.as_str(), MARATHON_ACCEPT);
        let response = self.cluster.send(request).await.map_err(delete)?;
        if response.status == 404 {
            info!(app_id, "App already gone");
            return Ok(());
        }
        let response = response.error_for_status().map_err(delete)?;
        let deployment_id = response
            .json::<DeleteResponse>()
            .map_err(delete)?
            .deployment_id;

        let condition = format!("marathon app {app_id} removed");
        let policy = PollPolicy::new(self.poll_interval, timeout);
        poll(&policy, &condition, || self.observe_deployments(&deployment_id))
            .await
            .map_err(WorkloadError::Teardown)?;

        info!(app_id, "App destroyed");
        Ok(())
    }

    async fn observe_deployments(&self, deployment_id: &str) -> Result<ProbeOutcome<()>, HttpError> {
        let request = ApiRequest::get(DEPLOYMENTS_PATH).header(ACCEPT.as_str(), MARATHON_ACCEPT);
        let response = self.cluster.send(request).await?;
        if let Some(outcome) = fatal_status(&response) {
            return Ok(outcome);
        }

        Ok(match response.json::<Vec<Deployment>>() {
            Ok(deployments) => deployment_gone(&deployments, deployment_id),
            Err(e) => ProbeOutcome::fatal(e.to_string()),
        })
    }

    /// Deploy, run `body` against the endpoints, then destroy the app.
    ///
    /// The app is destroyed on every path, including a failed submit: a
    /// submit that timed out may still have created the app. The first
    /// failure is returned; a teardown failure after an earlier one is only
    /// logged.
    pub async fn deploy_and_cleanup<T, E, F, Fut>(
        &self,
        app: &AppDefinition,
        options: &DeployOptions,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Vec<Endpoint>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<WorkloadError>,
    {
        let result = match self.deploy(app, options).await {
            Ok(endpoints) => body(endpoints).await,
            Err(e) => Err(e.into()),
        };

        let teardown = self.destroy(&app.id, options.timeout).await;

        match (result, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown_error)) => {
                warn!(app_id = %app.id, error = %teardown_error, "App teardown failed after an earlier failure");
                Err(e)
            }
        }
    }

    /// Deploy the test server, confirm it is the instance this run created
    /// and that it runs as root, then destroy it.
    pub async fn deploy_test_app_and_check(
        &self,
        app: &AppDefinition,
        token: &TestToken,
    ) -> Result<(), WorkloadError> {
        self.deploy_and_cleanup(app, &DeployOptions::default(), |endpoints| async move {
            self.check_test_server(&endpoints, token).await
        })
        .await
    }

    async fn check_test_server(
        &self,
        endpoints: &[Endpoint],
        token: &TestToken,
    ) -> Result<(), WorkloadError> {
        let endpoint = endpoints.first().ok_or_else(|| WorkloadError::Verify {
            endpoint: "<none>".to_string(),
            reason: "app has no tasks".to_string(),
        })?;
        // Overlay tasks get no host port; reach them on their own IP.
        let base = match (endpoint.port, &endpoint.ip) {
            (Some(port), _) => format!("http://{}:{port}", endpoint.host),
            (None, Some(ip)) => format!("http://{ip}:{CONTAINER_PORT}"),
            (None, None) => {
                return Err(WorkloadError::Verify {
                    endpoint: endpoint.host.clone(),
                    reason: "task has no port".to_string(),
                })
            }
        };

        let body = self.test_server_get(&base, "/test_uuid").await?;
        let expected = token.to_string();
        if body.get("test_uuid").and_then(|v| v.as_str()) != Some(expected.as_str()) {
            return Err(WorkloadError::Verify {
                endpoint: format!("{base}/test_uuid"),
                reason: format!("expected test_uuid {expected}, got {body}"),
            });
        }

        let body = self.test_server_get(&base, "/operating_environment").await?;
        if body != json!({ "username": "root" }) {
            return Err(WorkloadError::Verify {
                endpoint: format!("{base}/operating_environment"),
                reason: format!("expected to run as root, got {body}"),
            });
        }

        info!(endpoint = %base, "Test server verified");
        Ok(())
    }

    async fn test_server_get(&self, base: &str, path: &str) -> Result<serde_json::Value, WorkloadError> {
        let url = format!("{base}{path}");
        let verify = |reason: String| WorkloadError::Verify {
            endpoint: url.clone(),
            reason,
        };

        let response = self
            .cluster
            .send(ApiRequest::absolute(Method::GET, &url))
            .await
            .map_err(|e| verify(e.to_string()))?;
        if response.status != 200 {
            return Err(verify(format!(
                "test server replied with {}: {}",
                response.status,
                response.text()
            )));
        }
        response.json().map_err(|e| verify(e.to_string()))
    }
}
