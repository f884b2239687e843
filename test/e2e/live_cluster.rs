//! End-to-end checks against a live DC/OS cluster.
//!
//! Each test waits for the cluster to be ready, then exercises one workload
//! path:
//!
//! 1. Ready sequence and session
//! 2. Test server app on the Mesos containerizer
//! 3. Test server app in Docker
//! 4. One-off Metronome job
//!
//! ## Running
//!
//! ```bash
//! export DCOS_DNS_ADDRESS=http://10.0.0.5 MASTER_HOSTS=10.0.0.5 \
//!     PUBLIC_MASTER_HOSTS=10.0.0.5 SLAVE_HOSTS=10.0.1.1 PUBLIC_SLAVE_HOSTS=10.0.2.1 \
//!     DNS_SEARCH=false DCOS_PROVIDER=onprem
//! cargo test -p dcos-e2e --test live_cluster
//! ```
//!
//! Without DCOS_DNS_ADDRESS every test returns early.

use std::time::Duration;

use dcos_cluster::{
    AppDefinition, Cluster, HarnessConfig, HickoryResolver, JobDefinition, JobOptions, Marathon,
    Metronome, Readiness,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dcos_cluster=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Connect and wait for readiness, or `None` when no cluster is configured.
async fn ready_cluster() -> Option<Cluster> {
    if std::env::var_os("DCOS_DNS_ADDRESS").is_none() {
        eprintln!("DCOS_DNS_ADDRESS not set, skipping live cluster test");
        return None;
    }
    init_tracing();

    let config = HarnessConfig::from_env().expect("invalid cluster environment");
    let cluster = config.connect().expect("failed to build HTTP client");
    let resolver = HickoryResolver::new(config.http_timeout);

    Readiness::new(&cluster, &resolver, &config.credentials)
        .with_policy(config.readiness)
        .wait()
        .await
        .expect("cluster never became ready");

    Some(cluster)
}

#[tokio::test]
async fn e2e_cluster_becomes_ready() {
    let Some(cluster) = ready_cluster().await else {
        return;
    };

    let handle = cluster.handle();
    assert_eq!(handle.is_authenticated(), handle.auth_enabled());

    let resp = cluster.get("/").await.expect("front door unreachable");
    assert!(resp.is_success(), "front door returned {}", resp.status);
}

#[tokio::test]
async fn e2e_test_app_deploys_and_is_removed() {
    let Some(cluster) = ready_cluster().await else {
        return;
    };

    let (app, token) = AppDefinition::test_app(false);
    Marathon::new(&cluster)
        .deploy_test_app_and_check(&app, &token)
        .await
        .expect("test app failed");

    let resp = cluster
        .get(&format!("/marathon/v2/apps{}", app.id))
        .await
        .expect("marathon unreachable");
    assert_eq!(resp.status, 404, "app {} was not removed", app.id);
}

#[tokio::test]
async fn e2e_docker_test_app_deploys_and_is_removed() {
    let Some(cluster) = ready_cluster().await else {
        return;
    };

    let (app, token) = AppDefinition::test_app_in_docker(false);
    Marathon::new(&cluster)
        .deploy_test_app_and_check(&app, &token)
        .await
        .expect("docker test app failed");
}

#[tokio::test]
async fn e2e_one_off_job_succeeds() {
    let Some(cluster) = ready_cluster().await else {
        return;
    };

    let job = JobDefinition::one_off("sleep 5 && echo done");
    let options = JobOptions {
        timeout: Duration::from_secs(300),
        ignore_failures: false,
    };

    Metronome::new(&cluster)
        .run(&job, &options)
        .await
        .expect("job did not succeed");
}
