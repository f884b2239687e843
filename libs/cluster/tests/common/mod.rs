//! Shared fixtures for the mock-cluster tests.

#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dcos_cluster::{
    Cluster, ClusterHandle, ClusterSpec, NameResolver, Provider, ReadinessPolicy,
    ReqwestTransport, ResolveError,
};
use wiremock::{Match, MockServer, Request, Respond, ResponseTemplate};

pub const POLL: Duration = Duration::from_millis(10);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dcos_cluster=debug,dcos_converge=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn spec(base_uri: &str, auth_enabled: bool) -> ClusterSpec {
    ClusterSpec {
        base_uri: base_uri.to_string(),
        masters: vec!["127.0.0.1".to_string()],
        public_masters: vec!["127.0.0.1".to_string()],
        private_agents: vec!["10.0.1.1".to_string(), "10.0.1.2".to_string()],
        public_agents: vec![],
        provider: Provider::Onprem,
        dns_search: false,
        auth_enabled,
    }
}

pub fn cluster_at(base_uri: &str, auth_enabled: bool) -> Cluster {
    cluster_with_timeout(base_uri, auth_enabled, Duration::from_secs(5))
}

pub fn cluster_with_timeout(base_uri: &str, auth_enabled: bool, timeout: Duration) -> Cluster {
    init_tracing();
    let handle = ClusterHandle::new(spec(base_uri, auth_enabled)).expect("valid cluster spec");
    let transport = ReqwestTransport::new(timeout, true).expect("reqwest client builds");
    Cluster::new(handle, Arc::new(transport))
}

pub fn cluster(server: &MockServer, auth_enabled: bool) -> Cluster {
    cluster_at(&server.uri(), auth_enabled)
}

/// Intervals short enough for tests, deadline long enough for CI.
pub fn fast_readiness() -> ReadinessPolicy {
    ReadinessPolicy {
        interval: POLL,
        slow_interval: POLL,
        deadline: Duration::from_secs(5),
    }
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

/// Replays responses in order, repeating the last one forever.
pub struct Sequence {
    responses: Vec<ResponseTemplate>,
    next: AtomicUsize,
}

impl Sequence {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        assert!(!responses.is_empty(), "sequence needs at least one response");
        Self {
            responses,
            next: AtomicUsize::new(0),
        }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        self.responses[i.min(self.responses.len() - 1)].clone()
    }
}

/// Matches requests that carry no `Authorization` header.
pub struct NoAuthorization;

impl Match for NoAuthorization {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("authorization")
    }
}

/// Resolver that fails a fixed number of times, then answers.
pub struct FakeResolver {
    failures: usize,
    calls: AtomicUsize,
}

impl FakeResolver {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn ready() -> Self {
        Self::failing(0)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NameResolver for FakeResolver {
    async fn resolve(
        &self,
        name: &str,
        nameservers: &[IpAddr],
        port: u16,
    ) -> Result<Vec<IpAddr>, ResolveError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ResolveError::Lookup {
                name: name.to_string(),
                nameservers: format!("{nameservers:?}:{port}"),
                message: "NXDOMAIN".to_string(),
            });
        }
        Ok(vec!["10.0.0.1".parse().expect("valid ip")])
    }
}
