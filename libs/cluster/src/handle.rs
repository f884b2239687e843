//! Cluster topology and session state.
//!
//! A [`ClusterHandle`] is built once per test run from validated
//! configuration. Topology never changes after construction; the session is
//! written at most once, by the login step, and only read afterwards, so a
//! handle can be shared across concurrently running scenarios without locks.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ConfigError;

/// Admin Router ports on masters, by scheme.
const MASTER_HTTP_PORT: u16 = 80;
const MASTER_HTTPS_PORT: u16 = 443;

/// Admin Router ports on agents, by scheme.
const AGENT_HTTP_PORT: u16 = 61001;
const AGENT_HTTPS_PORT: u16 = 61002;

/// ZooKeeper client port on masters.
const ZK_PORT: u16 = 2181;

/// Where the cluster runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Onprem,
    Aws,
    Azure,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onprem => "onprem",
            Self::Aws => "aws",
            Self::Azure => "azure",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown provider {0:?}, expected one of onprem, aws, azure")]
pub struct ParseProviderError(String);

impl FromStr for Provider {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onprem" => Ok(Self::Onprem),
            "aws" => Ok(Self::Aws),
            "azure" => Ok(Self::Azure),
            other => Err(ParseProviderError(other.to_string())),
        }
    }
}

/// URI scheme of the cluster entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    fn master_port(&self) -> u16 {
        match self {
            Self::Http => MASTER_HTTP_PORT,
            Self::Https => MASTER_HTTPS_PORT,
        }
    }

    fn agent_port(&self) -> u16 {
        match self {
            Self::Http => AGENT_HTTP_PORT,
            Self::Https => AGENT_HTTPS_PORT,
        }
    }
}

/// Session credential obtained by logging in.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    cookie: String,
}

impl Session {
    pub fn new(token: impl Into<String>, cookie: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            cookie: cookie.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("token={}", self.token)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("cookie", &"<redacted>")
            .finish()
    }
}

/// Construction parameters for a [`ClusterHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    /// Cluster entry point, including scheme.
    pub base_uri: String,

    /// Master addresses as advertised inside the cluster.
    pub masters: Vec<String>,

    /// Master addresses routable from the test host, one per master.
    pub public_masters: Vec<String>,

    pub private_agents: Vec<String>,

    pub public_agents: Vec<String>,

    pub provider: Provider,

    /// Whether a DNS search domain is configured on the nodes.
    pub dns_search: bool,

    pub auth_enabled: bool,
}

/// Immutable cluster topology plus the once-written session credential.
#[derive(Debug, Clone)]
pub struct ClusterHandle {
    base_uri: String,
    scheme: Scheme,
    masters: Vec<String>,
    public_masters: Vec<String>,
    private_agents: Vec<String>,
    public_agents: Vec<String>,
    all_agents: Vec<String>,
    provider: Provider,
    dns_search: bool,
    auth_enabled: bool,
    session: OnceLock<Session>,
}

impl ClusterHandle {
    /// Validate a spec and build the handle.
    pub fn new(spec: ClusterSpec) -> Result<Self, ConfigError> {
        let (base_uri, scheme) = parse_base_uri(&spec.base_uri)?;

        let masters = normalize(spec.masters);
        let public_masters = normalize(spec.public_masters);
        if masters.is_empty() {
            return Err(ConfigError::NoMasters);
        }
        if masters.len() != public_masters.len() {
            return Err(ConfigError::MasterCountMismatch {
                masters: masters.len(),
                public_masters: public_masters.len(),
            });
        }

        let private_agents = normalize(spec.private_agents);
        let public_agents = normalize(spec.public_agents);
        let all_agents = normalize(
            private_agents
                .iter()
                .chain(public_agents.iter())
                .cloned()
                .collect(),
        );

        Ok(Self {
            base_uri,
            scheme,
            masters,
            public_masters,
            private_agents,
            public_agents,
            all_agents,
            provider: spec.provider,
            dns_search: spec.dns_search,
            auth_enabled: spec.auth_enabled,
            session: OnceLock::new(),
        })
    }

    /// Entry point URI, never ending in `/`.
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn masters(&self) -> &[String] {
        &self.masters
    }

    pub fn public_masters(&self) -> &[String] {
        &self.public_masters
    }

    pub fn private_agents(&self) -> &[String] {
        &self.private_agents
    }

    pub fn public_agents(&self) -> &[String] {
        &self.public_agents
    }

    /// Private and public agents, sorted and deduplicated.
    pub fn all_agents(&self) -> &[String] {
        &self.all_agents
    }

    /// Number of agents that must register before the cluster is usable.
    pub fn expected_agent_count(&self) -> usize {
        self.all_agents.len()
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn dns_search(&self) -> bool {
        self.dns_search
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth_enabled
    }

    /// ZooKeeper connection string over the public master addresses.
    pub fn zk_hostports(&self) -> String {
        self.public_masters
            .iter()
            .map(|host| format!("{host}:{ZK_PORT}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Admin Router base URL on a specific node, or `None` if the node is
    /// not part of this cluster.
    pub fn node_base_url(&self, node: &str) -> Option<String> {
        let port = if self.masters.iter().any(|m| m == node) {
            self.scheme.master_port()
        } else if self.all_agents.iter().any(|a| a == node) {
            self.scheme.agent_port()
        } else {
            return None;
        };

        Some(format!("{}://{}:{}", self.scheme.as_str(), node, port))
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.get().is_some()
    }

    /// Store the session. Fails if one is already stored.
    pub(crate) fn set_session(&self, session: Session) -> Result<(), Session> {
        self.session.set(session)
    }
}

fn parse_base_uri(uri: &str) -> Result<(String, Scheme), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };

    let scheme = if uri.starts_with("https://") {
        Scheme::Https
    } else if uri.starts_with("http://") {
        Scheme::Http
    } else {
        return Err(invalid("must start with http:// or https://"));
    };

    let parsed = reqwest::Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;
    if parsed.host_str().is_none() {
        return Err(invalid("missing host"));
    }

    Ok((uri.trim_end_matches('/').to_string(), scheme))
}

/// Trim, drop blanks, sort, dedup.
fn normalize(hosts: Vec<String>) -> Vec<String> {
    let mut hosts: Vec<String> = hosts
        .into_iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect();
    hosts.sort();
    hosts.dedup();
    hosts
}
