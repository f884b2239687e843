//! Harness configuration from the environment.
//!
//! Everything is validated here, before the first network call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Credentials;
use crate::client::Cluster;
use crate::error::ConfigError;
use crate::handle::{ClusterHandle, ClusterSpec, Provider};
use crate::http::ReqwestTransport;
use crate::ready::ReadinessPolicy;

const DEFAULT_READY_TIMEOUT_SECS: u64 = 15 * 60;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Validated harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Cluster topology.
    pub cluster: ClusterHandle,

    /// Login credentials, used only when auth is enabled.
    pub credentials: Credentials,

    /// Per-check deadline and intervals for the ready sequence.
    pub readiness: ReadinessPolicy,

    /// Per-request HTTP timeout.
    pub http_timeout: Duration,

    /// Verify TLS certificates. Off for self-signed test clusters.
    pub verify_tls: bool,
}

impl HarnessConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of variables.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let required = |name: &'static str| {
            vars.get(name)
                .map(String::as_str)
                .ok_or(ConfigError::Missing(name))
        };
        let optional = |name: &'static str| vars.get(name).map(String::as_str);

        let base_uri = required("DCOS_DNS_ADDRESS")?.to_string();
        let masters = host_list(required("MASTER_HOSTS")?);
        let public_masters = host_list(required("PUBLIC_MASTER_HOSTS")?);
        let private_agents = host_list(required("SLAVE_HOSTS")?);
        let public_agents = host_list(required("PUBLIC_SLAVE_HOSTS")?);

        // Exact spelling only, so a typo does not silently mean false.
        let dns_search = parse_bool("DNS_SEARCH", required("DNS_SEARCH")?)?;

        let provider_raw = required("DCOS_PROVIDER")?;
        let provider =
            provider_raw
                .parse::<Provider>()
                .map_err(|e| ConfigError::Invalid {
                    name: "DCOS_PROVIDER",
                    value: provider_raw.to_string(),
                    reason: e.to_string(),
                })?;

        let auth_enabled = match optional("DCOS_AUTH_ENABLED") {
            Some(value) => parse_bool("DCOS_AUTH_ENABLED", value)?,
            None => true,
        };

        let credentials = match (optional("DCOS_LOGIN_UNAME"), optional("DCOS_LOGIN_PW")) {
            (Some(uid), Some(password)) => Credentials::login(uid, password),
            (None, None) => Credentials::BuiltinToken,
            (Some(_), None) => return Err(ConfigError::Missing("DCOS_LOGIN_PW")),
            (None, Some(_)) => return Err(ConfigError::Missing("DCOS_LOGIN_UNAME")),
        };

        let ready_timeout = parse_secs(
            "DCOS_READY_TIMEOUT_SECS",
            optional("DCOS_READY_TIMEOUT_SECS"),
            DEFAULT_READY_TIMEOUT_SECS,
        )?;
        let http_timeout = parse_secs(
            "DCOS_HTTP_TIMEOUT_SECS",
            optional("DCOS_HTTP_TIMEOUT_SECS"),
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?;
        let insecure_tls = match optional("DCOS_INSECURE_TLS") {
            Some(value) => parse_bool("DCOS_INSECURE_TLS", value)?,
            None => false,
        };

        let cluster = ClusterHandle::new(ClusterSpec {
            base_uri,
            masters,
            public_masters,
            private_agents,
            public_agents,
            provider,
            dns_search,
            auth_enabled,
        })?;

        Ok(Self {
            cluster,
            credentials,
            readiness: ReadinessPolicy {
                deadline: ready_timeout,
                ..ReadinessPolicy::default()
            },
            http_timeout,
            verify_tls: !insecure_tls,
        })
    }

    /// Bind the cluster handle to a reqwest transport.
    pub fn connect(&self) -> Result<Cluster, ConfigError> {
        let transport = ReqwestTransport::new(self.http_timeout, self.verify_tls)
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Cluster::new(self.cluster.clone(), Arc::new(transport)))
    }
}

fn host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            value: other.to_string(),
            reason: "must be exactly true or false".to_string(),
        }),
    }
}

fn parse_secs(name: &'static str, value: Option<&str>, default: u64) -> Result<Duration, ConfigError> {
    let Some(value) = value else {
        return Ok(Duration::from_secs(default));
    };

    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        Ok(_) => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "must be positive".to_string(),
        }),
        Err(e) => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn vars() -> Vec<(String, String)> {
        [
            ("DCOS_DNS_ADDRESS", "http://10.0.0.1"),
            ("MASTER_HOSTS", "10.0.0.1,10.0.0.2,10.0.0.3"),
            ("PUBLIC_MASTER_HOSTS", "54.0.0.1, 54.0.0.2,54.0.0.3"),
            ("SLAVE_HOSTS", "10.0.1.1,10.0.1.2"),
            ("PUBLIC_SLAVE_HOSTS", "10.0.2.1"),
            ("DNS_SEARCH", "false"),
            ("DCOS_PROVIDER", "onprem"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn with(mut vars: Vec<(String, String)>, key: &str, value: &str) -> Vec<(String, String)> {
        vars.retain(|(k, _)| k != key);
        vars.push((key.to_string(), value.to_string()));
        vars
    }

    fn without(mut vars: Vec<(String, String)>, key: &str) -> Vec<(String, String)> {
        vars.retain(|(k, _)| k != key);
        vars
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::from_vars(vars()).unwrap();
        assert!(config.cluster.auth_enabled());
        assert!(!config.cluster.dns_search());
        assert_eq!(config.cluster.provider(), Provider::Onprem);
        assert_eq!(config.cluster.public_masters()[1], "54.0.0.2");
        assert_eq!(config.cluster.expected_agent_count(), 3);
        assert_eq!(config.credentials, Credentials::BuiltinToken);
        assert_eq!(config.readiness.deadline, Duration::from_secs(900));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert!(config.verify_tls);
    }

    #[rstest]
    #[case("DCOS_DNS_ADDRESS")]
    #[case("MASTER_HOSTS")]
    #[case("PUBLIC_MASTER_HOSTS")]
    #[case("SLAVE_HOSTS")]
    #[case("PUBLIC_SLAVE_HOSTS")]
    #[case("DNS_SEARCH")]
    #[case("DCOS_PROVIDER")]
    fn test_required_variable(#[case] name: &str) {
        let err = HarnessConfig::from_vars(without(vars(), name)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(missing) if missing == name));
    }

    #[rstest]
    #[case("DNS_SEARCH", "True")]
    #[case("DNS_SEARCH", "yes")]
    #[case("DCOS_PROVIDER", "gce")]
    #[case("DCOS_AUTH_ENABLED", "1")]
    #[case("DCOS_READY_TIMEOUT_SECS", "0")]
    #[case("DCOS_HTTP_TIMEOUT_SECS", "soon")]
    #[case("DCOS_INSECURE_TLS", "on")]
    fn test_invalid_value(#[case] name: &str, #[case] value: &str) {
        let err = HarnessConfig::from_vars(with(vars(), name, value)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: n, .. } if n == name));
    }

    #[test]
    fn test_base_uri_without_scheme() {
        let err = HarnessConfig::from_vars(with(vars(), "DCOS_DNS_ADDRESS", "10.0.0.1")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUri { .. }));
    }

    #[test]
    fn test_master_mismatch() {
        let err =
            HarnessConfig::from_vars(with(vars(), "PUBLIC_MASTER_HOSTS", "54.0.0.1")).unwrap_err();
        assert!(matches!(err, ConfigError::MasterCountMismatch { .. }));
    }

    #[test]
    fn test_login_credentials() {
        let vars = with(with(vars(), "DCOS_LOGIN_UNAME", "ops"), "DCOS_LOGIN_PW", "pw");
        let config = HarnessConfig::from_vars(vars).unwrap();
        assert_eq!(config.credentials, Credentials::login("ops", "pw"));
    }

    #[test]
    fn test_login_requires_both_halves() {
        let err = HarnessConfig::from_vars(with(vars(), "DCOS_LOGIN_UNAME", "ops")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DCOS_LOGIN_PW")));

        let err = HarnessConfig::from_vars(with(vars(), "DCOS_LOGIN_PW", "pw")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DCOS_LOGIN_UNAME")));
    }

    #[test]
    fn test_overrides() {
        let vars = with(
            with(
                with(vars(), "DCOS_AUTH_ENABLED", "false"),
                "DCOS_READY_TIMEOUT_SECS",
                "60",
            ),
            "DCOS_INSECURE_TLS",
            "true",
        );
        let config = HarnessConfig::from_vars(vars).unwrap();
        assert!(!config.cluster.auth_enabled());
        assert_eq!(config.readiness.deadline, Duration::from_secs(60));
        assert!(!config.verify_tls);
    }

    #[test]
    fn test_empty_agent_lists_allowed() {
        let vars = with(with(vars(), "SLAVE_HOSTS", ""), "PUBLIC_SLAVE_HOSTS", "");
        let config = HarnessConfig::from_vars(vars).unwrap();
        assert_eq!(config.cluster.expected_agent_count(), 0);
    }
}
