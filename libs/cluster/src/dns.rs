//! Name resolution against cluster DNS.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tracing::debug;

use crate::error::ResolveError;

/// Port Mesos-DNS listens on for external queries.
pub const MESOS_DNS_PORT: u16 = 61053;

/// Record that exists only once a Mesos leader is elected.
pub const LEADER_NAME: &str = "leader.mesos.";

/// Resolves A records against an explicit set of nameservers.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(
        &self,
        name: &str,
        nameservers: &[IpAddr],
        port: u16,
    ) -> Result<Vec<IpAddr>, ResolveError>;
}

/// [`NameResolver`] backed by hickory. Builds a fresh, cache-less resolver
/// per query so every attempt hits the wire.
#[derive(Debug, Clone)]
pub struct HickoryResolver {
    timeout: Duration,
}

impl HickoryResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HickoryResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl NameResolver for HickoryResolver {
    async fn resolve(
        &self,
        name: &str,
        nameservers: &[IpAddr],
        port: u16,
    ) -> Result<Vec<IpAddr>, ResolveError> {
        if nameservers.is_empty() {
            return Err(ResolveError::NoNameservers(name.to_string()));
        }

        let group = NameServerConfigGroup::from_ips_clear(nameservers, port, true);
        let config = ResolverConfig::from_parts(None, vec![], group);

        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;
        opts.attempts = 1;
        opts.cache_size = 0;

        let resolver = TokioAsyncResolver::tokio(config, opts);

        debug!(name, port, nameservers = ?nameservers, "Resolving");

        let lookup = resolver
            .ipv4_lookup(name)
            .await
            .map_err(|e| ResolveError::Lookup {
                name: name.to_string(),
                nameservers: format_nameservers(nameservers, port),
                message: e.to_string(),
            })?;

        Ok(lookup.iter().map(|a| IpAddr::V4(a.0)).collect())
    }
}

fn format_nameservers(nameservers: &[IpAddr], port: u16) -> String {
    nameservers
        .iter()
        .map(|ip| match ip {
            IpAddr::V4(v4) => format!("{v4}:{port}"),
            IpAddr::V6(v6) => format!("[{v6}]:{port}"),
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_nameservers_rejected() {
        let err = HickoryResolver::default()
            .resolve(LEADER_NAME, &[], MESOS_DNS_PORT)
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::NoNameservers(LEADER_NAME.to_string()));
    }

    #[test]
    fn test_format_nameservers() {
        let servers: Vec<IpAddr> = vec!["10.0.0.1".parse().unwrap(), "::1".parse().unwrap()];
        assert_eq!(
            format_nameservers(&servers, 61053),
            "10.0.0.1:61053,[::1]:61053"
        );
    }
}
