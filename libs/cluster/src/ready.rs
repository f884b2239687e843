//! The cluster-ready sequence.
//!
//! Checks run strictly in order. Each later check assumes what the earlier
//! ones established: nothing is reachable before a leader exists, and
//! everything after login is sent with the session credential.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use dcos_converge::{poll, PollPolicy, ProbeOutcome};
use tracing::info;

use crate::auth::{authenticate, Credentials};
use crate::client::{ApiRequest, Cluster};
use crate::dns::{NameResolver, LEADER_NAME, MESOS_DNS_PORT};
use crate::error::{HttpError, ReadyError};
use crate::probes::{
    agent_list_outcome, agent_state_outcome, agent_state_path, agents_outcome, front_door_outcome,
    history_outcome, leader_outcome, marathon_outcome, metronome_outcome, FRONT_DOOR_PATH,
    HISTORY_PING_PATH, MARATHON_UI_PATH, MESOS_SLAVES_PATH, METRONOME_JOBS_PATH,
};

/// Default deadline for each check.
pub const DEFAULT_READY_DEADLINE: Duration = Duration::from_secs(15 * 60);

/// One step of the cluster-ready sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadinessCheck {
    LeaderElected,
    FrontDoor,
    Authenticated,
    Marathon,
    AgentsJoined,
    HistoryService,
    EdgeRouterCache,
    Metronome,
}

impl ReadinessCheck {
    /// Every check, in the order they run.
    pub const SEQUENCE: [ReadinessCheck; 8] = [
        Self::LeaderElected,
        Self::FrontDoor,
        Self::Authenticated,
        Self::Marathon,
        Self::AgentsJoined,
        Self::HistoryService,
        Self::EdgeRouterCache,
        Self::Metronome,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeaderElected => "leader elected",
            Self::FrontDoor => "admin router up",
            Self::Authenticated => "authenticated",
            Self::Marathon => "marathon up",
            Self::AgentsJoined => "agents joined",
            Self::HistoryService => "history service up",
            Self::EdgeRouterCache => "admin router agent endpoints cached",
            Self::Metronome => "metronome up",
        }
    }
}

impl fmt::Display for ReadinessCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Poll timing for the ready sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub interval: Duration,
    /// Used by the checks that walk every agent or wait on Metronome.
    pub slow_interval: Duration,
    /// Applied to each check separately.
    pub deadline: Duration,
}

impl ReadinessPolicy {
    pub fn for_check(&self, check: ReadinessCheck) -> PollPolicy {
        let interval = match check {
            ReadinessCheck::EdgeRouterCache | ReadinessCheck::Metronome => self.slow_interval,
            _ => self.interval,
        };
        PollPolicy::new(interval, self.deadline)
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            slow_interval: Duration::from_secs(2),
            deadline: DEFAULT_READY_DEADLINE,
        }
    }
}

/// Drives the cluster-ready sequence.
pub struct Readiness<'a> {
    cluster: &'a Cluster,
    resolver: &'a dyn NameResolver,
    credentials: &'a Credentials,
    policy: ReadinessPolicy,
}

impl<'a> Readiness<'a> {
    pub fn new(
        cluster: &'a Cluster,
        resolver: &'a dyn NameResolver,
        credentials: &'a Credentials,
    ) -> Self {
        Self {
            cluster,
            resolver,
            credentials,
            policy: ReadinessPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run every check in order, stopping at the first failure.
    pub async fn wait(&self) -> Result<(), ReadyError> {
        for check in ReadinessCheck::SEQUENCE {
            self.check(check).await?;
        }
        info!("Cluster is ready");
        Ok(())
    }

    /// Run a single check.
    pub async fn check(&self, check: ReadinessCheck) -> Result<(), ReadyError> {
        info!(check = %check, "Waiting for cluster");

        if check == ReadinessCheck::Authenticated {
            authenticate(self.cluster, self.credentials).await?;
            return Ok(());
        }

        let policy = self.policy.for_check(check);
        poll(&policy, check.as_str(), || self.observe(check))
            .await
            .map_err(|source| ReadyError::Check { check, source })
    }

    async fn observe(&self, check: ReadinessCheck) -> Result<ProbeOutcome<()>, HttpError> {
        let outcome = match check {
            ReadinessCheck::LeaderElected => self.observe_leader().await,
            ReadinessCheck::FrontDoor => {
                let result = self
                    .cluster
                    .send(ApiRequest::get(FRONT_DOOR_PATH).without_auth())
                    .await;
                front_door_outcome(result).map(drop)
            }
            ReadinessCheck::Authenticated => ProbeOutcome::Satisfied(()),
            ReadinessCheck::Marathon => {
                marathon_outcome(&self.cluster.get(MARATHON_UI_PATH).await?)
            }
            ReadinessCheck::AgentsJoined => {
                let expected = self.cluster.handle().expected_agent_count();
                agents_outcome(&self.cluster.get(MESOS_SLAVES_PATH).await?, expected).map(drop)
            }
            ReadinessCheck::HistoryService => {
                history_outcome(&self.cluster.get(HISTORY_PING_PATH).await?)
            }
            ReadinessCheck::EdgeRouterCache => self.observe_edge_router().await?,
            ReadinessCheck::Metronome => {
                metronome_outcome(&self.cluster.get(METRONOME_JOBS_PATH).await?)
            }
        };
        Ok(outcome)
    }

    async fn observe_leader(&self) -> ProbeOutcome<()> {
        let mut nameservers = Vec::new();
        for host in self.cluster.handle().public_masters() {
            match host.parse::<IpAddr>() {
                Ok(ip) => nameservers.push(ip),
                Err(_) => {
                    return ProbeOutcome::fatal(format!(
                        "public master {host} is not an IP address"
                    ))
                }
            }
        }

        let result = self
            .resolver
            .resolve(LEADER_NAME, &nameservers, MESOS_DNS_PORT)
            .await;
        leader_outcome(result).map(drop)
    }

    /// Every currently registered agent must be served from Admin Router's
    /// cache. The agent list is re-read on every pass.
    async fn observe_edge_router(&self) -> Result<ProbeOutcome<()>, HttpError> {
        let list = self.cluster.get(MESOS_SLAVES_PATH).await?;
        let ids = match agent_list_outcome(&list) {
            ProbeOutcome::Satisfied(ids) => ids,
            ProbeOutcome::NotYet(reason) => return Ok(ProbeOutcome::NotYet(reason)),
            ProbeOutcome::Fatal(reason) => return Ok(ProbeOutcome::Fatal(reason)),
        };

        for id in &ids {
            let response = self.cluster.get(&agent_state_path(id)).await?;
            match agent_state_outcome(id, &response) {
                ProbeOutcome::Satisfied(()) => continue,
                other => return Ok(other),
            }
        }

        Ok(ProbeOutcome::Satisfied(()))
    }
}
