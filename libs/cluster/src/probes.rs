//! Readiness probe evaluators.
//!
//! Each function classifies exactly one observation. They do no I/O; the
//! async steps in [`crate::ready`] take the observation and hand it here.

use std::net::IpAddr;

use dcos_converge::ProbeOutcome;
use serde::Deserialize;

use crate::error::{HttpError, ResolveError};
use crate::http::HttpResponse;

pub const FRONT_DOOR_PATH: &str = "/";
pub const MARATHON_UI_PATH: &str = "/marathon/ui/";
pub const MESOS_SLAVES_PATH: &str = "/mesos/master/slaves";
pub const HISTORY_PING_PATH: &str = "/dcos-history-service/ping";
pub const METRONOME_JOBS_PATH: &str = "/service/metronome/v1/jobs";

/// Agent state as served by Admin Router's cached Mesos state.
pub fn agent_state_path(agent_id: &str) -> String {
    format!("/slave/{agent_id}/slave%281%29/state.json")
}

/// Body of `GET /mesos/master/slaves`.
#[derive(Debug, Clone, Deserialize)]
pub struct MesosSlaves {
    pub slaves: Vec<MesosSlave>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MesosSlave {
    pub id: String,
    #[serde(default)]
    pub hostname: Option<String>,
}

impl MesosSlaves {
    /// Agent ids, sorted.
    pub fn sorted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slaves.iter().map(|s| s.id.clone()).collect();
        ids.sort();
        ids
    }
}

#[derive(Debug, Deserialize)]
struct AgentState {
    id: Option<String>,
}

/// `leader.mesos` resolves once a leader is elected.
pub fn leader_outcome(result: Result<Vec<IpAddr>, ResolveError>) -> ProbeOutcome<Vec<IpAddr>> {
    match result {
        Ok(addrs) => ProbeOutcome::Satisfied(addrs),
        Err(e) => ProbeOutcome::not_yet(format!("cannot resolve leader.mesos: {e}")),
    }
}

/// Any HTTP response means Admin Router is listening, whatever the status.
pub fn front_door_outcome(result: Result<HttpResponse, HttpError>) -> ProbeOutcome<u16> {
    match result {
        Ok(response) => ProbeOutcome::Satisfied(response.status),
        Err(e) if e.is_transient() => ProbeOutcome::not_yet(format!("cannot connect: {e}")),
        Err(e) => ProbeOutcome::fatal(e.to_string()),
    }
}

/// Below 500 the Marathon backend is answering.
pub fn marathon_outcome(response: &HttpResponse) -> ProbeOutcome<()> {
    if response.status < 500 {
        ProbeOutcome::Satisfied(())
    } else {
        ProbeOutcome::not_yet(format!("marathon returned {}", response.status))
    }
}

/// Satisfied once at least `expected` agents are registered.
pub fn agents_outcome(response: &HttpResponse, expected: usize) -> ProbeOutcome<MesosSlaves> {
    if response.status != 200 {
        return ProbeOutcome::not_yet(format!("mesos master returned {}", response.status));
    }

    let slaves: MesosSlaves = match response.json() {
        Ok(slaves) => slaves,
        Err(e) => return ProbeOutcome::fatal(e.to_string()),
    };

    let joined = slaves.slaves.len();
    if joined >= expected {
        ProbeOutcome::Satisfied(slaves)
    } else {
        ProbeOutcome::not_yet(format!("{joined} of {expected} agents joined"))
    }
}

/// The history service is up once it stops answering above 500.
pub fn history_outcome(response: &HttpResponse) -> ProbeOutcome<()> {
    if response.status <= 500 {
        ProbeOutcome::Satisfied(())
    } else {
        ProbeOutcome::not_yet(format!("history service returned {}", response.status))
    }
}

/// The agent list the edge-router probe walks. Must be readable.
pub fn agent_list_outcome(response: &HttpResponse) -> ProbeOutcome<Vec<String>> {
    if response.status != 200 {
        return ProbeOutcome::fatal(format!(
            "mesos master returned {} for the agent list",
            response.status
        ));
    }

    match response.json::<MesosSlaves>() {
        Ok(slaves) => ProbeOutcome::Satisfied(slaves.sorted_ids()),
        Err(e) => ProbeOutcome::fatal(e.to_string()),
    }
}

/// Admin Router serves one agent's state once its cache knows the agent.
pub fn agent_state_outcome(agent_id: &str, response: &HttpResponse) -> ProbeOutcome<()> {
    match response.status {
        404 => ProbeOutcome::not_yet(format!("agent {agent_id} not yet cached by admin router")),
        200 => match response.json::<AgentState>() {
            Ok(AgentState { id: Some(id) }) if id == agent_id => ProbeOutcome::Satisfied(()),
            Ok(AgentState { id: Some(id) }) => {
                ProbeOutcome::fatal(format!("state for agent {agent_id} reports id {id}"))
            }
            Ok(AgentState { id: None }) => {
                ProbeOutcome::fatal(format!("state for agent {agent_id} has no id"))
            }
            Err(e) => ProbeOutcome::fatal(e.to_string()),
        },
        status => ProbeOutcome::fatal(format!(
            "unexpected status {status} for agent {agent_id} state"
        )),
    }
}

/// 500 and 504 mean the Metronome backend is still starting.
pub fn metronome_outcome(response: &HttpResponse) -> ProbeOutcome<()> {
    match response.status {
        200 => ProbeOutcome::Satisfied(()),
        500 | 504 => ProbeOutcome::not_yet(format!("metronome returned {}", response.status)),
        status => ProbeOutcome::fatal(format!("metronome returned {status}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;
    use reqwest::header::HeaderMap;
    use rstest::rstest;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse::new(
            status,
            HeaderMap::new(),
            Bytes::from(body.to_string()),
            "http://cluster/probe",
        )
    }

    fn slaves_body(count: usize) -> String {
        let slaves: Vec<String> = (0..count)
            .map(|i| format!(r#"{{"id":"agent-{i}","hostname":"10.0.1.{i}"}}"#))
            .collect();
        format!(r#"{{"slaves":[{}]}}"#, slaves.join(","))
    }

    #[test]
    fn test_agent_state_path_escapes_parens() {
        assert_eq!(
            agent_state_path("abc-S1"),
            "/slave/abc-S1/slave%281%29/state.json"
        );
    }

    #[test]
    fn test_leader_outcome() {
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(
            leader_outcome(Ok(vec![ip])),
            ProbeOutcome::Satisfied(vec![ip])
        );

        let err = ResolveError::Lookup {
            name: "leader.mesos.".to_string(),
            nameservers: "10.0.0.1:61053".to_string(),
            message: "no record".to_string(),
        };
        assert!(matches!(leader_outcome(Err(err)), ProbeOutcome::NotYet(_)));
    }

    #[rstest]
    #[case(200)]
    #[case(401)]
    #[case(502)]
    fn test_front_door_any_status_is_up(#[case] status: u16) {
        assert_eq!(
            front_door_outcome(Ok(response(status, ""))),
            ProbeOutcome::Satisfied(status)
        );
    }

    #[test]
    fn test_front_door_connect_error_is_not_yet() {
        let err = HttpError::Connect {
            url: "http://cluster/".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(matches!(
            front_door_outcome(Err(err)),
            ProbeOutcome::NotYet(_)
        ));

        let err = HttpError::Timeout {
            url: "http://cluster/".to_string(),
        };
        assert!(matches!(
            front_door_outcome(Err(err)),
            ProbeOutcome::NotYet(_)
        ));
    }

    #[rstest]
    #[case(200, true)]
    #[case(404, true)]
    #[case(499, true)]
    #[case(500, false)]
    #[case(503, false)]
    fn test_marathon_outcome(#[case] status: u16, #[case] up: bool) {
        assert_eq!(marathon_outcome(&response(status, "")).is_satisfied(), up);
    }

    #[rstest]
    #[case(200, true)]
    #[case(500, true)]
    #[case(502, false)]
    #[case(503, false)]
    fn test_history_outcome(#[case] status: u16, #[case] up: bool) {
        assert_eq!(history_outcome(&response(status, "")).is_satisfied(), up);
    }

    #[test]
    fn test_agents_non_200_is_not_yet() {
        assert!(matches!(
            agents_outcome(&response(503, ""), 1),
            ProbeOutcome::NotYet(_)
        ));
    }

    #[test]
    fn test_agents_malformed_body_is_fatal() {
        assert!(agents_outcome(&response(200, "{}"), 1).is_fatal());
        assert!(agents_outcome(&response(200, "<html>"), 1).is_fatal());
    }

    #[test]
    fn test_agents_threshold() {
        assert!(matches!(
            agents_outcome(&response(200, &slaves_body(2)), 3),
            ProbeOutcome::NotYet(ref r) if r == "2 of 3 agents joined"
        ));
        assert!(agents_outcome(&response(200, &slaves_body(3)), 3).is_satisfied());
        assert!(agents_outcome(&response(200, &slaves_body(4)), 3).is_satisfied());
    }

    #[test]
    fn test_agent_list_must_be_200() {
        assert!(agent_list_outcome(&response(503, "")).is_fatal());
        assert_eq!(
            agent_list_outcome(&response(
                200,
                r#"{"slaves":[{"id":"b"},{"id":"a"}]}"#
            )),
            ProbeOutcome::Satisfied(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[rstest]
    #[case(404, "", "not_yet")]
    #[case(200, r#"{"id":"agent-1"}"#, "satisfied")]
    #[case(200, r#"{"id":"agent-2"}"#, "fatal")]
    #[case(200, r#"{"hostname":"x"}"#, "fatal")]
    #[case(500, "", "fatal")]
    #[case(503, "", "fatal")]
    fn test_agent_state_outcome(#[case] status: u16, #[case] body: &str, #[case] expected: &str) {
        let outcome = agent_state_outcome("agent-1", &response(status, body));
        let actual = match outcome {
            ProbeOutcome::Satisfied(()) => "satisfied",
            ProbeOutcome::NotYet(_) => "not_yet",
            ProbeOutcome::Fatal(_) => "fatal",
        };
        assert_eq!(actual, expected);
    }

    #[rstest]
    #[case(200, "satisfied")]
    #[case(500, "not_yet")]
    #[case(504, "not_yet")]
    #[case(502, "fatal")]
    #[case(404, "fatal")]
    fn test_metronome_outcome(#[case] status: u16, #[case] expected: &str) {
        let actual = match metronome_outcome(&response(status, "")) {
            ProbeOutcome::Satisfied(()) => "satisfied",
            ProbeOutcome::NotYet(_) => "not_yet",
            ProbeOutcome::Fatal(_) => "fatal",
        };
        assert_eq!(actual, expected);
    }

    proptest! {
        /// Once enough agents have joined, more joining never un-satisfies it.
        #[test]
        fn prop_agent_membership_monotonic(expected in 0usize..20, joined in 0usize..20, extra in 0usize..10) {
            let before = agents_outcome(&response(200, &slaves_body(joined)), expected);
            let after = agents_outcome(&response(200, &slaves_body(joined + extra)), expected);
            if before.is_satisfied() {
                prop_assert!(after.is_satisfied());
            }
            prop_assert_eq!(before.is_satisfied(), joined >= expected);
        }
    }
}
