//! Error types for cluster access.

use dcos_converge::ConvergeError;
use thiserror::Error;

use crate::ready::ReadinessCheck;

/// Invalid or missing configuration. Raised before any cluster contact.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// The cluster URI is not an absolute http(s) URI.
    #[error("invalid cluster URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("at least one master is required")]
    NoMasters,

    /// Every master must have exactly one externally reachable counterpart.
    #[error("{masters} masters but {public_masters} public masters")]
    MasterCountMismatch {
        masters: usize,
        public_masters: usize,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// HTTP transport and status errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// Nothing is listening yet, or the network path is down.
    #[error("cannot connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("unexpected status {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("failed to encode request body: {0}")]
    Encode(String),

    #[error("node {0} is not part of the cluster")]
    UnknownNode(String),
}

impl HttpError {
    /// Returns true if the request never reached a listening server.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }

    /// Returns true for failures that waiting may fix.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Timeout { .. })
    }
}

/// Name resolution errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("cannot resolve {name} via {nameservers}: {message}")]
    Lookup {
        name: String,
        nameservers: String,
        message: String,
    },

    #[error("no nameservers given for {0}")]
    NoNameservers(String),
}

/// Login errors. None of these are retried.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed login response: {0}")]
    MalformedResponse(String),

    #[error("login response did not set the {0} cookie")]
    MissingCookie(&'static str),

    #[error("cluster handle is already authenticated")]
    AlreadyAuthenticated,

    #[error("login request failed: {0}")]
    Http(#[from] HttpError),
}

/// The cluster-ready sequence stopped at a check.
#[derive(Debug, Error)]
pub enum ReadyError {
    #[error("cluster not ready ({check}): {source}")]
    Check {
        check: ReadinessCheck,
        #[source]
        source: ConvergeError<HttpError>,
    },

    #[error("cluster not ready (authentication): {0}")]
    Auth(#[from] AuthError),
}

impl ReadyError {
    /// The check that failed.
    pub fn check(&self) -> ReadinessCheck {
        match self {
            Self::Check { check, .. } => *check,
            Self::Auth(_) => ReadinessCheck::Authenticated,
        }
    }
}

/// Marathon app lifecycle errors.
#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("failed to submit app {id}: {source}")]
    Submit {
        id: String,
        #[source]
        source: HttpError,
    },

    #[error("app deployment failed: {0}")]
    Deploy(#[source] ConvergeError<HttpError>),

    #[error("failed to delete app {id}: {source}")]
    Delete {
        id: String,
        #[source]
        source: HttpError,
    },

    #[error("app teardown failed: {0}")]
    Teardown(#[source] ConvergeError<HttpError>),

    /// The deployed test server did not answer as expected.
    #[error("app check against {endpoint} failed: {reason}")]
    Verify { endpoint: String, reason: String },
}

/// Metronome job lifecycle errors.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to create job {id}: {source}")]
    Create {
        id: String,
        #[source]
        source: HttpError,
    },

    #[error("failed to start job {id}: {source}")]
    Start {
        id: String,
        #[source]
        source: HttpError,
    },

    #[error("job run failed: {0}")]
    Run(#[source] ConvergeError<HttpError>),

    #[error("failed to delete job {id}: {source}")]
    Delete {
        id: String,
        #[source]
        source: HttpError,
    },
}

/// Remote command execution errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to spawn {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}
