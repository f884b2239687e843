//! DC/OS cluster access for integration runs.
//!
//! This library connects a test run to a live cluster and drives short-lived
//! workloads on it. Key pieces:
//!
//! - **Handle**: immutable topology plus the session written by login
//!   ([`ClusterHandle`]).
//! - **Readiness**: the ordered sequence of probes that must pass before
//!   any test touches the cluster ([`Readiness`]).
//! - **Workloads**: Marathon apps and Metronome jobs that are always
//!   torn down, whatever happened in between ([`Marathon`], [`Metronome`]).
//!
//! # Invariants
//!
//! - Configuration is validated before any network call
//! - Every wait has a deadline
//! - Nothing here retries a mutation; only observations are repeated

pub mod auth;
pub mod client;
pub mod config;
pub mod dns;
pub mod error;
pub mod handle;
pub mod http;
pub mod marathon;
pub mod metronome;
pub mod probes;
pub mod ready;
pub mod remote;

pub use auth::{authenticate, Credentials};
pub use client::{ApiRequest, Cluster};
pub use config::HarnessConfig;
pub use dns::{HickoryResolver, NameResolver};
pub use error::{
    AuthError, ConfigError, HttpError, JobError, ReadyError, RemoteError, ResolveError,
    WorkloadError,
};
pub use handle::{ClusterHandle, ClusterSpec, Provider, Session};
pub use http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use marathon::{AppDefinition, DeployOptions, Endpoint, Marathon};
pub use metronome::{JobDefinition, JobOptions, Metronome};
pub use ready::{Readiness, ReadinessCheck, ReadinessPolicy};
pub use remote::{CommandOutput, IntegrationTestRun, RemoteExecutor, ShellExecutor};
