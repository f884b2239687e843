//! # dcos-id
//!
//! Identifiers for the ephemeral resources an integration run creates on a
//! cluster.
//!
//! ## Design Principles
//!
//! - Every identifier is derived from a fresh random [`TestToken`], so
//!   concurrent test scenarios never collide on cluster-side names
//! - Identifiers have one canonical string form with strict parsing
//! - Identifiers are typed so an app id cannot be passed where a job id is
//!   expected
//!
//! ## ID Format
//!
//! A token is a UUIDv4 in simple (32 lowercase hex digit) form. Typed IDs
//! prepend a resource prefix:
//!
//! - `/integration-test-3f0c1c9e5b9b4a52a0d54c1f0b2e6d11` (Marathon app)
//! - `integration-test-3f0c1c9e5b9b4a52a0d54c1f0b2e6d11` (Metronome job)
//!
//! Metronome rejects `/` in job ids, hence the separate prefix.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export uuid for consumers that need the raw token value.
pub use uuid::Uuid;
