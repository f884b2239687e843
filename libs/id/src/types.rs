//! Token and typed ID definitions.

use crate::{define_id, IdError};

/// Length of a token in its canonical (simple hex) form.
const TOKEN_LEN: usize = 32;

/// Random per-invocation token.
///
/// The same token is embedded in a resource id and handed to the workload
/// itself, so a test can confirm it reached the instance it deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TestToken(uuid::Uuid);

impl TestToken {
    /// Creates a fresh random token.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn uuid(&self) -> uuid::Uuid {
        self.0
    }

    /// Parses a token from its simple hex form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let well_formed = s.len() == TOKEN_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(IdError::InvalidToken(s.to_string()));
        }

        uuid::Uuid::try_parse(s)
            .map(Self)
            .map_err(|e| IdError::InvalidToken(e.to_string()))
    }
}

impl Default for TestToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl std::str::FromStr for TestToken {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for TestToken {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for TestToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Workloads
// =============================================================================

define_id!(AppId, "/integration-test-");
define_id!(JobId, "integration-test-");

// =============================================================================
// Tests
// =============================================================================
