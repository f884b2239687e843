//! Macros for defining typed ID types.

/// Macro to define a typed ID with a specific prefix.
///
/// This generates a newtype wrapper around [`TestToken`](crate::TestToken)
/// with:
/// - A `PREFIX` constant
/// - `new()` to generate an ID from a fresh token
/// - `parse()` to parse from string
/// - `Display` and `FromStr` implementations
/// - `Serialize` and `Deserialize` implementations
///
/// # Example
///
/// ```ignore
/// define_id!(AppId, "/integration-test-");
///
/// let app_id = AppId::new();
/// let parsed: AppId = "/integration-test-3f0c1c9e5b9b4a52a0d54c1f0b2e6d11".parse()?;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        /// A typed ID for this resource type.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::TestToken);

        impl $name {
            /// The prefix for this ID type.
            pub const PREFIX: &'static str = $prefix;

            /// Creates a new ID with a fresh token.
            #[must_use]
            pub fn new() -> Self {
                Self($crate::TestToken::new())
            }

            /// Creates an ID that shares an existing token.
            #[must_use]
            pub const fn from_token(token: $crate::TestToken) -> Self {
                Self(token)
            }

            /// Returns the token this ID was derived from.
            #[must_use]
            pub const fn token(&self) -> $crate::TestToken {
                self.0
            }

            /// Parses an ID from a string.
            ///
            /// The string must be in the format `{prefix}{token}`.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }

                let Some(token) = s.strip_prefix(Self::PREFIX) else {
                    return Err($crate::IdError::InvalidPrefix {
                        expected: Self::PREFIX,
                        actual: s.to_string(),
                    });
                };

                Ok(Self($crate::TestToken::parse(token)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}
