//! Superuser login.
//!
//! Runs once per cluster handle, between the front-door check and the first
//! authenticated probe. Login is never retried: a rejected or malformed
//! response means the cluster (or the supplied credentials) is broken, and
//! waiting will not change that.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::client::{ApiRequest, Cluster};
use crate::error::AuthError;
use crate::handle::Session;

/// Login endpoint on the IAM service.
pub const LOGIN_PATH: &str = "/acs/api/v1/auth/login";

/// Cookie carrying the session after login.
pub const AUTH_COOKIE: &str = "dcos-acs-auth-cookie";

/// Long-lived OAuth id token accepted by the default test cluster IAM
/// configuration. Expires in 2036.
pub const BUILTIN_TEST_TOKEN: &str = concat!(
    "eyJ0eXAiOiJKV1QiLCJhbGciOiJSUzI1NiIsImtpZCI6Ik9UQkVOakZFTWtWQ09VRTRPRVpGTlRNMFJrWXlRa015Tnprd1JrSkVRemRCTWpBM1FqYzVOZyJ9.",
    "eyJlbWFpbCI6ImFsYmVydEBiZWtzdGlsLm5ldCIsImVtYWlsX3ZlcmlmaWVkIjp0cnVlLCJpc3MiOiJodHRwczovL2Rjb3MuYXV0aDAuY29tLyIsInN1YiI6Imdvb2dsZS1vYXV0aDJ8MTA5OTY0NDk5MDExMTA4OTA1MDUwIiwiYXVkIjoiM3lGNVRPU3pkbEk0NVExeHNweHplb0dCZTlmTnhtOW0iLCJleHAiOjIwOTA4ODQ5NzQsImlhdCI6MTQ2MDE2NDk3NH0.",
    "OxcoJJp06L1z2_41_p65FriEGkPzwFB_0pA9ULCvwvzJ8pJXw9hLbmsx-23aY2f-ydwJ7LSibL9i5NbQSR2riJWTcW4N7tLLCCMeFXKEK4hErN2hyxz71Fl765EjQSO5KD1A-HsOPr3ZZPoGTBjE0-EFtmXkSlHb1T2zd0Z8T5Z2-q96WkFoT6PiEdbrDA-e47LKtRmqsddnPZnp0xmMQdTr2MjpVgvqG7TlRvxDcYc-62rkwQXDNSWsW61FcKfQ-TRIZSf2GS9F9esDF4b5tRtrXcBNaorYa9ql0XAWH5W_ct4ylRNl3vwkYKWa4cmPvOqT5Wlj9Tf0af4lNO40PQ",
);

/// What to log in with.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    /// The built-in test token.
    #[default]
    BuiltinToken,

    /// Operator-supplied username and password.
    Login { uid: String, password: String },
}

impl Credentials {
    pub fn login(uid: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Login {
            uid: uid.into(),
            password: password.into(),
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            Self::BuiltinToken => json!({ "token": BUILTIN_TEST_TOKEN }),
            Self::Login { uid, password } => json!({ "uid": uid, "password": password }),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::BuiltinToken => "builtin_token",
            Self::Login { .. } => "login",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuiltinToken => f.write_str("BuiltinToken"),
            Self::Login { uid, .. } => f
                .debug_struct("Login")
                .field("uid", uid)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LoginResponse {
    token: String,
}

/// Log in and store the session on the cluster handle.
///
/// Does nothing when auth is disabled on the cluster.
pub async fn authenticate(cluster: &Cluster, credentials: &Credentials) -> Result<(), AuthError> {
    let handle = cluster.handle();
    if !handle.auth_enabled() {
        debug!("Auth disabled, skipping login");
        return Ok(());
    }
    if handle.is_authenticated() {
        return Err(AuthError::AlreadyAuthenticated);
    }

    info!(method = credentials.kind(), "Logging in");

    let request = ApiRequest::post(LOGIN_PATH)
        .without_auth()
        .json(&credentials.body())?;
    let response = cluster.send(request).await?;

    if response.status != 200 {
        return Err(AuthError::Rejected {
            status: response.status,
            body: response.text(),
        });
    }

    let body: LoginResponse = response
        .json()
        .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
    let cookie = response
        .cookie(AUTH_COOKIE)
        .ok_or(AuthError::MissingCookie(AUTH_COOKIE))?;

    handle
        .set_session(Session::new(body.token, cookie))
        .map_err(|_| AuthError::AlreadyAuthenticated)?;

    info!("Logged in");
    Ok(())
}
