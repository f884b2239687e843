//! Authenticated access to the cluster through Admin Router.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, COOKIE};
use reqwest::Method;
use serde::Serialize;

use crate::auth::AUTH_COOKIE;
use crate::error::HttpError;
use crate::handle::ClusterHandle;
use crate::http::{HttpRequest, HttpResponse, HttpTransport};

/// Where a request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// Path below the cluster entry point.
    Cluster(String),
    /// Path below a node's own Admin Router.
    Node { node: String, path: String },
    /// A complete URL outside Admin Router.
    Absolute(String),
}

/// A request before it is bound to a cluster.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    target: Target,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    json: Option<serde_json::Value>,
    authenticated: bool,
}

impl ApiRequest {
    fn new(method: Method, target: Target) -> Self {
        Self {
            method,
            target,
            query: Vec::new(),
            headers: Vec::new(),
            json: None,
            authenticated: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, Target::Cluster(path.into()))
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, Target::Cluster(path.into()))
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, Target::Cluster(path.into()))
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::HEAD, Target::Cluster(path.into()))
    }

    /// GET against a node's Admin Router rather than the entry point.
    pub fn node_get(node: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(
            Method::GET,
            Target::Node {
                node: node.into(),
                path: path.into(),
            },
        )
    }

    /// Request to an arbitrary URL. Never carries the cluster credential.
    pub fn absolute(method: Method, url: impl Into<String>) -> Self {
        let mut request = Self::new(method, Target::Absolute(url.into()));
        request.authenticated = false;
        request
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, HttpError> {
        let value = serde_json::to_value(body).map_err(|e| HttpError::Encode(e.to_string()))?;
        self.json = Some(value);
        Ok(self)
    }

    /// Do not attach the session credential.
    #[must_use]
    pub fn without_auth(mut self) -> Self {
        self.authenticated = false;
        self
    }

    fn resolve(self, handle: &ClusterHandle) -> Result<HttpRequest, HttpError> {
        let url = match &self.target {
            Target::Cluster(path) => format!("{}{}", handle.base_uri(), path),
            Target::Node { node, path } => {
                let base = handle
                    .node_base_url(node)
                    .ok_or_else(|| HttpError::UnknownNode(node.clone()))?;
                format!("{base}{path}")
            }
            Target::Absolute(url) => url.clone(),
        };

        let mut request = HttpRequest::new(self.method, url);
        request.query = self.query;
        request.headers = self.headers;
        request.json = self.json;

        if self.authenticated && handle.auth_enabled() && !request.has_header(AUTHORIZATION.as_str())
        {
            if let Some(session) = handle.session() {
                request
                    .headers
                    .push((AUTHORIZATION.to_string(), session.authorization()));
                request.headers.push((
                    COOKIE.to_string(),
                    format!("{AUTH_COOKIE}={}", session.cookie()),
                ));
            }
        }

        Ok(request)
    }
}

/// A cluster handle bound to a transport.
#[derive(Clone)]
pub struct Cluster {
    handle: Arc<ClusterHandle>,
    transport: Arc<dyn HttpTransport>,
}

impl Cluster {
    pub fn new(handle: ClusterHandle, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            handle: Arc::new(handle),
            transport,
        }
    }

    pub fn handle(&self) -> &ClusterHandle {
        &self.handle
    }

    /// Send a request. Only transport failures are errors; the caller
    /// decides what a status means.
    pub async fn send(&self, request: ApiRequest) -> Result<HttpResponse, HttpError> {
        let request = request.resolve(&self.handle)?;
        self.transport.execute(request).await
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse, HttpError> {
        self.send(ApiRequest::get(path)).await
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{ClusterSpec, Provider, Session};

    fn handle(auth_enabled: bool) -> ClusterHandle {
        ClusterHandle::new(ClusterSpec {
            base_uri: "https://dcos.example.com".to_string(),
            masters: vec!["10.0.0.1".to_string()],
            public_masters: vec!["54.0.0.1".to_string()],
            private_agents: vec!["10.0.1.1".to_string()],
            public_agents: vec![],
            provider: Provider::Onprem,
            dns_search: false,
            auth_enabled,
        })
        .unwrap()
    }

    fn auth_header(request: &HttpRequest) -> Option<&str> {
        request
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_cluster_path_joined_to_base() {
        let request = ApiRequest::get("/marathon/v2/apps")
            .query("embed", "apps.counts")
            .resolve(&handle(true))
            .unwrap();
        assert_eq!(request.url, "https://dcos.example.com/marathon/v2/apps");
        assert_eq!(
            request.query,
            vec![("embed".to_string(), "apps.counts".to_string())]
        );
    }

    #[test]
    fn test_node_target_uses_agent_port() {
        let request = ApiRequest::node_get("10.0.1.1", "/system/health/v1")
            .resolve(&handle(true))
            .unwrap();
        assert_eq!(request.url, "https://10.0.1.1:61002/system/health/v1");
    }

    #[test]
    fn test_unknown_node_rejected() {
        let err = ApiRequest::node_get("192.168.1.1", "/")
            .resolve(&handle(true))
            .unwrap_err();
        assert_eq!(err, HttpError::UnknownNode("192.168.1.1".to_string()));
    }

    #[test]
    fn test_no_auth_header_before_login() {
        let request = ApiRequest::get("/").resolve(&handle(true)).unwrap();
        assert!(auth_header(&request).is_none());
    }

    #[test]
    fn test_auth_header_after_login() {
        let handle = handle(true);
        handle.set_session(Session::new("tok", "cookie")).unwrap();
        let request = ApiRequest::get("/").resolve(&handle).unwrap();
        assert_eq!(auth_header(&request), Some("token=tok"));
    }

    #[test]
    fn test_session_cookie_sent_with_token() {
        let handle = handle(true);
        handle.set_session(Session::new("tok", "c00kie")).unwrap();
        let request = ApiRequest::get("/").resolve(&handle).unwrap();
        let cookie = request
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .map(|(_, v)| v.as_str());
        assert_eq!(cookie, Some("dcos-acs-auth-cookie=c00kie"));
    }

    #[test]
    fn test_auth_disabled_never_sends_header() {
        let handle = handle(false);
        handle.set_session(Session::new("tok", "cookie")).unwrap();
        let request = ApiRequest::get("/").resolve(&handle).unwrap();
        assert!(auth_header(&request).is_none());
    }

    #[test]
    fn test_caller_header_wins() {
        let handle = handle(true);
        handle.set_session(Session::new("tok", "cookie")).unwrap();
        let request = ApiRequest::get("/")
            .header("Authorization", "token=other")
            .resolve(&handle)
            .unwrap();
        assert_eq!(auth_header(&request), Some("token=other"));
        assert_eq!(request.headers.len(), 1);
    }

    #[test]
    fn test_absolute_and_without_auth_skip_credential() {
        let handle = handle(true);
        handle.set_session(Session::new("tok", "cookie")).unwrap();

        let absolute = ApiRequest::absolute(Method::GET, "http://10.0.1.1:8080/test_uuid")
            .resolve(&handle)
            .unwrap();
        assert_eq!(absolute.url, "http://10.0.1.1:8080/test_uuid");
        assert!(auth_header(&absolute).is_none());

        let anonymous = ApiRequest::get("/").without_auth().resolve(&handle).unwrap();
        assert!(auth_header(&anonymous).is_none());
    }
}
