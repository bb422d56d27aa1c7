//! HTTP transport seam.
//!
//! The portal client speaks in terms of [`PortalRequest`] / [`PortalResponse`]
//! and never touches reqwest directly, so the login flow and the refresh
//! cascade can be driven by a scripted transport in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{header, redirect, Client};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::PortalConfig;
use crate::error::{AuthError, Result};

/// Header carrying the CSRF token on the login form submission
pub const CSRF_HEADER: &str = "X-CSRF-TOKEN";

/// Header the mobile app uses to identify itself
const REQUESTED_WITH_HEADER: &str = "X-Requested-With";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortalRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: RequestBody,
    pub follow_redirects: bool,
}

impl PortalRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            bearer: None,
            body: RequestBody::Empty,
            follow_redirects: true,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        self.body = RequestBody::Form(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn no_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortalResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl PortalResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Body as loose JSON; non-JSON bodies come back as a JSON string.
    pub fn json_value(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: PortalRequest) -> Result<PortalResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: PortalRequest) -> Result<PortalResponse> {
        (**self).send(request).await
    }
}

/// reqwest-backed transport sharing one cookie jar across requests, which
/// the login form relies on to tie the CSRF token to the session.
/// Clone is cheap - both clients and the jar are reference counted.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    no_redirect_client: Client,
}

impl HttpTransport {
    pub fn new(config: &PortalConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(config.user_agent.as_str())
                .map_err(|e| AuthError::Config(format!("Invalid user agent: {}", e)))?,
        );
        default_headers.insert(
            REQUESTED_WITH_HEADER,
            header::HeaderValue::from_str(&config.requested_with)
                .map_err(|e| AuthError::Config(format!("Invalid X-Requested-With value: {}", e)))?,
        );

        let builder = || {
            Client::builder()
                .timeout(config.request_timeout)
                .default_headers(default_headers.clone())
                .cookie_provider(jar.clone())
        };

        Ok(Self {
            client: builder().build()?,
            no_redirect_client: builder().redirect(redirect::Policy::none()).build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: PortalRequest) -> Result<PortalResponse> {
        let client = if request.follow_redirects {
            &self.client
        } else {
            &self.no_redirect_client
        };

        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(ref body) => builder.json(body),
            RequestBody::Form(ref pairs) => builder.form(pairs),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(PortalResponse { status, headers, body })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport used by the authenticator and session tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays canned responses in order and records every request it saw.
    #[derive(Default)]
    pub struct ScriptedTransport {
        responses: Mutex<VecDeque<PortalResponse>>,
        requests: Mutex<Vec<PortalRequest>>,
    }

    impl ScriptedTransport {
        pub fn new(responses: Vec<PortalResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<PortalRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn requests_to(&self, url: &str) -> usize {
            self.requests().iter().filter(|r| r.url == url).count()
        }

        pub fn remaining(&self) -> usize {
            self.responses.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: PortalRequest) -> Result<PortalResponse> {
            let url = request.url.clone();
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AuthError::InvalidResponse(format!("no scripted response for {}", url)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserAgent;
    use serde_json::json;

    #[test]
    fn test_http_transport_rejects_bad_header_values() {
        let config = PortalConfig::default().with_user_agent(UserAgent::Custom("bad\nagent".to_string()));
        assert!(matches!(HttpTransport::new(&config), Err(AuthError::Config(_))));

        let config = PortalConfig {
            requested_with: "pl.librus\r\nX-Injected: 1".to_string(),
            ..PortalConfig::default()
        };
        assert!(matches!(HttpTransport::new(&config), Err(AuthError::Config(_))));

        assert!(HttpTransport::new(&PortalConfig::default()).is_ok());
    }

    #[test]
    fn test_request_builders() {
        let request = PortalRequest::post("https://example.test/token")
            .bearer("R1")
            .form(&[("grant_type", "refresh_token")])
            .no_redirects();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.bearer.as_deref(), Some("R1"));
        assert!(!request.follow_redirects);
        assert_eq!(
            request.body,
            RequestBody::Form(vec![("grant_type".into(), "refresh_token".into())])
        );
    }

    #[test]
    fn test_response_header_lookup_is_case_insensitive() {
        let response = PortalResponse::new(302, "").with_header("Location", "app://librus?code=X");
        assert_eq!(response.header("location"), Some("app://librus?code=X"));
        assert_eq!(response.header("LOCATION"), Some("app://librus?code=X"));
    }

    #[test]
    fn test_json_value_falls_back_to_string() {
        assert_eq!(PortalResponse::new(200, r#"{"a":1}"#).json_value(), json!({"a": 1}));
        assert_eq!(
            PortalResponse::new(500, "Internal Server Error").json_value(),
            json!("Internal Server Error")
        );
    }

    #[test]
    fn test_http_transport_builds_with_defaults() {
        assert!(HttpTransport::new(&PortalConfig::default()).is_ok());
    }
}
