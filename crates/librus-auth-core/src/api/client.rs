//! Typed calls against the Librus portal and the Synergia API.
//!
//! Each method is one HTTP round trip. The multi-step flows built on top of
//! them live in [`crate::auth`].

use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::config::PortalConfig;
use crate::error::{AuthError, Result};
use crate::models::{AccountsResponse, LoginRedirect, SynergiaAccount, TokenGrant};

use super::csrf::extract_csrf_token;
use super::transport::{HttpTransport, PortalRequest, PortalResponse, Transport, CSRF_HEADER};

/// Error entry the login endpoint reports when a reCAPTCHA is required
const CAPTCHA_ERROR_KEY: &str = "g-recaptcha-response";

/// Error code the fresh-token endpoint returns for a stale root token
const ACCESS_DENIED: &str = "access_denied";

/// Outcome of asking the portal for a fresh Synergia access token.
#[derive(Debug, Clone, PartialEq)]
pub enum FreshToken {
    Issued(String),
    /// The root token was rejected.
    AccessDenied(Value),
    /// Anything else; carries the raw payload.
    Invalid(Value),
}

pub struct PortalClient<T = HttpTransport> {
    config: PortalConfig,
    transport: T,
}

impl PortalClient<HttpTransport> {
    /// Client backed by reqwest with a fresh cookie jar.
    pub fn new(config: PortalConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self { config, transport })
    }
}

impl<T: Transport> PortalClient<T> {
    pub fn with_transport(config: PortalConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Load the authorize page and pull the CSRF token out of it.
    pub async fn fetch_csrf_token(&self) -> Result<String> {
        let url = self.config.authorize_url();
        let response = self.transport.send(PortalRequest::get(url)).await?;
        debug!(status = response.status, "Authorize page response");

        if !response.is_success() {
            return Err(AuthError::from_status(response.status, &response.body));
        }
        extract_csrf_token(&response.body).ok_or(AuthError::MissingCsrfToken)
    }

    /// Submit the login form. Returns the redirect URL carrying the OAuth code.
    pub async fn submit_login(&self, email: &str, password: &str, csrf_token: &str) -> Result<String> {
        let request = PortalRequest::post(self.config.login_url())
            .header(CSRF_HEADER, csrf_token)
            .json(json!({ "email": email, "password": password }));
        let response = self.transport.send(request).await?;
        debug!(status = response.status, "Login response");

        match response.status {
            200 => {
                let redirect: LoginRedirect = response
                    .json()
                    .map_err(|_| AuthError::LoginFailed(AuthError::truncate_body(&response.body)))?;
                Ok(redirect.redirect)
            }
            403 => {
                let payload = response.json_value();
                if requires_captcha(&payload) {
                    Err(AuthError::CaptchaRequired(payload))
                } else {
                    Err(AuthError::InvalidCredentials(payload))
                }
            }
            _ => Err(AuthError::LoginFailed(response.body)),
        }
    }

    /// Follow the login redirect by hand and read the code off `Location`.
    pub async fn fetch_authorization_code(&self, redirect_url: &str) -> Result<String> {
        let response = self
            .transport
            .send(PortalRequest::get(redirect_url).no_redirects())
            .await?;
        debug!(status = response.status, "Redirect response");

        let location = response.header("location").ok_or_else(|| {
            AuthError::InvalidResponse(format!(
                "Redirect answered {} without a Location header",
                response.status
            ))
        })?;
        extract_authorization_code(location, &self.config.redirect_uri)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let request = PortalRequest::post(self.config.token_url()).form(&[
            ("client_id", self.config.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ]);
        let response = self.transport.send(request).await?;
        debug!(status = response.status, "Authorization code exchange response");

        parse_token_grant(&response).ok_or_else(|| AuthError::auth("Invalid token response", response.json_value()))
    }

    /// Trade the refresh token for a new root token.
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant> {
        let request = PortalRequest::post(self.config.token_url()).form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ]);
        let response = self.transport.send(request).await?;
        debug!(status = response.status, "Refresh token response");

        parse_token_grant(&response).ok_or_else(|| AuthError::auth("Invalid payload received", response.json_value()))
    }

    /// List the Synergia accounts linked to the portal login.
    pub async fn fetch_accounts(&self, root_token: &str) -> Result<Vec<SynergiaAccount>> {
        let request = PortalRequest::get(self.config.accounts_url()).bearer(root_token);
        let response = self.transport.send(request).await?;
        debug!(status = response.status, "Accounts response");

        if !response.is_success() {
            return Err(AuthError::from_status(response.status, &response.body));
        }
        let parsed: AccountsResponse = response
            .json()
            .map_err(|_| AuthError::auth("Invalid accounts response", response.json_value()))?;
        Ok(parsed.accounts)
    }

    pub async fn fetch_fresh_token(&self, root_token: &str, login: &str) -> Result<FreshToken> {
        let request = PortalRequest::get(self.config.fresh_token_url(login)).bearer(root_token);
        let response = self.transport.send(request).await?;
        debug!(status = response.status, login = login, "Fresh token response");

        let payload = response.json_value();
        if payload.get("error").and_then(Value::as_str) == Some(ACCESS_DENIED) {
            return Ok(FreshToken::AccessDenied(payload));
        }
        match payload.get("accessToken").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => Ok(FreshToken::Issued(token.to_string())),
            _ => Ok(FreshToken::Invalid(payload)),
        }
    }

    /// Ask `/Me` whether the access token is still accepted. Only 401 means no.
    pub async fn probe_access_token(&self, access_token: &str) -> Result<bool> {
        let request = PortalRequest::get(self.config.me_url()).bearer(access_token);
        let response = self.transport.send(request).await?;
        debug!(status = response.status, "Me response");

        Ok(response.status != 401)
    }
}

/// Whether a 403 login payload lists the reCAPTCHA field among its errors.
fn requires_captcha(payload: &Value) -> bool {
    match payload.get("errors") {
        Some(Value::Array(errors)) => errors.iter().any(|e| match e {
            Value::String(s) => s == CAPTCHA_ERROR_KEY,
            Value::Object(map) => map.contains_key(CAPTCHA_ERROR_KEY),
            _ => false,
        }),
        Some(Value::Object(errors)) => errors.contains_key(CAPTCHA_ERROR_KEY),
        _ => false,
    }
}

fn extract_authorization_code(location: &str, redirect_uri: &str) -> Result<String> {
    let invalid = || AuthError::InvalidResponse(format!("No authorization code in redirect: {}", location));

    if !location.starts_with(redirect_uri) {
        return Err(invalid());
    }
    let url = Url::parse(location).map_err(|_| invalid())?;
    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
        .ok_or_else(invalid)
}

fn parse_token_grant(response: &PortalResponse) -> Option<TokenGrant> {
    let mut grant: TokenGrant = response.json().ok()?;
    if grant.access_token.is_empty() {
        return None;
    }
    grant.raw = response.json_value();
    Some(grant)
}
