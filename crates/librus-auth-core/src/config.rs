//! Portal endpoint configuration.
//!
//! Every URL, the OAuth client id and the headers the mobile app sends are
//! collected in [`PortalConfig`] so that tests and alternative deployments can
//! point the client somewhere else. `PortalConfig::default()` targets the
//! production Librus portal.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Base URL of the Librus portal (login form, OAuth, account management)
const PORTAL_BASE_URL: &str = "https://portal.librus.pl";

/// Base URL of the Synergia API the access tokens are meant for
const API_BASE_URL: &str = "https://api.librus.pl";

/// OAuth client id of the official mobile application
const CLIENT_ID: &str = "0RbsDOkV9tyKEQYzlLv5hs3DM1ukrynFI4p6C1Yc";

/// Redirect URI registered for the mobile application
const REDIRECT_URI: &str = "app://librus";

/// Value of the `X-Requested-With` header the mobile app sends
const REQUESTED_WITH: &str = "pl.librus.synergiaDru2";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const XIAOMI_USER_AGENT: &str =
    "Dalvik/2.1.0 (Linux; U; Android 10; Mi 9T Build/QQ3A.200905.001)LibrusMobileApp";
const GOOGLEBOT_USER_AGENT: &str = "Googlebot/2.1 (+http://www.google.com/bot.html)LibrusMobileApp";

/// User-Agent presented to the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserAgent {
    /// Android build of the mobile app
    #[default]
    Xiaomi,
    Googlebot,
    Custom(String),
}

impl UserAgent {
    pub fn as_str(&self) -> &str {
        match self {
            UserAgent::Xiaomi => XIAOMI_USER_AGENT,
            UserAgent::Googlebot => GOOGLEBOT_USER_AGENT,
            UserAgent::Custom(value) => value,
        }
    }

    /// Parse a preset name, treating anything unknown as a literal user agent.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "xiaomi" => UserAgent::Xiaomi,
            "googlebot" => UserAgent::Googlebot,
            _ => UserAgent::Custom(name.to_string()),
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub portal_base_url: String,
    pub api_base_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub user_agent: UserAgent,
    pub requested_with: String,
    pub request_timeout: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self::with_base_urls(PORTAL_BASE_URL, API_BASE_URL)
    }
}

impl PortalConfig {
    /// Production client id and headers against custom hosts.
    pub fn with_base_urls(portal_base_url: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        Self {
            portal_base_url: portal_base_url.into().trim_end_matches('/').to_string(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            client_id: CLIENT_ID.to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
            user_agent: UserAgent::default(),
            requested_with: REQUESTED_WITH.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_user_agent(mut self, user_agent: UserAgent) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn authorize_url(&self) -> String {
        format!(
            "{}/oauth2/authorize?client_id={}&redirect_uri={}&response_type=code",
            self.portal_base_url, self.client_id, self.redirect_uri
        )
    }

    pub fn login_url(&self) -> String {
        format!("{}/rodzina/login/action", self.portal_base_url)
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth2/access_token", self.portal_base_url)
    }

    pub fn accounts_url(&self) -> String {
        format!("{}/api/v2/SynergiaAccounts", self.portal_base_url)
    }

    pub fn fresh_token_url(&self, login: &str) -> String {
        format!("{}/api/v2/SynergiaAccounts/fresh/{}", self.portal_base_url, login)
    }

    pub fn me_url(&self) -> String {
        format!("{}/2.0/Me", self.api_base_url)
    }
}
