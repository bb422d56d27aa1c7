use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::expiry_after;

/// A Synergia account linked to a portal login, as returned by
/// `SynergiaAccounts` and stored in the `user_dict` of a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynergiaAccount {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "studentName")]
    pub student_name: String,
    pub id: i64,
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountsResponse {
    pub accounts: Vec<SynergiaAccount>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRedirect {
    pub redirect: String,
}

/// Successful answer of the OAuth token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<i64>,
    /// The endpoint's full answer, kept for error reports.
    #[serde(skip)]
    pub raw: Value,
}

impl TokenGrant {
    /// Root token expiry counted from `now`. `None` when `expires_in` is
    /// absent or does not fit in a timestamp.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.and_then(|secs| expiry_after(now, secs))
    }
}
