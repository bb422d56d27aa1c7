//! The credential record: identity of one Synergia account plus the token
//! triple needed to keep talking to the portal and the Synergia API.

use std::fmt;

use chrono::{DateTime, Duration, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SynergiaAccount;
use crate::error::{AuthError, Result};

/// Number of characters kept at each end of a masked token
const MASK_KEEP_CHARS: usize = 6;

/// On-disk shape of a credential record.
///
/// `exp_in` holds the absolute expiry as epoch seconds despite its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub user_dict: SynergiaAccount,
    pub root_token: String,
    pub revalidation_token: String,
    pub exp_in: i64,
}

/// Identity and tokens for a single Synergia account.
///
/// `expires_at` tracks the root token, not the access token. Use
/// [`SessionManager::is_valid`](crate::auth::SessionManager::is_valid) to learn
/// whether the access token is still accepted.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    access_token: String,
    root_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
    login: String,
    uid: i64,
    first_name: String,
    last_name: String,
}

impl CredentialRecord {
    pub fn new(
        account: SynergiaAccount,
        root_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self> {
        let root_token = root_token.into();
        ensure_token("accessToken", &account.access_token)?;
        ensure_token("root_token", &root_token)?;

        let (first_name, last_name) = split_student_name(&account.student_name);
        Ok(Self {
            access_token: account.access_token,
            root_token,
            refresh_token: refresh_token.into(),
            expires_at,
            login: account.login,
            uid: account.id,
            first_name,
            last_name,
        })
    }

    /// Build a record from a freshly granted root token that lives `expires_in` seconds.
    pub fn issued_now(
        account: SynergiaAccount,
        root_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: i64,
    ) -> Result<Self> {
        let expires_at = expiry_after(Utc::now(), expires_in).ok_or_else(|| {
            AuthError::MalformedRecord(format!("expires_in out of range: {}", expires_in))
        })?;
        Self::new(account, root_token, refresh_token, expires_at)
    }

    pub fn from_persisted(persisted: PersistedRecord) -> Result<Self> {
        let expires_at = DateTime::from_timestamp(persisted.exp_in, 0).ok_or_else(|| {
            AuthError::MalformedRecord(format!("exp_in out of range: {}", persisted.exp_in))
        })?;
        Self::new(
            persisted.user_dict,
            persisted.root_token,
            persisted.revalidation_token,
            expires_at,
        )
    }

    pub fn to_persisted(&self) -> PersistedRecord {
        PersistedRecord {
            user_dict: SynergiaAccount {
                access_token: self.access_token.clone(),
                student_name: self.student_name(),
                id: self.uid,
                login: self.login.clone(),
            },
            root_token: self.root_token.clone(),
            revalidation_token: self.refresh_token.clone(),
            exp_in: self.expires_at.timestamp(),
        }
    }

    /// Validated constructor from a loosely-typed JSON mapping.
    pub fn from_json_value(value: Value) -> Result<Self> {
        let persisted: PersistedRecord =
            serde_json::from_value(value).map_err(|e| AuthError::MalformedRecord(e.to_string()))?;
        Self::from_persisted(persisted)
    }

    pub fn to_json_value(&self) -> Value {
        // PersistedRecord only holds strings and integers
        serde_json::to_value(self.to_persisted()).unwrap_or(Value::Null)
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn root_token(&self) -> &str {
        &self.root_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn uid(&self) -> i64 {
        self.uid
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn student_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }

    /// Whether the root token expiry lies before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Time left on the root token, clamped to zero.
    pub fn time_until_expiry(&self) -> Duration {
        (self.expires_at - Utc::now()).max(Duration::zero())
    }

    pub(crate) fn with_access_token(mut self, access_token: String) -> Result<Self> {
        ensure_token("accessToken", &access_token)?;
        self.access_token = access_token;
        Ok(self)
    }

    /// Swap in a new root/refresh token pair. The expiry only ever moves forward.
    pub(crate) fn with_root_tokens(
        mut self,
        root_token: String,
        refresh_token: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        ensure_token("root_token", &root_token)?;
        self.root_token = root_token;
        self.refresh_token = refresh_token;
        if let Some(expires_at) = expires_at {
            self.expires_at = self.expires_at.max(expires_at);
        }
        Ok(self)
    }
}

impl fmt::Display for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.student_name())
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("login", &self.login)
            .field("uid", &self.uid)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("access_token", &mask_token(&self.access_token))
            .field("root_token", &mask_token(&self.root_token))
            .field("refresh_token", &mask_token(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// `now + secs`, or `None` when the result does not fit in a timestamp.
pub(crate) fn expiry_after(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(secs).and_then(|delta| now.checked_add_signed(delta))
}

fn ensure_token(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(AuthError::MalformedRecord(format!("{} must not be empty", name)));
    }
    Ok(())
}

/// Split "First Last" on the first space.
fn split_student_name(name: &str) -> (String, String) {
    match name.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.to_string()),
        None => (name.to_string(), String::new()),
    }
}

/// Keep the first and last few characters of a token for logs.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= MASK_KEEP_CHARS * 2 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..MASK_KEEP_CHARS].iter().collect();
    let tail: String = chars[chars.len() - MASK_KEEP_CHARS..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account() -> SynergiaAccount {
        SynergiaAccount {
            access_token: "A1".to_string(),
            student_name: "Jan Maria Kowalski".to_string(),
            id: 7,
            login: "jkowalski".to_string(),
        }
    }

    #[test]
    fn test_student_name_split_on_first_space() {
        let record = CredentialRecord::issued_now(account(), "R1", "F1", 3600).unwrap();
        assert_eq!(record.first_name(), "Jan");
        assert_eq!(record.last_name(), "Maria Kowalski");
        assert_eq!(record.to_string(), "Jan Maria Kowalski");
    }

    #[test]
    fn test_single_word_name() {
        let mut acc = account();
        acc.student_name = "Jan".to_string();
        let record = CredentialRecord::issued_now(acc, "R1", "F1", 3600).unwrap();
        assert_eq!(record.first_name(), "Jan");
        assert_eq!(record.last_name(), "");
        assert_eq!(record.student_name(), "Jan");
    }

    #[test]
    fn test_empty_tokens_rejected() {
        let mut acc = account();
        acc.access_token = String::new();
        assert!(matches!(
            CredentialRecord::issued_now(acc, "R1", "F1", 3600),
            Err(AuthError::MalformedRecord(_))
        ));
        assert!(matches!(
            CredentialRecord::issued_now(account(), "", "F1", 3600),
            Err(AuthError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_issued_now_rejects_huge_lifetime() {
        assert!(matches!(
            CredentialRecord::issued_now(account(), "R1", "F1", i64::MAX),
            Err(AuthError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_from_persisted_rejects_out_of_range_expiry() {
        let mut persisted = CredentialRecord::issued_now(account(), "R1", "F1", 3600)
            .unwrap()
            .to_persisted();
        persisted.exp_in = i64::MAX;
        match CredentialRecord::from_persisted(persisted) {
            Err(AuthError::MalformedRecord(msg)) => assert!(msg.contains("exp_in")),
            other => panic!("expected MalformedRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_persisted_round_trip() {
        let record = CredentialRecord::issued_now(account(), "R1", "F1", 3600).unwrap();
        let restored = CredentialRecord::from_json_value(record.to_json_value()).unwrap();

        assert_eq!(restored.access_token(), record.access_token());
        assert_eq!(restored.root_token(), record.root_token());
        assert_eq!(restored.refresh_token(), record.refresh_token());
        assert_eq!(restored.login(), record.login());
        assert_eq!(restored.uid(), record.uid());
        assert_eq!(restored.first_name(), record.first_name());
        assert_eq!(restored.last_name(), record.last_name());
        assert_eq!(restored.expires_at().timestamp(), record.expires_at().timestamp());
    }

    #[test]
    fn test_persisted_shape() {
        let expires_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let record = CredentialRecord::new(account(), "R1", "F1", expires_at).unwrap();
        assert_eq!(
            record.to_json_value(),
            json!({
                "user_dict": {
                    "accessToken": "A1",
                    "studentName": "Jan Maria Kowalski",
                    "id": 7,
                    "login": "jkowalski"
                },
                "root_token": "R1",
                "revalidation_token": "F1",
                "exp_in": 1_700_000_000
            })
        );
    }

    #[test]
    fn test_missing_key_is_malformed() {
        let value = json!({
            "user_dict": {"accessToken": "A1", "studentName": "Jan Kowalski", "id": 7, "login": "j"},
            "revalidation_token": "F1",
            "exp_in": 1_700_000_000
        });
        match CredentialRecord::from_json_value(value) {
            Err(AuthError::MalformedRecord(msg)) => assert!(msg.contains("root_token")),
            other => panic!("expected MalformedRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_expiry_only_moves_forward() {
        let expires_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let record = CredentialRecord::new(account(), "R1", "F1", expires_at).unwrap();

        let earlier = expires_at - Duration::hours(1);
        let kept = record
            .clone()
            .with_root_tokens("R2".into(), "F2".into(), Some(earlier))
            .unwrap();
        assert_eq!(kept.expires_at(), expires_at);
        assert_eq!(kept.root_token(), "R2");

        let later = expires_at + Duration::hours(1);
        let moved = record.with_root_tokens("R3".into(), "F3".into(), Some(later)).unwrap();
        assert_eq!(moved.expires_at(), later);
    }

    #[test]
    fn test_is_expired_at() {
        let expires_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let record = CredentialRecord::new(account(), "R1", "F1", expires_at).unwrap();
        assert!(!record.is_expired_at(expires_at));
        assert!(record.is_expired_at(expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_debug_masks_tokens() {
        let mut acc = account();
        acc.access_token = "abcdef0123456789uvwxyz".to_string();
        let record = CredentialRecord::issued_now(acc, "R1", "F1", 3600).unwrap();
        let debug = format!("{:?}", record);
        assert!(debug.contains("abcdef...uvwxyz"));
        assert!(!debug.contains("abcdef0123456789uvwxyz"));
        assert_eq!(mask_token("short"), "*****");
    }
}
