use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::api::{FreshToken, HttpTransport, PortalClient, Transport};
use crate::config::PortalConfig;
use crate::error::{AuthError, Result};
use crate::models::CredentialRecord;

/// Which expiry checks [`SessionManager::check_expired`] should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryCheck {
    /// Compare the clock against the root token expiry
    pub clock: bool,
    /// Ask `/Me` whether the access token is still accepted
    pub query: bool,
}

impl ExpiryCheck {
    pub const BOTH: Self = Self { clock: true, query: true };
    pub const CLOCK_ONLY: Self = Self { clock: true, query: false };
    pub const QUERY_ONLY: Self = Self { clock: false, query: true };
}

impl Default for ExpiryCheck {
    fn default() -> Self {
        Self::BOTH
    }
}

/// Results of [`SessionManager::check_expired`]. `true` means still valid,
/// `None` means the check was not requested.
///
/// `clock` reflects the root token, `query` the access token. They answer
/// different questions and can disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpiryStatus {
    pub clock: Option<bool>,
    pub query: Option<bool>,
}

/// Keeps credential records alive: refreshes the root token, mints new
/// access tokens and checks whether either is still usable.
///
/// Every operation takes a record and returns an updated copy; the input is
/// never mutated. Use [`SharedCredential`] when several tasks hold the same
/// record.
pub struct SessionManager<T = HttpTransport> {
    client: PortalClient<T>,
}

impl SessionManager<HttpTransport> {
    pub fn new(config: PortalConfig) -> Result<Self> {
        Ok(Self {
            client: PortalClient::new(config)?,
        })
    }
}

impl<T: Transport> SessionManager<T> {
    pub fn with_client(client: PortalClient<T>) -> Self {
        Self { client }
    }

    /// Exchange the refresh token for a new root/refresh token pair.
    pub async fn revalidate_root(&self, record: &CredentialRecord) -> Result<CredentialRecord> {
        let grant = self.client.refresh_grant(record.refresh_token()).await?;
        let expires_at = match grant.expires_in {
            None => None,
            Some(_) => Some(
                grant
                    .expires_at(Utc::now())
                    .ok_or_else(|| AuthError::auth("Invalid payload received", grant.raw.clone()))?,
            ),
        };

        debug!(login = record.login(), "Root token refreshed");
        record
            .clone()
            .with_root_tokens(grant.access_token, grant.refresh_token, expires_at)
    }

    /// Fetch a new Synergia access token.
    ///
    /// A denied request means the root token went stale: the root token is
    /// refreshed once and the request retried once. A second denial is an error.
    pub async fn revalidate_access(&self, record: &CredentialRecord) -> Result<CredentialRecord> {
        let mut current = record.clone();
        let mut outcome = self
            .client
            .fetch_fresh_token(current.root_token(), current.login())
            .await?;

        if let FreshToken::AccessDenied(_) = outcome {
            info!(login = current.login(), "Obtaining new access token failed, refreshing root token");
            current = self.revalidate_root(&current).await?;
            outcome = self
                .client
                .fetch_fresh_token(current.root_token(), current.login())
                .await?;
        }

        match outcome {
            FreshToken::Issued(access_token) => current.with_access_token(access_token),
            FreshToken::AccessDenied(payload) | FreshToken::Invalid(payload) => {
                Err(AuthError::auth("Invalid response received", payload))
            }
        }
    }

    pub async fn check_expired(&self, record: &CredentialRecord, check: ExpiryCheck) -> Result<ExpiryStatus> {
        let clock = check.clock.then(|| !record.is_expired_at(Utc::now()));
        let query = if check.query {
            Some(self.client.probe_access_token(record.access_token()).await?)
        } else {
            None
        };
        Ok(ExpiryStatus { clock, query })
    }

    /// Whether the access token is still accepted. Ignores the clock.
    pub async fn is_valid(&self, record: &CredentialRecord) -> Result<bool> {
        let status = self.check_expired(record, ExpiryCheck::QUERY_ONLY).await?;
        Ok(status.query.unwrap_or(false))
    }

    /// Return the record untouched if its access token works, otherwise
    /// run [`revalidate_access`](Self::revalidate_access).
    pub async fn ensure_fresh(&self, record: &CredentialRecord) -> Result<CredentialRecord> {
        if self.is_valid(record).await? {
            return Ok(record.clone());
        }
        debug!(login = record.login(), "Access token rejected, revalidating");
        self.revalidate_access(record).await
    }
}

/// A credential record shared between tasks.
///
/// The lock is held for the whole refresh cascade, so readers never observe
/// a fresh access token paired with a stale root token.
/// Clone is cheap - clones share the same record.
#[derive(Clone)]
pub struct SharedCredential {
    inner: Arc<Mutex<CredentialRecord>>,
}

impl SharedCredential {
    pub fn new(record: CredentialRecord) -> Self {
        Self {
            inner: Arc::new(Mutex::new(record)),
        }
    }

    pub async fn snapshot(&self) -> CredentialRecord {
        self.inner.lock().await.clone()
    }

    pub async fn access_token(&self) -> String {
        self.inner.lock().await.access_token().to_string()
    }

    pub async fn revalidate_root<T: Transport>(&self, manager: &SessionManager<T>) -> Result<CredentialRecord> {
        let mut guard = self.inner.lock().await;
        let updated = manager.revalidate_root(&guard).await?;
        *guard = updated.clone();
        Ok(updated)
    }

    pub async fn revalidate_access<T: Transport>(&self, manager: &SessionManager<T>) -> Result<CredentialRecord> {
        let mut guard = self.inner.lock().await;
        let updated = manager.revalidate_access(&guard).await?;
        *guard = updated.clone();
        Ok(updated)
    }

    pub async fn ensure_fresh<T: Transport>(&self, manager: &SessionManager<T>) -> Result<CredentialRecord> {
        let mut guard = self.inner.lock().await;
        let updated = manager.ensure_fresh(&guard).await?;
        *guard = updated.clone();
        Ok(updated)
    }
}
