//! Librus portal authentication.
//!
//! Logs in to the Librus portal with e-mail and password, returns a
//! [`CredentialRecord`] per linked Synergia account and keeps those records
//! usable: refreshing the root token with the refresh token, minting new
//! access tokens and checking whether either is still accepted.
//!
//! ```no_run
//! use librus_auth_core::{Authenticator, ExpiryCheck, PortalConfig, SessionManager};
//!
//! # async fn example() -> librus_auth_core::Result<()> {
//! let records = Authenticator::new(PortalConfig::default())?
//!     .authenticate("parent@example.com", "secret")
//!     .await?;
//!
//! let sessions = SessionManager::new(PortalConfig::default())?;
//! for record in &records {
//!     let status = sessions.check_expired(record, ExpiryCheck::default()).await?;
//!     if status.query == Some(false) {
//!         let _fresh = sessions.revalidate_access(record).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;

pub use auth::{
    authenticate, Authenticator, CredentialStore, ExpiryCheck, ExpiryStatus, RecordStore,
    SessionManager, SharedCredential,
};
pub use config::{PortalConfig, UserAgent};
pub use error::{AuthError, Result};
pub use models::{CredentialRecord, PersistedRecord, SynergiaAccount};
