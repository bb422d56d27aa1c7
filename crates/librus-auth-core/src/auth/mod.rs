//! Authentication module for Librus portal logins and token upkeep.
//!
//! This module provides:
//! - `Authenticator`: the one-shot login producing a record per Synergia account
//! - `SessionManager`: root/access token refresh and expiry checks
//! - `SharedCredential`: a record shared between tasks, refreshed under one lock
//! - `RecordStore`: credential records persisted as JSON files
//! - `CredentialStore`: portal passwords in the OS keychain
//!
//! Root tokens are refreshed with the refresh token; access tokens are minted
//! from the root token and retried once after a root refresh.

pub mod authenticator;
pub mod credentials;
pub mod session;
pub mod store;

pub use authenticator::{authenticate, Authenticator};
pub use credentials::CredentialStore;
pub use session::{ExpiryCheck, ExpiryStatus, SessionManager, SharedCredential};
pub use store::RecordStore;
