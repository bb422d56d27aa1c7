use anyhow::{Context, Result};
use keyring::Entry;

/// Default keychain service name
const SERVICE_NAME: &str = "librus-auth";

/// Portal passwords kept in the OS keychain, one entry per e-mail.
///
/// Used to log in again from scratch when the refresh token itself has
/// been revoked.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    service: String,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::with_service(SERVICE_NAME)
    }
}

impl CredentialStore {
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, email: &str) -> Result<Entry> {
        Entry::new(&self.service, &normalize_email(email))
            .with_context(|| format!("Failed to create keyring entry for {}", email))
    }

    pub fn store(&self, email: &str, password: &str) -> Result<()> {
        self.entry(email)?
            .set_password(password)
            .context("Failed to store portal password in keychain")
    }

    pub fn get_password(&self, email: &str) -> Result<String> {
        self.entry(email)?
            .get_password()
            .context("Failed to retrieve portal password from keychain")
    }

    pub fn delete(&self, email: &str) -> Result<()> {
        self.entry(email)?
            .delete_credential()
            .context("Failed to delete portal password from keychain")
    }

    pub fn has_credentials(&self, email: &str) -> bool {
        self.entry(email)
            .map(|entry| entry.get_password().is_ok())
            .unwrap_or(false)
    }
}

/// The portal treats e-mails case-insensitively; so does the keychain key.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
