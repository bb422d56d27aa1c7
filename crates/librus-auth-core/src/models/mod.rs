mod account;
mod record;

pub use account::{SynergiaAccount, TokenGrant};
pub(crate) use account::{AccountsResponse, LoginRedirect};
pub use record::{mask_token, CredentialRecord, PersistedRecord};
