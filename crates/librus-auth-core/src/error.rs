use serde_json::Value;
use thiserror::Error;

/// Result alias used throughout the portal client and session code.
pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
    /// The portal put a reCAPTCHA in front of the login form. Not automatable.
    #[error("Captcha required to log in: {0}")]
    CaptchaRequired(Value),

    #[error("Invalid e-mail or password: {0}")]
    InvalidCredentials(Value),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// Token endpoint answered without the fields we need.
    #[error("{message}: {payload}")]
    Auth { message: String, payload: Value },

    #[error("Malformed credential record: {0}")]
    MalformedRecord(String),

    #[error("Login page did not contain a CSRF token")]
    MissingCsrfToken,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl AuthError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        AuthError::UnexpectedStatus {
            status,
            body: Self::truncate_body(body),
        }
    }

    pub(crate) fn auth(message: impl Into<String>, payload: Value) -> Self {
        AuthError::Auth {
            message: message.into(),
            payload,
        }
    }

    /// Raw server payload carried by the error, if any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            AuthError::CaptchaRequired(payload)
            | AuthError::InvalidCredentials(payload)
            | AuthError::Auth { payload, .. } => Some(payload),
            _ => None,
        }
    }
}
