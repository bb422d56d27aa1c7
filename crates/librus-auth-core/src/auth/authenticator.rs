use chrono::Utc;
use tracing::{debug, info};

use crate::api::{HttpTransport, PortalClient, Transport};
use crate::config::{PortalConfig, UserAgent};
use crate::error::{AuthError, Result};
use crate::models::CredentialRecord;

/// Runs the one-shot portal login and returns a record per linked account.
pub struct Authenticator<T = HttpTransport> {
    client: PortalClient<T>,
}

impl Authenticator<HttpTransport> {
    /// Authenticator with its own cookie session.
    pub fn new(config: PortalConfig) -> Result<Self> {
        Ok(Self {
            client: PortalClient::new(config)?,
        })
    }
}

impl<T: Transport> Authenticator<T> {
    pub fn with_client(client: PortalClient<T>) -> Self {
        Self { client }
    }

    /// Log in with portal credentials.
    ///
    /// Either every linked Synergia account comes back as a record or the
    /// whole call fails; nothing is retried.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Vec<CredentialRecord>> {
        debug!(user_agent = %self.client.config().user_agent, "Starting portal login");

        let csrf_token = self.client.fetch_csrf_token().await?;
        let redirect = self.client.submit_login(email, password, &csrf_token).await?;
        let code = self.client.fetch_authorization_code(&redirect).await?;

        let grant = self.client.exchange_code(&code).await?;
        let expires_at = grant
            .expires_at(Utc::now())
            .ok_or_else(|| AuthError::auth("Invalid token response", grant.raw.clone()))?;

        let accounts = self.client.fetch_accounts(&grant.access_token).await?;
        let records = accounts
            .into_iter()
            .map(|account| {
                CredentialRecord::new(
                    account,
                    grant.access_token.clone(),
                    grant.refresh_token.clone(),
                    expires_at,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        info!(accounts = records.len(), "Portal login succeeded");
        Ok(records)
    }
}

/// Log in against the production portal, optionally with a different user agent.
pub async fn authenticate(
    email: &str,
    password: &str,
    user_agent: Option<UserAgent>,
) -> Result<Vec<CredentialRecord>> {
    let config = PortalConfig::default().with_user_agent(user_agent.unwrap_or_default());
    Authenticator::new(config)?.authenticate(email, password).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::api::transport::testing::ScriptedTransport;
    use crate::api::{PortalResponse, RequestBody};

    const LOGIN_PAGE: &str =
        r#"<html><head><meta name="csrf-token" content="csrf-abc"></head><body></body></html>"#;

    fn authenticator(responses: Vec<PortalResponse>) -> (Authenticator<Arc<ScriptedTransport>>, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(responses));
        let client = PortalClient::with_transport(PortalConfig::default(), transport.clone());
        (Authenticator::with_client(client), transport)
    }

    fn happy_path(accounts: &str) -> Vec<PortalResponse> {
        vec![
            PortalResponse::new(200, LOGIN_PAGE),
            PortalResponse::new(200, r#"{"redirect":"https://portal.librus.pl/r"}"#),
            PortalResponse::new(302, "").with_header("Location", "app://librus?code=ABC123"),
            PortalResponse::new(
                200,
                r#"{"access_token":"R1","refresh_token":"F1","expires_in":3600,"token_type":"Bearer"}"#,
            ),
            PortalResponse::new(200, accounts),
        ]
    }

    #[tokio::test]
    async fn test_authenticate_single_account() {
        let (auth, transport) = authenticator(happy_path(
            r#"{"accounts":[{"accessToken":"A1","studentName":"Jan Kowalski","id":7,"login":"jkowalski"}]}"#,
        ));

        let before = Utc::now();
        let records = auth.authenticate("a@b.com", "x").await.unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.root_token(), "R1");
        assert_eq!(record.refresh_token(), "F1");
        assert_eq!(record.access_token(), "A1");
        assert_eq!(record.login(), "jkowalski");
        assert_eq!(record.uid(), 7);
        assert_eq!(record.first_name(), "Jan");
        assert_eq!(record.last_name(), "Kowalski");
        assert!(record.expires_at() >= before + Duration::seconds(3600));

        let requests = transport.requests();
        assert_eq!(requests.len(), 5);
        assert!(!requests[2].follow_redirects);
        assert_eq!(requests[2].url, "https://portal.librus.pl/r");
        match &requests[3].body {
            RequestBody::Form(pairs) => {
                assert!(pairs.contains(&("grant_type".into(), "authorization_code".into())));
                assert!(pairs.contains(&("code".into(), "ABC123".into())));
            }
            other => panic!("expected form body, got {:?}", other),
        }
        assert_eq!(requests[4].bearer.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_authenticate_multiple_accounts_share_root_tokens() {
        let (auth, _) = authenticator(happy_path(
            r#"{"accounts":[
                {"accessToken":"A1","studentName":"Jan Kowalski","id":7,"login":"jkowalski"},
                {"accessToken":"A2","studentName":"Anna Kowalska","id":8,"login":"akowalska"}
            ]}"#,
        ));

        let records = auth.authenticate("a@b.com", "x").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].root_token(), records[1].root_token());
        assert_eq!(records[0].refresh_token(), records[1].refresh_token());
        assert_eq!(records[0].expires_at(), records[1].expires_at());
        assert_eq!(records[1].access_token(), "A2");
        assert_eq!(records[1].last_name(), "Kowalska");
    }

    fn token_step(token_body: &str) -> Vec<PortalResponse> {
        vec![
            PortalResponse::new(200, LOGIN_PAGE),
            PortalResponse::new(200, r#"{"redirect":"https://portal.librus.pl/r"}"#),
            PortalResponse::new(302, "").with_header("Location", "app://librus?code=ABC123"),
            PortalResponse::new(200, token_body),
        ]
    }

    #[tokio::test]
    async fn test_authenticate_expiry_out_of_range() {
        let (auth, transport) = authenticator(token_step(
            r#"{"access_token":"R1","refresh_token":"F1","expires_in":9223372036854775807}"#,
        ));

        match auth.authenticate("a@b.com", "x").await {
            Err(AuthError::Auth { message, payload }) => {
                assert_eq!(message, "Invalid token response");
                assert_eq!(payload["expires_in"], i64::MAX);
            }
            other => panic!("expected Auth error, got {:?}", other),
        }
        // Accounts are never fetched
        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_authenticate_missing_expiry_reports_server_payload() {
        let (auth, _) = authenticator(token_step(
            r#"{"access_token":"R1","refresh_token":"F1","token_type":"Bearer"}"#,
        ));

        match auth.authenticate("a@b.com", "x").await {
            Err(AuthError::Auth { payload, .. }) => {
                assert_eq!(payload["token_type"], "Bearer");
                assert_eq!(payload["access_token"], "R1");
            }
            other => panic!("expected Auth error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_authenticate_captcha_stops_flow() {
        let (auth, transport) = authenticator(vec![
            PortalResponse::new(200, LOGIN_PAGE),
            PortalResponse::new(403, r#"{"errors":["g-recaptcha-response"]}"#),
        ]);

        let err = auth.authenticate("a@b.com", "x").await.unwrap_err();
        assert!(matches!(err, AuthError::CaptchaRequired(_)));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_authenticate_missing_location() {
        let (auth, _) = authenticator(vec![
            PortalResponse::new(200, LOGIN_PAGE),
            PortalResponse::new(200, r#"{"redirect":"https://portal.librus.pl/r"}"#),
            PortalResponse::new(200, "<html></html>"),
        ]);

        assert!(matches!(
            auth.authenticate("a@b.com", "x").await,
            Err(AuthError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_malformed_token_response() {
        let (auth, transport) = authenticator(vec![
            PortalResponse::new(200, LOGIN_PAGE),
            PortalResponse::new(200, r#"{"redirect":"https://portal.librus.pl/r"}"#),
            PortalResponse::new(302, "").with_header("Location", "app://librus?code=ABC123"),
            PortalResponse::new(400, r#"{"error":"invalid_grant"}"#),
        ]);

        match auth.authenticate("a@b.com", "x").await {
            Err(AuthError::Auth { payload, .. }) => {
                assert_eq!(payload["error"], "invalid_grant");
            }
            other => panic!("expected Auth error, got {:?}", other),
        }
        assert_eq!(transport.remaining(), 0);
    }
}
