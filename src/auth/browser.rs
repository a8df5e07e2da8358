//! Interactive browser sign-in (authorization code + PKCE).
//!
//! The refresh token is held in memory only; a restart means signing in again.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::callback_server;
use super::oauth::{parse_callback_url, random_state, OAuth2Client, PkceChallenge, TokenResponse};
use super::{AccessToken, Audience, SecretString, TokenCredential};
use crate::config::Config;
use crate::error::AuthError;

/// How long to wait for the user to finish signing in.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

pub struct BrowserCredential {
    oauth: OAuth2Client,
    redirect_port: u16,
    refresh_token: Mutex<Option<SecretString>>,
    cache: Mutex<HashMap<Audience, AccessToken>>,
}

impl BrowserCredential {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_client(
            OAuth2Client::new(config)?,
            config.auth.redirect_port,
        ))
    }

    fn with_client(oauth: OAuth2Client, redirect_port: u16) -> Self {
        Self {
            oauth,
            redirect_port,
            refresh_token: Mutex::new(None),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Store the tokens from a successful grant and return the access token.
    async fn store(&self, audience: Audience, response: TokenResponse) -> AccessToken {
        let expires_on = Utc::now() + chrono::Duration::seconds(response.expires_in as i64);
        let token = AccessToken::new(response.access_token, expires_on);

        // Azure AD rotates refresh tokens; keep the newest one.
        if let Some(refresh) = response.refresh_token {
            *self.refresh_token.lock().await = Some(SecretString::from(refresh));
        }
        self.cache.lock().await.insert(audience, token.clone());
        token
    }
}

#[async_trait]
impl TokenCredential for BrowserCredential {
    async fn get_token(&self, audience: Audience) -> Result<AccessToken, AuthError> {
        if let Some(token) = self.cache.lock().await.get(&audience) {
            if token.is_fresh() {
                return Ok(token.clone());
            }
        }

        let refresh = self.refresh_token.lock().await.clone().ok_or_else(|| {
            AuthError::NotSignedIn("browser sign-in required, press 'l' to log in".into())
        })?;

        let response = self.oauth.refresh_for(refresh.expose(), audience).await?;
        Ok(self.store(audience, response).await)
    }

    async fn login(&self) -> Result<(), AuthError> {
        let listener = callback_server::bind(self.redirect_port).await?;
        let redirect_uri = callback_server::redirect_uri(self.redirect_port);

        let pkce = PkceChallenge::new();
        let state = random_state();
        let auth_url = self.oauth.generate_auth_url(&pkce, &state, &redirect_uri)?;

        info!("Opening browser for sign-in");
        if let Err(e) = open::that(auth_url.as_str()) {
            warn!("Failed to open browser ({}), open this URL manually: {}", e, auth_url);
        }

        let callback = tokio::time::timeout(
            LOGIN_TIMEOUT,
            callback_server::wait_for_callback(listener, CancellationToken::new()),
        )
        .await
        .map_err(|_| AuthError::CallbackTimeout)??;

        let (code, returned_state) = parse_callback_url(&callback)?;
        if returned_state != state {
            return Err(AuthError::StateValidationFailed);
        }

        let response = self
            .oauth
            .exchange_code(&code, &pkce.verifier, &redirect_uri)
            .await?;
        self.cache.lock().await.clear();
        self.store(Audience::Graph, response).await;

        info!("Browser sign-in completed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_token_without_sign_in() {
        let oauth = OAuth2Client::with_authority("client", "organizations", "http://127.0.0.1:9").unwrap();
        let credential = BrowserCredential::with_client(oauth, 0);

        let err = credential.get_token(Audience::Pim).await.unwrap_err();
        assert!(matches!(err, AuthError::NotSignedIn(_)));
        assert!(err.requires_sign_in());
    }

    #[tokio::test]
    async fn test_refresh_token_is_rotated_and_tokens_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("refresh_token=first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "pim-token",
                "expires_in": 3600,
                "refresh_token": "second"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let oauth = OAuth2Client::with_authority("client", "organizations", &server.uri()).unwrap();
        let credential = BrowserCredential::with_client(oauth, 0);
        *credential.refresh_token.lock().await = Some(SecretString::from("first"));

        let token = credential.get_token(Audience::Pim).await.unwrap();
        assert_eq!(token.token.expose(), "pim-token");

        // Served from cache, so the mock's expect(1) holds.
        let again = credential.get_token(Audience::Pim).await.unwrap();
        assert_eq!(again.token.expose(), "pim-token");

        let stored = credential.refresh_token.lock().await.clone().unwrap();
        assert_eq!(stored.expose(), "second");
    }
}
