//! OAuth2 client with PKCE support for Azure AD authentication.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use url::Url;

use super::Audience;
use crate::config::Config;
use crate::error::AuthError;

/// Default Azure AD authority.
const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// HTTP request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// PKCE code verifier and challenge pair.
#[derive(Debug)]
pub struct PkceChallenge {
    /// The code verifier (kept locally, sent in token exchange).
    pub verifier: String,
    /// The code challenge (SHA256 hash of verifier, sent in auth request).
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a new PKCE challenge pair.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let verifier_bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
        let verifier = URL_SAFE_NO_PAD.encode(&verifier_bytes);

        // challenge = BASE64URL(SHA256(verifier))
        let hash = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(hash);

        Self {
            verifier,
            challenge,
        }
    }
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

/// Random CSRF state token for the authorization request.
pub fn random_state() -> String {
    let mut rng = rand::thread_rng();
    let state_bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(&state_bytes)
}

/// OAuth2 client for Azure AD authentication.
pub struct OAuth2Client {
    client_id: String,
    tenant: String,
    authority: String,
    http_client: reqwest::Client,
}

impl OAuth2Client {
    /// Create a new OAuth2 client from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_authority(&config.auth.client_id, &config.auth.tenant, DEFAULT_AUTHORITY)
    }

    /// Create a client against a specific authority host.
    pub fn with_authority(client_id: &str, tenant: &str, authority: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client_id: client_id.to_string(),
            tenant: tenant.to_string(),
            authority: authority.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}/oauth2/v2.0/{}", self.authority, self.tenant, name)
    }

    /// Scopes requested at sign-in: Graph plus a refresh token.
    ///
    /// Tokens for the other audiences are minted later from the refresh token.
    pub fn sign_in_scopes() -> String {
        format!("{} offline_access", Audience::Graph.scope())
    }

    /// Generate the authorization URL for browser-based sign-in.
    pub fn generate_auth_url(
        &self,
        pkce: &PkceChallenge,
        state: &str,
        redirect_uri: &str,
    ) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.endpoint("authorize"))
            .map_err(|e| AuthError::OAuthFailed(format!("invalid authority: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &Self::sign_in_scopes())
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(url)
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        let scope = Self::sign_in_scopes();
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", pkce_verifier),
            ("scope", scope.as_str()),
        ];

        self.token_request(&params)
            .await
            .map_err(AuthError::TokenExchangeFailed)
    }

    /// Mint a token for `audience` from a refresh token.
    ///
    /// Azure AD issues one access token per resource, so each audience needs its
    /// own refresh grant.
    pub async fn refresh_for(
        &self,
        refresh_token: &str,
        audience: Audience,
    ) -> Result<TokenResponse, AuthError> {
        let scope = format!("{} offline_access", audience.scope());
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ];

        tracing::debug!("Requesting {:?} token via refresh grant", audience);

        self.token_request(&params)
            .await
            .map_err(AuthError::TokenRefreshFailed)
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let response = self
            .http_client
            .post(self.endpoint("token"))
            .form(params)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            // Log error details for debugging (doesn't expose to user)
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("Token request failed: HTTP {} - {}", status, error_body);
            return Err(format!("HTTP {}", status.as_u16()));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| e.to_string())
    }
}

/// Token response from Azure AD.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
}

/// Parse OAuth callback URL to extract code and state.
pub fn parse_callback_url(url_string: &str) -> Result<(String, String), AuthError> {
    let url = Url::parse(url_string).map_err(|_| AuthError::InvalidAuthCode)?;

    let params: HashMap<_, _> = url.query_pairs().collect();

    // Check for error response
    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .map(|s| s.to_string())
            .unwrap_or_else(|| error.to_string());
        return Err(AuthError::OAuthFailed(description));
    }

    let code = params
        .get("code")
        .ok_or(AuthError::InvalidAuthCode)?
        .to_string();

    let state = params
        .get("state")
        .ok_or(AuthError::StateValidationFailed)?
        .to_string();

    Ok((code, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_pkce_generation() {
        let pkce = PkceChallenge::new();

        // Verifier should be base64url encoded (43 chars for 32 bytes)
        assert_eq!(pkce.verifier.len(), 43);
        assert!(!pkce.challenge.is_empty());
        assert_ne!(pkce.verifier, pkce.challenge);
    }

    #[test]
    fn test_auth_url_carries_pkce_and_state() {
        let client = OAuth2Client::with_authority("client-1", "contoso", DEFAULT_AUTHORITY).unwrap();
        let pkce = PkceChallenge::new();
        let url = client
            .generate_auth_url(&pkce, "state-123", "http://localhost:28491/callback")
            .unwrap();

        assert!(url
            .as_str()
            .starts_with("https://login.microsoftonline.com/contoso/oauth2/v2.0/authorize"));
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client-1");
        assert_eq!(params["state"], "state-123");
        assert_eq!(params["code_challenge"], pkce.challenge);
        assert_eq!(params["code_challenge_method"], "S256");
        assert!(params["scope"].contains("offline_access"));
    }

    #[test]
    fn test_parse_callback_success() {
        let url = "http://localhost:28491/callback?code=abc123&state=xyz789";
        let (code, state) = parse_callback_url(url).unwrap();
        assert_eq!(code, "abc123");
        assert_eq!(state, "xyz789");
    }

    #[test]
    fn test_parse_callback_error() {
        let url = "http://localhost:28491/callback?error=access_denied&error_description=User%20cancelled";
        let result = parse_callback_url(url);
        assert!(matches!(result, Err(AuthError::OAuthFailed(ref msg)) if msg == "User cancelled"));
    }

    #[test]
    fn test_parse_callback_missing_code() {
        let url = "http://localhost:28491/callback?state=xyz789";
        let result = parse_callback_url(url);
        assert!(matches!(result, Err(AuthError::InvalidAuthCode)));
    }

    #[tokio::test]
    async fn test_refresh_requests_audience_scope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contoso/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("management.azure.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "arm-token",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "rotated"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OAuth2Client::with_authority("client-1", "contoso", &server.uri()).unwrap();
        let response = client
            .refresh_for("old-refresh", Audience::ResourceManager)
            .await
            .unwrap();

        assert_eq!(response.access_token, "arm-token");
        assert_eq!(response.refresh_token.as_deref(), Some("rotated"));
    }

    #[tokio::test]
    async fn test_refresh_failure_maps_to_refresh_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let client = OAuth2Client::with_authority("client-1", "contoso", &server.uri()).unwrap();
        let err = client
            .refresh_for("bad", Audience::Graph)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::TokenRefreshFailed(ref msg) if msg == "HTTP 400"));
        assert!(err.requires_sign_in());
    }
}
