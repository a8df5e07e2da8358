//! Credential providers.
//!
//! Every REST call asks a [`TokenCredential`] for a bearer token for one of
//! three audiences. Two providers exist: the Azure CLI session (`az login`)
//! and an interactive browser sign-in with PKCE.

pub mod azure_cli;
pub mod browser;
pub mod callback_server;
pub mod oauth;
pub mod secure;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::config::{AuthMethod, Config};
use crate::error::AuthError;
pub use secure::SecretString;

/// Tokens this close to expiry are treated as stale.
const EXPIRY_SKEW_SECONDS: i64 = 300;

/// Token audiences used by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Audience {
    /// Microsoft Graph.
    Graph,
    /// PIM Governance API (Entra roles and groups).
    Pim,
    /// Azure Resource Manager.
    ResourceManager,
}

impl Audience {
    /// Resource identifier as understood by Azure AD.
    pub fn resource(self) -> &'static str {
        match self {
            Self::Graph => "https://graph.microsoft.com",
            Self::Pim => "https://api.azrbac.mspim.azure.com",
            Self::ResourceManager => "https://management.azure.com",
        }
    }

    /// v2 endpoint scope for this resource.
    pub fn scope(self) -> String {
        format!("{}/.default", self.resource())
    }
}

/// A bearer token with its expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: SecretString,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<SecretString>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// True while the token is usable with a safety margin.
    pub fn is_fresh(&self) -> bool {
        self.expires_on - Utc::now() > Duration::seconds(EXPIRY_SKEW_SECONDS)
    }
}

/// Source of bearer tokens.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Get a token for the given audience.
    async fn get_token(&self, audience: Audience) -> Result<AccessToken, AuthError>;

    /// Run the interactive sign-in flow.
    async fn login(&self) -> Result<(), AuthError>;

    /// Short human-readable provider name for logs.
    fn name(&self) -> &'static str;
}

/// Build the credential selected in the configuration.
pub fn credential_from_config(config: &Config) -> Result<Arc<dyn TokenCredential>> {
    let credential: Arc<dyn TokenCredential> = match config.auth.method {
        AuthMethod::AzureCli => Arc::new(azure_cli::AzureCliCredential::new()),
        AuthMethod::Browser => Arc::new(browser::BrowserCredential::new(config)?),
    };
    Ok(credential)
}

/// Credential returning a fixed token for every audience.
#[cfg(test)]
pub(crate) struct StaticCredential;

#[cfg(test)]
#[async_trait]
impl TokenCredential for StaticCredential {
    async fn get_token(&self, _audience: Audience) -> Result<AccessToken, AuthError> {
        Ok(AccessToken::new(
            "test-token".to_string(),
            Utc::now() + Duration::hours(1),
        ))
    }

    async fn login(&self) -> Result<(), AuthError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audience_scopes() {
        assert_eq!(
            Audience::Graph.scope(),
            "https://graph.microsoft.com/.default"
        );
        assert_eq!(
            Audience::Pim.scope(),
            "https://api.azrbac.mspim.azure.com/.default"
        );
        assert_eq!(
            Audience::ResourceManager.resource(),
            "https://management.azure.com"
        );
    }

    #[test]
    fn test_token_freshness() {
        let fresh = AccessToken::new("a".to_string(), Utc::now() + Duration::hours(1));
        assert!(fresh.is_fresh());

        let stale = AccessToken::new("b".to_string(), Utc::now() + Duration::minutes(2));
        assert!(!stale.is_fresh());
    }
}
