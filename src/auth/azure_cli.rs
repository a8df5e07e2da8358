//! Credential backed by the Azure CLI session (`az login`).

use std::collections::HashMap;
use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{AccessToken, Audience, TokenCredential};
use crate::error::{looks_like_sign_in, AuthError};

/// Format of the legacy `expiresOn` field (local time).
const CLI_EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Uses `az account get-access-token` for every audience.
///
/// Tokens are kept in memory until shortly before they expire, so each
/// audience costs one subprocess per token lifetime.
pub struct AzureCliCredential {
    cache: Mutex<HashMap<Audience, AccessToken>>,
}

impl AzureCliCredential {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an `az` invocation; on Windows the CLI is a batch file.
fn az_command() -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "az"]);
        cmd
    } else {
        Command::new("az")
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, audience: Audience) -> Result<AccessToken, AuthError> {
        if let Some(token) = self.cache.lock().await.get(&audience) {
            if token.is_fresh() {
                return Ok(token.clone());
            }
        }

        debug!("Requesting {:?} token from Azure CLI", audience);

        let output = az_command()
            .args([
                "account",
                "get-access-token",
                "--resource",
                audience.resource(),
                "--output",
                "json",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => AuthError::CliUnavailable(
                    "Azure CLI ('az') not found on PATH. Install it and run 'az login'".into(),
                ),
                _ => AuthError::CliUnavailable(e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("Azure CLI token request failed: {}", stderr);
            return Err(if looks_like_sign_in(&stderr) {
                AuthError::NotSignedIn(stderr)
            } else {
                AuthError::TokenRequestFailed(stderr)
            });
        }

        let token = parse_cli_token(&output.stdout)?;
        self.cache.lock().await.insert(audience, token.clone());
        Ok(token)
    }

    async fn login(&self) -> Result<(), AuthError> {
        info!("Starting 'az login'");

        // Output is captured so the CLI doesn't draw over the terminal UI;
        // the CLI opens the browser itself.
        let output = az_command()
            .args(["login", "--output", "none"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AuthError::CliUnavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AuthError::OAuthFailed(stderr));
        }

        self.cache.lock().await.clear();
        info!("Azure CLI login completed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "azure-cli"
    }
}

/// JSON printed by `az account get-access-token`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenOutput {
    access_token: String,
    /// Local time, e.g. "2024-05-01 13:37:00.000000". Present in all CLI versions.
    expires_on: Option<String>,
    /// Unix seconds. Only in newer CLI versions.
    #[serde(rename = "expires_on")]
    expires_on_unix: Option<i64>,
}

/// Parse the CLI output, preferring the unambiguous unix timestamp.
fn parse_cli_token(stdout: &[u8]) -> Result<AccessToken, AuthError> {
    let out: CliTokenOutput = serde_json::from_slice(stdout)
        .map_err(|e| AuthError::TokenRequestFailed(format!("unexpected Azure CLI output: {}", e)))?;

    let expires_on = match (out.expires_on_unix, out.expires_on.as_deref()) {
        (Some(secs), _) => Utc.timestamp_opt(secs, 0).single(),
        (None, Some(local)) => parse_local_expiry(local),
        (None, None) => None,
    }
    .ok_or_else(|| AuthError::TokenRequestFailed("Azure CLI token has no expiry".into()))?;

    Ok(AccessToken::new(out.access_token, expires_on))
}

fn parse_local_expiry(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, CLI_EXPIRY_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
