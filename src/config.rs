//! Configuration loading and management.
//!
//! Loads the embedded config.toml defaults, overlays the optional user file and
//! finally applies environment variable overrides. The result is read once at
//! startup; nothing re-reads it at runtime.

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::settings;

/// Embedded configuration file content.
const CONFIG_TOML: &str = include_str!("../config.toml");

/// Log levels accepted by the activity panel.
const LOG_LEVELS: &[&str] = &["debug", "info", "error"];

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub activation: ActivationConfig,
    pub refresh: RefreshConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub theme: ThemeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivationConfig {
    pub default_duration_hours: u32,
    pub duration_presets_hours: Vec<u32>,
    /// Delay before the second refetch after a successful activation.
    pub settle_delay_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    pub auto_refresh_enabled: bool,
    pub auto_refresh_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Which credential provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    AzureCli,
    Browser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    pub client_id: String,
    pub tenant: String,
    pub redirect_port: u16,
}

/// Colors as `#rrggbb` strings; parsed by the renderer into an immutable theme.
#[derive(Debug, Clone, Deserialize)]
pub struct ThemeConfig {
    pub active: String,
    pub expiring: String,
    pub inactive: String,
    pub pending: String,
    pub error: String,
    pub highlight: String,
    pub border: String,
}

impl Config {
    /// Load configuration: embedded defaults, user file, then environment.
    pub fn load() -> Result<Self> {
        let user_file = match settings::user_config_path() {
            Some(path) if path.exists() => Some(read_user_file(&path)?),
            _ => None,
        };

        let mut config = Self::from_sources(user_file.as_deref())?;
        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Built-in defaults only.
    pub fn defaults() -> Result<Self> {
        Self::from_sources(None)
    }

    /// Merge the embedded defaults with an optional user TOML document.
    fn from_sources(user_toml: Option<&str>) -> Result<Self> {
        let mut base: toml::Value =
            toml::from_str(CONFIG_TOML).context("Failed to parse embedded config.toml")?;

        if let Some(user_toml) = user_toml {
            let overlay: toml::Value =
                toml::from_str(user_toml).context("Failed to parse user config file")?;
            merge_values(&mut base, overlay);
        }

        base.try_into::<Config>().context("Invalid configuration")
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(hours) = env::var("PIM_TUI_DEFAULT_DURATION") {
            self.activation.default_duration_hours = hours
                .parse()
                .context("PIM_TUI_DEFAULT_DURATION must be a whole number of hours")?;
        }

        if let Ok(enabled) = env::var("PIM_TUI_AUTO_REFRESH") {
            self.refresh.auto_refresh_enabled = matches!(enabled.as_str(), "1" | "true" | "yes");
        }

        if let Ok(interval) = env::var("PIM_TUI_AUTO_REFRESH_INTERVAL") {
            self.refresh.auto_refresh_interval_seconds = interval
                .parse()
                .context("PIM_TUI_AUTO_REFRESH_INTERVAL must be a number of seconds")?;
        }

        if let Ok(level) = env::var("PIM_TUI_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(method) = env::var("PIM_TUI_AUTH_METHOD") {
            self.auth.method = match method.as_str() {
                "browser" => AuthMethod::Browser,
                "azure_cli" | "cli" => AuthMethod::AzureCli,
                other => anyhow::bail!("Unknown PIM_TUI_AUTH_METHOD '{}'", other),
            };
        }

        if let Ok(client_id) = env::var("AZURE_CLIENT_ID") {
            self.auth.client_id = client_id;
        }

        if let Ok(tenant) = env::var("AZURE_TENANT_ID") {
            self.auth.tenant = tenant;
        }

        Ok(())
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.activation.duration_presets_hours.is_empty() {
            anyhow::bail!("activation.duration_presets_hours must not be empty");
        }

        if self.activation.default_duration_hours == 0
            || self.activation.duration_presets_hours.contains(&0)
        {
            anyhow::bail!("activation durations must be at least one hour");
        }

        if self.refresh.auto_refresh_interval_seconds == 0 {
            anyhow::bail!("refresh.auto_refresh_interval_seconds must be greater than zero");
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            );
        }

        if self.auth.method == AuthMethod::Browser && self.auth.client_id.trim().is_empty() {
            anyhow::bail!(
                "Browser sign-in needs an Azure AD client id. Set AZURE_CLIENT_ID \
                 or auth.client_id in the config file"
            );
        }

        Ok(())
    }

    /// Index of the default duration within the presets, or 0 if absent.
    pub fn default_preset_index(&self) -> usize {
        self.activation
            .duration_presets_hours
            .iter()
            .position(|h| *h == self.activation.default_duration_hours)
            .unwrap_or(0)
    }

    /// Get the authorization URL for Azure AD.
    pub fn auth_url(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/authorize",
            self.auth.tenant
        )
    }

    /// Get the token URL for Azure AD.
    pub fn token_url(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.auth.tenant
        )
    }
}

fn read_user_file(path: &Path) -> Result<String> {
    debug!("Reading user config from {:?}", path);
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Recursively overlay `overlay` onto `base`; tables merge, everything else replaces.
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parsing() {
        let config = Config::defaults().expect("embedded config parses");
        assert_eq!(config.activation.default_duration_hours, 4);
        assert_eq!(config.activation.duration_presets_hours, vec![1, 2, 4, 8]);
        assert_eq!(config.refresh.auto_refresh_interval_seconds, 60);
        assert_eq!(config.auth.method, AuthMethod::AzureCli);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_user_overlay_merges_tables() {
        let user = r#"
            [activation]
            default_duration_hours = 2

            [refresh]
            auto_refresh_enabled = false
        "#;
        let config = Config::from_sources(Some(user)).unwrap();

        assert_eq!(config.activation.default_duration_hours, 2);
        // Untouched keys keep their defaults
        assert_eq!(config.activation.duration_presets_hours, vec![1, 2, 4, 8]);
        assert!(!config.refresh.auto_refresh_enabled);
        assert_eq!(config.theme.active, "#00ff00");
        assert_eq!(config.default_preset_index(), 1);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = Config::from_sources(Some("[logging]\nlevel = \"trace\"")).unwrap();
        assert!(config.validate().is_err());

        let config =
            Config::from_sources(Some("[activation]\nduration_presets_hours = []")).unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_sources(Some("[auth]\nmethod = \"browser\"")).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_preset_index_falls_back_to_first() {
        let config = Config::from_sources(Some("[activation]\ndefault_duration_hours = 3")).unwrap();
        assert_eq!(config.default_preset_index(), 0);
    }

    #[test]
    fn test_urls() {
        let mut config = Config::defaults().unwrap();
        config.auth.tenant = "test-tenant".into();

        assert_eq!(
            config.auth_url(),
            "https://login.microsoftonline.com/test-tenant/oauth2/v2.0/authorize"
        );
        assert_eq!(
            config.token_url(),
            "https://login.microsoftonline.com/test-tenant/oauth2/v2.0/token"
        );
    }
}
