use anyhow::Result;
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// API key value shipped in example environment files; treated as "not set".
pub const PLACEHOLDER_API_KEY: &str = "your_builderprime_api_key_here";

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener
    pub server: ServerConfig,
    /// CRM directory
    pub crm: CrmConfig,
    /// Webhook signatures
    pub webhook: WebhookConfig,
    /// Log output
    pub logging: LoggingConfig,
}

/// HTTP server settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `host:port` to listen on
    pub bind_address: String,
    /// Bearer token for administrative routes; unset disables them outside test mode
    #[serde(default)]
    pub admin_token: Option<String>,
}

/// CRM connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Lookup API key; empty or placeholder selects the in-memory directory
    pub api_key: String,
    /// API root, e.g. `https://api.builderprime.com/v1`
    pub base_url: String,
    /// Client-activities endpoint; empty means `<base_url>/client-activities/v1`
    #[serde(default)]
    pub activity_url: String,
    /// Write token copied into every activity
    pub secret_key: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Force the in-memory directory
    pub use_test_directory: bool,
}

/// Webhook verification settings
#[derive(Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Secret for `x-dialpad-signature`
    #[serde(default)]
    pub provider_secret: Option<String>,
    /// Secret for `x-signature` on the generic webhook
    #[serde(default)]
    pub generic_secret: Option<String>,
    /// Reject deliveries that cannot be verified
    pub require_signature: bool,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Daily-rolling JSON log file
    #[serde(default)]
    pub file_path: Option<String>,
    /// Console format, `json` or `text`
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0:3000".to_string(),
                admin_token: None,
            },
            crm: CrmConfig {
                api_key: String::new(),
                base_url: "https://api.builderprime.com/v1".to_string(),
                activity_url: String::new(),
                secret_key: String::new(),
                timeout_secs: 30,
                use_test_directory: false,
            },
            webhook: WebhookConfig {
                provider_secret: None,
                generic_secret: None,
                require_signature: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_address", &self.bind_address)
            .field("admin_token", &self.admin_token.as_deref().map(redact))
            .finish()
    }
}

impl std::fmt::Debug for CrmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("activity_url", &self.activity_url)
            .field("secret_key", &redact(&self.secret_key))
            .field("timeout_secs", &self.timeout_secs)
            .field("use_test_directory", &self.use_test_directory)
            .finish()
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("provider_secret", &self.provider_secret.as_deref().map(redact))
            .field("generic_secret", &self.generic_secret.as_deref().map(redact))
            .field("require_signature", &self.require_signature)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

impl ServerConfig {
    /// Admin token, ignoring blank values
    #[must_use]
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref().filter(|s| !s.trim().is_empty())
    }
}

impl CrmConfig {
    /// Whether the in-memory directory should stand in for the CRM
    #[must_use]
    pub fn test_mode(&self) -> bool {
        self.use_test_directory
            || self.api_key.trim().is_empty()
            || self.api_key == PLACEHOLDER_API_KEY
    }

    /// Effective client-activities endpoint
    #[must_use]
    pub fn activity_url(&self) -> String {
        if self.activity_url.trim().is_empty() {
            format!("{}/client-activities/v1", self.base_url.trim_end_matches('/'))
        } else {
            self.activity_url.clone()
        }
    }
}

impl WebhookConfig {
    /// Provider secret, ignoring blank values
    #[must_use]
    pub fn provider_secret(&self) -> Option<&str> {
        self.provider_secret.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Generic webhook secret, ignoring blank values
    #[must_use]
    pub fn generic_secret(&self) -> Option<&str> {
        self.generic_secret.as_deref().filter(|s| !s.trim().is_empty())
    }
}

impl AppConfig {
    fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>> {
        let defaults = Self::default();
        let builder = Config::builder()
            .set_default("server.bind_address", defaults.server.bind_address)?
            .set_default("crm.api_key", defaults.crm.api_key)?
            .set_default("crm.base_url", defaults.crm.base_url)?
            .set_default("crm.activity_url", defaults.crm.activity_url)?
            .set_default("crm.secret_key", defaults.crm.secret_key)?
            .set_default("crm.timeout_secs", defaults.crm.timeout_secs)?
            .set_default("crm.use_test_directory", defaults.crm.use_test_directory)?
            .set_default("webhook.require_signature", defaults.webhook.require_signature)?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.format", defaults.logging.format)?;
        Ok(builder)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder
            .add_source(
                Environment::with_prefix("CALL_BRIDGE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let builder = Self::builder_with_defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("call-bridge").required(false));

        Self::finish(builder)
    }

    /// Load configuration from an explicit file on top of the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let builder = Self::builder_with_defaults()?.add_source(File::from(path).required(true));

        Self::finish(builder)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate server config
        if self.server.bind_address.trim().is_empty() {
            return Err(anyhow::anyhow!("server.bind_address cannot be empty"));
        }

        // Validate CRM config
        if self.crm.timeout_secs == 0 {
            return Err(anyhow::anyhow!("crm.timeout_secs must be greater than 0"));
        }
        for (name, url) in [("crm.base_url", self.crm.base_url.clone()), ("crm.activity_url", self.crm.activity_url())] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(anyhow::anyhow!("{name} must be an http(s) URL, got: {url}"));
            }
        }
        if !self.crm.test_mode() && self.crm.secret_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "crm.secret_key is required when the live CRM directory is used"
            ));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        Ok(())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:3000");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.crm.timeout_secs, 30);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.crm.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let mut config = AppConfig::default();
        config.crm.api_key = "live-key".into();
        config.crm.secret_key = "write-token".into();
        config.webhook.provider_secret = Some("whsec".into());
        config.server.admin_token = Some("admin-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("live-key"));
        assert!(!debug.contains("write-token"));
        assert!(!debug.contains("whsec"));
        assert!(!debug.contains("admin-secret"));
    }
}
