//! Server configuration.

use gridhook_webhooks::{AuthStrategy, MissingSignaturePolicy, PreflightSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides `webhook.allowed_topics` (comma separated).
pub const ALLOWED_TOPICS_ENV: &str = "GRIDHOOK_ALLOWED_TOPICS";

/// Overrides `server.environment`.
pub const ENVIRONMENT_ENV: &str = "GRIDHOOK_ENVIRONMENT";

/// Variable read by the default validation key source.
pub const VALIDATION_KEY_ENV: &str = "GRIDHOOK_VALIDATION_KEY";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridhookConfig {
    /// `[server]` section.
    pub server: ServerConfig,
    /// `[webhook]` section.
    pub webhook: WebhookSettings,
}

/// Server-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Host to bind to.
    pub host: String,
    /// Log level, used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Deployment name reported by the diagnostics endpoint.
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
            log_level: "info".to_string(),
            environment: "Unknown".to_string(),
        }
    }
}

/// Webhook validation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Allowed topic prefixes.
    pub allowed_topics: Vec<String>,
    /// Caller authentication strategy.
    pub auth_strategy: AuthStrategy,
    /// Policy for deliveries without a signature header.
    pub missing_signature: MissingSignaturePolicy,
    /// Where the signature validation key is read from.
    pub validation_key: ValidationKeyConfig,
    /// Preflight handshake settings.
    pub preflight: PreflightSettings,
    /// Bearer token settings, required by the `bearer` strategy.
    pub bearer: Option<BearerSettings>,
}

/// Validation key source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ValidationKeyConfig {
    /// Literal key. Development only.
    Value { value: String },
    /// Environment variable, re-read for every delivery.
    Env { variable: String },
    /// File (e.g. a mounted vault secret), re-read for every delivery.
    File { path: PathBuf },
}

impl Default for ValidationKeyConfig {
    fn default() -> Self {
        ValidationKeyConfig::Env {
            variable: VALIDATION_KEY_ENV.to_string(),
        }
    }
}

/// Bearer token settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BearerSettings {
    /// Token authority; also the expected issuer.
    pub authority: String,
    /// Expected audience.
    pub audience: Option<String>,
    /// Allowed calling applications. Empty allows any.
    pub allowed_application_ids: Vec<String>,
    /// Clock skew tolerance in seconds.
    pub leeway_secs: Option<u64>,
    /// HS256 shared secret. Development only.
    pub shared_secret: Option<String>,
    /// RS256 public key file; skips discovery.
    pub public_key_path: Option<PathBuf>,
    /// How long discovered keys are trusted, in seconds.
    pub jwks_ttl_secs: Option<u64>,
}

impl GridhookConfig {
    /// Applies environment overrides using `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(topics) = lookup(ALLOWED_TOPICS_ENV) {
            self.webhook.allowed_topics = topics
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(environment) = lookup(ENVIRONMENT_ENV).filter(|e| !e.trim().is_empty()) {
            self.server.environment = environment;
        }
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok());
        self
    }

    /// Checks settings that cannot be expressed by the types alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook.auth_strategy == AuthStrategy::Bearer {
            let bearer = self.webhook.bearer.as_ref().ok_or_else(|| {
                ConfigError::Invalid("auth_strategy 'bearer' requires a [webhook.bearer] section".into())
            })?;
            if bearer.authority.trim().is_empty() {
                return Err(ConfigError::Invalid("webhook.bearer.authority is required".into()));
            }
        }

        match &self.webhook.validation_key {
            ValidationKeyConfig::Env { variable } if variable.trim().is_empty() => Err(
                ConfigError::Invalid("webhook.validation_key.variable is empty".into()),
            ),
            ValidationKeyConfig::File { path } if path.as_os_str().is_empty() => Err(
                ConfigError::Invalid("webhook.validation_key.path is empty".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// Parses configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GridhookConfig, ConfigError> {
    let config: GridhookConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from a TOML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<GridhookConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
    parse_config(&content)
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
