//! # Gridhook Server
//!
//! Standalone Event Grid webhook receiver. Loads a TOML configuration,
//! builds the dispatcher and serves the webhook routes.

mod config;

pub use config::{
    ALLOWED_TOPICS_ENV, BearerSettings, ConfigError, ENVIRONMENT_ENV, GridhookConfig,
    ServerConfig, VALIDATION_KEY_ENV, ValidationKeyConfig, WebhookSettings, load_config,
    parse_config,
};

use axum::Router;
use gridhook_core::{EnvSecret, FileSecret, SecretSource, StaticSecret, ValidationError};
use gridhook_jwt::{BearerAuthenticator, JwksCache, JwtValidator, KeySource};
use gridhook_webhooks::{AuthStrategy, DispatchConfig, TopicAllowList, WebhookDispatcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Server error.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Dispatcher setup failed: {0}")]
    Dispatcher(#[from] ValidationError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Initializes the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if let Err(err) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        // A global subscriber is already set, e.g. by an earlier call in the same test binary.
        tracing::debug!(error = %err, "Tracing subscriber already installed");
    }
}

/// Builds the validation key source.
pub fn secret_source(config: &ValidationKeyConfig) -> Arc<dyn SecretSource> {
    match config {
        ValidationKeyConfig::Value { value } => {
            tracing::warn!("Validation key configured inline, use only for development");
            Arc::new(StaticSecret::new(value.clone()))
        }
        ValidationKeyConfig::Env { variable } => Arc::new(EnvSecret::new(variable.clone())),
        ValidationKeyConfig::File { path } => Arc::new(FileSecret::new(path.clone())),
    }
}

/// Builds the bearer authenticator.
pub fn bearer_authenticator(settings: &BearerSettings) -> Result<BearerAuthenticator, ConfigError> {
    let keys = if let Some(secret) = &settings.shared_secret {
        tracing::warn!("Bearer tokens checked with a shared secret, use only for development");
        KeySource::shared_secret(secret)
    } else if let Some(path) = &settings.public_key_path {
        let pem = std::fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        KeySource::rsa_pem(&pem).map_err(|e| ConfigError::Invalid(e.to_string()))?
    } else {
        let mut cache = JwksCache::discover(&settings.authority);
        if let Some(ttl) = settings.jwks_ttl_secs {
            cache = cache.with_ttl(Duration::from_secs(ttl));
        }
        KeySource::jwks(cache)
    };

    let mut validator = JwtValidator::new(keys).with_issuer(settings.authority.as_str());
    if let Some(audience) = &settings.audience {
        validator = validator.with_audience(audience.as_str());
    } else {
        tracing::warn!("No bearer audience configured, audience is not checked");
    }
    if let Some(leeway) = settings.leeway_secs {
        validator = validator.with_leeway(leeway);
    }

    Ok(BearerAuthenticator::new(validator)
        .allow_applications(settings.allowed_application_ids.iter().cloned()))
}

/// Builds the dispatcher from webhook settings.
pub fn build_dispatcher(settings: &WebhookSettings) -> Result<WebhookDispatcher, ServerError> {
    let config = DispatchConfig::new()
        .auth_strategy(settings.auth_strategy)
        .missing_signature(settings.missing_signature)
        .preflight(settings.preflight.clone());

    let mut builder = WebhookDispatcher::builder()
        .config(config)
        .allow_list(TopicAllowList::new(&settings.allowed_topics))
        .secrets(secret_source(&settings.validation_key));

    if settings.auth_strategy == AuthStrategy::Bearer {
        if let Some(bearer) = &settings.bearer {
            builder = builder.authenticator(Arc::new(bearer_authenticator(bearer)?));
        }
    }

    Ok(builder.build()?)
}

/// The webhook server.
pub struct GridhookServer {
    config: GridhookConfig,
    dispatcher: Arc<WebhookDispatcher>,
}

impl GridhookServer {
    /// Creates a server, building the dispatcher from `config`.
    pub fn new(config: GridhookConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let dispatcher = Arc::new(build_dispatcher(&config.webhook)?);
        Ok(Self { config, dispatcher })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &GridhookConfig {
        &self.config
    }

    /// Builds the application router.
    pub fn router(&self) -> Router {
        Router::new()
            .nest(
                "/api",
                gridhook_axum::webhook_routes(
                    self.dispatcher.clone(),
                    self.config.server.environment.clone(),
                ),
            )
            .layer(TraceLayer::new_for_http())
    }

    /// Serves until Ctrl-C.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!(
            address = %listener.local_addr()?,
            environment = %self.config.server.environment,
            auth_strategy = ?self.config.webhook.auth_strategy,
            missing_signature = ?self.config.webhook.missing_signature,
            allowed_topics = self.dispatcher.allow_list().len(),
            "Gridhook server listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
