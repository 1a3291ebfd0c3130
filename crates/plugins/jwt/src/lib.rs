//! # Gridhook JWT Authenticator
//!
//! Bearer-token caller authentication for the webhook dispatcher. Used when
//! the deployment selects the `bearer` auth strategy instead of relying on
//! payload signatures alone.
//!
//! ## Features
//!
//! - Signature, lifetime (5 minute leeway), issuer and audience validation
//! - Shared secret, RSA PEM, or JWKS discovery key sources
//! - Calling application allow-list (`appid` / `azp`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use gridhook_jwt::{BearerAuthenticator, JwksCache, JwtValidator, KeySource};
//!
//! let authority = "https://login.microsoftonline.com/<tenant>/v2.0";
//! let validator = JwtValidator::new(KeySource::jwks(JwksCache::discover(authority)))
//!     .with_issuer(authority)
//!     .with_audience("api://gridhook");
//!
//! let authenticator = BearerAuthenticator::new(validator)
//!     .allow_applications(["<publisher-app-id>"]);
//! ```

pub mod claims;
pub mod jwks;
pub mod token;

pub use claims::{Audience, CallerClaims};
pub use jwks::{DEFAULT_JWKS_TTL, JwksCache};
pub use token::{DEFAULT_LEEWAY_SECS, JwtError, JwtValidator, KeySource};

use async_trait::async_trait;
use gridhook_core::{CallerAuthenticator, CallerIdentity, Request, ValidationError, ValidationResult};
use std::collections::HashSet;

impl From<JwtError> for ValidationError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::KeyFetch(message) => ValidationError::internal(message),
            other => ValidationError::unauthenticated(other.to_string()),
        }
    }
}

/// Authenticates callers by their `Authorization: Bearer` token.
#[derive(Debug)]
pub struct BearerAuthenticator {
    validator: JwtValidator,
    allowed_applications: HashSet<String>,
}

impl BearerAuthenticator {
    /// Creates an authenticator that accepts any application.
    pub fn new(validator: JwtValidator) -> Self {
        Self {
            validator,
            allowed_applications: HashSet::new(),
        }
    }

    /// Restricts callers to the given application ids. Blank ids are ignored.
    pub fn allow_applications<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_applications.extend(
            ids.into_iter()
                .map(Into::into)
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
        );
        self
    }

    /// Returns the validator.
    pub fn validator(&self) -> &JwtValidator {
        &self.validator
    }

    fn authorize(&self, claims: &CallerClaims) -> ValidationResult<()> {
        if self.allowed_applications.is_empty() {
            return Ok(());
        }

        match claims.application_id() {
            Some(id) if self.allowed_applications.contains(id) => Ok(()),
            Some(id) => {
                tracing::warn!(application_id = %id, "Access forbidden for application");
                Err(ValidationError::forbidden(format!(
                    "application '{}' is not allowed",
                    id
                )))
            }
            None => {
                tracing::warn!("Access forbidden, token carries no application id");
                Err(ValidationError::forbidden("token carries no application id"))
            }
        }
    }
}

#[async_trait]
impl CallerAuthenticator for BearerAuthenticator {
    fn scheme(&self) -> &'static str {
        "bearer"
    }

    async fn authenticate(&self, request: &Request) -> ValidationResult<CallerIdentity> {
        let Some(token) = extract_bearer_token(request) else {
            tracing::warn!("Authentication failed: no bearer token");
            return Err(ValidationError::unauthenticated("missing bearer token"));
        };

        let claims = match self.validator.validate(token).await {
            Ok(data) => data.claims,
            Err(err) => {
                match &err {
                    JwtError::KeyFetch(_) => {
                        tracing::error!(error = %err, "Signing keys unavailable")
                    }
                    _ => tracing::warn!(error = %err, "Authentication failed"),
                }
                return Err(err.into());
            }
        };

        self.authorize(&claims)?;

        let subject = claims.subject().unwrap_or("unknown");
        tracing::info!(
            subject = %subject,
            application_id = claims.application_id().unwrap_or("-"),
            "Token successfully validated"
        );

        let mut identity = CallerIdentity::new(subject);
        if let Some(issuer) = &claims.iss {
            identity = identity.with_issuer(issuer);
        }
        if let Some(app_id) = claims.application_id() {
            identity = identity.with_application_id(app_id);
        }
        Ok(identity)
    }
}

/// Extracts the token from an `Authorization: Bearer` header.
pub fn extract_bearer_token(request: &Request) -> Option<&str> {
    let value = request.header("authorization")?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}
