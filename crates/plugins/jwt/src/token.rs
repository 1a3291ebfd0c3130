//! JWT token validation.

use crate::claims::CallerClaims;
use crate::jwks::JwksCache;
use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation, decode, decode_header};

/// Default clock skew tolerance in seconds.
pub const DEFAULT_LEEWAY_SECS: u64 = 300;

/// Error type for JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Token expired")]
    Expired,

    #[error("Token not yet valid")]
    NotYetValid,

    #[error("Invalid token")]
    Invalid,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid issuer")]
    InvalidIssuer,

    #[error("Invalid audience")]
    InvalidAudience,

    #[error("Unexpected signing algorithm")]
    InvalidAlgorithm,

    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    #[error("No signing key matches kid '{0}'")]
    UnknownKey(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Signing key retrieval failed: {0}")]
    KeyFetch(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::ImmatureSignature => JwtError::NotYetValid,
            ErrorKind::InvalidSignature => JwtError::InvalidSignature,
            ErrorKind::InvalidToken => JwtError::Invalid,
            ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
            ErrorKind::InvalidAudience => JwtError::InvalidAudience,
            ErrorKind::InvalidAlgorithm => JwtError::InvalidAlgorithm,
            ErrorKind::MissingRequiredClaim(claim) => JwtError::MissingClaim(claim.clone()),
            _ => JwtError::DecodingFailed(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for JwtError {
    fn from(err: reqwest::Error) -> Self {
        JwtError::KeyFetch(err.to_string())
    }
}

/// Where token signing keys come from.
pub enum KeySource {
    /// A fixed key, e.g. a shared secret or a PEM public key.
    Static {
        key: DecodingKey,
        algorithm: Algorithm,
    },
    /// Keys published by the authority, selected by `kid`.
    Jwks(JwksCache),
}

impl KeySource {
    /// HS256 shared secret. Meant for development and tests.
    pub fn shared_secret(secret: &str) -> Self {
        KeySource::Static {
            key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
        }
    }

    /// RS256 public key in PEM form.
    pub fn rsa_pem(public_key_pem: &[u8]) -> Result<Self, JwtError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| JwtError::InvalidKey(e.to_string()))?;
        Ok(KeySource::Static {
            key,
            algorithm: Algorithm::RS256,
        })
    }

    /// Keys discovered from the authority's JWKS document.
    pub fn jwks(cache: JwksCache) -> Self {
        KeySource::Jwks(cache)
    }

    async fn resolve(&self, kid: Option<&str>) -> Result<(DecodingKey, Algorithm), JwtError> {
        match self {
            KeySource::Static { key, algorithm } => Ok((key.clone(), *algorithm)),
            KeySource::Jwks(cache) => Ok((cache.decoding_key(kid).await?, Algorithm::RS256)),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            KeySource::Static { .. } => "static",
            KeySource::Jwks(_) => "jwks",
        }
    }
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySource").field("kind", &self.describe()).finish()
    }
}

/// Validates caller access tokens.
#[derive(Debug)]
pub struct JwtValidator {
    keys: KeySource,
    issuer: Option<String>,
    audience: Option<String>,
    leeway: u64,
}

impl JwtValidator {
    /// Creates a validator using the given key source.
    pub fn new(keys: KeySource) -> Self {
        Self {
            keys,
            issuer: None,
            audience: None,
            leeway: DEFAULT_LEEWAY_SECS,
        }
    }

    /// Sets the expected issuer. A trailing `/` is ignored.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();
        self.issuer = Some(issuer.trim_end_matches('/').to_string());
        self
    }

    /// Sets the expected audience.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the clock skew tolerance.
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = seconds;
        self
    }

    /// Returns the expected issuer.
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// Validates a token and returns its claims.
    pub async fn validate(&self, token: &str) -> Result<TokenData<CallerClaims>, JwtError> {
        let header = decode_header(token)?;
        let (key, algorithm) = self.keys.resolve(header.kid.as_deref()).await?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = self.leeway;
        validation.validate_exp = true;
        validation.validate_nbf = true;

        let mut required = vec!["exp"];
        match &self.issuer {
            Some(issuer) => {
                validation.set_issuer(&[issuer.as_str()]);
                required.push("iss");
            }
            None => validation.iss = None,
        }
        match &self.audience {
            Some(audience) => {
                validation.set_audience(&[audience.as_str()]);
                required.push("aud");
            }
            None => validation.validate_aud = false,
        }
        validation.set_required_spec_claims(&required);

        decode::<CallerClaims>(token, &key, &validation).map_err(JwtError::from)
    }
}
