//! Error types for Gridhook.
//!
//! This module defines the `ValidationError` enum which represents every
//! reason a webhook delivery can be rejected. Each variant maps to exactly one
//! HTTP status and one fixed public message; the detail strings carried by
//! some variants are for logs only and never reach the caller.

use thiserror::Error;

/// The main error type for Gridhook operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    // ==================== Envelope Errors ====================
    /// The body is not well-formed JSON, or has the wrong shape.
    #[error("Malformed envelope: {detail}")]
    MalformedEnvelope { detail: String },

    /// The body decoded to `null` or an empty array.
    #[error("Empty or invalid envelope")]
    EmptyOrInvalidEnvelope,

    // ==================== Handshake Errors ====================
    /// A subscription validation was signalled but no usable code was found.
    #[error("Invalid handshake payload: {detail}")]
    InvalidHandshakePayload { detail: String },

    /// A preflight request carried a missing or unexpected origin.
    #[error("Invalid handshake origin: {origin}")]
    InvalidHandshakeOrigin { origin: String },

    // ==================== Signature Errors ====================
    /// No validation key is configured, so signatures cannot be checked.
    #[error("Signing key missing")]
    SigningKeyMissing,

    /// The delivery carries no signature and the policy requires one.
    #[error("Missing signature header '{header}'")]
    MissingSignature { header: String },

    /// The provided signature does not match the body.
    #[error("Invalid signature")]
    InvalidSignature,

    // ==================== Topic Errors ====================
    /// The allow-list is empty; nothing can be authorized.
    #[error("No allow-list configured")]
    NoAllowListConfigured,

    /// The topic does not start with any allow-listed prefix.
    #[error("Topic not allowed: {topic}")]
    TopicNotAllowed { topic: String },

    // ==================== Caller Errors ====================
    /// The caller's identity could not be established.
    #[error("Unauthenticated: {detail}")]
    Unauthenticated { detail: String },

    /// The caller is authenticated but fails the authorization policy.
    #[error("Forbidden: {detail}")]
    Forbidden { detail: String },

    // ==================== Internal Errors ====================
    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Anything not covered above.
    #[error("Internal failure: {message}")]
    InternalFailure { message: String },
}

impl ValidationError {
    /// Creates a new malformed envelope error.
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            detail: detail.into(),
        }
    }

    /// Creates a new invalid handshake payload error.
    pub fn invalid_handshake(detail: impl Into<String>) -> Self {
        Self::InvalidHandshakePayload {
            detail: detail.into(),
        }
    }

    /// Creates a new unauthenticated error.
    pub fn unauthenticated(detail: impl Into<String>) -> Self {
        Self::Unauthenticated {
            detail: detail.into(),
        }
    }

    /// Creates a new forbidden error.
    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::Forbidden {
            detail: detail.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalFailure {
            message: message.into(),
        }
    }

    /// Returns the taxonomy name of this error, used as the `reason` field.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MalformedEnvelope { .. } => "MalformedEnvelope",
            Self::EmptyOrInvalidEnvelope => "EmptyOrInvalidEnvelope",
            Self::InvalidHandshakePayload { .. } => "InvalidHandshakePayload",
            Self::InvalidHandshakeOrigin { .. } => "InvalidHandshakeOrigin",
            Self::SigningKeyMissing => "SigningKeyMissing",
            Self::MissingSignature { .. } => "MissingSignature",
            Self::InvalidSignature => "InvalidSignature",
            Self::NoAllowListConfigured => "NoAllowListConfigured",
            Self::TopicNotAllowed { .. } => "TopicNotAllowed",
            Self::Unauthenticated { .. } => "Unauthenticated",
            Self::Forbidden { .. } => "Forbidden",
            Self::Configuration { .. } | Self::InternalFailure { .. } => "InternalFailure",
        }
    }

    /// Returns the `reason` reported to the caller.
    pub fn public_reason(&self) -> &'static str {
        match self {
            Self::SigningKeyMissing => "InvalidSignature",
            other => other.reason(),
        }
    }

    /// Returns the fixed message safe to send back to the caller.
    ///
    /// A missing signing key answers like a bad signature so the sender
    /// cannot probe for misconfiguration.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MalformedEnvelope { .. } => "Invalid event format",
            Self::EmptyOrInvalidEnvelope => "Invalid event format or empty event list",
            Self::InvalidHandshakePayload { .. } => {
                "Unable to process validation event. Check logs for details."
            }
            Self::InvalidHandshakeOrigin { .. } => "Unauthorized origin",
            Self::SigningKeyMissing | Self::InvalidSignature => "Invalid signature",
            Self::MissingSignature { .. } => "Missing signature",
            Self::NoAllowListConfigured | Self::TopicNotAllowed { .. } => "Unauthorized topic",
            Self::Unauthenticated { .. } => "Authentication required",
            Self::Forbidden { .. } => "Forbidden",
            Self::Configuration { .. } | Self::InternalFailure { .. } => "Internal server error",
        }
    }

    /// Returns true if this error was caused by the delivery (vs the server).
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::Configuration { .. } | Self::InternalFailure { .. }
        )
    }

    /// Returns an HTTP status code appropriate for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedEnvelope { .. }
            | Self::EmptyOrInvalidEnvelope
            | Self::InvalidHandshakePayload { .. }
            | Self::InvalidHandshakeOrigin { .. } => 400,
            Self::SigningKeyMissing
            | Self::MissingSignature { .. }
            | Self::InvalidSignature
            | Self::Unauthenticated { .. } => 401,
            Self::NoAllowListConfigured | Self::TopicNotAllowed { .. } | Self::Forbidden { .. } => {
                403
            }
            Self::Configuration { .. } | Self::InternalFailure { .. } => 500,
        }
    }
}

/// A Result type alias using ValidationError.
pub type ValidationResult<T> = Result<T, ValidationError>;

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedEnvelope {
            detail: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ValidationError {
    fn from(err: std::io::Error) -> Self {
        Self::InternalFailure {
            message: err.to_string(),
        }
    }
}
