//! Core traits for Gridhook.
//!
//! This module defines the seam between the dispatch coordinator and the
//! caller-authentication layer that sits above webhook signatures.

use async_trait::async_trait;

use crate::error::ValidationResult;
use crate::router::Request;
use crate::types::CallerIdentity;

/// Establishes and authorizes the identity of the party delivering a webhook.
///
/// Implementations return `ValidationError::Unauthenticated` when no identity
/// can be established and `ValidationError::Forbidden` when the identity fails
/// the configured policy.
#[async_trait]
pub trait CallerAuthenticator: Send + Sync {
    /// Short name used in logs.
    fn scheme(&self) -> &'static str;

    /// Authenticates and authorizes the caller of `request`.
    async fn authenticate(&self, request: &Request) -> ValidationResult<CallerIdentity>;
}
