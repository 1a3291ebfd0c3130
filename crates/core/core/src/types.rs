//! Shared data types.

use serde::{Deserialize, Serialize};

/// An authenticated webhook caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Subject claim.
    pub subject: String,
    /// Token issuer.
    pub issuer: Option<String>,
    /// Calling application id (`appid` or `azp`).
    pub application_id: Option<String>,
}

impl CallerIdentity {
    /// Creates an identity for `subject`.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            issuer: None,
            application_id: None,
        }
    }

    /// Sets the issuer.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Sets the application id.
    pub fn with_application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }
}
