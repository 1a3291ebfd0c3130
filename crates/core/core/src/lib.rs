//! # Gridhook Core
//!
//! This crate provides the foundational types and traits for Gridhook.
//! It defines the rejection taxonomy (`ValidationError`), the
//! framework-agnostic `Request`/`Response` pair handed between the HTTP front
//! end and the validation core, and the collaborator traits the core calls
//! into (`SecretSource`, `CallerAuthenticator`).

pub mod error;
pub mod router;
pub mod secret;
pub mod traits;
pub mod types;

// Re-export commonly used items at the crate root
pub use error::{ValidationError, ValidationResult};
pub use router::{Method, Request, Response};
pub use secret::{EnvSecret, FileSecret, SecretSource, StaticSecret, ValidationKey};
pub use traits::CallerAuthenticator;
pub use types::CallerIdentity;
