//! # Gridhook Webhooks
//!
//! Validation pipeline for Event Grid push deliveries:
//! - Preflight and subscription validation handshakes
//! - CloudEvents and Event Grid envelope parsing
//! - HMAC signature verification
//! - Topic allow-list authorization
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gridhook_core::{Request, StaticSecret};
//! use gridhook_webhooks::{TopicAllowList, WebhookDispatcher};
//!
//! let dispatcher = WebhookDispatcher::builder()
//!     .allow_list(TopicAllowList::new(["/subscriptions/my-sub"]))
//!     .secrets(Arc::new(StaticSecret::new("validation-key")))
//!     .build()?;
//!
//! let response = dispatcher.dispatch(&request).await.into_response();
//! ```

mod dispatch;
mod envelope;
mod handshake;
mod signature;
mod topic;

pub use dispatch::{
    AuthStrategy, Decision, DispatchConfig, DispatchState, MissingSignaturePolicy,
    WebhookDispatcher, WebhookDispatcherBuilder,
};
pub use envelope::{
    CLOUD_EVENTS_CONTENT_TYPE, CloudEvent, Envelope, EnvelopeHint, EnvelopeKind, GridEvent,
    decode_document, parse_envelope,
};
pub use handshake::{
    EVENT_TYPE_HEADER, Handshake, HandshakeNegotiator, PreflightSettings,
    SUBSCRIPTION_VALIDATION_EVENT_TYPE, ValidationSignal,
};
pub use signature::{
    CLOUD_EVENT_SIGNATURE_HEADER, EVENT_GRID_SIGNATURE_HEADER, EventSigner, sign, verify,
};
pub use topic::TopicAllowList;
