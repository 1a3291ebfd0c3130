//! Dispatch coordinator - main entry point.
//!
//! Runs one delivery through
//! `Start → HandshakeCheck → {HandshakeResponse | AuthCheck → EnvelopeParse →
//! SignatureCheck → TopicCheck → Accepted}`, with `Rejected` reachable from
//! every non-terminal state. Every outcome is a [`Decision`]; neither errors
//! nor collaborator panics escape.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

use gridhook_core::{
    CallerAuthenticator, Request, Response, SecretSource, StaticSecret, ValidationError,
    ValidationResult,
};

use crate::envelope::{Envelope, EnvelopeHint, decode_document, envelope_from_document};
use crate::handshake::{Handshake, HandshakeNegotiator, PreflightSettings};
use crate::signature;
use crate::topic::TopicAllowList;

/// How the caller is authenticated before the envelope is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStrategy {
    /// Require a bearer token accepted by the configured authenticator.
    Bearer,
    /// Rely on the payload signature alone.
    #[default]
    SignatureOnly,
}

/// What to do with a delivery that carries no signature header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSignaturePolicy {
    /// Accept it without verification.
    Skip,
    /// Reject it as unsigned.
    #[default]
    Reject,
}

/// Dispatch configuration.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    /// Caller authentication strategy.
    pub auth_strategy: AuthStrategy,
    /// Policy for unsigned deliveries.
    pub missing_signature: MissingSignaturePolicy,
    /// Preflight handshake settings.
    pub preflight: PreflightSettings,
}

impl DispatchConfig {
    /// Creates a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the authentication strategy.
    pub fn auth_strategy(mut self, strategy: AuthStrategy) -> Self {
        self.auth_strategy = strategy;
        self
    }

    /// Sets the missing signature policy.
    pub fn missing_signature(mut self, policy: MissingSignaturePolicy) -> Self {
        self.missing_signature = policy;
        self
    }

    /// Sets the preflight settings.
    pub fn preflight(mut self, preflight: PreflightSettings) -> Self {
        self.preflight = preflight;
        self
    }
}

/// Coordinator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Start,
    HandshakeCheck,
    HandshakeResponse,
    AuthCheck,
    EnvelopeParse,
    SignatureCheck,
    TopicCheck,
    Accepted,
    Rejected,
}

impl DispatchState {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchState::Start => "start",
            DispatchState::HandshakeCheck => "handshake_check",
            DispatchState::HandshakeResponse => "handshake_response",
            DispatchState::AuthCheck => "auth_check",
            DispatchState::EnvelopeParse => "envelope_parse",
            DispatchState::SignatureCheck => "signature_check",
            DispatchState::TopicCheck => "topic_check",
            DispatchState::Accepted => "accepted",
            DispatchState::Rejected => "rejected",
        }
    }
}

/// Outcome of one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// A handshake was answered.
    Handshake(Handshake),
    /// The delivery is authentic and authorized; the envelope may be processed.
    Accepted(Envelope),
    /// The delivery was refused.
    Rejected(ValidationError),
}

impl Decision {
    /// Returns the rejection, if any.
    pub fn rejection(&self) -> Option<&ValidationError> {
        match self {
            Decision::Rejected(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if the delivery was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted(_))
    }

    /// Renders the decision for the HTTP front end.
    pub fn into_response(self) -> Response {
        match self {
            Decision::Handshake(handshake) => handshake.into_response(),
            Decision::Accepted(_) => Response::ok(),
            Decision::Rejected(err) => Response::new(err.status_code()).json(json!({
                "error": err.public_message(),
                "reason": err.public_reason(),
                "code": err.status_code(),
            })),
        }
    }
}

/// The dispatch coordinator.
///
/// Holds only immutable configuration, so one instance behind an `Arc`
/// serves any number of concurrent deliveries without locking.
pub struct WebhookDispatcher {
    config: DispatchConfig,
    handshake: HandshakeNegotiator,
    allow_list: TopicAllowList,
    secrets: Arc<dyn SecretSource>,
    authenticator: Option<Arc<dyn CallerAuthenticator>>,
}

impl WebhookDispatcher {
    /// Starts building a dispatcher.
    pub fn builder() -> WebhookDispatcherBuilder {
        WebhookDispatcherBuilder::default()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Gets the topic allow-list.
    pub fn allow_list(&self) -> &TopicAllowList {
        &self.allow_list
    }

    /// Handles a delivery, deriving the envelope hint from `Content-Type`.
    pub async fn dispatch(&self, request: &Request) -> Decision {
        let hint = EnvelopeHint::from_content_type(request.header("content-type"));
        self.dispatch_with_hint(request, hint).await
    }

    /// Handles a delivery whose route fixes the expected envelope variant.
    pub async fn dispatch_with_hint(&self, request: &Request, hint: EnvelopeHint) -> Decision {
        let span = tracing::info_span!(
            "dispatch",
            delivery_id = %uuid::Uuid::new_v4(),
            method = %request.method,
            path = %request.path,
        );

        async {
            let mut state = DispatchState::Start;
            let outcome = AssertUnwindSafe(self.run(request, hint, &mut state))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(decision)) => decision,
                Ok(Err(err)) => self.reject(state, err, request),
                Err(payload) => {
                    let err = ValidationError::internal(format!(
                        "panic during {}: {}",
                        state.as_str(),
                        panic_message(payload.as_ref())
                    ));
                    self.reject(state, err, request)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        request: &Request,
        hint: EnvelopeHint,
        state: &mut DispatchState,
    ) -> ValidationResult<Decision> {
        advance(state, DispatchState::HandshakeCheck);

        if HandshakeNegotiator::is_preflight(request) {
            let handshake = self.handshake.preflight(request)?;
            advance(state, DispatchState::HandshakeResponse);
            return Ok(Decision::Handshake(handshake));
        }

        let document = decode_document(&request.body);
        if let Some(signal) = HandshakeNegotiator::detect(request, document.as_ref().ok()) {
            tracing::info!(signal = signal.as_str(), "Subscription validation detected");
            let document = document?;
            let handshake = self.handshake.validate_subscription(&document)?;
            advance(state, DispatchState::HandshakeResponse);
            return Ok(Decision::Handshake(handshake));
        }

        advance(state, DispatchState::AuthCheck);
        self.authenticate(request).await?;

        advance(state, DispatchState::EnvelopeParse);
        let envelope = envelope_from_document(document?, hint)?;
        tracing::debug!(
            kind = envelope.kind().as_str(),
            events = envelope.len(),
            "Envelope parsed"
        );

        advance(state, DispatchState::SignatureCheck);
        self.check_signature(request, &envelope).await?;

        advance(state, DispatchState::TopicCheck);
        self.check_topics(&envelope)?;

        advance(state, DispatchState::Accepted);
        for (event_id, topic) in envelope.origins() {
            tracing::info!(event_id = %event_id, topic = %topic, "Event accepted");
        }
        Ok(Decision::Accepted(envelope))
    }

    async fn authenticate(&self, request: &Request) -> ValidationResult<()> {
        match self.config.auth_strategy {
            AuthStrategy::SignatureOnly => {
                tracing::debug!("Signature-only strategy, no caller authentication");
                Ok(())
            }
            AuthStrategy::Bearer => {
                let authenticator = self.authenticator.as_ref().ok_or_else(|| {
                    ValidationError::config("bearer strategy without an authenticator")
                })?;
                let identity = authenticator.authenticate(request).await?;
                tracing::info!(
                    scheme = authenticator.scheme(),
                    subject = %identity.subject,
                    application_id = identity.application_id.as_deref().unwrap_or("-"),
                    "Caller authenticated"
                );
                Ok(())
            }
        }
    }

    async fn check_signature(&self, request: &Request, envelope: &Envelope) -> ValidationResult<()> {
        let header = envelope.kind().signature_header();

        let Some(provided) = request.header(header) else {
            return match self.config.missing_signature {
                MissingSignaturePolicy::Skip => {
                    tracing::info!(header, "No signature header, skipping signature validation");
                    Ok(())
                }
                MissingSignaturePolicy::Reject => Err(ValidationError::MissingSignature {
                    header: header.to_string(),
                }),
            };
        };

        let key = self.secrets.validation_key().await?;
        if key.is_none() {
            tracing::warn!(
                source = self.secrets.name(),
                "Validation key is not configured"
            );
        }

        signature::check(key.as_ref(), &request.body, provided)?;
        tracing::debug!(header, "Signature validated");
        Ok(())
    }

    fn check_topics(&self, envelope: &Envelope) -> ValidationResult<()> {
        for (event_id, topic) in envelope.origins() {
            if let Err(err) = self.allow_list.authorize(topic) {
                match &err {
                    ValidationError::NoAllowListConfigured => {
                        tracing::warn!("No allowed topics configured")
                    }
                    _ => tracing::warn!(
                        event_id = %event_id,
                        topic = %truncate(topic, 256),
                        "Topic is not in the list of allowed topics"
                    ),
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn reject(&self, state: DispatchState, err: ValidationError, request: &Request) -> Decision {
        let detail = err.to_string();
        if err.is_client_error() {
            tracing::warn!(
                from = state.as_str(),
                to = DispatchState::Rejected.as_str(),
                reason = err.reason(),
                detail = %truncate(&detail, 256),
                "Delivery rejected"
            );
        } else {
            tracing::error!(
                from = state.as_str(),
                to = DispatchState::Rejected.as_str(),
                error = %detail,
                "Delivery failed with an internal error"
            );
        }

        let preview = &request.body[..request.body.len().min(1024)];
        tracing::trace!(
            body = %String::from_utf8_lossy(preview),
            body_len = request.body.len(),
            "Rejected delivery body"
        );

        Decision::Rejected(err)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Builder for [`WebhookDispatcher`].
#[derive(Default)]
pub struct WebhookDispatcherBuilder {
    config: DispatchConfig,
    allow_list: TopicAllowList,
    secrets: Option<Arc<dyn SecretSource>>,
    authenticator: Option<Arc<dyn CallerAuthenticator>>,
}

impl WebhookDispatcherBuilder {
    /// Sets the configuration.
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the topic allow-list.
    pub fn allow_list(mut self, allow_list: TopicAllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Sets the validation key source.
    pub fn secrets(mut self, secrets: Arc<dyn SecretSource>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Sets the caller authenticator used by the bearer strategy.
    pub fn authenticator(mut self, authenticator: Arc<dyn CallerAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Builds the dispatcher.
    ///
    /// Fails if the bearer strategy is selected without an authenticator.
    pub fn build(self) -> ValidationResult<WebhookDispatcher> {
        if self.config.auth_strategy == AuthStrategy::Bearer && self.authenticator.is_none() {
            return Err(ValidationError::config(
                "auth strategy 'bearer' requires a caller authenticator",
            ));
        }

        if self.allow_list.is_empty() {
            tracing::warn!("Topic allow-list is empty, every event will be rejected");
        }

        Ok(WebhookDispatcher {
            handshake: HandshakeNegotiator::new(self.config.preflight.clone()),
            config: self.config,
            allow_list: self.allow_list,
            secrets: self
                .secrets
                .unwrap_or_else(|| Arc::new(StaticSecret::none())),
            authenticator: self.authenticator,
        })
    }
}

fn advance(state: &mut DispatchState, next: DispatchState) {
    tracing::debug!(from = state.as_str(), to = next.as_str(), "Dispatch transition");
    *state = next;
}

/// Cuts `value` to at most `max` bytes on a char boundary.
pub(crate) fn truncate(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
