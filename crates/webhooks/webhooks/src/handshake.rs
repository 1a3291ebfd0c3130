//! Subscription-validation handshake.
//!
//! Event Grid proves endpoint ownership before activating a subscription,
//! either with a CloudEvents abuse-protection preflight (`OPTIONS`) or by
//! posting a `SubscriptionValidationEvent` whose `validationCode` must be
//! echoed back. Both exchanges happen before the sender can authenticate, so
//! nothing here consults the caller authenticator.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use gridhook_core::{Method, Request, Response, ValidationError, ValidationResult};

use crate::dispatch::truncate;
use crate::envelope::json_kind;

/// Event type of an Event Grid subscription validation event.
pub const SUBSCRIPTION_VALIDATION_EVENT_TYPE: &str = "Microsoft.EventGrid.SubscriptionValidationEvent";

/// Header naming the Event Grid delivery type.
pub const EVENT_TYPE_HEADER: &str = "aeg-event-type";

/// `aeg-event-type` value announcing a validation handshake.
pub const SUBSCRIPTION_VALIDATION_HEADER_VALUE: &str = "SubscriptionValidation";

/// Preflight origin header.
pub const ORIGIN_HEADER: &str = "origin";

/// CloudEvents HTTP webhook origin header, consulted when `Origin` is absent.
pub const REQUEST_ORIGIN_HEADER: &str = "webhook-request-origin";

/// Preflight response header granting the origin.
pub const ALLOWED_ORIGIN_HEADER: &str = "WebHook-Allowed-Origin";

/// Preflight response header advertising the accepted request rate.
pub const ALLOWED_RATE_HEADER: &str = "WebHook-Allowed-Rate";

/// Preflight configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightSettings {
    /// Origin the sender must present.
    pub expected_origin: String,
    /// Value of `WebHook-Allowed-Rate` (requests per minute, or `*`).
    pub allowed_rate: String,
}

impl Default for PreflightSettings {
    fn default() -> Self {
        Self {
            expected_origin: "azure-eventing.net".to_string(),
            allowed_rate: "120".to_string(),
        }
    }
}

/// What announced a subscription validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSignal {
    /// `aeg-event-type: SubscriptionValidation`.
    Header,
    /// A validation event found in the body.
    Body,
}

impl ValidationSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationSignal::Header => "header",
            ValidationSignal::Body => "body",
        }
    }
}

/// A completed handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// Preflight accepted.
    Preflight {
        allowed_origin: String,
        allowed_rate: String,
    },
    /// Validation code to echo back.
    SubscriptionValidation {
        validation_code: String,
        validation_url: Option<String>,
    },
}

impl Handshake {
    /// Renders the response the sender expects.
    pub fn into_response(self) -> Response {
        match self {
            Handshake::Preflight {
                allowed_origin,
                allowed_rate,
            } => Response::ok()
                .header(ALLOWED_ORIGIN_HEADER, allowed_origin)
                .header(ALLOWED_RATE_HEADER, allowed_rate),
            Handshake::SubscriptionValidation {
                validation_code, ..
            } => Response::ok().json(json!({ "validationResponse": validation_code })),
        }
    }
}

/// Recognizes and answers handshake requests.
#[derive(Debug, Clone, Default)]
pub struct HandshakeNegotiator {
    preflight: PreflightSettings,
}

impl HandshakeNegotiator {
    /// Creates a negotiator.
    pub fn new(preflight: PreflightSettings) -> Self {
        Self { preflight }
    }

    /// Returns the preflight settings.
    pub fn preflight_settings(&self) -> &PreflightSettings {
        &self.preflight
    }

    /// Returns true for a preflight request. The body is not looked at.
    pub fn is_preflight(request: &Request) -> bool {
        request.method == Method::OPTIONS
    }

    /// Detects a subscription validation, header signal first.
    ///
    /// `document` is the decoded body, if it decoded. An undecodable body is
    /// never a body signal.
    pub fn detect(request: &Request, document: Option<&Value>) -> Option<ValidationSignal> {
        let header = request
            .header(EVENT_TYPE_HEADER)
            .map(str::trim)
            .is_some_and(|v| v.eq_ignore_ascii_case(SUBSCRIPTION_VALIDATION_HEADER_VALUE));
        if header {
            return Some(ValidationSignal::Header);
        }

        if document.is_some_and(contains_validation_event) {
            return Some(ValidationSignal::Body);
        }

        None
    }

    /// Answers a preflight request.
    pub fn preflight(&self, request: &Request) -> ValidationResult<Handshake> {
        let origin = request
            .header(ORIGIN_HEADER)
            .or_else(|| request.header(REQUEST_ORIGIN_HEADER))
            .map(str::trim)
            .filter(|o| !o.is_empty());

        let Some(origin) = origin else {
            tracing::warn!("Preflight request missing Origin header");
            return Err(ValidationError::InvalidHandshakeOrigin {
                origin: String::new(),
            });
        };

        if !origin.eq_ignore_ascii_case(&self.preflight.expected_origin) {
            tracing::warn!(
                origin = %truncate(origin, 128),
                "Preflight request from unauthorized origin"
            );
            return Err(ValidationError::InvalidHandshakeOrigin {
                origin: truncate(origin, 128).to_string(),
            });
        }

        tracing::info!(origin = %origin, "Preflight origin confirmed");
        Ok(Handshake::Preflight {
            allowed_origin: self.preflight.expected_origin.clone(),
            allowed_rate: self.preflight.allowed_rate.clone(),
        })
    }

    /// Extracts the validation code from a decoded batch.
    ///
    /// Only the validation event itself is inspected; sibling elements and
    /// fields other than `eventType` and `data` may take any shape.
    pub fn validate_subscription(&self, document: &Value) -> ValidationResult<Handshake> {
        let items = match document {
            Value::Null => return Err(ValidationError::EmptyOrInvalidEnvelope),
            Value::Array(items) if items.is_empty() => {
                return Err(ValidationError::EmptyOrInvalidEnvelope);
            }
            Value::Array(items) => items,
            other => {
                return Err(ValidationError::malformed(format!(
                    "expected an array of events, found {}",
                    json_kind(other)
                )));
            }
        };

        let Some(event) = items.iter().find(|item| is_validation_event(item)) else {
            tracing::warn!(
                events = items.len(),
                "Handshake payload carries no subscription validation event"
            );
            return Err(ValidationError::invalid_handshake(
                "no subscription validation event",
            ));
        };

        let event_id = string_field(Some(event), "id").unwrap_or("-");
        let data = event.get("data").filter(|d| !d.is_null());
        let Some(code) = string_field(data, "validationCode") else {
            tracing::warn!(
                event_id = %truncate(event_id, 128),
                data_shape = %describe_shape(data),
                "Validation event structure invalid or validationCode missing, empty or not a string"
            );
            return Err(ValidationError::invalid_handshake(format!(
                "validationCode unusable in event {}",
                truncate(event_id, 128)
            )));
        };

        let validation_url = string_field(data, "validationUrl").map(str::to_string);
        if let Some(url) = &validation_url {
            tracing::info!(
                event_id = %truncate(event_id, 128),
                validation_url = %truncate(url, 256),
                "Validation URL offered for manual handshake"
            );
        }

        Ok(Handshake::SubscriptionValidation {
            validation_code: code.to_string(),
            validation_url,
        })
    }
}

/// Returns true if `document` is an array holding a validation event.
pub fn contains_validation_event(document: &Value) -> bool {
    document
        .as_array()
        .is_some_and(|items| items.iter().any(is_validation_event))
}

/// Event type compared ignoring case.
fn is_validation_event(item: &Value) -> bool {
    string_field(Some(item), "eventType")
        .is_some_and(|t| t.eq_ignore_ascii_case(SUBSCRIPTION_VALIDATION_EVENT_TYPE))
}

/// Typed optional lookup: a non-empty string field of an object, or `None`.
fn string_field<'a>(value: Option<&'a Value>, field: &str) -> Option<&'a str> {
    value?
        .as_object()?
        .get(field)?
        .as_str()
        .filter(|s| !s.is_empty())
}

/// Describes a payload without echoing its values.
fn describe_shape(data: Option<&Value>) -> String {
    match data {
        None => "missing".to_string(),
        Some(Value::Object(map)) => {
            let keys: Vec<&str> = map.keys().take(16).map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        Some(other) => json_kind(other).to_string(),
    }
}
