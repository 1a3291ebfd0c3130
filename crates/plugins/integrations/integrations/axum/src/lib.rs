//! # Gridhook Axum Integration
//!
//! This crate provides the HTTP front end for the webhook dispatcher:
//! - Route mounting for the CloudEvents, Event Grid and generic endpoints
//! - Conversion between axum requests/responses and the core types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use axum::Router;
//! use gridhook_axum::webhook_routes;
//!
//! let app = Router::new().nest("/api", webhook_routes(dispatcher, "Production"));
//! ```

mod routes;

pub use routes::webhook_routes;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use gridhook_core::{Method, Request as WebhookRequest, Response as WebhookResponse};
use gridhook_webhooks::Decision;
use std::collections::HashMap;

/// Converts an axum request into a webhook request, keeping the raw body.
///
/// Returns `None` for a method the core request type cannot represent.
pub fn to_webhook_request(
    method: &axum::http::Method,
    uri: &axum::http::Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Option<WebhookRequest> {
    let method = Method::parse(method.as_str())?;

    let mut webhook_headers = HashMap::new();
    for (key, value) in headers.iter() {
        if let Ok(v) = value.to_str() {
            webhook_headers.insert(key.as_str().to_lowercase(), v.to_string());
        }
    }

    Some(WebhookRequest {
        method,
        path: uri.path().to_string(),
        headers: webhook_headers,
        body: body.to_vec(),
    })
}

/// Converts a webhook response to an axum response.
pub fn to_axum_response(webhook_response: WebhookResponse) -> Response {
    let status =
        StatusCode::from_u16(webhook_response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = if let Some(body) = webhook_response.body {
        axum::Json(body).into_response()
    } else {
        status.into_response()
    };

    *response.status_mut() = status;

    for (key, value) in webhook_response.headers {
        if let (Ok(name), Ok(val)) = (
            axum::http::header::HeaderName::try_from(key),
            axum::http::header::HeaderValue::try_from(value),
        ) {
            response.headers_mut().insert(name, val);
        }
    }

    response
}

/// Wrapper for a dispatch decision that implements IntoResponse.
pub struct DecisionResponse(pub Decision);

impl IntoResponse for DecisionResponse {
    fn into_response(self) -> Response {
        to_axum_response(self.0.into_response())
    }
}

impl From<Decision> for DecisionResponse {
    fn from(decision: Decision) -> Self {
        DecisionResponse(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_to_webhook_request() {
        let mut headers = HeaderMap::new();
        headers.insert("Aeg-Signature", HeaderValue::from_static("abc="));
        headers.insert("x-binary", HeaderValue::from_bytes(&[0xff]).unwrap());

        let uri: axum::http::Uri = "/api/eventgrid?code=1".parse().unwrap();
        let request = to_webhook_request(
            &axum::http::Method::POST,
            &uri,
            &headers,
            Bytes::from_static(b"[]"),
        )
        .unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/api/eventgrid");
        assert_eq!(request.header("aeg-signature"), Some("abc="));
        assert!(!request.has_header("x-binary"));
        assert_eq!(request.body, b"[]");
    }

    #[test]
    fn test_unknown_method_is_not_converted() {
        let uri: axum::http::Uri = "/api/eventgrid".parse().unwrap();
        for method in [axum::http::Method::TRACE, axum::http::Method::CONNECT] {
            let request = to_webhook_request(&method, &uri, &HeaderMap::new(), Bytes::new());
            assert!(request.is_none(), "{}", method);
        }
    }

    #[test]
    fn test_to_axum_response() {
        let response = to_axum_response(
            WebhookResponse::new(403).json(serde_json::json!({"error": "Unauthorized topic"})),
        );
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );

        let response = to_axum_response(
            WebhookResponse::ok().header("WebHook-Allowed-Rate", "120"),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("webhook-allowed-rate").unwrap(), "120");
    }
}
