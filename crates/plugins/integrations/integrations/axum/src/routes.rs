//! Route mounting for the webhook endpoints.

use axum::Router;
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use gridhook_webhooks::{EnvelopeHint, WebhookDispatcher};
use serde_json::json;
use std::sync::Arc;

use crate::{DecisionResponse, to_webhook_request};

/// Creates an axum router with the webhook endpoints.
///
/// - `POST|OPTIONS /cloudevents`: single CloudEvents deliveries
/// - `POST|OPTIONS /eventgrid`: Event Grid schema batches
/// - `POST|OPTIONS /webhook`: either, by `Content-Type`
/// - `GET /eventgrid/test`: liveness probe for operators
///
/// # Example
///
/// ```rust,ignore
/// let app = Router::new().nest("/api", webhook_routes(dispatcher, "Staging"));
/// ```
pub fn webhook_routes<S>(dispatcher: Arc<WebhookDispatcher>, environment: impl Into<String>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/cloudevents",
            post(cloud_events_handler).options(cloud_events_handler),
        )
        .route(
            "/eventgrid",
            post(event_grid_handler).options(event_grid_handler),
        )
        .route("/eventgrid/test", get(test_handler))
        .route("/webhook", post(webhook_handler).options(webhook_handler))
        .with_state(WebhookState {
            dispatcher,
            environment: Arc::from(environment.into()),
        })
}

/// Shared state for webhook routes.
#[derive(Clone)]
struct WebhookState {
    dispatcher: Arc<WebhookDispatcher>,
    environment: Arc<str>,
}

async fn cloud_events_handler(
    State(state): State<WebhookState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(request) = to_webhook_request(&method, &uri, &headers, body) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };
    let decision = state
        .dispatcher
        .dispatch_with_hint(&request, EnvelopeHint::Single)
        .await;
    DecisionResponse(decision).into_response()
}

async fn event_grid_handler(
    State(state): State<WebhookState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(request) = to_webhook_request(&method, &uri, &headers, body) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };
    let decision = state
        .dispatcher
        .dispatch_with_hint(&request, EnvelopeHint::Batch)
        .await;
    DecisionResponse(decision).into_response()
}

async fn webhook_handler(
    State(state): State<WebhookState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(request) = to_webhook_request(&method, &uri, &headers, body) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };
    DecisionResponse(state.dispatcher.dispatch(&request).await).into_response()
}

async fn test_handler(State(state): State<WebhookState>) -> Response {
    tracing::info!("Test endpoint called");
    axum::Json(json!({
        "message": "Event Grid webhook endpoint is working",
        "timestamp": chrono::Utc::now(),
        "environment": state.environment.as_ref(),
    }))
    .into_response()
}
