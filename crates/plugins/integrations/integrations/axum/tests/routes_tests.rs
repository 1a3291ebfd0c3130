//! HTTP-level tests for the webhook routes.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use gridhook_core::StaticSecret;
use gridhook_webhooks::{
    DispatchConfig, MissingSignaturePolicy, TopicAllowList, WebhookDispatcher, sign,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const KEY: &str = "route-test-key";
const TOPIC: &str = "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.EventGrid/topics/t";

fn app() -> Router {
    let dispatcher = WebhookDispatcher::builder()
        .config(DispatchConfig::new().missing_signature(MissingSignaturePolicy::Reject))
        .allow_list(TopicAllowList::new(["/subscriptions/sub-1"]))
        .secrets(Arc::new(StaticSecret::new(KEY)))
        .build()
        .unwrap();

    Router::new().nest("/api", gridhook_axum::webhook_routes(Arc::new(dispatcher), "Test"))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("POST").uri(uri)
}

mod route_tests {
    use super::*;

    #[tokio::test]
    async fn test_signed_cloud_event() {
        let body = json!({"id": "1", "source": TOPIC, "type": "x", "specversion": "1.0"}).to_string();
        let request = post("/api/cloudevents")
            .header("content-type", "application/cloudevents+json")
            .header("ce-signature", sign(KEY, body.as_bytes()))
            .body(Body::from(body))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_subscription_validation() {
        let body = json!([{
            "id": "v-1",
            "topic": TOPIC,
            "eventType": "Microsoft.EventGrid.SubscriptionValidationEvent",
            "data": {"validationCode": "abc123"},
            "dataVersion": "2",
        }])
        .to_string();
        let request = post("/api/eventgrid")
            .header("aeg-event-type", "SubscriptionValidation")
            .body(Body::from(body))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"validationResponse": "abc123"}));
    }

    #[tokio::test]
    async fn test_preflight() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/webhook")
            .header("WebHook-Request-Origin", "azure-eventing.net")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("webhook-allowed-origin").unwrap(),
            "azure-eventing.net"
        );
    }

    #[tokio::test]
    async fn test_unsigned_batch_rejected() {
        let body = json!([{"id": "1", "eventType": "x", "topic": TOPIC}]).to_string();
        let request = post("/api/eventgrid")
            .body(Body::from(body))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json_body(response).await;
        assert_eq!(body["reason"], "MissingSignature");
        assert_eq!(body["code"], 401);
    }

    #[tokio::test]
    async fn test_cloud_events_route_refuses_batch() {
        let body = json!([{"id": "1", "eventType": "x", "topic": TOPIC}]).to_string();
        let request = post("/api/cloudevents")
            .header("ce-signature", sign(KEY, body.as_bytes()))
            .body(Body::from(body))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_diagnostics_endpoint() {
        let request = Request::builder()
            .uri("/api/eventgrid/test")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["environment"], "Test");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_get_on_webhook_route_not_allowed() {
        let request = Request::builder()
            .uri("/api/webhook")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
