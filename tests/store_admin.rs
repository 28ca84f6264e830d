mod support;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use cachegate::cache::StoreAdapter;

use support::{FakeUpstream, gateway, get, json_body, memory_adapter, send};

fn flush_request() -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri("/store/flush-all-keys")
        .body(Body::empty())
        .expect("request should build")
}

#[tokio::test]
async fn empty_store_lists_no_keys() {
    let app = gateway(memory_adapter(), Arc::new(FakeUpstream::default()));

    let response = send(&app, get("/store/all-keys")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], false);
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn cached_requests_show_up_in_key_listing() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = gateway(memory_adapter(), upstream.clone());

    send(&app, get("/widgets?id=7")).await;
    send(&app, get("/products/1")).await;

    let body = json_body(send(&app, get("/store/all-keys")).await).await;
    assert_eq!(body["status"], true);
    assert_eq!(body["message"], "All keys fetched successfully");

    let keys: Vec<&str> = body["data"]
        .as_array()
        .expect("key array")
        .iter()
        .filter_map(|key| key.as_str())
        .collect();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().any(|key| key.starts_with("/widgets@")));
    assert!(keys.iter().any(|key| key.starts_with("/products/1@")));

    // Admin routes never reach the upstream.
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn flush_removes_everything_and_is_idempotent() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = gateway(memory_adapter(), upstream.clone());

    send(&app, get("/widgets?id=7")).await;
    send(&app, get("/widgets?id=8")).await;

    let first = json_body(send(&app, flush_request()).await).await;
    assert_eq!(first["status"], true);
    assert_eq!(first["data"]["deleted"], 2);

    let second = json_body(send(&app, flush_request()).await).await;
    assert_eq!(second["status"], true);
    assert_eq!(second["data"]["deleted"], 0);

    let listing = json_body(send(&app, get("/store/all-keys")).await).await;
    assert_eq!(listing["status"], false);

    // Flushed entries are fetched again.
    send(&app, get("/widgets?id=7")).await;
    assert_eq!(upstream.calls(), 3);
}

#[tokio::test]
async fn info_reports_parsed_fields() {
    let app = gateway(memory_adapter(), Arc::new(FakeUpstream::default()));
    send(&app, get("/widgets?id=7")).await;

    let response = send(&app, get("/store/info")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], true);
    assert_eq!(body["data"]["store_backend"], "memory");
    assert_eq!(body["data"]["keys"], "1");
    assert!(body["data"].get("memory_usage_percentage").is_none());
}

#[tokio::test]
async fn unavailable_store_answers_503() {
    let app = gateway(
        StoreAdapter::disconnected(),
        Arc::new(FakeUpstream::default()),
    );

    let requests = [get("/store/all-keys"), get("/store/info"), flush_request()];
    for request in requests {
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = json_body(response).await;
        assert_eq!(body["status"], false);
        assert_eq!(body["message"], "Store connection not available");
    }
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = gateway(memory_adapter(), Arc::new(FakeUpstream::default()));
    let response = send(&app, get("/store/all-keys")).await;

    let id = response
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .expect("request id header");
    assert!(uuid::Uuid::parse_str(id).is_ok());
}
