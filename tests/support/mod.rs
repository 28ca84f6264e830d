#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, StatusCode},
};
use cachegate::{
    cache::{CacheConfig, CacheState, MemoryStore, StoreAdapter},
    infra::{
        http::{AppState, build_router},
        upstream::{Upstream, UpstreamError, UpstreamRequest, UpstreamResponse},
    },
};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Upstream double that counts calls and echoes the request back.
///
/// `/missing` answers 404, `/broken` answers 500, `/html` returns a non-JSON body.
#[derive(Default)]
pub struct FakeUpstream {
    calls: AtomicUsize,
}

impl FakeUpstream {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match request.path.as_str() {
            "/missing" => Err(UpstreamError::Status {
                status: StatusCode::NOT_FOUND,
                body: r#"{"message":"not found"}"#.to_string(),
            }),
            "/broken" => Err(UpstreamError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: String::new(),
            }),
            "/html" => {
                let err = serde_json::from_str::<Value>("<html></html>")
                    .expect_err("html is not json");
                Err(UpstreamError::InvalidBody(err))
            }
            path => {
                let body: Value = if request.body.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_slice(&request.body).unwrap_or(Value::Null)
                };
                let status = if request.method == Method::POST {
                    StatusCode::CREATED
                } else {
                    StatusCode::OK
                };
                Ok(UpstreamResponse {
                    status,
                    body: json!({
                        "path": path,
                        "query": request.query,
                        "body": body,
                    }),
                })
            }
        }
    }
}

pub fn memory_adapter() -> StoreAdapter {
    StoreAdapter::with_backend(Arc::new(MemoryStore::new()))
}

pub fn gateway(store: StoreAdapter, upstream: Arc<FakeUpstream>) -> Router {
    gateway_with_config(CacheConfig::default(), store, upstream)
}

pub fn gateway_with_config(
    config: CacheConfig,
    store: StoreAdapter,
    upstream: Arc<FakeUpstream>,
) -> Router {
    let cache = CacheState::new(config, store);
    build_router(AppState::new(cache, upstream))
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should buffer");
    serde_json::from_slice(&bytes).expect("body should be json")
}

pub fn cache_status(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get("x-cache-status")
        .and_then(|value| value.to_str().ok())
}
