//! Response cache middleware.
//!
//! Wraps the upstream passthrough handler: lookups short-circuit on a hit,
//! misses run the handler once and persist successful bodies with the
//! request's TTL. Every store or codec failure degrades to a miss.

use std::time::Duration;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode,
        header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::application::error::HttpError;
use crate::infra::telemetry::{
    CACHE_CODEC_ERROR_TOTAL, CACHE_HIT_TOTAL, CACHE_MISS_TOTAL, CACHE_STORE_ERROR_TOTAL,
    CACHE_WRITE_ERROR_TOTAL,
};

use super::{
    CacheConfig, StoreAdapter,
    codec::{CachedPayload, CodecError, PayloadCodec},
    config::TTL_HEADER,
    keys::{CacheKey, RequestIdentity, derive_key},
    store::StoreError,
};

const SOURCE: &str = "cache::middleware";

/// Response header mirroring the envelope's `cacheStatus`.
pub const CACHE_STATUS_HEADER: &str = "x-cache-status";

/// Upstream headers describing the original body, which the envelope replaces.
const ENTITY_HEADERS: [HeaderName; 4] =
    [CONTENT_TYPE, CONTENT_LENGTH, CONTENT_ENCODING, TRANSFER_ENCODING];

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub store: StoreAdapter,
    pub codec: PayloadCodec,
}

impl CacheState {
    pub fn new(config: CacheConfig, store: StoreAdapter) -> Self {
        let codec = PayloadCodec::new(config.compression, config.offload_threshold_bytes);
        Self {
            config,
            store,
            codec,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    fn header_value(self) -> HeaderValue {
        match self {
            Self::Hit => HeaderValue::from_static("hit"),
            Self::Miss => HeaderValue::from_static("miss"),
        }
    }
}

/// Body of every cached-route success response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEnvelope {
    pub message: Value,
    pub cache_status: CacheStatus,
}

#[derive(Debug, Error)]
enum StoreWriteError {
    #[error("failed to encode payload: {0}")]
    Codec(#[from] CodecError),
    #[error("failed to write payload: {0}")]
    Store(#[from] StoreError),
}

struct PendingWrite {
    key: CacheKey,
    ttl: Duration,
}

/// Middleware for store-backed response caching.
///
/// Only `GET` and `POST` requests participate. Non-2xx responses, and 2xx
/// statuses that carry no body, are passed through untouched and never stored.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET && request.method() != Method::POST {
        return next.run(request).await;
    }

    // Store down or never configured: plain passthrough.
    if !cache.store.is_available() {
        let response = next.run(request).await;
        return finish_miss(&cache, response, None).await;
    }

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, cache.config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return HttpError::new(
                SOURCE,
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
                err.to_string(),
            )
            .into_response();
        }
    };

    let identity = RequestIdentity::new(parts.uri.path(), parts.uri.query(), &body);
    let key = derive_key(&identity);
    let ttl = cache.config.ttl_for(
        parts
            .headers
            .get(TTL_HEADER)
            .and_then(|value| value.to_str().ok()),
    );

    if let Some(payload) = read_cached(&cache, &key).await {
        counter!(CACHE_HIT_TOTAL).increment(1);
        debug!(cache = "store", outcome = "hit", key = %key, "serving cached response");
        return envelope_response(StatusCode::OK, payload.into_value(), CacheStatus::Hit);
    }

    counter!(CACHE_MISS_TOTAL).increment(1);
    debug!(cache = "store", outcome = "miss", key = %key, "cache miss, executing handler");

    let request = Request::from_parts(parts, Body::from(body));
    let response = next.run(request).await;

    finish_miss(&cache, response, Some(PendingWrite { key, ttl })).await
}

async fn read_cached(cache: &CacheState, key: &CacheKey) -> Option<CachedPayload> {
    let stored = match cache.store.get(key.as_str()).await {
        Ok(Some(stored)) => stored,
        Ok(None) => return None,
        Err(err) => {
            counter!(CACHE_STORE_ERROR_TOTAL).increment(1);
            warn!(cache = "store", key = %key, error = %err, "cache read failed; treating as miss");
            return None;
        }
    };

    match cache.codec.decode(stored).await {
        Ok(raw) => Some(CachedPayload::from_bytes(&raw)),
        Err(err) => {
            counter!(CACHE_CODEC_ERROR_TOTAL).increment(1);
            warn!(cache = "store", key = %key, error = %err, "cached value undecodable; treating as miss");
            None
        }
    }
}

async fn finish_miss(
    cache: &CacheState,
    response: Response,
    pending: Option<PendingWrite>,
) -> Response {
    if !is_cacheable_status(response.status()) {
        let mut response = response;
        response
            .headers_mut()
            .insert(CACHE_STATUS_HEADER, CacheStatus::Miss.header_value());
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match BodyExt::collect(body).await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            return HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                format!("failed to buffer response body: {err}"),
            )
            .into_response();
        }
    };

    if let Some(PendingWrite { key, ttl }) = pending {
        if bytes.len() <= cache.config.max_body_bytes {
            write_through(cache, key, bytes.clone(), ttl).await;
        } else {
            debug!(cache = "store", key = %key, size = bytes.len(), "response too large to cache");
        }
    }

    let message = CachedPayload::from_bytes(&bytes).into_value();
    let mut response = envelope_response(parts.status, message, CacheStatus::Miss);
    copy_upstream_headers(&parts.headers, response.headers_mut());
    response
}

fn is_cacheable_status(status: StatusCode) -> bool {
    status.is_success() && status != StatusCode::NO_CONTENT && status != StatusCode::RESET_CONTENT
}

fn copy_upstream_headers(source: &HeaderMap, target: &mut HeaderMap) {
    for (name, value) in source {
        if ENTITY_HEADERS.contains(name) || name.as_str() == CACHE_STATUS_HEADER {
            continue;
        }
        target.append(name.clone(), value.clone());
    }
}

/// Persist a response body.
///
/// The write runs on its own task so it completes even if the client goes
/// away, but it is awaited so the response is only sent once it settles.
async fn write_through(cache: &CacheState, key: CacheKey, body: Bytes, ttl: Duration) {
    let store = cache.store.clone();
    let codec = cache.codec;
    let task_key = key.clone();

    let task = tokio::spawn(async move {
        let value = codec.encode(body).await?;
        store
            .set_with_expiry(task_key.as_str(), value, ttl)
            .await?;
        Ok::<(), StoreWriteError>(())
    });

    match task.await {
        Ok(Ok(())) => {
            debug!(cache = "store", key = %key, ttl_secs = ttl.as_secs(), "cached response");
        }
        Ok(Err(err)) => {
            counter!(CACHE_WRITE_ERROR_TOTAL).increment(1);
            warn!(cache = "store", key = %key, error = %err, "cache write failed");
        }
        Err(err) => {
            counter!(CACHE_WRITE_ERROR_TOTAL).increment(1);
            warn!(cache = "store", key = %key, error = %err, "cache write task aborted");
        }
    }
}

fn envelope_response(status: StatusCode, message: Value, cache_status: CacheStatus) -> Response {
    let envelope = CacheEnvelope {
        message,
        cache_status,
    };
    let mut response = (status, Json(envelope)).into_response();
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, cache_status.header_value());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_camel_case() {
        let envelope = CacheEnvelope {
            message: serde_json::json!({ "name": "Bolt" }),
            cache_status: CacheStatus::Hit,
        };
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({ "message": { "name": "Bolt" }, "cacheStatus": "hit" })
        );
    }

    #[test]
    fn bodyless_statuses_are_not_cacheable() {
        assert!(is_cacheable_status(StatusCode::OK));
        assert!(is_cacheable_status(StatusCode::CREATED));
        assert!(!is_cacheable_status(StatusCode::NO_CONTENT));
        assert!(!is_cacheable_status(StatusCode::RESET_CONTENT));
        assert!(!is_cacheable_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn entity_headers_are_not_copied() {
        let mut upstream = HeaderMap::new();
        upstream.insert("x-upstream-id", HeaderValue::from_static("abc"));
        upstream.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        upstream.insert(CONTENT_LENGTH, HeaderValue::from_static("3"));

        let mut response = envelope_response(StatusCode::OK, Value::Null, CacheStatus::Miss);
        copy_upstream_headers(&upstream, response.headers_mut());

        let headers = response.headers();
        assert_eq!(headers.get("x-upstream-id").and_then(|v| v.to_str().ok()), Some("abc"));
        assert_eq!(
            headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        assert!(headers.get(CONTENT_LENGTH).is_none());
    }

    #[tokio::test]
    async fn envelope_response_sets_header() {
        let response = envelope_response(StatusCode::OK, Value::Null, CacheStatus::Miss);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(CACHE_STATUS_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("miss")
        );
    }
}
