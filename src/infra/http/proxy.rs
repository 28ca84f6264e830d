use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use metrics::histogram;

use crate::application::error::HttpError;
use crate::infra::telemetry::UPSTREAM_FETCH_MS;
use crate::infra::upstream::{Upstream, UpstreamError, UpstreamRequest};

const SOURCE: &str = "infra::http::proxy";

/// Forward the request path, query and body upstream and return its JSON.
pub(super) async fn forward(
    State(upstream): State<Arc<dyn Upstream>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Result<Response, HttpError> {
    let request = UpstreamRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        body,
    };

    let started = Instant::now();
    let result = upstream.fetch(request).await;
    histogram!(UPSTREAM_FETCH_MS).record(started.elapsed().as_secs_f64() * 1000.0);

    let response = result.map_err(upstream_error)?;
    Ok((response.status, Json(response.body)).into_response())
}

fn upstream_error(err: UpstreamError) -> HttpError {
    match err.client_status() {
        Some(status) => HttpError::from_error(SOURCE, status, "Upstream rejected the request", &err),
        None => HttpError::from_error(
            SOURCE,
            StatusCode::BAD_GATEWAY,
            "Upstream request failed",
            &err,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_status() {
        let err = UpstreamError::Status {
            status: StatusCode::NOT_FOUND,
            body: "{}".to_string(),
        };
        assert_eq!(upstream_error(err).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn server_errors_become_bad_gateway() {
        let err = UpstreamError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: String::new(),
        };
        assert_eq!(upstream_error(err).status(), StatusCode::BAD_GATEWAY);

        let invalid = serde_json::from_slice::<serde_json::Value>(b"<html>")
            .expect_err("not json");
        assert_eq!(
            upstream_error(UpstreamError::InvalidBody(invalid)).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
