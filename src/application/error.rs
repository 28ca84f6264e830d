use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{cache::StoreError, infra::error::InfraError};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Error body shared by every JSON error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: bool,
    pub message: &'static str,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: false,
            message: self.public_message,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<StoreError> for HttpError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable => HttpError::new(
                "application::error::store_error_to_http_error",
                StatusCode::SERVICE_UNAVAILABLE,
                "Store connection not available",
                "store is not connected",
            ),
            other => HttpError::from_error(
                "application::error::store_error_to_http_error",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Store command failed",
                &other,
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("outer")]
    struct Outer(#[source] Inner);

    #[derive(Debug, Error)]
    #[error("inner")]
    struct Inner;

    #[test]
    fn report_collects_source_chain() {
        let report =
            ErrorReport::from_error("test", StatusCode::BAD_GATEWAY, &Outer(Inner));
        assert_eq!(report.messages, vec!["outer".to_string(), "inner".to_string()]);
    }

    #[test]
    fn unavailable_store_maps_to_503() {
        let error = HttpError::from(StoreError::Unavailable);
        assert_eq!(error.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = error.into_response();
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }

    #[test]
    fn command_failure_maps_to_500() {
        let error = HttpError::from(StoreError::command("KEYS", "boom"));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
