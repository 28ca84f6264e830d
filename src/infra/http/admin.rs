use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::application::error::HttpError;
use crate::cache::{ServerInfo, StoreAdmin};

/// `{status, message, data}` body shared by the admin routes and CLI output.
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T> {
    pub status: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiEnvelope<T> {
    pub fn ok(message: &'static str, data: T) -> Self {
        Self {
            status: true,
            message,
            data: Some(data),
        }
    }

    pub fn empty(message: &'static str) -> Self {
        Self {
            status: false,
            message,
            data: None,
        }
    }
}

impl ApiEnvelope<Vec<String>> {
    /// Envelope for the key listing; an empty store reports `status: false`.
    pub fn keys(keys: Vec<String>) -> Self {
        if keys.is_empty() {
            Self::empty("No keys found in the store")
        } else {
            Self::ok("All keys fetched successfully", keys)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FlushSummary {
    pub deleted: usize,
}

impl ApiEnvelope<FlushSummary> {
    pub fn flushed(deleted: usize) -> Self {
        Self::ok("All keys flushed successfully", FlushSummary { deleted })
    }
}

impl ApiEnvelope<ServerInfo> {
    pub fn info(info: ServerInfo) -> Self {
        Self::ok("Store info fetched successfully", info)
    }
}

pub(super) async fn store_info(State(admin): State<StoreAdmin>) -> Result<Response, HttpError> {
    let info = admin.server_info().await?;
    Ok(Json(ApiEnvelope::info(info)).into_response())
}

pub(super) async fn all_keys(State(admin): State<StoreAdmin>) -> Result<Response, HttpError> {
    let keys = admin.list_keys().await?;
    Ok(Json(ApiEnvelope::keys(keys)).into_response())
}

pub(super) async fn flush_all_keys(
    State(admin): State<StoreAdmin>,
) -> Result<Response, HttpError> {
    let deleted = admin.flush_all().await?;
    Ok(Json(ApiEnvelope::flushed(deleted)).into_response())
}
