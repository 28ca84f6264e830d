//! Key-value backend abstraction.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not connected")]
    Unavailable,
    #[error("store command `{command}` failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },
    #[error("unsupported store url `{0}`")]
    UnsupportedUrl(String),
}

impl StoreError {
    pub fn command(command: &'static str, message: impl Into<String>) -> Self {
        Self::Command {
            command,
            message: message.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// Minimal command set the cache needs from a backend.
///
/// Implementations are shared across requests behind an `Arc`, so every
/// method takes `&self`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// `GET key`; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// `SET key value EX ttl`.
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// `DEL key...`, returning how many keys existed.
    async fn del(&self, keys: &[String]) -> Result<usize, StoreError>;

    /// `KEYS pattern` with glob semantics (`*`, `?`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// `TTL key`; `None` when the key is absent or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// `INFO` as raw `name:value` text.
    async fn info(&self) -> Result<String, StoreError>;
}
