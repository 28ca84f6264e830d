//! Store adapter: the only owner of the backend handle.
//!
//! Every operation short-circuits with [`StoreError::Unavailable`] when no
//! backend was connected, so callers can fail open without inspecting
//! connection state themselves.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use super::config::ConnectPolicy;
use super::memory::MemoryStore;
use super::redis_store::RedisStore;
use super::store::{KeyValueStore, StoreError};

#[derive(Clone, Default)]
pub struct StoreAdapter {
    backend: Option<Arc<dyn KeyValueStore>>,
}

impl StoreAdapter {
    /// Adapter with caching disabled.
    pub fn disconnected() -> Self {
        Self { backend: None }
    }

    pub fn with_backend(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Connect to the backend named by `url`, retrying with bounded backoff.
    ///
    /// Never fails: when the URL is absent or every attempt fails the adapter
    /// stays disconnected for the lifetime of the process.
    pub async fn connect(url: Option<&str>, policy: &ConnectPolicy) -> Self {
        let Some(url) = url else {
            info!(
                target = "cachegate::cache::adapter",
                "no store url configured; caching disabled"
            );
            return Self::disconnected();
        };

        match connect_with_backoff(policy, || open_backend(url)).await {
            Some(backend) => Self::with_backend(backend),
            None => {
                error!(
                    target = "cachegate::cache::adapter",
                    attempts = policy.max_attempts.get(),
                    "store unreachable; continuing without cache"
                );
                Self::disconnected()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> Result<&Arc<dyn KeyValueStore>, StoreError> {
        self.backend.as_ref().ok_or(StoreError::Unavailable)
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.backend()?.get(key).await
    }

    pub async fn set_with_expiry(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.backend()?.set_ex(key, value, ttl).await
    }

    pub async fn delete_all(&self, keys: &[String]) -> Result<usize, StoreError> {
        let backend = self.backend()?;
        if keys.is_empty() {
            return Ok(0);
        }
        backend.del(keys).await
    }

    pub async fn list_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.backend()?.keys(pattern).await
    }

    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.backend()?.ttl(key).await
    }

    pub async fn info(&self) -> Result<String, StoreError> {
        self.backend()?.info().await
    }
}

async fn open_backend(url: &str) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    let scheme = url.split_once("://").map(|(scheme, _)| scheme);
    match scheme {
        Some("redis") | Some("rediss") => {
            let store = RedisStore::connect(url).await?;
            Ok(Arc::new(store))
        }
        Some("memory") => Ok(Arc::new(MemoryStore::new())),
        _ => Err(StoreError::UnsupportedUrl(url.to_string())),
    }
}

/// Retry `connect` with exponential backoff until it succeeds or the policy's
/// attempt or elapsed-time budget runs out.
pub async fn connect_with_backoff<T, F, Fut>(policy: &ConnectPolicy, mut connect: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let started = Instant::now();
    let mut delay = policy.initial_backoff;

    for attempt in 1..=policy.max_attempts.get() {
        match connect().await {
            Ok(value) => return Some(value),
            Err(StoreError::UnsupportedUrl(url)) => {
                error!(
                    target = "cachegate::cache::adapter",
                    url = %url,
                    "unsupported store url; not retrying"
                );
                return None;
            }
            Err(err) => {
                warn!(
                    target = "cachegate::cache::adapter",
                    attempt,
                    error = %err,
                    "store connection failed"
                );
            }
        }

        if attempt == policy.max_attempts.get() {
            break;
        }
        if started.elapsed() + delay > policy.max_elapsed {
            warn!(
                target = "cachegate::cache::adapter",
                attempt, "store connect retry window exhausted"
            );
            break;
        }

        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(policy.max_backoff);
    }

    None
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy(attempts: u32) -> ConnectPolicy {
        ConnectPolicy {
            max_attempts: NonZeroU32::new(attempts).expect("non-zero"),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(3),
            max_elapsed: Duration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn disconnected_adapter_reports_unavailable() {
        let adapter = StoreAdapter::disconnected();
        assert!(!adapter.is_available());
        assert!(adapter.get("k").await.expect_err("unavailable").is_unavailable());
        assert!(
            adapter
                .set_with_expiry("k", "v".to_string(), Duration::from_secs(1))
                .await
                .expect_err("unavailable")
                .is_unavailable()
        );
        assert!(adapter.list_keys("*").await.expect_err("unavailable").is_unavailable());
        assert!(adapter.info().await.expect_err("unavailable").is_unavailable());
    }

    #[tokio::test]
    async fn missing_url_disables_caching() {
        let adapter = StoreAdapter::connect(None, &policy(3)).await;
        assert!(!adapter.is_available());
    }

    #[tokio::test]
    async fn memory_url_connects() {
        let adapter = StoreAdapter::connect(Some("memory://local"), &policy(1)).await;
        assert!(adapter.is_available());
        adapter
            .set_with_expiry("k", "v".to_string(), Duration::from_secs(10))
            .await
            .expect("set");
        assert_eq!(adapter.get("k").await.expect("get").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn unsupported_scheme_gives_up_immediately() {
        let adapter = StoreAdapter::connect(Some("ftp://nope"), &policy(5)).await;
        assert!(!adapter.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_stops_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let result: Option<()> = connect_with_backoff(&policy(4), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::command("CONNECT", "refused")) }
        })
        .await;

        assert!(result.is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        // 100ms + 200ms + 400ms between the four attempts.
        assert_eq!(started.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_respects_elapsed_window() {
        let attempts = AtomicU32::new(0);
        let policy = ConnectPolicy {
            max_elapsed: Duration::from_millis(250),
            ..policy(10)
        };

        let result: Option<()> = connect_with_backoff(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::command("CONNECT", "refused")) }
        })
        .await;

        assert!(result.is_none());
        // Sleeps of 100ms then 200ms would cross 250ms, so only two attempts run.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_returns_first_success() {
        let attempts = AtomicU32::new(0);
        let result = connect_with_backoff(&policy(10), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(StoreError::command("CONNECT", "refused"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Some(3));
    }
}
