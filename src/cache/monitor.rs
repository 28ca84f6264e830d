//! Periodic diagnostic sweep of store contents.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{StoreAdapter, store::StoreError};

/// One key and its remaining lifetime at sweep time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTtl {
    pub key: String,
    pub ttl: Option<Duration>,
}

/// List every key with its TTL, logging each at debug level.
pub async fn sweep_once(store: &StoreAdapter) -> Result<Vec<KeyTtl>, StoreError> {
    let keys = store.list_keys("*").await?;
    let mut snapshot = Vec::with_capacity(keys.len());

    for key in keys {
        // Keys can expire between KEYS and TTL; those report no TTL.
        let ttl = store.ttl(&key).await?;
        debug!(
            target = "cachegate::cache::monitor",
            key = %key,
            ttl_secs = ttl.map(|ttl| ttl.as_secs()),
            "cached key"
        );
        snapshot.push(KeyTtl { key, ttl });
    }

    Ok(snapshot)
}

/// Run [`sweep_once`] on a fixed cadence until the handle is aborted.
pub fn spawn_key_monitor(store: StoreAdapter, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            match sweep_once(&store).await {
                Ok(snapshot) => debug!(
                    target = "cachegate::cache::monitor",
                    keys = snapshot.len(),
                    "key sweep complete"
                ),
                Err(err) => warn!(
                    target = "cachegate::cache::monitor",
                    error = %err,
                    "key sweep failed"
                ),
            }
        }
    })
}
