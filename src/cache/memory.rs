//! In-process store used for `memory://` URLs and tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::store::{KeyValueStore, StoreError};

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Map size below which writes never sweep expired entries.
const MIN_SWEEP_LEN: usize = 1024;

struct Entries {
    map: HashMap<String, Entry>,
    /// Length at which the next write sweeps expired entries.
    sweep_at: usize,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            sweep_at: MIN_SWEEP_LEN,
        }
    }
}

impl Entries {
    fn prune(&mut self, now: Instant) {
        self.map.retain(|_, entry| entry.is_live(now));
        self.sweep_at = (self.map.len() * 2).max(MIN_SWEEP_LEN);
    }
}

/// Expiring string map with Redis-like semantics.
///
/// Expired entries are dropped lazily: reads ignore them, `KEYS` prunes them,
/// and a write sweeps them whenever the map has doubled since the last sweep.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let guard = self.entries.read().await;
        Ok(guard
            .map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| StoreError::command("SET", format!("ttl {ttl:?} out of range")))?;

        let mut guard = self.entries.write().await;
        guard.map.insert(key.to_string(), Entry { value, expires_at });
        if guard.map.len() >= guard.sweep_at {
            guard.prune(now);
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut guard = self.entries.write().await;
        let deleted = keys
            .iter()
            .filter_map(|key| guard.map.remove(key))
            .filter(|entry| entry.is_live(now))
            .count();
        Ok(deleted)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let mut guard = self.entries.write().await;
        guard.prune(now);
        let mut keys: Vec<String> = guard
            .map
            .keys()
            .filter(|key| glob_match(pattern.as_bytes(), key.as_bytes()))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        let guard = self.entries.read().await;
        Ok(guard
            .map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at - now))
    }

    async fn info(&self) -> Result<String, StoreError> {
        let now = Instant::now();
        let guard = self.entries.read().await;
        let (count, used_memory) = guard
            .map
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .fold((0usize, 0usize), |(count, bytes), (key, entry)| {
                (count + 1, bytes + key.len() + entry.value.len())
            });

        Ok(format!(
            "# Server\r\nstore_backend:memory\r\n\r\n# Memory\r\nused_memory:{used_memory}\r\n\r\n# Keyspace\r\nkeys:{count}\r\n"
        ))
    }
}

/// Glob match supporting `*` and `?`.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == b'?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}
