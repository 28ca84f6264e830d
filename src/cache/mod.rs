//! cachegate cache system
//!
//! Store-backed response caching for the upstream passthrough routes:
//!
//! - **Keys**: `<path>@<sha256(query, body)>`
//! - **Codec**: optional zlib + base64 encoding of stored payloads
//! - **Adapter**: optional backend (Redis or in-process), fail-open when absent
//! - **Middleware**: hit/miss control flow around the upstream handler
//! - **Admin**: key listing, flush and parsed `INFO`
//!
//! ## Configuration
//!
//! ```toml
//! [store]
//! url = "redis://127.0.0.1:6379"
//! compression = true
//! default_ttl_seconds = 600
//! # ... see config.rs for all options
//! ```

mod adapter;
mod admin;
mod codec;
mod config;
mod keys;
mod memory;
mod middleware;
mod monitor;
mod redis_store;
mod store;

pub use adapter::{StoreAdapter, connect_with_backoff};
pub use admin::{ServerInfo, StoreAdmin};
pub use codec::{CachedPayload, CodecError, PayloadCodec, decode, encode};
pub use self::config::{CacheConfig, ConnectPolicy, MAX_TTL, TTL_HEADER};
pub use keys::{CacheKey, RequestIdentity, derive_key};
pub use memory::MemoryStore;
pub use middleware::{
    CACHE_STATUS_HEADER, CacheEnvelope, CacheState, CacheStatus, response_cache_layer,
};
pub use monitor::{KeyTtl, spawn_key_monitor, sweep_once};
pub use redis_store::RedisStore;
pub use store::{KeyValueStore, StoreError};
