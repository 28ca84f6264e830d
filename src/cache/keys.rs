//! Cache key derivation.
//!
//! A key is `<path>@<digest>` where the digest is a SHA-256 over the canonical
//! JSON form of the query parameters and the request body. The path stays in
//! clear text so keys remain readable when listed from the store.

use std::collections::BTreeMap;
use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// The parts of a request that select a cached response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RequestIdentity {
    /// Build an identity from a raw (still percent-encoded) query string.
    pub fn new(path: impl Into<String>, raw_query: Option<&str>, body: &[u8]) -> Self {
        let query = raw_query
            .map(|raw| {
                url::form_urlencoded::parse(raw.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        Self {
            path: path.into(),
            query,
            body: body.to_vec(),
        }
    }
}

/// Stable cache key string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize)]
struct HashInput<'a> {
    query: BTreeMap<&'a str, Vec<&'a str>>,
    body: TaggedBody,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum TaggedBody {
    Empty,
    Json(Value),
    Text(String),
    Bytes(String),
}

impl TaggedBody {
    fn from_bytes(body: &[u8]) -> Self {
        if body.is_empty() {
            return Self::Empty;
        }
        // serde_json keeps object keys sorted, so equal documents hash equally
        // regardless of the client's key order. Documents with numbers that
        // only parse as f64 are hashed verbatim, since the parsed form is lossy.
        if let Some(value) = serde_json::from_slice::<Value>(body)
            .ok()
            .filter(|value| !has_lossy_number(value))
        {
            return Self::Json(value);
        }
        match std::str::from_utf8(body) {
            Ok(text) => Self::Text(text.to_string()),
            Err(_) => Self::Bytes(STANDARD.encode(body)),
        }
    }
}

fn has_lossy_number(value: &Value) -> bool {
    match value {
        Value::Number(number) => number.is_f64(),
        Value::Array(items) => items.iter().any(has_lossy_number),
        Value::Object(fields) => fields.values().any(has_lossy_number),
        _ => false,
    }
}

/// Derive the cache key for a request identity.
pub fn derive_key(identity: &RequestIdentity) -> CacheKey {
    let mut query: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, value) in &identity.query {
        query.entry(name.as_str()).or_default().push(value.as_str());
    }

    let input = HashInput {
        query,
        body: TaggedBody::from_bytes(&identity.body),
    };

    // Serializing string maps and JSON values cannot fail.
    let canonical = serde_json::to_vec(&input).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    let digest = hex::encode(hasher.finalize());

    CacheKey(format!("{}@{}", identity.path, digest))
}
