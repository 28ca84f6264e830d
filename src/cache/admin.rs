//! Administrative operations over the store.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use super::{StoreAdapter, store::StoreError};

const ALL_KEYS: &str = "*";

/// Parsed `INFO` output with the derived memory usage figure.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerInfo {
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage_percentage: Option<f64>,
}

impl ServerInfo {
    /// Parse `name:value` lines; section headers and blank lines are skipped.
    pub fn parse(raw: &str) -> Self {
        let fields: BTreeMap<String, String> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once(':'))
            .filter(|(name, value)| !name.is_empty() && !value.is_empty())
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        let memory_usage_percentage = memory_usage_percentage(&fields);

        Self {
            fields,
            memory_usage_percentage,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

fn memory_usage_percentage(fields: &BTreeMap<String, String>) -> Option<f64> {
    let used: f64 = fields.get("used_memory")?.parse().ok()?;
    let total: f64 = fields.get("total_system_memory")?.parse().ok()?;
    (total > 0.0).then(|| used / total * 100.0)
}

/// Admin facade used by the HTTP routes and the CLI.
#[derive(Clone)]
pub struct StoreAdmin {
    store: StoreAdapter,
}

impl StoreAdmin {
    pub fn new(store: StoreAdapter) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StoreAdapter {
        &self.store
    }

    pub async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_keys(ALL_KEYS).await
    }

    /// Delete every key, returning how many were removed.
    pub async fn flush_all(&self) -> Result<usize, StoreError> {
        let keys = self.store.list_keys(ALL_KEYS).await?;
        let deleted = self.store.delete_all(&keys).await?;
        info!(target = "cachegate::cache::admin", deleted, "flushed store");
        Ok(deleted)
    }

    pub async fn server_info(&self) -> Result<ServerInfo, StoreError> {
        let raw = self.store.info().await?;
        Ok(ServerInfo::parse(&raw))
    }
}
