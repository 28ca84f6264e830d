//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::MAX_TTL;

mod cli;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "cachegate";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_TTL_SECS: u64 = 600;
const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;
const DEFAULT_OFFLOAD_THRESHOLD_BYTES: u64 = 64 * 1024;
const DEFAULT_CONNECT_ATTEMPTS: u64 = 10;
const DEFAULT_CONNECT_INITIAL_BACKOFF_MS: u64 = 100;
const DEFAULT_CONNECT_MAX_BACKOFF_MS: u64 = 3_000;
const DEFAULT_CONNECT_MAX_ELAPSED_SECS: u64 = 300;
const DEFAULT_UPSTREAM_BASE_URL: &str = "https://dummyjson.com";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
const STORE_SCHEMES: [&str; 3] = ["redis", "rediss", "memory"];

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub store: StoreSettings,
    pub upstream: UpstreamSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// `None` runs the gateway without a cache.
    pub url: Option<String>,
    pub compression: bool,
    pub default_ttl: Duration,
    pub max_body_bytes: usize,
    pub offload_threshold_bytes: usize,
    pub connect_attempts: NonZeroU32,
    pub connect_initial_backoff: Duration,
    pub connect_max_backoff: Duration,
    pub connect_max_elapsed: Duration,
    /// Interval of the key/TTL logging task; `None` disables it.
    pub key_monitor: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub base_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("CACHEGATE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_store_url(cli.store_url.as_deref());
    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Keys | Command::Flush | Command::Info) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    store: RawStoreSettings,
    upstream: RawUpstreamSettings,
}

impl RawSettings {
    fn apply_store_url(&mut self, url: Option<&str>) {
        if let Some(url) = url {
            self.store.url = Some(url.to_string());
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(compression) = overrides.store_compression {
            self.store.compression = Some(compression);
        }
        if let Some(seconds) = overrides.default_ttl_seconds {
            self.store.default_ttl_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.key_monitor_seconds {
            self.store.key_monitor_seconds = Some(seconds);
        }
        if let Some(url) = overrides.upstream_base_url.as_ref() {
            self.upstream.base_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.upstream_timeout_seconds {
            self.upstream.timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            store,
            upstream,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let store = build_store_settings(store)?;
        let upstream = build_upstream_settings(upstream)?;

        Ok(Self {
            server,
            logging,
            store,
            upstream,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr =
        parse_socket_addr(&host, port).map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let url = store.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    if let Some(url) = url.as_deref() {
        validate_store_url(url)?;
    }

    let default_ttl = positive_secs(
        store.default_ttl_seconds.unwrap_or(DEFAULT_TTL_SECS),
        "store.default_ttl_seconds",
    )?;
    if default_ttl > MAX_TTL {
        return Err(LoadError::invalid(
            "store.default_ttl_seconds",
            format!("must not exceed {} seconds", MAX_TTL.as_secs()),
        ));
    }

    let max_body_bytes = store.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    if max_body_bytes == 0 {
        return Err(LoadError::invalid(
            "store.max_body_bytes",
            "must be greater than zero",
        ));
    }
    let max_body_bytes = to_usize(max_body_bytes, "store.max_body_bytes")?;
    let offload_threshold_bytes = to_usize(
        store
            .offload_threshold_bytes
            .unwrap_or(DEFAULT_OFFLOAD_THRESHOLD_BYTES),
        "store.offload_threshold_bytes",
    )?;

    let connect_attempts = non_zero_u32(
        store.connect_attempts.unwrap_or(DEFAULT_CONNECT_ATTEMPTS),
        "store.connect_attempts",
    )?;

    let initial_ms = store
        .connect_initial_backoff_ms
        .unwrap_or(DEFAULT_CONNECT_INITIAL_BACKOFF_MS);
    if initial_ms == 0 {
        return Err(LoadError::invalid(
            "store.connect_initial_backoff_ms",
            "must be greater than zero",
        ));
    }
    let max_ms = store
        .connect_max_backoff_ms
        .unwrap_or(DEFAULT_CONNECT_MAX_BACKOFF_MS);
    if max_ms < initial_ms {
        return Err(LoadError::invalid(
            "store.connect_max_backoff_ms",
            "must not be smaller than connect_initial_backoff_ms",
        ));
    }

    let connect_max_elapsed = positive_secs(
        store
            .connect_max_elapsed_seconds
            .unwrap_or(DEFAULT_CONNECT_MAX_ELAPSED_SECS),
        "store.connect_max_elapsed_seconds",
    )?;

    // Zero turns the monitor off.
    let key_monitor = store
        .key_monitor_seconds
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    Ok(StoreSettings {
        url,
        compression: store.compression.unwrap_or(true),
        default_ttl,
        max_body_bytes,
        offload_threshold_bytes,
        connect_attempts,
        connect_initial_backoff: Duration::from_millis(initial_ms),
        connect_max_backoff: Duration::from_millis(max_ms),
        connect_max_elapsed,
        key_monitor,
    })
}

fn validate_store_url(url: &str) -> Result<(), LoadError> {
    let parsed =
        Url::parse(url).map_err(|err| LoadError::invalid("store.url", err.to_string()))?;
    if !STORE_SCHEMES.contains(&parsed.scheme()) {
        return Err(LoadError::invalid(
            "store.url",
            format!(
                "unsupported scheme `{}`; expected one of redis, rediss, memory",
                parsed.scheme()
            ),
        ));
    }
    Ok(())
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let raw_url = upstream
        .base_url
        .unwrap_or_else(|| DEFAULT_UPSTREAM_BASE_URL.to_string());
    let base_url = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("upstream.base_url", err.to_string()))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "upstream.base_url",
            "scheme must be http or https",
        ));
    }

    let timeout = positive_secs(
        upstream
            .timeout_seconds
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        "upstream.timeout_seconds",
    )?;

    Ok(UpstreamSettings { base_url, timeout })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    url: Option<String>,
    compression: Option<bool>,
    default_ttl_seconds: Option<u64>,
    max_body_bytes: Option<u64>,
    offload_threshold_bytes: Option<u64>,
    connect_attempts: Option<u64>,
    connect_initial_backoff_ms: Option<u64>,
    connect_max_backoff_ms: Option<u64>,
    connect_max_elapsed_seconds: Option<u64>,
    key_monitor_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn to_usize(value: u64, key: &'static str) -> Result<usize, LoadError> {
    usize::try_from(value)
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
