use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the cachegate binary.
#[derive(Debug, Parser)]
#[command(name = "cachegate", version, about = "Caching gateway for JSON APIs")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CACHEGATE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Override the store connection URL (redis://, rediss:// or memory://).
    #[arg(long = "store-url", env = "REDIS_URI", value_name = "URL", global = true)]
    pub store_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the caching gateway.
    Serve(Box<ServeArgs>),
    /// Print every key currently held by the store.
    Keys,
    /// Delete every key held by the store.
    Flush,
    /// Print parsed store server statistics.
    Info,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Toggle zlib compression of stored values.
    #[arg(
        long = "store-compression",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub store_compression: Option<bool>,

    /// Override the TTL applied when a request carries no `ex` header.
    #[arg(long = "default-ttl-seconds", value_name = "SECONDS")]
    pub default_ttl_seconds: Option<u64>,

    /// Log every key and its remaining TTL at this interval.
    #[arg(long = "key-monitor-seconds", value_name = "SECONDS")]
    pub key_monitor_seconds: Option<u64>,

    /// Override the upstream API base URL.
    #[arg(long = "upstream-base-url", value_name = "URL")]
    pub upstream_base_url: Option<String>,

    /// Override the upstream request timeout.
    #[arg(long = "upstream-timeout-seconds", value_name = "SECONDS")]
    pub upstream_timeout_seconds: Option<u64>,
}
