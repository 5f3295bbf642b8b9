use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Clone, Debug, Default, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub ingest: IngestConfig,

    #[command(flatten)]
    pub realtime: RealtimeConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "WA_RELAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the public API (webhook, conversations, gateway)
    #[arg(long, env = "WA_RELAY_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Port for the management API (probes, purge)
    #[arg(long, env = "WA_RELAY_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for open sessions to close on shutdown
    #[arg(long, env = "WA_RELAY_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 5000, mgmt_port: 9090, shutdown_timeout_secs: 5 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Postgres connection URL. When unset, messages are kept in memory.
    #[arg(long = "database-url", env = "WA_RELAY_DATABASE_URL")]
    pub url: Option<String>,

    /// Maximum number of pooled connections
    #[arg(long, env = "WA_RELAY_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// Minimum number of idle connections kept open
    #[arg(long, env = "WA_RELAY_DB_MIN_CONNECTIONS", default_value_t = 1)]
    pub min_connections: u32,

    /// Seconds to wait for a free connection
    #[arg(long, env = "WA_RELAY_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    /// Attempts made to reach the database at boot before giving up
    #[arg(long, env = "WA_RELAY_DB_CONNECT_ATTEMPTS", default_value_t = 5)]
    pub connect_attempts: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: None, max_connections: 10, min_connections: 1, acquire_timeout_secs: 5, connect_attempts: 5 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct IngestConfig {
    /// Directory of seed payloads imported before the server accepts traffic
    #[arg(long, env = "WA_RELAY_PAYLOAD_DIR", default_value = "payloads")]
    pub payload_dir: PathBuf,

    /// Import the seed payloads at startup
    #[arg(
        long,
        env = "WA_RELAY_IMPORT_ON_START",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub import_on_start: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { payload_dir: PathBuf::from("payloads"), import_on_start: true }
    }
}

#[derive(Clone, Debug, Args)]
pub struct RealtimeConfig {
    /// Events buffered per subscriber before it is considered lagged
    #[arg(long, env = "WA_RELAY_CHANNEL_CAPACITY", default_value_t = 256)]
    pub channel_capacity: usize,

    /// Seconds between server pings
    #[arg(long, env = "WA_RELAY_WS_PING_INTERVAL_SECS", default_value_t = 30)]
    pub ping_interval_secs: u64,

    /// Seconds of silence tolerated after a ping before the socket is closed
    #[arg(long, env = "WA_RELAY_WS_PING_TIMEOUT_SECS", default_value_t = 10)]
    pub ping_timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self { channel_capacity: 256, ping_interval_secs: 30, ping_timeout_secs: 10 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the store readiness check in milliseconds
    #[arg(long, env = "WA_RELAY_HEALTH_STORE_TIMEOUT_MS", default_value_t = 2000)]
    pub store_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { store_timeout_ms: 2000 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// OTLP collector endpoint. Export is disabled when unset.
    #[arg(long, env = "WA_RELAY_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Log output format
    #[arg(long, env = "WA_RELAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}
