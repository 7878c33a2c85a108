use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Default, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub lifecycle: LifecycleConfig,

    #[command(flatten)]
    pub websocket: WsConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Database connection URL. When unset the server keeps all state in memory.
    #[arg(long = "database-url", env = "COURIER_DATABASE_URL")]
    pub url: Option<String>,

    /// Maximum number of pooled connections
    #[arg(long, env = "COURIER_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    /// Minimum number of idle connections kept open
    #[arg(long, env = "COURIER_DB_MIN_CONNECTIONS", default_value_t = 2)]
    pub min_connections: u32,

    /// How long to wait for a free connection before failing
    #[arg(long, env = "COURIER_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    /// How long an idle connection may stay in the pool
    #[arg(long, env = "COURIER_DB_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    /// Maximum lifetime of a pooled connection
    #[arg(long, env = "COURIER_DB_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub max_lifetime_secs: u64,

    /// Initial backoff when the database is unreachable at boot
    #[arg(long, env = "COURIER_DB_CONNECT_MIN_BACKOFF_SECS", default_value_t = 1)]
    pub connect_min_backoff_secs: u64,

    /// Upper bound for the boot-time connect backoff
    #[arg(long, env = "COURIER_DB_CONNECT_MAX_BACKOFF_SECS", default_value_t = 30)]
    pub connect_max_backoff_secs: u64,

    /// Number of connect attempts before giving up
    #[arg(long, env = "COURIER_DB_CONNECT_ATTEMPTS", default_value_t = 5)]
    pub connect_attempts: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 20,
            min_connections: 2,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            connect_min_backoff_secs: 1,
            connect_max_backoff_secs: 30,
            connect_attempts: 5,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "COURIER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the public API and gateway
    #[arg(long, env = "COURIER_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for liveness and readiness probes
    #[arg(long, env = "COURIER_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for background tasks after a shutdown signal
    #[arg(long, env = "COURIER_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 3000, mgmt_port: 9090, shutdown_timeout_secs: 5 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Maximum size of a message body in bytes
    #[arg(long, env = "COURIER_MAX_TEXT_BYTES", default_value_t = 4096)]
    pub max_text_bytes: usize,

    /// Text that replaces the body of a deleted message
    #[arg(long, env = "COURIER_DELETED_PLACEHOLDER", default_value = "message deleted")]
    pub deleted_placeholder: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { max_text_bytes: 4096, deleted_placeholder: "message deleted".to_string() }
    }
}

#[derive(Clone, Debug, Args)]
pub struct LifecycleConfig {
    /// How often the scheduled/burnout sweep runs
    #[arg(long, env = "COURIER_SWEEP_INTERVAL_SECS", default_value_t = 30)]
    pub sweep_interval_secs: u64,

    /// Maximum number of messages handled per sweep phase
    #[arg(long, env = "COURIER_SWEEP_BATCH_LIMIT", default_value_t = 100)]
    pub batch_limit: i64,

    /// Arm single-shot timers for messages that fall due soon
    #[arg(long, env = "COURIER_TIMERS_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    pub timers_enabled: bool,

    /// Only messages due within this window get a single-shot timer
    #[arg(long, env = "COURIER_TIMER_HORIZON_SECS", default_value_t = 3600)]
    pub timer_horizon_secs: u64,

    /// Capacity of the channel feeding the timer queue
    #[arg(long, env = "COURIER_TIMER_QUEUE_CAPACITY", default_value_t = 1024)]
    pub timer_queue_capacity: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            batch_limit: 100,
            timers_enabled: true,
            timer_horizon_secs: 3600,
            timer_queue_capacity: 1024,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct WsConfig {
    /// Buffer size for outbound events per connection
    #[arg(long, env = "COURIER_WS_OUTBOUND_BUFFER_SIZE", default_value_t = 64)]
    pub outbound_buffer_size: usize,

    /// Largest inbound frame accepted, in bytes
    #[arg(long, env = "COURIER_WS_MAX_FRAME_BYTES", default_value_t = 65_536)]
    pub max_frame_bytes: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self { outbound_buffer_size: 64, max_frame_bytes: 65_536 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the database readiness check
    #[arg(long, env = "COURIER_HEALTH_DB_TIMEOUT_MS", default_value_t = 2000)]
    pub db_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { db_timeout_ms: 2000 }
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
    /// Log output format
    #[arg(long, env = "COURIER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; traces and metrics are exported only when set
    #[arg(long, env = "COURIER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
