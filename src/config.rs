use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_EVENT_BUFFER: usize = 1024;
const DEFAULT_FEED_CAPACITY: usize = 256;
const CONFIG_DIR: &str = "config";
const DEV_DEFAULT_JWT_SECRET: &str =
    "development_only_secret_key_change_me_before_exposing_this_service";

/// Application configuration, layered from `config/default.toml` and
/// `RELLENITAS_*` environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Database connection URL (Postgres in production, SQLite in tests).
    pub database_url: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// HS256 secret for verifying the auth provider's role tokens.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON logs instead of the human-readable format.
    #[serde(default)]
    pub log_json: bool,

    /// Run migrations on startup.
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    /// Bound on every request; a silent indefinite hang is the worst failure
    /// mode for the kitchen display.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Capacity of the event intake channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Capacity of the broadcast change feed; a subscriber that falls further
    /// behind than this gets a refetch signal instead of replayed deltas.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_jwt_secret() -> String {
    DEV_DEFAULT_JWT_SECRET.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

fn default_feed_capacity() -> usize {
    DEFAULT_FEED_CAPACITY
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Loads configuration from `config/default.toml` (optional) layered under
/// `RELLENITAS_*` environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let cfg = Config::builder()
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(Environment::with_prefix("RELLENITAS").separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    info!(host = %app.host, port = app.port, "Configuration loaded");
    Ok(app)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rellenitas_api={log_level},tower_http=info")));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
