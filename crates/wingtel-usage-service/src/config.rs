//! Service configuration.

use wingtel_usage_core::ZeroRowPolicy;
use wingtel_usage_store::StoreOptions;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/wingtel-usage").
    pub data_dir: String,

    /// API key required for raw record writes.
    pub service_api_key: Option<String>,

    /// API key required for aggregate rebuild and audit.
    pub admin_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// How long a write waits for a rollup row lock, in milliseconds.
    pub lock_timeout_ms: i64,

    /// Whether rollup rows that drop to zero are kept or removed.
    pub zero_rows: ZeroRowPolicy,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| parse_origins(&s))
                .unwrap_or(defaults.cors_origins),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            lock_timeout_ms: env_parse("LOCK_TIMEOUT_MS").unwrap_or(defaults.lock_timeout_ms),
            zero_rows: match std::env::var("ZERO_ROW_POLICY").as_deref() {
                Ok("delete") => ZeroRowPolicy::Delete,
                _ => ZeroRowPolicy::Keep,
            },
        }
    }

    /// Storage options derived from this configuration.
    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            lock_timeout_ms: self.lock_timeout_ms,
            zero_rows: self.zero_rows,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let store = StoreOptions::default();

        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/wingtel-usage".into(),
            service_api_key: None,
            admin_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024, // 1MB
            request_timeout_seconds: 30,
            lock_timeout_ms: store.lock_timeout_ms,
            zero_rows: store.zero_rows,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
