//! Configuration management for the relay service.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use relay_core::storage::TableName;
use relay_delivery::{ClientConfig, RelayConfig};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "relay.toml";

/// Longest accepted expiry window: one hundred years.
pub const MAX_EXPIRY_HOURS: u64 = 100 * 365 * 24;

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`relay.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// # Example
///
/// ```no_run
/// use relay_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Sweeping every {}s", config.sweep_interval_seconds);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Tables
    /// Table holding pending delivery records.
    ///
    /// Environment variable: `EVENT_TABLE`
    #[serde(default = "default_event_table", alias = "EVENT_TABLE")]
    pub event_table: String,
    /// Table holding subscriber endpoints.
    ///
    /// Environment variable: `SUBS_TABLE`
    #[serde(default = "default_subs_table", alias = "SUBS_TABLE")]
    pub subs_table: String,
    /// Rows fetched per page when scanning either table.
    ///
    /// Environment variable: `SCAN_PAGE_SIZE`
    #[serde(default = "default_scan_page_size", alias = "SCAN_PAGE_SIZE")]
    pub scan_page_size: i64,

    // Database
    /// PostgreSQL connection URL.
    ///
    /// Environment variable: `DATABASE_URL`
    #[serde(default = "default_database_url", alias = "DATABASE_URL")]
    pub database_url: String,
    /// Maximum number of database connections in the pool.
    ///
    /// Environment variable: `DATABASE_MAX_CONNECTIONS`
    #[serde(default = "default_max_connections", alias = "DATABASE_MAX_CONNECTIONS")]
    pub database_max_connections: u32,
    /// Database connection acquire timeout in seconds.
    ///
    /// Environment variable: `DATABASE_CONNECTION_TIMEOUT`
    #[serde(default = "default_acquire_timeout", alias = "DATABASE_CONNECTION_TIMEOUT")]
    pub database_connection_timeout: u64,

    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// Timeout for a whole trigger request in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    // Delivery
    /// HTTP timeout for one delivery attempt in seconds.
    ///
    /// Environment variable: `DELIVERY_TIMEOUT_SECONDS`
    #[serde(default = "default_delivery_timeout", alias = "DELIVERY_TIMEOUT_SECONDS")]
    pub delivery_timeout_seconds: u64,
    /// Deliveries attempted concurrently within one dispatch or sweep.
    ///
    /// Environment variable: `DELIVERY_CONCURRENCY`
    #[serde(default = "default_delivery_concurrency", alias = "DELIVERY_CONCURRENCY")]
    pub delivery_concurrency: usize,
    /// Hours after the first failure before a pending delivery is dropped.
    ///
    /// Environment variable: `EXPIRY_HOURS`
    #[serde(default = "default_expiry_hours", alias = "EXPIRY_HOURS")]
    pub expiry_hours: u64,
    /// Seconds between scheduled sweeps.
    ///
    /// Environment variable: `SWEEP_INTERVAL_SECONDS`
    #[serde(default = "default_sweep_interval", alias = "SWEEP_INTERVAL_SECONDS")]
    pub sweep_interval_seconds: u64,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns error if a source cannot be parsed or a value fails validation.
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::file(CONFIG_FILE))
                .merge(Env::prefixed("")),
        )
    }

    /// Extracts and validates configuration from an arbitrary figment.
    ///
    /// # Errors
    ///
    /// Returns error if extraction or validation fails.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to the relay's delivery configuration.
    pub fn to_relay_config(&self) -> RelayConfig {
        RelayConfig {
            expiry_window: Duration::from_secs(self.expiry_hours.saturating_mul(3600)),
            delivery_concurrency: self.delivery_concurrency,
            client_config: self.to_client_config(),
        }
    }

    /// Convert to client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.delivery_timeout_seconds),
            ..ClientConfig::default()
        }
    }

    /// Interval between scheduled sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Validated pending delivery table name.
    ///
    /// # Errors
    ///
    /// Returns error if the name is not a plain SQL identifier.
    pub fn event_table_name(&self) -> Result<TableName> {
        TableName::new(self.event_table.as_str()).context("Invalid EVENT_TABLE")
    }

    /// Validated subscriber table name.
    ///
    /// # Errors
    ///
    /// Returns error if the name is not a plain SQL identifier.
    pub fn subs_table_name(&self) -> Result<TableName> {
        TableName::new(self.subs_table.as_str()).context("Invalid SUBS_TABLE")
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Returns error if host and port do not form a socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Get database URL with password masked for logging.
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let mut masked = self.database_url.clone();
                masked.replace_range(colon_pos + 1..at_pos, "***");
                return masked;
            }
        }
        self.database_url.clone()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns error naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.event_table_name()?;
        self.subs_table_name()?;

        if self.event_table == self.subs_table {
            anyhow::bail!("event_table and subs_table must differ");
        }

        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.database_max_connections == 0 {
            anyhow::bail!("database max_connections must be greater than 0");
        }

        if self.delivery_timeout_seconds == 0 {
            anyhow::bail!("delivery_timeout_seconds must be greater than 0");
        }

        if self.delivery_concurrency == 0 {
            anyhow::bail!("delivery_concurrency must be greater than 0");
        }

        if self.expiry_hours == 0 {
            anyhow::bail!("expiry_hours must be greater than 0");
        }

        if self.expiry_hours > MAX_EXPIRY_HOURS {
            anyhow::bail!("expiry_hours must be at most {MAX_EXPIRY_HOURS}");
        }

        if self.sweep_interval_seconds == 0 {
            anyhow::bail!("sweep_interval_seconds must be greater than 0");
        }

        if self.scan_page_size <= 0 {
            anyhow::bail!("scan_page_size must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_table: default_event_table(),
            subs_table: default_subs_table(),
            scan_page_size: default_scan_page_size(),
            database_url: default_database_url(),
            database_max_connections: default_max_connections(),
            database_connection_timeout: default_acquire_timeout(),
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            delivery_timeout_seconds: default_delivery_timeout(),
            delivery_concurrency: default_delivery_concurrency(),
            expiry_hours: default_expiry_hours(),
            sweep_interval_seconds: default_sweep_interval(),
            rust_log: default_log_level(),
        }
    }
}

fn default_event_table() -> String {
    "events".to_string()
}

fn default_subs_table() -> String {
    "subscribers".to_string()
}

fn default_scan_page_size() -> i64 {
    relay_core::storage::DEFAULT_SCAN_PAGE_SIZE
}

fn default_database_url() -> String {
    "postgresql://localhost/relay".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    120
}

fn default_delivery_timeout() -> u64 {
    relay_delivery::DEFAULT_TIMEOUT_SECONDS
}

fn default_delivery_concurrency() -> usize {
    relay_delivery::DEFAULT_CONCURRENCY
}

fn default_expiry_hours() -> u64 {
    24
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info,relay=debug,tower_http=debug".to_string()
}
