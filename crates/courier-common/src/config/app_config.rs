//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub gateway: ServerConfig,
    pub database: Option<DatabaseConfig>,
    pub webhook: WebhookConfig,
    pub session: SessionSettings,
    pub pairing: PairingSettings,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Webhook delivery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Target used when a session has no webhook of its own
    pub default_url: Option<String>,
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_webhook_max_attempts")]
    pub max_attempts: u32,
}

impl WebhookConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Connection lifecycle tuning
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_connect_max_attempts")]
    pub connect_max_attempts: u32,
    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_auto_reconnect_delay_secs")]
    pub auto_reconnect_delay_secs: u64,
    #[serde(default = "default_auto_reconnect_interval_secs")]
    pub auto_reconnect_interval_secs: u64,
    #[serde(default = "default_side_effect_concurrency")]
    pub side_effect_concurrency: usize,
    #[serde(default = "default_restore_on_startup")]
    pub restore_on_startup: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            connect_max_attempts: default_connect_max_attempts(),
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            auto_reconnect_delay_secs: default_auto_reconnect_delay_secs(),
            auto_reconnect_interval_secs: default_auto_reconnect_interval_secs(),
            side_effect_concurrency: default_side_effect_concurrency(),
            restore_on_startup: default_restore_on_startup(),
        }
    }
}

/// Pairing code tuning
#[derive(Debug, Clone, Deserialize)]
pub struct PairingSettings {
    #[serde(default = "default_pairing_code_ttl_secs")]
    pub code_ttl_secs: u64,
    #[serde(default = "default_pairing_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for PairingSettings {
    fn default() -> Self {
        Self {
            code_ttl_secs: default_pairing_code_ttl_secs(),
            sweep_interval_secs: default_pairing_sweep_interval_secs(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "courier".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_webhook_max_attempts() -> u32 {
    3
}

fn default_connect_timeout_secs() -> u64 {
    300 // 5 minutes
}

fn default_connect_max_attempts() -> u32 {
    3
}

fn default_connect_retry_delay_ms() -> u64 {
    2000
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_auto_reconnect_delay_secs() -> u64 {
    5
}

fn default_auto_reconnect_interval_secs() -> u64 {
    30
}

fn default_side_effect_concurrency() -> usize {
    64
}

fn default_restore_on_startup() -> bool {
    true
}

fn default_pairing_code_ttl_secs() -> u64 {
    30
}

fn default_pairing_sweep_interval_secs() -> u64 {
    10
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &'static str| -> Result<Option<u64>, ConfigError> {
            lookup(key)
                .map(|s| {
                    s.trim()
                        .parse::<u64>()
                        .map_err(|_| ConfigError::InvalidValue(key, s))
                })
                .transpose()
        };

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: lookup("APP_ENV")
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            gateway: ServerConfig {
                host: lookup("GATEWAY_HOST").unwrap_or_else(default_host),
                port: lookup("GATEWAY_PORT")
                    .and_then(|s| s.parse().ok())
                    .ok_or(ConfigError::MissingVar("GATEWAY_PORT"))?,
            },
            database: lookup("DATABASE_URL").map(|url| DatabaseConfig {
                url,
                max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_max_connections),
                min_connections: lookup("DATABASE_MIN_CONNECTIONS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_min_connections),
            }),
            webhook: WebhookConfig {
                default_url: lookup("WEBHOOK_URL").filter(|s| !s.trim().is_empty()),
                timeout_secs: parsed("WEBHOOK_TIMEOUT_SECS")?
                    .unwrap_or_else(default_webhook_timeout_secs),
                max_attempts: parsed("WEBHOOK_MAX_ATTEMPTS")?
                    .map_or_else(default_webhook_max_attempts, |v| v as u32),
            },
            session: SessionSettings {
                connect_timeout_secs: parsed("CONNECT_TIMEOUT_SECS")?
                    .unwrap_or_else(default_connect_timeout_secs),
                connect_max_attempts: parsed("CONNECT_MAX_ATTEMPTS")?
                    .map_or_else(default_connect_max_attempts, |v| v as u32),
                connect_retry_delay_ms: parsed("CONNECT_RETRY_DELAY_MS")?
                    .unwrap_or_else(default_connect_retry_delay_ms),
                reconnect_delay_ms: parsed("RECONNECT_DELAY_MS")?
                    .unwrap_or_else(default_reconnect_delay_ms),
                auto_reconnect_delay_secs: parsed("AUTO_RECONNECT_DELAY_SECS")?
                    .unwrap_or_else(default_auto_reconnect_delay_secs),
                auto_reconnect_interval_secs: parsed("AUTO_RECONNECT_INTERVAL_SECS")?
                    .unwrap_or_else(default_auto_reconnect_interval_secs),
                side_effect_concurrency: parsed("SIDE_EFFECT_CONCURRENCY")?
                    .map_or_else(default_side_effect_concurrency, |v| v as usize),
                restore_on_startup: lookup("RESTORE_ON_STARTUP")
                    .map_or_else(default_restore_on_startup, |s| {
                        !matches!(s.to_lowercase().as_str(), "0" | "false" | "no" | "off")
                    }),
            },
            pairing: PairingSettings {
                code_ttl_secs: parsed("PAIRING_CODE_TTL_SECS")?
                    .unwrap_or_else(default_pairing_code_ttl_secs),
                sweep_interval_secs: parsed("PAIRING_SWEEP_INTERVAL_SECS")?
                    .unwrap_or_else(default_pairing_sweep_interval_secs),
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
