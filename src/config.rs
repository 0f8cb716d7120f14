use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 3;
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Payment-gateway (Stripe) configuration.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StripeConfig {
    /// API secret key used for outbound payment-intent calls
    #[validate(length(min = 1))]
    pub secret_key: String,

    /// Shared secret used to verify inbound webhook signatures
    #[validate(length(min = 1))]
    pub webhook_secret: String,

    /// Gateway API base URL (overridable for tests)
    #[serde(default = "default_stripe_api_base")]
    pub api_base_url: String,

    /// Frontend payment page; the client secret is appended as a query param
    pub payment_page_url: String,

    /// Bounded timeout for outbound gateway calls, in seconds
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_env")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Stripe gateway settings
    #[validate]
    pub stripe: StripeConfig,

    /// Remaining stock at or below which a low-stock notification fires
    /// (exclusive of zero: a sold-out variation is filtered, not alerted)
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i32,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_env() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}
fn default_low_stock_threshold() -> i32 {
    DEFAULT_LOW_STOCK_THRESHOLD
}
fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}

impl AppConfig {
    /// Loads configuration from `config/{environment}.toml` (if present) with
    /// `APP_`-prefixed environment-variable overrides, then validates it.
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_file = Path::new(CONFIG_DIR).join(format!("{}.toml", environment));

        let config = Config::builder()
            .add_source(File::from(config_file).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config
            .validate()
            .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

        info!(
            environment = %app_config.environment,
            host = %app_config.host,
            port = app_config.port,
            "configuration loaded"
        );
        Ok(app_config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
