use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_PHONE_COUNTRY_CODE: &str = "593";
const DEFAULT_HOME_ROUTE: &str = "/";
const DEFAULT_CHECKOUT_ROUTE: &str = "/checkout";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_MAX_PROOF_BYTES: usize = 5 * 1024 * 1024; // 5 MiB
const DEFAULT_OUTBOX_MAX_ATTEMPTS: u32 = 8;
const DEFAULT_OUTBOX_POLL_SECS: u64 = 30;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Payment gateway configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Gateway API base URL
    #[validate(url)]
    pub base_url: String,

    /// Bearer credential issued by the gateway
    #[validate(length(min = 16))]
    pub token: String,

    /// Store identifier registered with the gateway
    #[validate(length(min = 1))]
    pub store_id: String,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Backend REST API base URL
    #[validate(url)]
    pub api_base_url: String,

    /// Storefront URL the gateway redirects back to after a link payment;
    /// the client transaction id is appended as a query parameter.
    #[validate(url)]
    pub payment_callback_url: String,

    /// Payment gateway configuration
    #[validate]
    pub gateway: GatewayConfig,

    /// Country calling code prefixed to normalized phone numbers
    #[serde(default = "default_phone_country_code")]
    pub phone_country_code: String,

    /// Route navigated to on forced logout
    #[serde(default = "default_home_route")]
    pub home_route: String,

    /// Route exempt from the forced-logout redirect
    #[serde(default = "default_checkout_route")]
    pub checkout_route: String,

    /// HTTP client timeout (seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// TTL for cached backend reads (seconds)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum accepted deposit-proof upload size in bytes
    #[serde(default = "default_max_proof_bytes")]
    pub max_proof_bytes: usize,

    /// Outbox: attempts before an orphaned charge is parked as failed
    #[serde(default = "default_outbox_max_attempts")]
    pub outbox_max_attempts: u32,

    /// Outbox: worker poll interval (seconds)
    #[serde(default = "default_outbox_poll_secs")]
    pub outbox_poll_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,
}

impl AppConfig {
    /// Creates a configuration from the required values, leaving everything
    /// else at its default. Primarily used by tests and embedders.
    pub fn new(api_base_url: String, payment_callback_url: String, gateway: GatewayConfig) -> Self {
        Self {
            api_base_url,
            payment_callback_url,
            gateway,
            phone_country_code: default_phone_country_code(),
            home_route: default_home_route(),
            checkout_route: default_checkout_route(),
            http_timeout_secs: default_http_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_proof_bytes: default_max_proof_bytes(),
            outbox_max_attempts: default_outbox_max_attempts(),
            outbox_poll_secs: default_outbox_poll_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets cache TTL as a Duration
    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_ttl_secs)
    }

    /// Gets the HTTP client timeout as a Duration
    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_phone_country_code() -> String {
    DEFAULT_PHONE_COUNTRY_CODE.to_string()
}

fn default_home_route() -> String {
    DEFAULT_HOME_ROUTE.to_string()
}

fn default_checkout_route() -> String {
    DEFAULT_CHECKOUT_ROUTE.to_string()
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_max_proof_bytes() -> usize {
    DEFAULT_MAX_PROOF_BYTES
}

fn default_outbox_max_attempts() -> u32 {
    DEFAULT_OUTBOX_MAX_ATTEMPTS
}

fn default_outbox_poll_secs() -> u64 {
    DEFAULT_OUTBOX_POLL_SECS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("checkout_core={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // NOTE: gateway.token has no default - it MUST be provided via environment
    // variable or config file so a deployment can never silently run without
    // gateway credentials.
    let builder = Config::builder()
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("gateway.token").is_err() {
        error!("Gateway credential is not configured. Set APP__GATEWAY__TOKEN with the bearer token issued by the payment gateway.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "gateway.token is required but not configured. Set APP__GATEWAY__TOKEN environment variable.".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
