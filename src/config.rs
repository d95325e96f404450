use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_REORDER_DISCOUNT_PERCENT: u32 = 10;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// API key required on admin discount-code routes
    #[validate(length(min = 16))]
    pub admin_api_key: String,

    /// Base URL of the hosted-payment collaborator (Stripe-shaped API)
    #[validate(url)]
    pub payment_gateway_base_url: String,

    /// Secret key sent as a bearer token to the payment gateway
    #[validate(length(min = 8))]
    pub payment_gateway_secret_key: String,

    /// URL the hosted checkout redirects to on success
    #[validate(url)]
    pub checkout_success_url: String,

    /// URL the hosted checkout redirects to on cancel
    #[validate(url)]
    pub checkout_cancel_url: String,

    /// Fallback reorder discount percentage when no fixed amount is known
    #[serde(default = "default_reorder_discount_percent")]
    pub reorder_discount_percent: u32,

    /// Outbound HTTP timeout to the payment gateway, in seconds
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,
}

impl AppConfig {
    /// Returns true in the development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Gets the logging level
    pub fn log_level(&self) -> &str {
        &self.log_level
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

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_reorder_discount_percent() -> u32 {
    DEFAULT_REORDER_DISCOUNT_PERCENT
}

fn default_gateway_timeout_secs() -> u64 {
    20
}

/// Loads configuration from files in `config/` plus `APP__`-prefixed
/// environment variables (env always wins).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
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

    // NOTE: admin_api_key and the gateway secret have no defaults - they MUST
    // come from env or a config file so insecure defaults never ship.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://checkout.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("payment_gateway_base_url", "https://api.stripe.com/v1")?
        .set_default("checkout_success_url", "https://localhost/order-success")?
        .set_default("checkout_cancel_url", "https://localhost/cart")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("admin_api_key").is_err() {
        error!("Admin API key is not configured. Set APP__ADMIN_API_KEY with a random string (minimum 16 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "admin_api_key is required but not configured. Set APP__ADMIN_API_KEY.".into(),
        )));
    }
    if config.get_string("payment_gateway_secret_key").is_err() {
        error!("Payment gateway secret is not configured. Set APP__PAYMENT_GATEWAY_SECRET_KEY.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "payment_gateway_secret_key is required but not configured.".into(),
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

/// Initializes the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("storefront_checkout_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 8080,
            environment: "development".into(),
            log_level: "info".into(),
            log_json: false,
            auto_migrate: true,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            admin_api_key: "0123456789abcdef".into(),
            payment_gateway_base_url: "https://api.stripe.com/v1".into(),
            payment_gateway_secret_key: "sk_test_123".into(),
            checkout_success_url: "https://shop.example/order-success".into(),
            checkout_cancel_url: "https://shop.example/cart".into(),
            reorder_discount_percent: 10,
            gateway_timeout_secs: 20,
        }
    }

    #[test]
    fn development_allows_permissive_cors() {
        let cfg = base_config();
        assert!(cfg.should_allow_permissive_cors());
    }

    #[test]
    fn production_requires_explicit_cors() {
        let mut cfg = base_config();
        cfg.environment = "production".into();
        assert!(!cfg.should_allow_permissive_cors());

        cfg.cors_allow_any_origin = true;
        assert!(cfg.should_allow_permissive_cors());
    }

    #[test]
    fn short_admin_key_fails_validation() {
        let mut cfg = base_config();
        cfg.admin_api_key = "short".into();
        assert!(cfg.validate().is_err());
    }
}
