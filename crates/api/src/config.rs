//! Application configuration loaded from environment variables.

use std::str::FromStr;

use domain::PricingConfig;
use rust_decimal::Decimal;
use saga::{NotificationSettings, PayPalConfig, PayPalEnv};
use secrecy::SecretString;
use thiserror::Error;

/// A variable was set to something unusable.
#[derive(Debug, Error)]
#[error("invalid value for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

/// How log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `json` for structured logs
/// - `DATABASE_URL`: Postgres; the in-memory store is used when unset
/// - `TAX_RATE`, `FEATURE_FREE_SHIPPING`, `FEATURE_MIN_ORDER_FLOOR`,
///   `MIN_ORDER_CENTS`, `SHIPPING_METHOD_LABEL`: pricing
/// - `PAYPAL_ENV`, `PAYPAL_CLIENT_ID`, `PAYPAL_CLIENT_SECRET`: gateway
/// - `RESEND_API_KEY`, `EMAIL_FROM`, `EMAIL_REPLY_TO`, `ADMIN_EMAIL`,
///   `PUBLIC_SITE_URL`: notifications
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<SecretString>,
    pub pricing: PricingConfig,
    pub paypal: PayPalConfig,
    pub resend_api_key: Option<SecretString>,
    pub notifications: NotificationSettings,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let mut pricing = defaults.pricing;
        if let Some(rate) = parse::<Decimal>(&get, "TAX_RATE")? {
            if rate.is_sign_negative() {
                return Err(ConfigError {
                    var: "TAX_RATE",
                    reason: "must not be negative".to_string(),
                });
            }
            pricing.tax_rate = rate;
        }
        if let Some(flag) = flag(&get, "FEATURE_FREE_SHIPPING")? {
            pricing.free_shipping = flag;
        }
        if let Some(flag) = flag(&get, "FEATURE_MIN_ORDER_FLOOR")? {
            pricing.min_order_floor_enabled = flag;
        }
        if let Some(cents) = parse::<i64>(&get, "MIN_ORDER_CENTS")? {
            pricing.min_order_cents = cents.max(0);
        }
        if let Some(label) = get("SHIPPING_METHOD_LABEL") {
            pricing.shipping_method_label = label;
        }

        let mut notifications = defaults.notifications;
        if let Some(from) = get("EMAIL_FROM") {
            notifications.from = from;
        }
        if let Some(reply_to) = get("EMAIL_REPLY_TO") {
            notifications.reply_to = Some(reply_to);
        }
        if let Some(admin) = get("ADMIN_EMAIL") {
            notifications.admin_email = admin;
        }
        if let Some(site) = get("PUBLIC_SITE_URL") {
            notifications.site_url = site.trim_end_matches('/').to_string();
        }

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match get("LOG_FORMAT") {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: get("DATABASE_URL").map(SecretString::from),
            pricing,
            paypal: PayPalConfig {
                env: get("PAYPAL_ENV")
                    .map(|env| PayPalEnv::parse(&env))
                    .unwrap_or_default(),
                client_id: get("PAYPAL_CLIENT_ID"),
                client_secret: get("PAYPAL_CLIENT_SECRET").map(SecretString::from),
            },
            resend_api_key: get("RESEND_API_KEY").map(SecretString::from),
            notifications,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            pricing: PricingConfig::default(),
            paypal: PayPalConfig::default(),
            resend_api_key: None,
            notifications: NotificationSettings::default(),
        }
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(var)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError {
                var,
                reason: format!("{raw:?}: {e}"),
            })
        })
        .transpose()
}

fn flag(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<bool>, ConfigError> {
    get(var)
        .map(|raw| match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError {
                var,
                reason: format!("{raw:?} is not a boolean"),
            }),
        })
        .transpose()
}
