//! Configuration module for the site backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.
//! The password pepper is the only required value: without it no credential can
//! be hashed, so startup fails instead of serving requests.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Environment variable holding the password pepper.
pub const PEPPER_VAR: &str = "PEPPER";

/// Fatal configuration problems detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PEPPER is not set; admin credentials cannot be hashed")]
    MissingPepper,
    #[error("password hasher cannot be initialized: {0}")]
    Hasher(String),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Outbound mail settings for the contact form relay.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Webhook endpoint of the mail relay; when unset mails are only logged
    pub relay_url: Option<String>,
    /// Sender address of relayed contact messages
    pub from: String,
    /// Company inbox receiving contact messages
    pub to: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key guarding the admin routes (open when unset)
    pub api_psk: Option<String>,
    /// Server-wide secret appended to passwords before hashing
    pub pepper: String,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Directory where uploaded project images are stored
    pub upload_dir: PathBuf,
    /// Maximum accepted image size in bytes
    pub max_upload_bytes: usize,
    /// Requests allowed per client per minute
    pub rate_limit_per_minute: u32,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub mail: MailConfig,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pepper = lookup(PEPPER_VAR)
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::MissingPepper)?;

        let api_psk = lookup("SITE_API_PSK").filter(|k| !k.is_empty());

        let db_path = lookup("SITE_DB_PATH")
            .unwrap_or_else(|| "./data/site.sqlite".to_string())
            .into();

        let upload_dir = lookup("SITE_UPLOAD_DIR")
            .unwrap_or_else(|| "./data/assets".to_string())
            .into();

        let max_upload_bytes = parse_or("SITE_MAX_UPLOAD_BYTES", &lookup, 1_000_000)?;
        let rate_limit_per_minute = parse_or("SITE_RATE_LIMIT_PER_MINUTE", &lookup, 20)?;
        let bind_addr = parse_or(
            "SITE_BIND_ADDR",
            &lookup,
            SocketAddr::from(([127, 0, 0, 1], 3000)),
        )?;

        let log_level = lookup("SITE_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let mail = MailConfig {
            relay_url: lookup("SITE_MAIL_RELAY_URL").filter(|u| !u.is_empty()),
            from: lookup("EMAIL_USER").unwrap_or_else(|| "no-reply@localhost".to_string()),
            to: lookup("COMPANY_EMAIL").unwrap_or_else(|| "contact@localhost".to_string()),
        };

        Ok(Self {
            api_psk,
            pepper,
            db_path,
            upload_dir,
            max_upload_bytes,
            rate_limit_per_minute,
            bind_addr,
            log_level,
            mail,
        })
    }
}

fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::from_lookup(lookup_from(&[("PEPPER", "pepper")])).unwrap();

        assert!(config.api_psk.is_none());
        assert_eq!(config.pepper, "pepper");
        assert_eq!(config.db_path, PathBuf::from("./data/site.sqlite"));
        assert_eq!(config.upload_dir, PathBuf::from("./data/assets"));
        assert_eq!(config.max_upload_bytes, 1_000_000);
        assert_eq!(config.rate_limit_per_minute, 20);
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:3000");
        assert_eq!(config.log_level, "info");
        assert!(config.mail.relay_url.is_none());
    }

    #[test]
    fn test_missing_pepper_is_fatal() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPepper));

        let err = Config::from_lookup(lookup_from(&[("PEPPER", "")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPepper));
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = Config::from_lookup(lookup_from(&[
            ("PEPPER", "pepper"),
            ("SITE_RATE_LIMIT_PER_MINUTE", "lots"),
        ]))
        .unwrap_err();

        match err {
            ConfigError::Invalid { key, value, .. } => {
                assert_eq!(key, "SITE_RATE_LIMIT_PER_MINUTE");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PEPPER", "pepper"),
            ("SITE_API_PSK", "secret"),
            ("SITE_BIND_ADDR", "0.0.0.0:8080"),
            ("SITE_MAIL_RELAY_URL", "http://relay.local/send"),
            ("COMPANY_EMAIL", "hello@synapse.test"),
        ]))
        .unwrap();

        assert_eq!(config.api_psk.as_deref(), Some("secret"));
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(
            config.mail.relay_url.as_deref(),
            Some("http://relay.local/send")
        );
        assert_eq!(config.mail.to, "hello@synapse.test");
    }
}
