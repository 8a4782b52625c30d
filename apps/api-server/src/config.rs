//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use replica_db::DbConfig;

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3030)
    pub port: u16,
    /// Log format
    pub log_format: LogFormat,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Replica set connection settings
    pub db: DbConfig,
    /// How long to wait for the replica set to close on shutdown
    pub graceful_timeout: Duration,
}

fn parsed_var<T: FromStr>(field: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match env::var(field) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError {
            field,
            message: format!("Invalid value '{}': {}", raw, e),
        }),
        Err(_) => Ok(default),
    }
}

fn split_hosts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parsed_var("PORT", 3030)?;

        let log_format =
            LogFormat::from_str(&env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".into()));

        // CORS allow origin
        let cors_origin_str = env::var("CORS_ALLOW_ORIGIN").unwrap_or_else(|_| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Database replica set. DB_HOSTS is a comma-separated list; the first
        // host is the primary.
        let driver = env::var("DB_DRIVER").unwrap_or_else(|_| "sqlite".into());
        let hosts_raw =
            env::var("DB_HOSTS").unwrap_or_else(|_| "sqlite://todo.db?mode=rwc".into());
        let hosts = split_hosts(&hosts_raw);
        if hosts.is_empty() {
            return Err(ConfigError {
                field: "DB_HOSTS",
                message: "At least one host is required".into(),
            });
        }

        let max_open_conns = parsed_var("DB_MAX_OPEN_CONNS", 25u32)?;
        let max_idle_conns = parsed_var("DB_MAX_IDLE_CONNS", 5u32)?;
        let lifetime_secs = parsed_var("DB_CONN_MAX_LIFETIME_SECS", 300u64)?;
        let graceful_secs = parsed_var("GRACEFUL_TIMEOUT_SECS", 10u64)?;

        Ok(Self {
            port,
            log_format,
            cors_allow_origin,
            db: DbConfig {
                driver,
                hosts,
                max_open_conns,
                max_idle_conns,
                conn_max_lifetime: Duration::from_secs(lifetime_secs),
            },
            graceful_timeout: Duration::from_secs(graceful_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::from_str("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("anything"), LogFormat::Pretty);
    }

    #[test]
    fn hosts_split_on_commas_and_trim() {
        assert_eq!(
            split_hosts("primary:3306, replica-a:3306 ,replica-b:3306"),
            vec!["primary:3306", "replica-a:3306", "replica-b:3306"]
        );
        assert_eq!(split_hosts("one"), vec!["one"]);
        assert!(split_hosts(" , ,").is_empty());
    }
}
