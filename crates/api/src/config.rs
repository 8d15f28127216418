//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::{Money, Service};
use thiserror::Error;

/// A configuration value that could not be parsed.
#[derive(Debug, Error)]
#[error("invalid {key}: {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `SERVICE`: which participant to run (default: all of them in one process)
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `NATS_URL`: JetStream server; unset means an in-memory bus
/// - `AUTHZ_URL`: policy listing endpoint of the authorization service
/// - `POLICY_CACHE_TTL_SECS`: idle lifetime of a cached subject (default: `300`)
/// - `POLICY_CACHE_SWEEP_SECS`: expired-entry sweep interval (default: `600`)
/// - `INITIAL_WALLET_BALANCE_CENTS`: funds of a new wallet (default: `10000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub service: Option<Service>,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub nats_url: Option<String>,
    pub authz_url: String,
    pub policy_cache_ttl: Duration,
    pub policy_cache_sweep: Duration,
    pub initial_wallet_balance: Money,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let service = match var("SERVICE").as_deref() {
            None | Some("all") => None,
            Some(name) => Some(name.parse().map_err(|_| ConfigError {
                key: "SERVICE",
                value: name.to_string(),
            })?),
        };
        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            service,
            host: var("HOST").unwrap_or(defaults.host),
            port: parse(&var, "PORT")?.unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            nats_url: var("NATS_URL"),
            authz_url: var("AUTHZ_URL").unwrap_or(defaults.authz_url),
            policy_cache_ttl: parse(&var, "POLICY_CACHE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.policy_cache_ttl),
            policy_cache_sweep: parse(&var, "POLICY_CACHE_SWEEP_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.policy_cache_sweep),
            initial_wallet_balance: parse(&var, "INITIAL_WALLET_BALANCE_CENTS")?
                .map(Money::from_cents)
                .unwrap_or(defaults.initial_wallet_balance),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Name this process uses as an event consumer and client.
    pub fn process_name(&self) -> &'static str {
        self.service.map_or("all", |s| s.as_str())
    }

    /// Services hosted by this process.
    pub fn services(&self) -> Vec<Service> {
        match self.service {
            Some(service) => vec![service],
            None => Service::ALL.to_vec(),
        }
    }
}

fn parse<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    var(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError { key, value })
        })
        .transpose()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: None,
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            nats_url: None,
            authz_url: "http://localhost:3000/policies".to_string(),
            policy_cache_ttl: Duration::from_secs(300),
            policy_cache_sweep: Duration::from_secs(600),
            initial_wallet_balance: Money::from_cents(10_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.policy_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.policy_cache_sweep, Duration::from_secs(600));
        assert_eq!(config.initial_wallet_balance, Money::from_cents(10_000));
        assert!(config.nats_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_addr_default() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_empty_environment_runs_everything() {
        let config = from_pairs(&[]).unwrap();
        assert!(config.service.is_none());
        assert_eq!(config.process_name(), "all");
        assert_eq!(config.services().len(), 5);
    }

    #[test]
    fn test_reads_overrides() {
        let config = from_pairs(&[
            ("SERVICE", "paymentsvc"),
            ("PORT", "8085"),
            ("LOG_FORMAT", "json"),
            ("NATS_URL", "nats://nats:4222"),
            ("POLICY_CACHE_TTL_SECS", "30"),
            ("INITIAL_WALLET_BALANCE_CENTS", "250"),
        ])
        .unwrap();
        assert_eq!(config.service, Some(Service::Payment));
        assert_eq!(config.services(), vec![Service::Payment]);
        assert_eq!(config.process_name(), "paymentsvc");
        assert_eq!(config.port, 8085);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.nats_url.as_deref(), Some("nats://nats:4222"));
        assert_eq!(config.policy_cache_ttl, Duration::from_secs(30));
        assert_eq!(config.initial_wallet_balance, Money::from_cents(250));
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = from_pairs(&[("SERVICE", "shippingsvc")]).unwrap_err();
        assert_eq!(err.key, "SERVICE");
        let err = from_pairs(&[("PORT", "http")]).unwrap_err();
        assert_eq!(err.key, "PORT");
        assert!(from_pairs(&[("LOG_FORMAT", "xml")]).is_err());
    }
}
