//! Application configuration loaded from environment variables.

use thiserror::Error;

/// Error raised when an environment variable holds an unusable value.
#[derive(Debug, Error)]
#[error("invalid value {value:?} for {name}")]
pub struct ConfigError {
    pub name: &'static str,
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
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `API_PORT` or `PORT`: listen port (default: `3000`)
/// - `DATABASE_URL`: PostgreSQL connection string; the in-memory store is used when unset
/// - `DB_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `RUN_MIGRATIONS`: apply embedded migrations at start-up (default: `true`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// unset or empty variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let port = match get("API_PORT")
            .map(|value| ("API_PORT", value))
            .or_else(|| get("PORT").map(|value| ("PORT", value)))
        {
            Some((name, value)) => parse(name, &value)?,
            None => defaults.port,
        };

        let max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(value) => match parse("DB_MAX_CONNECTIONS", &value)? {
                0 => {
                    return Err(ConfigError {
                        name: "DB_MAX_CONNECTIONS",
                        value,
                    });
                }
                n => n,
            },
            None => defaults.max_connections,
        };

        let run_migrations = match get("RUN_MIGRATIONS") {
            Some(value) => parse_bool("RUN_MIGRATIONS", &value)?,
            None => defaults.run_migrations,
        };

        let log_format = match get("LOG_FORMAT") {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError {
                        name: "LOG_FORMAT",
                        value,
                    });
                }
            },
            None => defaults.log_format,
        };

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port,
            database_url: get("DATABASE_URL"),
            max_connections,
            run_migrations,
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
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
            database_url: None,
            max_connections: 10,
            run_migrations: true,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError {
        name,
        value: value.to_string(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_url, None);
        assert_eq!(config.max_connections, 10);
        assert!(config.run_migrations);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_api_port_wins_over_port() {
        let config = load(&[("API_PORT", "8080"), ("PORT", "9090")]).unwrap();
        assert_eq!(config.port, 8080);

        let config = load(&[("PORT", "9090")]).unwrap();
        assert_eq!(config.port, 9090);
    }

    #[test]
    fn test_database_settings() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("DB_MAX_CONNECTIONS", "25"),
            ("RUN_MIGRATIONS", "false"),
        ])
        .unwrap();
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/shop")
        );
        assert_eq!(config.max_connections, 25);
        assert!(!config.run_migrations);
    }

    #[test]
    fn test_empty_values_fall_back_to_defaults() {
        let config = load(&[("DATABASE_URL", ""), ("PORT", "  ")]).unwrap();
        assert_eq!(config.database_url, None);
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();
        assert_eq!(err.name, "PORT");
        assert!(load(&[("DB_MAX_CONNECTIONS", "0")]).is_err());
        assert!(load(&[("RUN_MIGRATIONS", "maybe")]).is_err());
        assert!(load(&[("LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn test_json_log_format() {
        let config = load(&[("LOG_FORMAT", "JSON")]).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
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
}
