//! Configuration management

use std::time::Duration;

use anyhow::{self, Context, Result};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_BATCH_SIZE: i64 = 10;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Pool size
    pub max_connections: u32,

    /// Maximum number of waiting batches claimed per run
    pub batch_size: i64,

    /// Pause between import runs in `serve` mode
    pub poll_interval: Duration,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number (got '{}')", key, raw)),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let batch_size = parse_or(&lookup, "IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        let poll_interval_secs = parse_or(&lookup, "IMPORT_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;

        if batch_size < 1 {
            anyhow::bail!("IMPORT_BATCH_SIZE must be at least 1 (got {})", batch_size);
        }
        if poll_interval_secs == 0 {
            anyhow::bail!("IMPORT_POLL_INTERVAL_SECS must be at least 1");
        }

        Ok(Self {
            database_url,
            max_connections,
            batch_size,
            poll_interval: Duration::from_secs(poll_interval_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("DATABASE_URL", "postgres://test")]).unwrap();
        assert_eq!(config.database_url, "postgres://test");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("DATABASE_URL", "postgres://test"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("IMPORT_BATCH_SIZE", " 25 "),
            ("IMPORT_POLL_INTERVAL_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_database_url_required() {
        let err = config(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        let err = config(&[("DATABASE_URL", "postgres://test"), ("IMPORT_BATCH_SIZE", "ten")]).unwrap_err();
        assert!(err.to_string().contains("IMPORT_BATCH_SIZE"));

        let err = config(&[("DATABASE_URL", "postgres://test"), ("IMPORT_BATCH_SIZE", "0")]).unwrap_err();
        assert!(err.to_string().contains("at least 1"));

        let err = config(&[("DATABASE_URL", "postgres://test"), ("IMPORT_POLL_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("IMPORT_POLL_INTERVAL_SECS"));
    }
}
