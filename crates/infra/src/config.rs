//! Store configuration, read from the environment.

use std::time::Duration;

use thiserror::Error;

pub const DATABASE_URL: &str = "CHECKOUT_DATABASE_URL";
pub const FALLBACK_DATABASE_URL: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS: &str = "CHECKOUT_DB_MAX_CONNECTIONS";
pub const ACQUIRE_TIMEOUT_SECS: &str = "CHECKOUT_DB_ACQUIRE_TIMEOUT_SECS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres(PostgresConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

impl StoreConfig {
    /// Postgres when a database URL is set, in-memory otherwise.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(DATABASE_URL)
            .or_else(|| lookup(FALLBACK_DATABASE_URL))
            .filter(|url| !url.trim().is_empty());

        let Some(url) = url else {
            return Ok(Self {
                backend: StoreBackend::InMemory,
            });
        };

        let max_connections = parse_or(&lookup, MAX_CONNECTIONS, DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: MAX_CONNECTIONS,
                value: "0".to_string(),
            });
        }
        let timeout_secs = parse_or(&lookup, ACQUIRE_TIMEOUT_SECS, DEFAULT_ACQUIRE_TIMEOUT_SECS)?;

        Ok(Self {
            backend: StoreBackend::Postgres(PostgresConfig {
                url,
                max_connections,
                acquire_timeout: Duration::from_secs(timeout_secs),
            }),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<StoreConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StoreConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn no_database_url_means_in_memory() {
        assert_eq!(config(&[]).unwrap().backend, StoreBackend::InMemory);
        assert_eq!(
            config(&[(DATABASE_URL, "  ")]).unwrap().backend,
            StoreBackend::InMemory
        );
    }

    #[test]
    fn database_url_selects_postgres_with_defaults() {
        let cfg = config(&[(FALLBACK_DATABASE_URL, "postgres://localhost/shop")]).unwrap();
        assert_eq!(
            cfg.backend,
            StoreBackend::Postgres(PostgresConfig {
                url: "postgres://localhost/shop".to_string(),
                max_connections: 5,
                acquire_timeout: Duration::from_secs(5),
            })
        );
    }

    #[test]
    fn prefixed_url_wins_and_pool_settings_are_read() {
        let cfg = config(&[
            (DATABASE_URL, "postgres://primary/shop"),
            (FALLBACK_DATABASE_URL, "postgres://other/shop"),
            (MAX_CONNECTIONS, "12"),
            (ACQUIRE_TIMEOUT_SECS, "30"),
        ])
        .unwrap();

        match cfg.backend {
            StoreBackend::Postgres(pg) => {
                assert_eq!(pg.url, "postgres://primary/shop");
                assert_eq!(pg.max_connections, 12);
                assert_eq!(pg.acquire_timeout, Duration::from_secs(30));
            }
            other => panic!("expected Postgres backend, got {other:?}"),
        }
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = config(&[(DATABASE_URL, "postgres://x/y"), (MAX_CONNECTIONS, "lots")])
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: MAX_CONNECTIONS,
                value: "lots".to_string()
            }
        );
        assert!(config(&[(DATABASE_URL, "postgres://x/y"), (MAX_CONNECTIONS, "0")]).is_err());
    }
}
