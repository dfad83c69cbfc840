use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::engine::EngineConfig;
use crate::wal::Wal;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Server settings, read from `INNKEEP_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    /// WAL appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub log: String,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let max_connections: usize = parse_var(&lookup, "INNKEEP_MAX_CONNECTIONS")?.unwrap_or(256);
        if max_connections == 0 {
            return Err(ConfigError::Zero("INNKEEP_MAX_CONNECTIONS"));
        }
        let lock_timeout_ms: u64 = parse_var(&lookup, "INNKEEP_LOCK_TIMEOUT_MS")?.unwrap_or(250);
        if lock_timeout_ms == 0 {
            return Err(ConfigError::Zero("INNKEEP_LOCK_TIMEOUT_MS"));
        }

        Ok(Self {
            port: parse_var(&lookup, "INNKEEP_PORT")?.unwrap_or(5433),
            bind: lookup("INNKEEP_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir: lookup("INNKEEP_DATA_DIR").unwrap_or_else(|| "./data".into()).into(),
            password: lookup("INNKEEP_PASSWORD").unwrap_or_else(|| "innkeep".into()),
            max_connections,
            compact_threshold: parse_var(&lookup, "INNKEEP_COMPACT_THRESHOLD")?.unwrap_or(1000),
            metrics_port: parse_var(&lookup, "INNKEEP_METRICS_PORT")?,
            log: lookup("INNKEEP_LOG").unwrap_or_else(|| "info".into()),
            engine: EngineConfig {
                lock_timeout: Duration::from_millis(lock_timeout_ms),
                lock_retries: parse_var(&lookup, "INNKEEP_LOCK_RETRIES")?.unwrap_or(3),
            },
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        Wal::path_in(&self.data_dir)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}
