//! Configuration module for the Peregrine sync service.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Datelike, Utc};

use crate::errors::ConfigError;
use crate::sync::{FanoutPolicy, OverlapPolicy, SyncConfig};

const DEFAULT_TBA_URL: &str = "https://www.thebluealliance.com/api/v3";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the health/status server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    /// Base URL of the TBA read API
    pub tba_url: String,
    /// TBA read API key
    pub tba_api_key: Option<String>,
    /// Season to sync events for
    pub year: i32,
    pub slow_interval: Duration,
    pub fast_interval: Duration,
    pub fetch_timeout: Duration,
    pub store_timeout: Duration,
    pub drain_timeout: Duration,
    pub fanout_policy: FanoutPolicy,
    pub overlap_policy: OverlapPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("PEREGRINE_DB_PATH")
            .unwrap_or_else(|_| "./data/peregrine.sqlite".to_string())
            .into();

        let bind_addr = parse_var("PEREGRINE_BIND_ADDR", "127.0.0.1:8080".parse().ok())?
            .ok_or(ConfigError::Missing("PEREGRINE_BIND_ADDR"))?;

        let log_level = env::var("PEREGRINE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = parse_var("PEREGRINE_LOG_JSON", Some(false))?.unwrap_or(false);

        let tba_url = env::var("PEREGRINE_TBA_URL")
            .unwrap_or_else(|_| DEFAULT_TBA_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let tba_api_key = env::var("PEREGRINE_TBA_API_KEY").ok();

        let year = parse_var("PEREGRINE_YEAR", Some(Utc::now().year()))?
            .unwrap_or_else(|| Utc::now().year());

        let fanout_policy = match env::var("PEREGRINE_FANOUT_POLICY") {
            Ok(value) => FanoutPolicy::parse(&value).ok_or(ConfigError::Invalid {
                var: "PEREGRINE_FANOUT_POLICY",
                value,
            })?,
            Err(_) => FanoutPolicy::default(),
        };

        let overlap_policy = match env::var("PEREGRINE_OVERLAP_POLICY") {
            Ok(value) => OverlapPolicy::parse(&value).ok_or(ConfigError::Invalid {
                var: "PEREGRINE_OVERLAP_POLICY",
                value,
            })?,
            Err(_) => OverlapPolicy::default(),
        };

        Ok(Self {
            db_path,
            bind_addr,
            log_level,
            log_json,
            tba_url,
            tba_api_key,
            year,
            slow_interval: secs_var("PEREGRINE_SLOW_INTERVAL_SECS", 15 * 60)?,
            fast_interval: secs_var("PEREGRINE_FAST_INTERVAL_SECS", 60)?,
            fetch_timeout: secs_var("PEREGRINE_FETCH_TIMEOUT_SECS", 15)?,
            store_timeout: secs_var("PEREGRINE_STORE_TIMEOUT_SECS", 30)?,
            drain_timeout: secs_var("PEREGRINE_DRAIN_TIMEOUT_SECS", 10)?,
            fanout_policy,
            overlap_policy,
        })
    }

    /// The immutable engine settings derived from this configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            year: self.year,
            slow_interval: self.slow_interval,
            fast_interval: self.fast_interval,
            fetch_timeout: self.fetch_timeout,
            store_timeout: self.store_timeout,
            drain_timeout: self.drain_timeout,
            fanout_policy: self.fanout_policy,
            overlap_policy: self.overlap_policy,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &'static str,
    default: Option<T>,
) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

fn secs_var(var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let secs = parse_var(var, Some(default))?.unwrap_or(default);
    if secs == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
