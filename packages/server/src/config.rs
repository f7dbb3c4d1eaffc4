//! Runtime configuration from environment variables
//!
//! | Variable                   | Default                      |
//! |----------------------------|------------------------------|
//! | `ARBOR_BIND_ADDR`          | `127.0.0.1`                  |
//! | `ARBOR_PORT`               | `3001`                       |
//! | `ARBOR_DB_PATH`            | `~/.arbor/database/arbor.db` |
//! | `CORS_ALLOW_ORIGIN`        | common local dev origins     |
//! | `ARBOR_STREAM_THROTTLE_MS` | `50`                         |
//! | `ARBOR_POLL_INTERVAL_MS`   | `100`                        |
//! | `ARBOR_POLL_MAX_TICKS`     | `300`                        |
//!
//! `CORS_ALLOW_ORIGIN` may list several origins separated by commas. A value that
//! does not parse is a startup error rather than a silent fallback.

use arbor_core::services::{NotifierConfig, StreamingConfig};
use arbor_core::tree::LayoutConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 3001;

const DEFAULT_CORS_ORIGINS: [&str; 3] = [
    "http://localhost:3000",
    "http://localhost:5173", // Vite default
    "http://localhost:1420",
];

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to determine home directory; set ARBOR_DB_PATH")]
    NoHomeDirectory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub db_path: PathBuf,
    pub cors_origins: Vec<String>,
    pub streaming: StreamingConfig,
    pub notifier: NotifierConfig,
    pub layout: LayoutConfig,
}

impl ServerConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns the raw value of a variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = parse_or(&lookup, "ARBOR_BIND_ADDR", IpAddr::V4(Ipv4Addr::LOCALHOST))?;
        let port = parse_or(&lookup, "ARBOR_PORT", DEFAULT_PORT)?;

        let db_path = match lookup("ARBOR_DB_PATH").filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => dirs::home_dir()
                .ok_or(ConfigError::NoHomeDirectory)?
                .join(".arbor")
                .join("database")
                .join("arbor.db"),
        };

        let cors_origins = match lookup("CORS_ALLOW_ORIGIN") {
            Some(raw) => {
                let origins: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect();
                if let Some(bad) = origins.iter().find(|o| !o.starts_with("http")) {
                    return Err(ConfigError::InvalidValue {
                        key: "CORS_ALLOW_ORIGIN",
                        value: bad.clone(),
                        reason: "origin must start with http:// or https://".to_string(),
                    });
                }
                origins
            }
            None => DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        let streaming = StreamingConfig {
            throttle: Duration::from_millis(parse_or(&lookup, "ARBOR_STREAM_THROTTLE_MS", 50)?),
            ..StreamingConfig::default()
        };

        let poll_interval_ms: u64 = parse_or(&lookup, "ARBOR_POLL_INTERVAL_MS", 100)?;
        if poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ARBOR_POLL_INTERVAL_MS",
                value: "0".to_string(),
                reason: "poll interval must be positive".to_string(),
            });
        }
        let notifier = NotifierConfig {
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_ticks: parse_or(&lookup, "ARBOR_POLL_MAX_TICKS", 300)?,
        };

        Ok(Self {
            bind_addr,
            port,
            db_path,
            cors_origins,
            streaming,
            notifier,
            layout: LayoutConfig::default(),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
