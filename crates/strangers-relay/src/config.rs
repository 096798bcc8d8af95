//! Relay configuration, read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use strangers_core::CoordinatorConfig;
use strangers_core::coordinator::{DEFAULT_ABANDON_PERIOD, DEFAULT_GRACE_PERIOD};

use crate::error::{RelayError, Result};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub bind_host: String,
    pub port: u16,
    /// SQLite file for the user directory. `:memory:` keeps it in RAM.
    pub db_path: PathBuf,
    pub push_url: String,
    pub push_enabled: bool,
    pub grace_period: Duration,
    pub abandon_period: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            db_path: PathBuf::from("strangers.db"),
            push_url: DEFAULT_EXPO_PUSH_URL.to_string(),
            push_enabled: true,
            grace_period: DEFAULT_GRACE_PERIOD,
            abandon_period: DEFAULT_ABANDON_PERIOD,
        }
    }
}

impl RelayConfig {
    /// Read `PORT`, `BIND_HOST`, `STRANGERS_DB`, `EXPO_PUSH_URL`,
    /// `PUSH_DISABLED`, `GRACE_PERIOD_SECS` and `ABANDON_PERIOD_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let push_disabled = get("PUSH_DISABLED")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            bind_host: get("BIND_HOST").unwrap_or(defaults.bind_host),
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            db_path: get("STRANGERS_DB").map(PathBuf::from).unwrap_or(defaults.db_path),
            push_url: get("EXPO_PUSH_URL").unwrap_or(defaults.push_url),
            push_enabled: !push_disabled,
            grace_period: parse(&get, "GRACE_PERIOD_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.grace_period),
            abandon_period: parse(&get, "ABANDON_PERIOD_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.abandon_period),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            grace_period: self.grace_period,
            abandon_period: self.abandon_period,
        }
    }
}

fn parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RelayError::Config(format!("{key} must be a number, got '{raw}'"))),
    }
}
