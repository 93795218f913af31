//! Runtime configuration
//!
//! [`TcovConfig`] has defaults for every key, can be read from TOML and is
//! finally adjusted by `TCOV_*` environment variables:
//!
//! | key | variable |
//! |---|---|
//! | `realtime` | `TCOV_REALTIME` |
//! | `send_packages` | `TCOV_SEND_PACKAGES` |
//! | `fan_out_workers` | `TCOV_FAN_OUT_WORKERS` |
//! | `default_scope_name` | `TCOV_DEFAULT_SCOPE_NAME` |
//! | `default_test_name` | `TCOV_DEFAULT_TEST_NAME` |
//! | `log_format` | `TCOV_LOG_FORMAT` |

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tcov_session::DEFAULT_SCOPE_NAME;

const ENV_PREFIX: &str = "TCOV_";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML could not be parsed
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A key has an unusable value
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Config key or environment variable
        key: String,
        /// Rejected value
        value: String,
    },
}

impl ConfigError {
    fn invalid(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::invalid("log_format", s)),
        }
    }
}

/// tcov runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcovConfig {
    /// Honour the realtime flag of started sessions
    pub realtime: bool,
    /// Report package coverage trees
    pub send_packages: bool,
    /// Concurrent report deliveries
    pub fan_out_workers: usize,
    /// Prefix of generated scope names
    pub default_scope_name: String,
    /// Test name for exec data that carries none
    pub default_test_name: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for TcovConfig {
    fn default() -> Self {
        Self {
            realtime: true,
            send_packages: true,
            fan_out_workers: 8,
            default_scope_name: DEFAULT_SCOPE_NAME.to_string(),
            default_test_name: "unspecified".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl TcovConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With realtime sessions enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// With package trees reported or not
    #[inline]
    #[must_use]
    pub fn with_send_packages(mut self, send_packages: bool) -> Self {
        self.send_packages = send_packages;
        self
    }

    /// With fan-out pool size
    #[inline]
    #[must_use]
    pub fn with_fan_out_workers(mut self, workers: usize) -> Self {
        self.fan_out_workers = workers;
        self
    }

    /// With scope name prefix
    #[inline]
    #[must_use]
    pub fn with_default_scope_name(mut self, name: impl Into<String>) -> Self {
        self.default_scope_name = name.into();
        self
    }

    /// With fallback test name
    #[inline]
    #[must_use]
    pub fn with_default_test_name(mut self, name: impl Into<String>) -> Self {
        self.default_test_name = name.into();
        self
    }

    /// With log format
    #[inline]
    #[must_use]
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Parse TOML; missing keys keep their defaults
    ///
    /// # Errors
    /// Returns [`ConfigError`] on malformed TOML or invalid values.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml)?;
        config.validate()
    }

    /// Apply `TCOV_*` variables from the process environment
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] if a variable cannot be parsed.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(std::env::vars())
    }

    /// Apply `TCOV_*` overrides from `(name, value)` pairs; other names are ignored
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] if a value cannot be parsed.
    pub fn with_overrides<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Result<Self, ConfigError>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in vars {
            let Some(key) = name.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value: String = value.into();
            match key {
                "REALTIME" => self.realtime = parse_bool(name.as_ref(), &value)?,
                "SEND_PACKAGES" => self.send_packages = parse_bool(name.as_ref(), &value)?,
                "FAN_OUT_WORKERS" => {
                    self.fan_out_workers = value
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::invalid(name.as_ref(), value.as_str()))?;
                }
                "DEFAULT_SCOPE_NAME" => self.default_scope_name = value,
                "DEFAULT_TEST_NAME" => self.default_test_name = value,
                "LOG_FORMAT" => self.log_format = value.parse()?,
                _ => {}
            }
        }
        self.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.fan_out_workers == 0 {
            return Err(ConfigError::invalid("fan_out_workers", "0"));
        }
        if self.default_scope_name.trim().is_empty() {
            return Err(ConfigError::invalid("default_scope_name", self.default_scope_name));
        }
        Ok(self)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, value)),
    }
}
