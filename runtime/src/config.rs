//! Producer configuration.
//!
//! Settings come from environment variables with sensible defaults and are
//! validated before use.
//!
//! | variable                            | default | meaning                          |
//! |-------------------------------------|---------|----------------------------------|
//! | `FOLDSTREAM_MAX_ATTEMPTS`           | 5       | decide-append attempts per command |
//! | `FOLDSTREAM_RETRY_INITIAL_DELAY_MS` | 5       | first backoff delay              |
//! | `FOLDSTREAM_RETRY_MAX_DELAY_MS`     | 250     | backoff ceiling                  |
//! | `FOLDSTREAM_RETRY_MULTIPLIER`       | 2.0     | backoff growth factor            |
//! | `FOLDSTREAM_RETRY_JITTER`           | true    | randomize delays                 |
//!
//! # Example
//!
//! ```no_run
//! use foldstream_runtime::config::ProducerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProducerConfig::from_env()?;
//! let policy = config.retry_policy();
//! assert!(policy.max_attempts >= 1);
//! # Ok(())
//! # }
//! ```

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("Invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
    },
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Retry settings for producers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Attempts per command, first try included
    pub max_attempts: usize,
    /// First backoff delay in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,
    /// Backoff growth factor
    pub multiplier: f64,
    /// Randomize delays
    pub jitter: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 5,
            max_delay_ms: 250,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ProducerConfig {
    /// Load configuration from `FOLDSTREAM_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set to an unparsable value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ProducerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            max_attempts: parse_var(&lookup, "FOLDSTREAM_MAX_ATTEMPTS", defaults.max_attempts)?,
            initial_delay_ms: parse_var(
                &lookup,
                "FOLDSTREAM_RETRY_INITIAL_DELAY_MS",
                defaults.initial_delay_ms,
            )?,
            max_delay_ms: parse_var(
                &lookup,
                "FOLDSTREAM_RETRY_MAX_DELAY_MS",
                defaults.max_delay_ms,
            )?,
            multiplier: parse_var(&lookup, "FOLDSTREAM_RETRY_MULTIPLIER", defaults.multiplier)?,
            jitter: parse_var(&lookup, "FOLDSTREAM_RETRY_JITTER", defaults.jitter)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if any setting is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation("max_attempts must be > 0".to_string()));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Validation(
                "multiplier must be a finite number >= 1.0".to_string(),
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Validation(
                "initial_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the retry policy these settings describe.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.max_attempts)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .multiplier(self.multiplier)
            .jitter(self.jitter)
            .build()
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests can unwrap

    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ProducerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ProducerConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = ProducerConfig::from_lookup(lookup(&[
            ("FOLDSTREAM_MAX_ATTEMPTS", "9"),
            ("FOLDSTREAM_RETRY_INITIAL_DELAY_MS", " 10 "),
            ("FOLDSTREAM_RETRY_MAX_DELAY_MS", "1000"),
            ("FOLDSTREAM_RETRY_MULTIPLIER", "3"),
            ("FOLDSTREAM_RETRY_JITTER", "false"),
        ]))
        .unwrap();

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 9);
        assert_eq!(policy.initial_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(1000));
        assert!((policy.multiplier - 3.0).abs() < f64::EPSILON);
        assert!(!policy.jitter);
    }

    #[test]
    fn rejects_unparsable_values() {
        let err = ProducerConfig::from_lookup(lookup(&[("FOLDSTREAM_MAX_ATTEMPTS", "many")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "FOLDSTREAM_MAX_ATTEMPTS".to_string(),
                value: "many".to_string(),
            }
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        for vars in [
            [("FOLDSTREAM_MAX_ATTEMPTS", "0")],
            [("FOLDSTREAM_RETRY_MULTIPLIER", "0.5")],
            [("FOLDSTREAM_RETRY_INITIAL_DELAY_MS", "5000")],
        ] {
            let err = ProducerConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, ConfigError::Validation(_)));
        }
    }
}
