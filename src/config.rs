//! Configuration for the `gamelib-demo` binary.
//!
//! Configuration can be set via environment variables:
//! - `GAMELIB_DEMO_GAMES` - Optional. Number of games in the demo library. Defaults to `40`.
//! - `GAMELIB_DEMO_STEP_MS` - Optional. Simulated work per game, in milliseconds. Defaults to `5`.
//! - `GAMELIB_DEMO_TIMEOUT_SECS` - Optional. Deadline after which the demo cancels its root task. Defaults to `30`.
//!
//! The library itself takes no configuration; everything it needs is passed
//! explicitly.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Demo configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of games generated for the library
    pub games: usize,

    /// Simulated per-game work delay
    pub step: Duration,

    /// Deadline for the whole bulk update
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            games: 40,
            step: Duration::from_millis(5),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but does not
    /// parse, or if `GAMELIB_DEMO_GAMES` / `GAMELIB_DEMO_TIMEOUT_SECS` is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let games = parse_var(&lookup, "GAMELIB_DEMO_GAMES")?.unwrap_or(defaults.games);
        if games == 0 {
            return Err(ConfigError::InvalidValue(
                "GAMELIB_DEMO_GAMES".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let step = parse_var(&lookup, "GAMELIB_DEMO_STEP_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.step);

        let timeout_secs: u64 = parse_var(&lookup, "GAMELIB_DEMO_TIMEOUT_SECS")?
            .unwrap_or(defaults.timeout.as_secs());
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "GAMELIB_DEMO_TIMEOUT_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            games,
            step,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("GAMELIB_DEMO_GAMES", "12"),
            ("GAMELIB_DEMO_STEP_MS", " 0 "),
            ("GAMELIB_DEMO_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.games, 12);
        assert_eq!(config.step, Duration::ZERO);
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[("GAMELIB_DEMO_STEP_MS", "fast")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref var, _) if var == "GAMELIB_DEMO_STEP_MS"));

        let err = Config::from_lookup(lookup(&[("GAMELIB_DEMO_GAMES", "0")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for GAMELIB_DEMO_GAMES: must be at least 1"
        );
    }
}
