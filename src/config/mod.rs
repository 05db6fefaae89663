//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup and fails fast on values that do not parse.
//! Every field has a default, so an empty environment is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bounded::BoundedStrategy;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker threads in the underlying pool.
    pub threads: usize,
    /// Cap on in-flight tasks. `None` means unbounded.
    pub max_in_flight: Option<usize>,
    /// Admission strategy at capacity. Only used when `max_in_flight` is set.
    pub strategy: BoundedStrategy,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            max_in_flight: None,
            strategy: BoundedStrategy::default(),
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Recognized variables: `KEYSEQ_THREADS`, `KEYSEQ_MAX_IN_FLIGHT`,
    /// `KEYSEQ_STRATEGY`, `OTEL_ENDPOINT`, `LOG_LEVEL`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            threads: match lookup("KEYSEQ_THREADS") {
                Some(raw) => parse_count("KEYSEQ_THREADS", &raw)?,
                None => defaults.threads,
            },
            max_in_flight: lookup("KEYSEQ_MAX_IN_FLIGHT")
                .map(|raw| parse_count("KEYSEQ_MAX_IN_FLIGHT", &raw))
                .transpose()?,
            strategy: match lookup("KEYSEQ_STRATEGY") {
                Some(raw) => raw.parse()?,
                None => defaults.strategy,
            },
            otel_endpoint: lookup("OTEL_ENDPOINT").filter(|s| !s.is_empty()),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file. Missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read config {}: {e}", path.display())))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::Config("threads must be at least 1".to_string()));
        }
        if self.max_in_flight == Some(0) {
            return Err(Error::Config("max_in_flight must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get())
}

fn parse_count(name: &str, raw: &str) -> Result<usize> {
    raw.trim().parse::<usize>().map_err(|e| {
        Error::Config(format!("{name} must be a non-negative integer, got {raw:?}: {e}"))
    })
}
