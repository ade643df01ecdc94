//! Observer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_TICK_MS: u64 = 100;
const DEFAULT_INTERRUPT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_BUFFERED: usize = 10_000;

/// Timing and buffering knobs of a session view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewConfig {
    /// Period of the elapsed-time tick of running tool widgets.
    pub tick_interval_ms: u64,
    /// How long an interrupt may stay unconfirmed before input is restored.
    pub interrupt_timeout_ms: u64,
    /// Live events held while a join snapshot is outstanding.
    pub max_buffered_events: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_MS,
            interrupt_timeout_ms: DEFAULT_INTERRUPT_TIMEOUT_MS,
            max_buffered_events: DEFAULT_MAX_BUFFERED,
        }
    }
}

impl ViewConfig {
    /// Defaults overridden by `AGENT_WATCH_TICK_MS`,
    /// `AGENT_WATCH_INTERRUPT_TIMEOUT_MS` and `AGENT_WATCH_MAX_BUFFERED`.
    ///
    /// # Errors
    /// Returns error if a variable is set but not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ViewConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    /// Returns error if a variable is set but not a positive integer.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, "AGENT_WATCH_TICK_MS")? {
            config.tick_interval_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "AGENT_WATCH_INTERRUPT_TIMEOUT_MS")? {
            config.interrupt_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "AGENT_WATCH_MAX_BUFFERED")? {
            config.max_buffered_events = usize::try_from(v).unwrap_or(usize::MAX);
        }
        Ok(config)
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub const fn interrupt_timeout(&self) -> Duration {
        Duration::from_millis(self.interrupt_timeout_ms)
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let invalid = |reason: String| ConfigError::Invalid {
        key,
        value: raw.clone(),
        reason,
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(invalid("must be greater than zero".into())),
        Ok(v) => Ok(Some(v)),
        Err(e) => Err(invalid(e.to_string())),
    }
}
