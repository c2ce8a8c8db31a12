use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::command::DEFAULT_HISTORY_LIMIT;
use crate::errors::{CoreError, CoreResult};
use crate::sync::RetryPolicy;

pub const DEFAULT_CHANGE_BUFFER: usize = 256;

const ENV_KEYS: [&str; 5] = [
    "FTA_HISTORY_LIMIT",
    "FTA_SYNC_MAX_ATTEMPTS",
    "FTA_SYNC_BACKOFF_MS",
    "FTA_SYNC_MAX_BACKOFF_MS",
    "FTA_CHANGE_BUFFER",
];

/// Editor settings loaded from defaults, an optional TOML file and the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorConfig {
    pub history_limit: usize,
    pub retry: RetryPolicy,
    pub change_buffer: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            retry: RetryPolicy::default(),
            change_buffer: DEFAULT_CHANGE_BUFFER,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    history_limit: Option<usize>,
    change_buffer: Option<usize>,
    #[serde(default)]
    sync: SyncSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SyncSection {
    max_attempts: Option<u32>,
    backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
}

impl EditorConfig {
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overlays any `FTA_*` variables present in the process environment.
    pub fn with_env(self) -> Self {
        let values: HashMap<String, String> = ENV_KEYS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();
        self.with_map(&values)
    }

    /// Overlays values from a key/value map using the environment variable
    /// names; unparsable values are ignored.
    pub fn with_map(mut self, values: &HashMap<String, String>) -> Self {
        fn parse<T: std::str::FromStr>(values: &HashMap<String, String>, key: &str) -> Option<T> {
            values
                .get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .and_then(|value| value.parse().ok())
        }

        if let Some(limit) = parse(values, "FTA_HISTORY_LIMIT") {
            self.history_limit = limit;
        }
        if let Some(attempts) = parse(values, "FTA_SYNC_MAX_ATTEMPTS") {
            self.retry.max_attempts = attempts;
        }
        if let Some(ms) = parse(values, "FTA_SYNC_BACKOFF_MS") {
            self.retry.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(values, "FTA_SYNC_MAX_BACKOFF_MS") {
            self.retry.max_backoff = Duration::from_millis(ms);
        }
        if let Some(buffer) = parse(values, "FTA_CHANGE_BUFFER") {
            self.change_buffer = buffer;
        }
        self
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(input).context("Invalid editor config")?;
        let mut config = Self::default();
        if let Some(limit) = file.history_limit {
            config.history_limit = limit;
        }
        if let Some(buffer) = file.change_buffer {
            config.change_buffer = buffer;
        }
        if let Some(attempts) = file.sync.max_attempts {
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = file.sync.backoff_ms {
            config.retry.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = file.sync.max_backoff_ms {
            config.retry.max_backoff = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.history_limit == 0 {
            return Err(CoreError::validation("history_limit must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(CoreError::validation("sync.max_attempts must be at least 1"));
        }
        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(CoreError::validation(
                "sync.backoff_ms must not exceed sync.max_backoff_ms",
            ));
        }
        if self.change_buffer == 0 {
            return Err(CoreError::validation("change_buffer must be at least 1"));
        }
        Ok(())
    }
}
