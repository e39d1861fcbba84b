//! Interpreter configuration.
//!
//! Layered: built-in defaults, then an optional TOML document, then
//! `EMBER_*` environment overrides.

use anyhow::{Context, Result, bail};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    /// Worker threads in the coroutine pool.
    pub workers: usize,
    /// Capacity of the runnable-coroutine queue.
    pub queue_depth: usize,
    /// Call depth at which a `Std::StackOverflowError` is raised.
    pub max_call_depth: usize,
    /// Write stack traces of uncaught coroutine errors to the stderr sink.
    pub trace_uncaught: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            queue_depth: 1024,
            max_call_depth: 10_000,
            trace_uncaught: true,
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: VmConfig = toml::from_str(text).context("invalid interpreter config")?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with process environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = VmConfig::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies `EMBER_WORKERS`, `EMBER_QUEUE_DEPTH`, `EMBER_MAX_CALL_DEPTH`,
    /// `EMBER_TRACE_UNCAUGHT` and `EMBER_SINGLE_THREAD` from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("EMBER_WORKERS") {
            self.workers = parse_usize("EMBER_WORKERS", &v)?;
        }
        if let Some(v) = lookup("EMBER_QUEUE_DEPTH") {
            self.queue_depth = parse_usize("EMBER_QUEUE_DEPTH", &v)?;
        }
        if let Some(v) = lookup("EMBER_MAX_CALL_DEPTH") {
            self.max_call_depth = parse_usize("EMBER_MAX_CALL_DEPTH", &v)?;
        }
        if let Some(v) = lookup("EMBER_TRACE_UNCAUGHT") {
            self.trace_uncaught = parse_bool("EMBER_TRACE_UNCAUGHT", &v)?;
        }
        if lookup("EMBER_SINGLE_THREAD").is_some() {
            self.workers = 1;
        }
        self.validate()?;
        tracing::debug!(target: "ember::config", config = ?self, "effective interpreter config");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.queue_depth == 0 {
            bail!("queue_depth must be at least 1");
        }
        Ok(())
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a non-negative integer, got {value:?}"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{key} must be a boolean, got {value:?}"),
    }
}
