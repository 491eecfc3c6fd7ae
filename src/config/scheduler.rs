//! Scheduler configuration: budgets, cleanup cadence, and pool caps.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::core::{
    AppResult, ProcessorSettings, DEFAULT_CLEANUP_INTERVAL_TICKS, DEFAULT_EAGER_CLEANUP_THRESHOLD,
    DEFAULT_MAX_POOL_SIZE, DEFAULT_TIME_BUDGET,
};

/// Prefix of environment variables read by [`SchedulerConfig::from_env`].
pub const ENV_PREFIX: &str = "EVENT_SCHEDULER_";

fn default_time_budget_ms() -> Option<u64> {
    u64::try_from(DEFAULT_TIME_BUDGET.as_millis()).ok()
}

const fn default_cleanup_interval_ticks() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_TICKS
}

const fn default_eager_cleanup_threshold() -> usize {
    DEFAULT_EAGER_CLEANUP_THRESHOLD
}

const fn default_pool_cap() -> usize {
    DEFAULT_MAX_POOL_SIZE
}

/// Root scheduler configuration. Every field is optional in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Executions per tick; `null` is unlimited.
    #[serde(default)]
    pub item_budget: Option<usize>,
    /// Milliseconds a tick may spend executing; `null` is unlimited.
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: Option<u64>,
    /// Ticks between cancellation drains; 0 disables interval drains.
    #[serde(default = "default_cleanup_interval_ticks")]
    pub cleanup_interval_ticks: u64,
    /// Ledger size that forces a drain; 0 disables eager drains.
    #[serde(default = "default_eager_cleanup_threshold")]
    pub eager_cleanup_threshold: usize,
    /// Pool cap for event types without an entry in `pool_caps`.
    #[serde(default = "default_pool_cap")]
    pub default_pool_cap: usize,
    /// Pool caps by event type name (full path or last segment).
    #[serde(default)]
    pub pool_caps: HashMap<String, usize>,
    /// Queue slots reserved at construction.
    #[serde(default)]
    pub initial_queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            item_budget: None,
            time_budget_ms: default_time_budget_ms(),
            cleanup_interval_ticks: DEFAULT_CLEANUP_INTERVAL_TICKS,
            eager_cleanup_threshold: DEFAULT_EAGER_CLEANUP_THRESHOLD,
            default_pool_cap: DEFAULT_MAX_POOL_SIZE,
            pool_caps: HashMap::new(),
            initial_queue_capacity: 0,
        }
    }
}

fn parse_var<T>(key: &str, raw: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{ENV_PREFIX}{key}: cannot parse `{raw}`"))
}

fn parse_optional<T>(key: &str, raw: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw.trim() {
        "" | "none" | "unlimited" => Ok(None),
        _ => parse_var(key, raw).map(Some),
    }
}

fn parse_pool_caps(raw: &str) -> AppResult<HashMap<String, usize>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| -> AppResult<(String, usize)> {
            let (name, cap) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("{ENV_PREFIX}POOL_CAPS: expected name=cap, got `{pair}`"))?;
            Ok((name.trim().to_owned(), parse_var("POOL_CAPS", cap)?))
        })
        .collect()
}

impl SchedulerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.item_budget == Some(0) {
            return Err("item_budget must be greater than 0 (use null for unlimited)".into());
        }
        if self.time_budget_ms == Some(0) {
            return Err("time_budget_ms must be greater than 0 (use null for unlimited)".into());
        }
        if self.default_pool_cap == 0 {
            return Err("default_pool_cap must be greater than 0".into());
        }
        for (name, cap) in &self.pool_caps {
            if name.trim().is_empty() {
                return Err("pool_caps keys must be non-empty type names".into());
            }
            if *cap == 0 {
                return Err(format!("pool cap for `{name}` must be greater than 0"));
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse, and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed, or validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("reading scheduler config {}", path.display()))?;
        Self::from_json_str(&input)
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("loading scheduler config {}", path.display()))
    }

    /// Defaults overridden by `EVENT_SCHEDULER_*` variables, after loading a
    /// `.env` file if one exists.
    ///
    /// # Errors
    ///
    /// Fails if a variable cannot be parsed or the result does not validate.
    pub fn from_env() -> AppResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Defaults overridden by values from `lookup`, keyed without the prefix
    /// (`ITEM_BUDGET`, `TIME_BUDGET_MS`, `CLEANUP_INTERVAL_TICKS`,
    /// `EAGER_CLEANUP_THRESHOLD`, `DEFAULT_POOL_CAP`, `POOL_CAPS`,
    /// `INITIAL_QUEUE_CAPACITY`).
    ///
    /// # Errors
    ///
    /// Fails if a value cannot be parsed or the result does not validate.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(raw) = lookup("ITEM_BUDGET") {
            cfg.item_budget = parse_optional("ITEM_BUDGET", &raw)?;
        }
        if let Some(raw) = lookup("TIME_BUDGET_MS") {
            cfg.time_budget_ms = parse_optional("TIME_BUDGET_MS", &raw)?;
        }
        if let Some(raw) = lookup("CLEANUP_INTERVAL_TICKS") {
            cfg.cleanup_interval_ticks = parse_var("CLEANUP_INTERVAL_TICKS", &raw)?;
        }
        if let Some(raw) = lookup("EAGER_CLEANUP_THRESHOLD") {
            cfg.eager_cleanup_threshold = parse_var("EAGER_CLEANUP_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("DEFAULT_POOL_CAP") {
            cfg.default_pool_cap = parse_var("DEFAULT_POOL_CAP", &raw)?;
        }
        if let Some(raw) = lookup("POOL_CAPS") {
            cfg.pool_caps = parse_pool_caps(&raw)?;
        }
        if let Some(raw) = lookup("INITIAL_QUEUE_CAPACITY") {
            cfg.initial_queue_capacity = parse_var("INITIAL_QUEUE_CAPACITY", &raw)?;
        }
        cfg.validate().map_err(|e| anyhow!("invalid scheduler config from environment: {e}"))?;
        Ok(cfg)
    }

    /// Time budget as a duration.
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }

    /// Processor settings described by this configuration. Pool caps are
    /// applied separately by the builder.
    pub fn to_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            item_budget: self.item_budget,
            time_budget: self.time_budget(),
            cleanup_interval_ticks: self.cleanup_interval_ticks,
            eager_cleanup_threshold: self.eager_cleanup_threshold,
            default_pool_cap: self.default_pool_cap,
            initial_queue_capacity: self.initial_queue_capacity,
        }
    }
}
