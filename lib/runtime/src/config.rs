//! Runtime configuration.
//!
//! Loaded via the `config` crate from environment variables prefixed with
//! `AURA_`, using `__` between nested keys:
//!
//! ```text
//! AURA_QUEUE__WORKERS=8
//! AURA_SCHEDULER__USE_UTC=true
//! AURA_GENERATOR__PROVIDER=ollama
//! ```

use aura_ai::OllamaConfig;
use aura_workflow::RetentionPolicy;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl RuntimeConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(environment())
    }

    /// Loads configuration from an explicit set of variables instead of the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::load(environment().source(Some(vars)))
    }

    fn load(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("AURA")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Trigger scheduler settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Interpret schedule times in UTC instead of local time.
    #[serde(default)]
    pub use_utc: bool,
}

fn default_tick_interval_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            use_utc: false,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }
}

/// Run queue and worker pool settings.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum number of executions running at once.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_workers() -> usize {
    4
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            workers: default_workers(),
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Live status settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_broadcast_interval_secs")]
    pub broadcast_interval_secs: u64,
    /// Number of executions included in each broadcast.
    #[serde(default = "default_recent_executions")]
    pub recent_executions: usize,
}

fn default_broadcast_interval_secs() -> u64 {
    5
}

fn default_recent_executions() -> usize {
    10
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            broadcast_interval_secs: default_broadcast_interval_secs(),
            recent_executions: default_recent_executions(),
        }
    }
}

impl StatusConfig {
    #[must_use]
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs.max(1))
    }
}

/// Execution history retention.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default)]
    pub max_age_hours: Option<u64>,
}

fn default_max_entries() -> usize {
    1000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_age_hours: None,
        }
    }
}

impl LedgerConfig {
    #[must_use]
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_entries: self.max_entries,
            max_age: self
                .max_age_hours
                .and_then(|hours| i64::try_from(hours).ok())
                .and_then(chrono::TimeDelta::try_hours),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionConfig {
    /// Timeout for workflows that do not set their own.
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
}

impl ExecutionConfig {
    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }
}

/// Where workflows are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Directory for workflow files. Unset keeps workflows in memory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// Which text-generation backend the `generateText` node uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorProvider {
    #[default]
    Canned,
    Ollama,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub provider: GeneratorProvider,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: GeneratorProvider::default(),
            base_url: default_base_url(),
            model: default_model(),
        }
    }
}

impl GeneratorConfig {
    #[must_use]
    pub fn ollama(&self) -> OllamaConfig {
        OllamaConfig::new(&self.base_url, &self.model)
    }
}

/// Workflows imported when the process starts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapConfig {
    /// Directory of workflow definition JSON files.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}
