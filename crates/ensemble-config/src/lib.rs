//! # Ensemble Config
//!
//! Unified single-file configuration management for Ensemble.
//! A single `ensemble.yaml` can configure the app, executor latency
//! simulation, session behavior, agent profiles, and observability.

mod loader;

pub use loader::{load_config, ConfigError};

use serde::Deserialize;

/// Top-level configuration schema for Ensemble.
#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleConfig {
    /// Config schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            executor: ExecutorConfig::default(),
            session: SessionConfig::default(),
            agents: AgentsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_env(),
        }
    }
}

fn default_app_name() -> String {
    "ensemble".to_string()
}

fn default_env() -> String {
    "development".to_string()
}

/// Simulated-latency bounds for the step interpreter.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Minimum simulated agent latency, milliseconds.
    #[serde(default = "default_latency_floor_ms")]
    pub latency_floor_ms: u64,
    /// Random jitter added on top of the floor, milliseconds.
    /// Zero makes every call take exactly the floor.
    #[serde(default = "default_latency_jitter_ms")]
    pub latency_jitter_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            latency_floor_ms: default_latency_floor_ms(),
            latency_jitter_ms: default_latency_jitter_ms(),
        }
    }
}

fn default_latency_floor_ms() -> u64 {
    500
}

fn default_latency_jitter_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Max plans per goal, continuation re-plans included.
    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,
    /// Agent ids that must be enabled before planning starts.
    #[serde(default)]
    pub required_agents: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            required_agents: Vec::new(),
        }
    }
}

fn default_max_cycles() -> usize {
    8
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AgentsConfig {
    /// Path to an agent profile JSON file; the built-in roster when unset.
    #[serde(default)]
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
