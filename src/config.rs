//! Waggle configuration file handling
//!
//! Loads and manages the ~/.config/waggle/config.yaml file. Every polling
//! interval, retry bound, backoff base and SLO threshold is a
//! configuration value here rather than a constant buried at a call site.

use crate::coordinator::CoordinatorConfig;
use crate::monitor::MonitorConfig;
use crate::slo::SloThresholds;
use crate::swarm::RoleRoutes;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Task Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// Path to the SQLite database
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        // Always use ~/.config for consistency across platforms
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("waggle");
        path.push("swarm.db");

        Self { path }
    }
}

/// Coordinator configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSection {
    /// Heartbeat staleness threshold in seconds
    #[serde(default = "default_heartbeat_staleness_secs")]
    pub heartbeat_staleness_secs: u64,
}

fn default_heartbeat_staleness_secs() -> u64 {
    30
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            heartbeat_staleness_secs: default_heartbeat_staleness_secs(),
        }
    }
}

/// Recovery monitor configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    /// Poll interval in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum retry attempts per task
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base in seconds
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Retry window in seconds
    #[serde(default = "default_retry_window_secs")]
    pub retry_window_secs: u64,

    /// Health report cadence, in cycles
    #[serde(default = "default_health_report_every")]
    pub health_report_every: u64,
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    10
}

fn default_retry_window_secs() -> u64 {
    300
}

fn default_health_report_every() -> u64 {
    10
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base_secs(),
            retry_window_secs: default_retry_window_secs(),
            health_report_every: default_health_report_every(),
        }
    }
}

/// SLO threshold configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloSection {
    /// Cost ceiling in USD
    #[serde(default = "default_max_cost_usd")]
    pub max_cost_usd: f64,

    /// Latency ceiling in seconds
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,

    /// Coverage floor, percent
    #[serde(default = "default_min_coverage_pct")]
    pub min_coverage_pct: f64,

    /// Confidence floor
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_max_cost_usd() -> f64 {
    5.0
}

fn default_max_duration_secs() -> u64 {
    720
}

fn default_min_coverage_pct() -> f64 {
    95.0
}

fn default_min_confidence() -> f64 {
    0.8
}

impl Default for SloSection {
    fn default() -> Self {
        Self {
            max_cost_usd: default_max_cost_usd(),
            max_duration_secs: default_max_duration_secs(),
            min_coverage_pct: default_min_coverage_pct(),
            min_confidence: default_min_confidence(),
        }
    }
}

/// Top-level Waggle configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaggleConfig {
    /// Task Store settings
    #[serde(default)]
    pub store: StoreSection,

    /// Coordinator settings
    #[serde(default)]
    pub coordinator: CoordinatorSection,

    /// Recovery monitor settings
    #[serde(default)]
    pub monitor: MonitorSection,

    /// SLO thresholds
    #[serde(default)]
    pub slo: SloSection,
}

impl WaggleConfig {
    /// Create a config with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file path (~/.config/waggle/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("waggle");
        path.push("config.yaml");
        path
    }

    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        Ok(config)
    }

    /// Save the config to a file, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Build the coordinator configuration from this file
    pub fn coordinator_config(&self, routes: RoleRoutes) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_heartbeat_staleness(Duration::from_secs(
                self.coordinator.heartbeat_staleness_secs,
            ))
            .with_routes(routes)
    }

    /// Build the monitor configuration from this file
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::default()
            .with_poll_interval(Duration::from_secs(self.monitor.poll_interval_secs))
            .with_max_retries(self.monitor.max_retries)
            .with_backoff_base(Duration::from_secs(self.monitor.backoff_base_secs))
            .with_retry_window(Duration::from_secs(self.monitor.retry_window_secs))
            .with_health_report_every(self.monitor.health_report_every)
            .with_agent_staleness(Duration::from_secs(
                self.coordinator.heartbeat_staleness_secs,
            ))
    }

    /// Build the SLO thresholds from this file
    pub fn slo_thresholds(&self) -> SloThresholds {
        SloThresholds::default()
            .with_max_cost_usd(self.slo.max_cost_usd)
            .with_max_duration(Duration::from_secs(self.slo.max_duration_secs))
            .with_min_coverage_pct(self.slo.min_coverage_pct)
            .with_min_confidence(self.slo.min_confidence)
    }
}
