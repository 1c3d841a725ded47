use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::trace;

/// An external driver process
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DriverConfig {
    /// Logical name used to resolve the driver (e.g. "monitord")
    pub name: String,

    pub executable: PathBuf,

    #[serde(default)]
    pub arguments: Vec<String>,
}

/// Information manager settings
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ManagerConfig {
    /// Timer period of the control loop in seconds
    #[serde(default = "default_timer_period")]
    pub timer_period: u64,

    /// Name of the driver receiving monitoring commands
    #[serde(default = "crate::util::get_default_driver")]
    pub monitor_driver: String,

    #[serde(default)]
    pub drivers: Vec<DriverConfig>,
}

impl ManagerConfig {
    pub fn timer_period(&self) -> Duration {
        Duration::from_secs(self.timer_period)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            timer_period: default_timer_period(),
            monitor_driver: crate::util::get_default_driver(),
            drivers: vec![],
        }
    }
}

/// Host registered in the pool at start-up
#[derive(Debug, Clone, serde::Deserialize)]
pub struct HostConfig {
    pub name: String,
    pub im_mad: String,
    pub vm_mad: String,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub manager: ManagerConfig,

    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

fn default_timer_period() -> u64 {
    60
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
