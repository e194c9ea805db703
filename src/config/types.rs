//! Root configuration types.

use serde::{Deserialize, Serialize};

use super::defaults::default_timer_sync_interval;
use super::game::GameRulesConfig;
use super::lifecycle::LifecycleConfig;
use super::logging::LoggingConfig;

/// Root configuration for the orchestration core.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Default game rules applied to newly created rooms. Hosts may override
    /// per room within validation bounds.
    #[serde(default)]
    pub game: GameRulesConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Interval between public `timer` sync broadcasts (seconds).
    #[serde(default = "default_timer_sync_interval")]
    pub timer_sync_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game: GameRulesConfig::default(),
            lifecycle: LifecycleConfig::default(),
            logging: LoggingConfig::default(),
            timer_sync_interval: default_timer_sync_interval(),
        }
    }
}
