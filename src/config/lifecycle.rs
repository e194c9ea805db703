//! Room lifecycle cleaner configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::defaults::{
    default_abandoned_retention, default_absolute_timeout, default_cleanup_interval,
    default_finished_retention, default_inactivity_timeout, default_warning_window,
};

/// Settings for the background room cleaner. All values are seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Interval between cleaner passes.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    /// Idle time after which a waiting room is abandoned.
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout: u64,
    /// Lead time before abandonment at which the warning is emitted.
    #[serde(default = "default_warning_window")]
    pub warning_window: u64,
    /// Room age after which a waiting room is abandoned regardless of activity.
    #[serde(default = "default_absolute_timeout")]
    pub absolute_timeout: u64,
    /// How long abandoned rooms are kept before deletion.
    #[serde(default = "default_abandoned_retention")]
    pub abandoned_retention: u64,
    /// How long finished rooms are kept before deletion.
    #[serde(default = "default_finished_retention")]
    pub finished_retention: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: default_cleanup_interval(),
            inactivity_timeout: default_inactivity_timeout(),
            warning_window: default_warning_window(),
            absolute_timeout: default_absolute_timeout(),
            abandoned_retention: default_abandoned_retention(),
            finished_retention: default_finished_retention(),
        }
    }
}

impl LifecycleConfig {
    pub fn cleanup_interval_duration(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }

    /// Idle time at which the warning fires.
    pub fn warning_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            self.inactivity_timeout.saturating_sub(self.warning_window) as i64,
        )
    }

    pub fn inactivity_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.inactivity_timeout as i64)
    }

    pub fn absolute_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.absolute_timeout as i64)
    }

    pub fn abandoned_retention_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.abandoned_retention as i64)
    }

    pub fn finished_retention_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.finished_retention as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = LifecycleConfig::default();
        assert_eq!(config.cleanup_interval, 120);
        assert_eq!(config.inactivity_timeout, 1200);
        assert_eq!(config.warning_window, 300);
        assert_eq!(config.absolute_timeout, 3600);
        assert_eq!(config.abandoned_retention, 86_400);
        assert_eq!(config.finished_retention, 604_800);
    }

    #[test]
    fn warning_threshold_is_inactivity_minus_window() {
        let config = LifecycleConfig::default();
        assert_eq!(config.warning_threshold(), chrono::Duration::seconds(900));
    }

    #[test]
    fn warning_threshold_saturates_at_zero() {
        let config = LifecycleConfig {
            inactivity_timeout: 100,
            warning_window: 500,
            ..LifecycleConfig::default()
        };
        assert_eq!(config.warning_threshold(), chrono::Duration::zero());
    }
}
