//! Configuration validation functions.

use anyhow::{bail, Result};

use super::Config;
use crate::protocol::validation::validate_rules_config;

/// Validate a loaded configuration. The loader logs failures and continues
/// with defaults; embedders that need hard failure call this directly.
pub fn validate_config(config: &Config) -> Result<()> {
    if let Err(reason) = validate_rules_config(&config.game) {
        bail!("invalid default game rules: {reason}");
    }

    if config.lifecycle.cleanup_interval == 0 {
        bail!("lifecycle.cleanup_interval must be positive");
    }

    if config.lifecycle.warning_window >= config.lifecycle.inactivity_timeout {
        bail!(
            "lifecycle.warning_window ({}) must be shorter than lifecycle.inactivity_timeout ({})",
            config.lifecycle.warning_window,
            config.lifecycle.inactivity_timeout
        );
    }

    if config.timer_sync_interval == 0 {
        bail!("timer_sync_interval must be positive");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn warning_window_must_fit_inside_inactivity_timeout() {
        let mut config = Config::default();
        config.lifecycle.warning_window = config.lifecycle.inactivity_timeout;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut config = Config::default();
        config.lifecycle.cleanup_interval = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.timer_sync_interval = 0;
        assert!(validate_config(&config).is_err());
    }
}
