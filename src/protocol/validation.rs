//! Input validation helpers shared by the engine's room and start surfaces.

use crate::config::GameRulesConfig;

use super::types::{MAX_PLAYERS, MIN_PLAYERS};

/// Timing values accepted for any phase duration (seconds). The lower bound
/// keeps automated tests fast; the upper bound keeps rooms from idling for
/// hours inside a single phase.
pub const MIN_PHASE_SECONDS: u64 = 10;
pub const MAX_PHASE_SECONDS: u64 = 3600;

/// Validate a room's rule configuration.
pub fn validate_rules_config(config: &GameRulesConfig) -> Result<(), String> {
    for (name, value) in [
        ("day_phase_seconds", config.day_phase_seconds),
        ("night_phase_seconds", config.night_phase_seconds),
        ("voting_seconds", config.voting_seconds),
    ] {
        if !(MIN_PHASE_SECONDS..=MAX_PHASE_SECONDS).contains(&value) {
            return Err(format!(
                "{name} must be between {MIN_PHASE_SECONDS} and {MAX_PHASE_SECONDS} seconds, got {value}"
            ));
        }
    }
    if config.werewolf_count == 0 {
        return Err("werewolf_count must be at least 1".to_string());
    }
    Ok(())
}

/// Validate a room's capacity setting.
pub fn validate_max_players(max_players: u8) -> Result<(), String> {
    let max_players = usize::from(max_players);
    if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&max_players) {
        return Err(format!(
            "max_players must be between {MIN_PLAYERS} and {MAX_PLAYERS}, got {max_players}"
        ));
    }
    Ok(())
}

/// Validate the role composition against the actual player count at start.
///
/// A werewolf majority at deal-out would decide the game before the first
/// night, so `werewolf_count >= ceil(n/2)` is rejected.
pub fn validate_composition(player_count: usize, config: &GameRulesConfig) -> Result<(), String> {
    if player_count < MIN_PLAYERS {
        return Err(format!(
            "need at least {MIN_PLAYERS} ready players, got {player_count}"
        ));
    }
    let werewolves = usize::from(config.werewolf_count);
    if werewolves >= player_count.div_ceil(2) {
        return Err(format!(
            "{werewolves} werewolves among {player_count} players would win at deal-out"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_rules_config(&GameRulesConfig::default()).is_ok());
    }

    #[test]
    fn phase_timing_bounds_are_enforced() {
        let mut config = GameRulesConfig::default();
        config.voting_seconds = 9;
        assert!(validate_rules_config(&config).is_err());
        config.voting_seconds = 10;
        assert!(validate_rules_config(&config).is_ok());
        config.day_phase_seconds = 3601;
        assert!(validate_rules_config(&config).is_err());
    }

    #[test]
    fn zero_werewolves_rejected() {
        let mut config = GameRulesConfig::default();
        config.werewolf_count = 0;
        assert!(validate_rules_config(&config).is_err());
    }

    #[test]
    fn werewolf_majority_rejected_at_start() {
        let mut config = GameRulesConfig::default();
        config.werewolf_count = 3;
        // ceil(6/2) = 3, so 3 wolves among 6 players is a deal-out win.
        assert!(validate_composition(6, &config).is_err());
        config.werewolf_count = 2;
        assert!(validate_composition(6, &config).is_ok());
    }

    #[test]
    fn capacity_bounds_are_enforced() {
        assert!(validate_max_players(5).is_err());
        assert!(validate_max_players(6).is_ok());
        assert!(validate_max_players(24).is_ok());
        assert!(validate_max_players(25).is_err());
    }
}
