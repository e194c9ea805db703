//! Per-room game rule configuration.

use serde::{Deserialize, Serialize};

use super::defaults::{
    default_day_phase_seconds, default_night_phase_seconds, default_voting_seconds,
    default_werewolf_count,
};
use crate::protocol::types::Role;

/// Rules a host configures for a room. Timing values are seconds, bounded to
/// [10, 3600] by validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRulesConfig {
    #[serde(default = "default_day_phase_seconds")]
    pub day_phase_seconds: u64,
    #[serde(default = "default_night_phase_seconds")]
    pub night_phase_seconds: u64,
    #[serde(default = "default_voting_seconds")]
    pub voting_seconds: u64,
    #[serde(default = "default_werewolf_count")]
    pub werewolf_count: u8,
    /// Special roles dealt after the werewolves, in
    /// [`Role::SPECIAL_PRIORITY`] order.
    #[serde(default = "default_enabled_roles")]
    pub enabled_roles: Vec<Role>,
}

fn default_enabled_roles() -> Vec<Role> {
    vec![Role::Seer, Role::Witch, Role::Bodyguard, Role::Hunter]
}

impl Default for GameRulesConfig {
    fn default() -> Self {
        Self {
            day_phase_seconds: default_day_phase_seconds(),
            night_phase_seconds: default_night_phase_seconds(),
            voting_seconds: default_voting_seconds(),
            werewolf_count: default_werewolf_count(),
            enabled_roles: default_enabled_roles(),
        }
    }
}

impl GameRulesConfig {
    /// Duration of a given phase in seconds.
    pub fn phase_seconds(&self, phase: crate::protocol::types::GamePhase) -> u64 {
        use crate::protocol::types::GamePhase;
        match phase {
            GamePhase::Night => self.night_phase_seconds,
            GamePhase::DayDiscussion => self.day_phase_seconds,
            GamePhase::DayVoting => self.voting_seconds,
            GamePhase::Finished => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::GamePhase;

    #[test]
    fn defaults_match_documented_values() {
        let config = GameRulesConfig::default();
        assert_eq!(config.day_phase_seconds, 300);
        assert_eq!(config.night_phase_seconds, 120);
        assert_eq!(config.voting_seconds, 60);
        assert_eq!(config.werewolf_count, 2);
        assert!(config.enabled_roles.contains(&Role::Seer));
    }

    #[test]
    fn phase_seconds_selects_the_right_knob() {
        let config = GameRulesConfig::default();
        assert_eq!(config.phase_seconds(GamePhase::Night), 120);
        assert_eq!(config.phase_seconds(GamePhase::DayDiscussion), 300);
        assert_eq!(config.phase_seconds(GamePhase::DayVoting), 60);
        assert_eq!(config.phase_seconds(GamePhase::Finished), 0);
    }

    #[test]
    fn empty_document_deserializes_to_defaults() {
        let config: GameRulesConfig = serde_json::from_str("{}").expect("should parse");
        assert_eq!(config, GameRulesConfig::default());
    }
}
