//! Win condition evaluation.
//!
//! Checked after every resolution. Precedence is strict: a lynched Tanner
//! beats everything, the last-two-lovers check beats the team conditions,
//! and werewolf parity only fires with at least one wolf standing. Neutral
//! roles count for neither side in the parity rule.

use crate::protocol::{DeathReason, GamePlayer, PlayerId, Role, Team, WinningTeam};

/// Outcome of one win check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinCondition {
    /// The Tanner was lynched (killed at night does not count).
    TannerWins { tanner: PlayerId },
    /// Exactly two players remain and they are each other's lover.
    LoversWin { lovers: [PlayerId; 2] },
    VillagersWin,
    WerewolvesWin,
    Continue,
}

impl WinCondition {
    pub fn is_game_over(&self) -> bool {
        !matches!(self, Self::Continue)
    }

    pub fn winning_team(&self) -> Option<WinningTeam> {
        match self {
            Self::TannerWins { .. } => Some(WinningTeam::Tanner),
            Self::LoversWin { .. } => Some(WinningTeam::Lovers),
            Self::VillagersWin => Some(WinningTeam::Villagers),
            Self::WerewolvesWin => Some(WinningTeam::Werewolves),
            Self::Continue => None,
        }
    }

    /// Players credited with the win, dead or alive; teams win as teams.
    pub fn winners(&self, players: &[GamePlayer]) -> Vec<PlayerId> {
        match self {
            Self::TannerWins { tanner } => vec![*tanner],
            Self::LoversWin { lovers } => lovers.to_vec(),
            Self::VillagersWin => players
                .iter()
                .filter(|p| p.team == Team::Villagers)
                .map(|p| p.player_id)
                .collect(),
            Self::WerewolvesWin => players
                .iter()
                .filter(|p| p.team == Team::Werewolves)
                .map(|p| p.player_id)
                .collect(),
            Self::Continue => Vec::new(),
        }
    }
}

/// Evaluate the win table against the current players.
///
/// `last_lynched` is the player lynched in the resolution that triggered
/// this check, if any.
pub fn evaluate(players: &[GamePlayer], last_lynched: Option<PlayerId>) -> WinCondition {
    // Rule 1: a lynched Tanner wins alone, regardless of anything else.
    if let Some(lynched_id) = last_lynched {
        let lynched_tanner = players.iter().any(|p| {
            p.player_id == lynched_id
                && p.role == Role::Tanner
                && p.death_reason == Some(DeathReason::Lynched)
        });
        if lynched_tanner {
            return WinCondition::TannerWins { tanner: lynched_id };
        }
    }

    // Rule 2: the last two alive are lovers. Strict: both must point at
    // each other.
    let alive: Vec<&GamePlayer> = players.iter().filter(|p| p.is_alive).collect();
    if let [a, b] = alive.as_slice() {
        if a.lover_id == Some(b.player_id) && b.lover_id == Some(a.player_id) {
            return WinCondition::LoversWin {
                lovers: [a.player_id, b.player_id],
            };
        }
    }

    let werewolves_alive = alive.iter().filter(|p| p.team == Team::Werewolves).count();
    let villagers_alive = alive.iter().filter(|p| p.team == Team::Villagers).count();

    // Rule 3: the village cleared every wolf.
    if werewolves_alive == 0 {
        return WinCondition::VillagersWin;
    }

    // Rule 4: parity. Neutrals count for neither side.
    if werewolves_alive >= villagers_alive {
        return WinCondition::WerewolvesWin;
    }

    WinCondition::Continue
}
