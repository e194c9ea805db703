//! Canonical death resolution.
//!
//! Resolution order for a night: werewolf attack (unless protected or
//! healed), then poison (unblockable), then chained lover deaths, then the
//! Hunter suspension. A lynch resolves as: lynched player, lover chain,
//! Hunter suspension. The Hunter's shot is a new unblockable primary death
//! that re-enters the lover chain. Submission order of the underlying
//! actions never influences this order.

use std::collections::HashSet;

use super::night::NightActionResults;
use crate::protocol::{DeathReason, GamePlayer, PlayerId, Role};

/// One death produced by resolution, in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeath {
    pub player_id: PlayerId,
    pub reason: DeathReason,
}

/// The resolver's output: deaths in order, plus a Hunter whose revenge
/// window is now open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeathOutcome {
    pub deaths: Vec<PendingDeath>,
    /// A newly dead Hunter with an unfired shot. Resolution suspends; the
    /// shot may arrive until the phase advances.
    pub pending_hunter: Option<PlayerId>,
}

impl DeathOutcome {
    pub fn dead_ids(&self) -> Vec<PlayerId> {
        self.deaths.iter().map(|d| d.player_id).collect()
    }
}

/// Resolve one night's aggregated actions against the current players.
pub fn resolve_night(players: &[GamePlayer], results: &NightActionResults) -> DeathOutcome {
    let mut resolution = Resolution::new(players);

    if let Some(target) = results.werewolf_target {
        if !results.is_protected() && !results.is_healed() {
            resolution.kill(target, DeathReason::WerewolfAttack);
        }
    }

    // Poison bypasses both the bodyguard and the heal. The Witch poisoning
    // herself is legal; no special defense applies.
    if let Some(target) = results.poison_target {
        resolution.kill(target, DeathReason::Poisoned);
    }

    resolution.chain_lovers();
    resolution.finish()
}

/// Resolve a lynch against the current players.
pub fn resolve_lynch(players: &[GamePlayer], lynched: PlayerId) -> DeathOutcome {
    let mut resolution = Resolution::new(players);
    resolution.kill(lynched, DeathReason::Lynched);
    resolution.chain_lovers();
    resolution.finish()
}

/// Resolve the Hunter's revenge shot. Unblockable, and may itself pull a
/// lover down.
pub fn resolve_hunter_shot(players: &[GamePlayer], target: PlayerId) -> DeathOutcome {
    let mut resolution = Resolution::new(players);
    resolution.kill(target, DeathReason::HunterShot);
    resolution.chain_lovers();
    resolution.finish()
}

struct Resolution<'a> {
    players: &'a [GamePlayer],
    alive: HashSet<PlayerId>,
    deaths: Vec<PendingDeath>,
}

impl<'a> Resolution<'a> {
    fn new(players: &'a [GamePlayer]) -> Self {
        Self {
            players,
            alive: players
                .iter()
                .filter(|p| p.is_alive)
                .map(|p| p.player_id)
                .collect(),
            deaths: Vec::new(),
        }
    }

    /// Kill a player if they are still alive in this resolution.
    fn kill(&mut self, player_id: PlayerId, reason: DeathReason) {
        if self.alive.remove(&player_id) {
            self.deaths.push(PendingDeath { player_id, reason });
        }
    }

    /// Chained lover deaths: iterate until no new chain fires. Lovers are
    /// pairs, so a chain cannot exceed length two, but the loop keeps the
    /// invariant obvious.
    fn chain_lovers(&mut self) {
        loop {
            let heartbroken: Vec<PlayerId> = self
                .deaths
                .iter()
                .filter_map(|death| self.lover_of(death.player_id))
                .filter(|lover| self.alive.contains(lover))
                .collect();
            if heartbroken.is_empty() {
                return;
            }
            for lover in heartbroken {
                self.kill(lover, DeathReason::LoverDied);
            }
        }
    }

    fn lover_of(&self, player_id: PlayerId) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|p| p.player_id == player_id)
            .and_then(|p| p.lover_id)
    }

    fn finish(self) -> DeathOutcome {
        let pending_hunter = self
            .deaths
            .iter()
            .filter_map(|death| {
                self.players
                    .iter()
                    .find(|p| p.player_id == death.player_id)
            })
            .find(|p| p.role == Role::Hunter && !p.role_state.has_shot)
            .map(|p| p.player_id);
        DeathOutcome {
            deaths: self.deaths,
            pending_hunter,
        }
    }
}
