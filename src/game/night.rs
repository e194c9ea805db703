//! Night action aggregation.
//!
//! Raw action rows are the source of truth; tallies are recomputed from them
//! on every read so concurrent submissions can never desynchronize a cached
//! counter.

use std::collections::{BTreeSet, HashMap};

use crate::protocol::{ActionType, GameAction, GamePlayer, PlayerId, Role};

/// Aggregated night actions handed to the death resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NightActionResults {
    /// Candidate with the most werewolf votes; ties break by store order.
    pub werewolf_target: Option<PlayerId>,
    pub bodyguard_target: Option<PlayerId>,
    /// The heal is targetless; it saves whoever the wolves picked.
    pub witch_healed: bool,
    pub poison_target: Option<PlayerId>,
}

impl NightActionResults {
    /// Bodyguard runs first: the attack is blocked outright when wolves and
    /// bodyguard picked the same player.
    pub fn is_protected(&self) -> bool {
        self.werewolf_target.is_some() && self.werewolf_target == self.bodyguard_target
    }

    /// The heal only applies (and the potion is only consumed) when the
    /// bodyguard did not already block the attack.
    pub fn is_healed(&self) -> bool {
        self.witch_healed && !self.is_protected()
    }

    /// Aggregate one night's raw action rows.
    pub fn collect(actions: &[GameAction]) -> Self {
        let mut results = Self {
            werewolf_target: provisional_victim(actions),
            ..Self::default()
        };
        for action in actions {
            match action.action_type {
                ActionType::BodyguardProtect => results.bodyguard_target = action.target_player_id,
                ActionType::WitchHeal => results.witch_healed = true,
                ActionType::WitchPoison => results.poison_target = action.target_player_id,
                _ => {}
            }
        }
        results
    }
}

/// Werewolf vote tally in first-seen target order. The order is what breaks
/// ties, matching the row order the aggregation reads.
pub fn tally_werewolf_votes(actions: &[GameAction]) -> Vec<(PlayerId, u32)> {
    let mut tally: Vec<(PlayerId, u32)> = Vec::new();
    for action in actions {
        if action.action_type != ActionType::WerewolfVote {
            continue;
        }
        let Some(target) = action.target_player_id else {
            continue;
        };
        match tally.iter_mut().find(|(id, _)| *id == target) {
            Some((_, count)) => *count += 1,
            None => tally.push((target, 1)),
        }
    }
    tally
}

/// The candidate currently leading the werewolf vote. On a split vote the
/// first candidate in store order wins. This is an intentional rule: werewolves
/// must coordinate.
pub fn provisional_victim(actions: &[GameAction]) -> Option<PlayerId> {
    let tally = tally_werewolf_votes(actions);
    let mut best: Option<(PlayerId, u32)> = None;
    for (target, count) in tally {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((target, count)),
        }
    }
    best.map(|(target, _)| target)
}

/// Per-target counts of one action type, for the denormalized state maps.
pub fn vote_counts(actions: &[GameAction], action_type: ActionType) -> HashMap<PlayerId, u32> {
    let mut counts = HashMap::new();
    for action in actions {
        if action.action_type != action_type {
            continue;
        }
        if let Some(target) = action.target_player_id {
            *counts.entry(target).or_insert(0) += 1;
        }
    }
    counts
}

/// Seed `actions_remaining` at night entry: living night-acting roles, minus
/// Cupid after the first night, minus a Witch with nothing left to spend.
pub fn required_roles(players: &[GamePlayer], day_number: u32) -> BTreeSet<Role> {
    let mut required = BTreeSet::new();
    for player in players.iter().filter(|p| p.is_alive) {
        if !player.role.acts_at_night() {
            continue;
        }
        match player.role {
            Role::Cupid if day_number > 0 => continue,
            Role::Witch
                if player.role_state.heal_used && player.role_state.poison_used =>
            {
                continue
            }
            _ => {}
        }
        required.insert(player.role);
    }
    required
}
