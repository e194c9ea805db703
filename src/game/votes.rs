//! Lynch vote tallying.
//!
//! Tallies are always recomputed from the raw action rows, never read from a
//! cached counter. Abstentions never produce a lynch.

use std::collections::HashMap;

use crate::protocol::{ActionType, GameAction, PlayerId};

/// Result of tallying one voting phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LynchTally {
    pub counts: HashMap<PlayerId, u32>,
    pub total_votes: u32,
    pub outcome: TallyOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyOutcome {
    /// One player holds strictly the most votes.
    Lynched(PlayerId),
    /// Two or more players share the maximum, in first-seen store order.
    /// The engine applies the mayor policy.
    Tie(Vec<PlayerId>),
    /// Nobody voted.
    NoVotes,
}

/// Tally the lynch votes among one phase's action rows.
pub fn tally_lynch(actions: &[GameAction]) -> LynchTally {
    // First-seen order retained so a tie reports candidates in store order.
    let mut ordered: Vec<(PlayerId, u32)> = Vec::new();
    for action in actions {
        if action.action_type != ActionType::VoteLynch {
            continue;
        }
        let Some(target) = action.target_player_id else {
            continue;
        };
        match ordered.iter_mut().find(|(id, _)| *id == target) {
            Some((_, count)) => *count += 1,
            None => ordered.push((target, 1)),
        }
    }

    let total_votes: u32 = ordered.iter().map(|(_, count)| count).sum();
    let outcome = match ordered.iter().map(|(_, count)| *count).max() {
        None => TallyOutcome::NoVotes,
        Some(max) => {
            let leaders: Vec<PlayerId> = ordered
                .iter()
                .filter(|(_, count)| *count == max)
                .map(|(id, _)| *id)
                .collect();
            match leaders.as_slice() {
                [single] => TallyOutcome::Lynched(*single),
                _ => TallyOutcome::Tie(leaders),
            }
        }
    };

    LynchTally {
        counts: ordered.into_iter().collect(),
        total_votes,
        outcome,
    }
}
