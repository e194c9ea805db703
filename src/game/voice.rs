//! Voice channel assignment intents.
//!
//! Recomputed on every phase transition and persisted on the player row for
//! the transport layer; the core never opens audio streams.

use crate::protocol::{GamePhase, GamePlayer, Role, VoiceChannel};

/// `(active_channel, allowed_channels)` for one player in one phase.
pub fn assign(phase: GamePhase, player: &GamePlayer) -> (Option<VoiceChannel>, Vec<VoiceChannel>) {
    if !player.is_alive {
        return (Some(VoiceChannel::Dead), vec![VoiceChannel::Dead]);
    }
    match phase {
        GamePhase::Night => {
            if player.role == Role::Werewolf {
                (Some(VoiceChannel::Werewolf), vec![VoiceChannel::Werewolf])
            } else {
                // Silenced: villagers sleep.
                (None, Vec::new())
            }
        }
        GamePhase::DayDiscussion | GamePhase::DayVoting | GamePhase::Finished => {
            (Some(VoiceChannel::Main), vec![VoiceChannel::Main])
        }
    }
}

/// Apply the assignment to a player row.
pub fn apply(phase: GamePhase, player: &mut GamePlayer) {
    let (active, allowed) = assign(phase, player);
    player.current_voice_channel = active;
    player.allowed_voice_channels = allowed;
}
