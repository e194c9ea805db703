//! Per-viewer information filtering.
//!
//! A viewer sees another player's role only when entitled: it is their own,
//! the player is dead, both are werewolves, or the player is their lover.
//! Sensitive session state (`werewolf_votes`, `healed_player`,
//! `protected_player`, `poisoned_player`) is stripped except for what a role
//! is entitled to: the Witch reads the live werewolf tally to identify the
//! provisional victim.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::protocol::{
    DeathReason, GamePhase, GamePlayer, GameSession, PlayerId, Role, RoomId, SessionId,
    SessionStatus, Team, VoiceChannel, WinningTeam,
};

/// A single player as one particular viewer sees them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub seat_position: u8,
    pub is_alive: bool,
    pub is_you: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lover_id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub died_at_phase: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death_reason: Option<DeathReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_voice_channel: Option<VoiceChannel>,
}

/// Session scratch state as one particular viewer sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStateView {
    pub lynch_votes: HashMap<PlayerId, u32>,
    pub revealed_roles: HashMap<PlayerId, Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_lynched_player: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_mayor_tiebreak: Option<Vec<PlayerId>>,
    /// Witch only: the live werewolf tally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub werewolf_votes: Option<HashMap<PlayerId, u32>>,
    /// Witch only: the candidate currently leading that tally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisional_victim: Option<PlayerId>,
}

/// The filtered session a viewer receives from `get_state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub room_id: RoomId,
    pub status: SessionStatus,
    pub current_phase: GamePhase,
    pub phase_label: String,
    pub phase_number: u32,
    pub day_number: u32,
    pub phase_started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_ends_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_team: Option<WinningTeam>,
    pub your_player_id: PlayerId,
    /// Whether the viewer's night duty is still outstanding.
    pub action_required: bool,
    pub players: Vec<PlayerView>,
    pub state: SessionStateView,
}

/// Whether `viewer` is entitled to see `player`'s role.
fn role_visible(viewer: &GamePlayer, player: &GamePlayer) -> bool {
    viewer.player_id == player.player_id
        || !player.is_alive
        || (viewer.role == Role::Werewolf && player.role == Role::Werewolf)
        || viewer.lover_id == Some(player.player_id)
}

/// Build the filtered view of a session for one viewer.
///
/// `provisional_victim` is precomputed from the raw werewolf vote rows (the
/// denormalized map loses store order) and only shown to the Witch.
pub fn filter_for_viewer(
    session: &GameSession,
    players: &[GamePlayer],
    viewer: &GamePlayer,
    provisional_victim: Option<PlayerId>,
) -> SessionView {
    let player_views = players
        .iter()
        .map(|player| {
            let visible = role_visible(viewer, player);
            let lover_visible = player.player_id == viewer.player_id
                || viewer.lover_id == Some(player.player_id);
            PlayerView {
                player_id: player.player_id,
                seat_position: player.seat_position,
                is_alive: player.is_alive,
                is_you: player.player_id == viewer.player_id,
                role: visible.then_some(player.role),
                team: visible.then_some(player.team),
                lover_id: if lover_visible { player.lover_id } else { None },
                died_at_phase: player.died_at_phase,
                death_reason: player.death_reason,
                current_voice_channel: player.current_voice_channel,
            }
        })
        .collect();

    let witch_sees_tally =
        viewer.role == Role::Witch && session.current_phase == GamePhase::Night;
    let state = SessionStateView {
        lynch_votes: session.state.lynch_votes.clone(),
        revealed_roles: session.state.revealed_roles.clone(),
        last_lynched_player: session.state.last_lynched_player,
        pending_mayor_tiebreak: session.state.pending_mayor_tiebreak.clone(),
        werewolf_votes: witch_sees_tally.then(|| session.state.werewolf_votes.clone()),
        provisional_victim: if witch_sees_tally {
            provisional_victim
        } else {
            None
        },
    };

    let action_required = session.current_phase == GamePhase::Night
        && viewer.is_alive
        && session.state.actions_remaining.contains(&viewer.role);

    SessionView {
        session_id: session.session_id,
        room_id: session.room_id,
        status: session.status,
        current_phase: session.current_phase,
        phase_label: session.phase_label(),
        phase_number: session.phase_number,
        day_number: session.day_number,
        phase_started_at: session.phase_started_at,
        phase_ends_at: session.phase_ends_at,
        winning_team: session.winning_team,
        your_player_id: viewer.player_id,
        action_required,
        players: player_views,
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RoleState, SessionState};
    use uuid::Uuid;

    fn player(role: Role) -> GamePlayer {
        GamePlayer {
            player_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role,
            team: role.team(),
            is_alive: true,
            died_at_phase: None,
            death_reason: None,
            role_state: RoleState::default(),
            lover_id: None,
            current_voice_channel: None,
            allowed_voice_channels: Vec::new(),
            seat_position: 0,
        }
    }

    fn session(phase: GamePhase) -> GameSession {
        GameSession {
            session_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            status: SessionStatus::Active,
            current_phase: phase,
            phase_number: 1,
            day_number: 0,
            phase_started_at: Utc::now(),
            phase_ends_at: Some(Utc::now()),
            state: SessionState::default(),
            werewolves_alive: 2,
            villagers_alive: 4,
            winning_team: None,
        }
    }

    #[test]
    fn living_strangers_show_no_role() {
        let viewer = player(Role::Villager);
        let other = player(Role::Seer);
        let view = filter_for_viewer(&session(GamePhase::Night), &[viewer.clone(), other], &viewer, None);
        let stranger = view.players.iter().find(|p| !p.is_you).expect("other player");
        assert_eq!(stranger.role, None);
        assert_eq!(stranger.team, None);
        assert_eq!(stranger.lover_id, None);
    }

    #[test]
    fn you_always_see_yourself() {
        let viewer = player(Role::Witch);
        let view = filter_for_viewer(&session(GamePhase::DayDiscussion), &[viewer.clone()], &viewer, None);
        let you = &view.players[0];
        assert!(you.is_you);
        assert_eq!(you.role, Some(Role::Witch));
    }

    #[test]
    fn werewolves_recognize_each_other() {
        let viewer = player(Role::Werewolf);
        let packmate = player(Role::Werewolf);
        let bystander = player(Role::Villager);
        let view = filter_for_viewer(
            &session(GamePhase::Night),
            &[viewer.clone(), packmate.clone(), bystander],
            &viewer,
            None,
        );
        let seen: HashMap<PlayerId, Option<Role>> =
            view.players.iter().map(|p| (p.player_id, p.role)).collect();
        assert_eq!(seen[&packmate.player_id], Some(Role::Werewolf));
        assert_eq!(seen.values().filter(|r| r.is_none()).count(), 1);
    }

    #[test]
    fn the_dead_are_an_open_book() {
        let viewer = player(Role::Villager);
        let mut fallen = player(Role::Seer);
        fallen.is_alive = false;
        fallen.death_reason = Some(DeathReason::WerewolfAttack);
        let view = filter_for_viewer(
            &session(GamePhase::DayDiscussion),
            &[viewer.clone(), fallen.clone()],
            &viewer,
            None,
        );
        let dead = view
            .players
            .iter()
            .find(|p| p.player_id == fallen.player_id)
            .expect("dead player in view");
        assert_eq!(dead.role, Some(Role::Seer));
        assert_eq!(dead.death_reason, Some(DeathReason::WerewolfAttack));
    }

    #[test]
    fn lovers_see_each_other() {
        let mut viewer = player(Role::Villager);
        let mut beloved = player(Role::Werewolf);
        viewer.lover_id = Some(beloved.player_id);
        beloved.lover_id = Some(viewer.player_id);
        let view = filter_for_viewer(
            &session(GamePhase::Night),
            &[viewer.clone(), beloved.clone()],
            &viewer,
            None,
        );
        let partner = view
            .players
            .iter()
            .find(|p| p.player_id == beloved.player_id)
            .expect("lover in view");
        assert_eq!(partner.role, Some(Role::Werewolf));
        assert_eq!(partner.lover_id, Some(viewer.player_id));
    }

    #[test]
    fn only_the_witch_reads_the_werewolf_tally() {
        let witch = player(Role::Witch);
        let villager = player(Role::Villager);
        let victim = Uuid::new_v4();
        let mut night = session(GamePhase::Night);
        night.state.werewolf_votes.insert(victim, 2);

        let witch_view =
            filter_for_viewer(&night, &[witch.clone(), villager.clone()], &witch, Some(victim));
        assert_eq!(witch_view.state.provisional_victim, Some(victim));
        assert!(witch_view.state.werewolf_votes.is_some());

        let villager_view = filter_for_viewer(&night, &[witch, villager.clone()], &villager, Some(victim));
        assert_eq!(villager_view.state.provisional_victim, None);
        assert!(villager_view.state.werewolf_votes.is_none());
    }

    #[test]
    fn witch_tally_is_night_only() {
        let witch = player(Role::Witch);
        let day = session(GamePhase::DayVoting);
        let view = filter_for_viewer(&day, &[witch.clone()], &witch, Some(Uuid::new_v4()));
        assert!(view.state.werewolf_votes.is_none());
        assert_eq!(view.state.provisional_victim, None);
    }

    #[test]
    fn action_required_tracks_the_remaining_set() {
        let seer = player(Role::Seer);
        let mut night = session(GamePhase::Night);
        night.state.actions_remaining.insert(Role::Seer);
        let view = filter_for_viewer(&night, &[seer.clone()], &seer, None);
        assert!(view.action_required);

        night.state.actions_remaining.remove(&Role::Seer);
        let view = filter_for_viewer(&night, &[seer.clone()], &seer, None);
        assert!(!view.action_required);
    }
}
