//! Event log rows and broadcast payloads.
//!
//! `GameEvent` is the append-only persisted record; `ServerEvent` is the
//! serde-tagged payload fanned out to clients through the [`crate::broadcast`]
//! sink. Log rows are written inside the same critical section as the state
//! change they describe; broadcast delivery is best-effort and happens after
//! commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::types::{
    DeathReason, EventId, GamePhase, PlayerId, Role, RoomId, SessionId, Team, WinningTeam,
};

/// Kinds of persisted event log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PhaseChange,
    PlayerDeath,
    RoleReveal,
    GameEnd,
    VoteComplete,
}

/// An entry in a session's append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEvent {
    pub event_id: EventId,
    pub session_id: SessionId,
    pub phase_number: u32,
    pub event_type: EventType,
    pub event_data: serde_json::Value,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl GameEvent {
    pub fn new(
        session_id: SessionId,
        phase_number: u32,
        event_type: EventType,
        event_data: serde_json::Value,
        is_public: bool,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            session_id,
            phase_number,
            event_type,
            event_data,
            is_public,
            created_at: Utc::now(),
        }
    }
}

/// A death announced in a `phase_change` or `player_death` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathNotice {
    pub player_id: PlayerId,
    pub reason: DeathReason,
    pub role_revealed: Role,
}

/// Which ballot a `player_voted` notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteKind {
    /// Private werewolf ballot; fanned out to werewolves only.
    WerewolfVote,
    /// Public lynch ballot.
    Lynch,
}

/// Payloads published to the broadcaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    PhaseChange {
        session_id: SessionId,
        new_phase: GamePhase,
        phase_label: String,
        phase_number: u32,
        day_number: u32,
        message: String,
        deaths: Vec<DeathNotice>,
        phase_ends_at: Option<DateTime<Utc>>,
    },
    PlayerDeath {
        session_id: SessionId,
        player_id: PlayerId,
        reason: DeathReason,
        role_revealed: Role,
    },
    /// Private, one per player at game start. `teammates` is populated only
    /// for werewolves.
    RoleReveal {
        session_id: SessionId,
        your_role: Role,
        your_team: Team,
        #[serde(skip_serializing_if = "Option::is_none")]
        teammates: Option<Vec<PlayerId>>,
    },
    /// Private divination result delivered to the Seer.
    DivinationResult {
        session_id: SessionId,
        target_id: PlayerId,
        is_werewolf: bool,
    },
    /// Public role announcement, e.g. the Mayor revealing themselves.
    RoleAnnounced {
        session_id: SessionId,
        player_id: PlayerId,
        role: Role,
    },
    PlayerVoted {
        session_id: SessionId,
        voter_id: PlayerId,
        target_id: PlayerId,
        vote_type: VoteKind,
    },
    VoteResult {
        session_id: SessionId,
        /// The lynched player, if the tally produced one.
        target_id: Option<PlayerId>,
        vote_count: u32,
        total_votes: u32,
        /// Tied candidates when the vote is held open for the Mayor.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tied_candidates: Vec<PlayerId>,
    },
    NightActionsComplete {
        session_id: SessionId,
        all_submitted: bool,
    },
    /// Periodic countdown sync for clients.
    Timer {
        session_id: SessionId,
        phase: GamePhase,
        time_remaining_seconds: u64,
    },
    GameEnd {
        session_id: SessionId,
        winning_team: WinningTeam,
        winners: Vec<PlayerId>,
        roles_revealed: HashMap<PlayerId, Role>,
    },
    RoomTimeoutWarning {
        room_id: RoomId,
        closes_in_seconds: u64,
    },
    RoomClosed {
        room_id: RoomId,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_events_use_snake_case_tags() {
        let event = ServerEvent::NightActionsComplete {
            session_id: Uuid::new_v4(),
            all_submitted: true,
        };
        let json = serde_json::to_value(&event).expect("event should serialize");
        assert_eq!(json["type"], "night_actions_complete");
        assert_eq!(json["all_submitted"], true);
    }

    #[test]
    fn role_reveal_omits_empty_teammates() {
        let event = ServerEvent::RoleReveal {
            session_id: Uuid::new_v4(),
            your_role: Role::Seer,
            your_team: Team::Villagers,
            teammates: None,
        };
        let json = serde_json::to_value(&event).expect("event should serialize");
        assert!(json.get("teammates").is_none());
    }

    #[test]
    fn game_event_round_trips() {
        let event = GameEvent::new(
            Uuid::new_v4(),
            3,
            EventType::PlayerDeath,
            serde_json::json!({ "reason": "lynched" }),
            true,
        );
        let json = serde_json::to_string(&event).expect("log row should serialize");
        let back: GameEvent = serde_json::from_str(&json).expect("log row should parse");
        assert_eq!(back.event_id, event.event_id);
        assert_eq!(back.event_type, EventType::PlayerDeath);
        assert!(back.is_public);
    }
}
