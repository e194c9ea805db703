use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::config::GameRulesConfig;

/// Unique identifier for rooms
pub type RoomId = Uuid;
/// Unique identifier for game sessions
pub type SessionId = Uuid;
/// Session-scoped player identifier (distinct from the account id)
pub type PlayerId = Uuid;
/// Account identifier as provided by the authentication layer
pub type UserId = Uuid;
/// Unique identifier for recorded actions
pub type ActionId = Uuid;
/// Unique identifier for event log entries
pub type EventId = Uuid;

/// Minimum ready players required to start a game.
pub const MIN_PLAYERS: usize = 6;
/// Hard cap on room capacity.
pub const MAX_PLAYERS: usize = 24;
/// Length of generated room codes.
pub const ROOM_CODE_LENGTH: usize = 6;

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
    Abandoned,
}

/// A lobby that players gather in before a game starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_id: RoomId,
    /// Human-friendly 6-character join code.
    pub code: String,
    pub host_user_id: UserId,
    pub status: RoomStatus,
    pub max_players: u8,
    pub config: GameRulesConfig,
    /// Set once the lifecycle cleaner has warned this room about inactivity.
    pub timeout_warning_sent: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A seat taken by a user in a room.
///
/// At most one non-left `(room_id, user_id)` pair exists; seat positions are
/// unique within a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPlayer {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub is_ready: bool,
    pub is_host: bool,
    pub seat_position: u8,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

/// Which side a player fights for. Cupid's pairing never changes this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Werewolves,
    Villagers,
    Neutral,
}

/// The faction a finished game was awarded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinningTeam {
    Werewolves,
    Villagers,
    Lovers,
    Tanner,
}

/// All roles the core can deal out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Werewolf,
    Villager,
    Seer,
    Witch,
    Bodyguard,
    Cupid,
    Hunter,
    Mayor,
    Medium,
    Tanner,
}

impl Role {
    /// Special roles in deal-out priority order. Werewolves are placed before
    /// any of these, villagers fill whatever remains.
    pub const SPECIAL_PRIORITY: [Role; 8] = [
        Role::Seer,
        Role::Witch,
        Role::Bodyguard,
        Role::Cupid,
        Role::Hunter,
        Role::Mayor,
        Role::Medium,
        Role::Tanner,
    ];

    pub fn team(self) -> Team {
        match self {
            Role::Werewolf => Team::Werewolves,
            Role::Tanner => Team::Neutral,
            _ => Team::Villagers,
        }
    }

    /// Roles with a night duty that can appear in `actions_remaining`.
    pub fn acts_at_night(self) -> bool {
        matches!(
            self,
            Role::Werewolf | Role::Seer | Role::Witch | Role::Bodyguard | Role::Cupid
        )
    }
}

/// How a player died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathReason {
    WerewolfAttack,
    Poisoned,
    Lynched,
    LoverDied,
    HunterShot,
}

/// Voice channels the transport layer can place players into. The core only
/// publishes assignment intents; it never opens audio streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceChannel {
    Main,
    Werewolf,
    Dead,
}

/// Phase of an active session. `Night` covers `night_0`, `night_1`, ... with
/// the ordinal carried by the session's `day_number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Night,
    DayDiscussion,
    DayVoting,
    Finished,
}

impl GamePhase {
    /// Human-readable phase label, e.g. `night_0` or `day_voting`.
    pub fn label(self, day_number: u32) -> String {
        match self {
            GamePhase::Night => format!("night_{day_number}"),
            GamePhase::DayDiscussion => "day_discussion".to_string(),
            GamePhase::DayVoting => "day_voting".to_string(),
            GamePhase::Finished => "finished".to_string(),
        }
    }
}

/// Lifecycle status of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Finished,
}

/// Mutable per-session scratch state, stored as a JSON sub-document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Live tally of the werewolf vote, recomputed on every vote commit so
    /// the Witch can read the provisional victim mid-night.
    #[serde(default)]
    pub werewolf_votes: HashMap<PlayerId, u32>,
    /// Live tally of the public lynch vote.
    #[serde(default)]
    pub lynch_votes: HashMap<PlayerId, u32>,
    /// Roles whose night duty is still outstanding for the current phase.
    #[serde(default)]
    pub actions_remaining: BTreeSet<Role>,
    #[serde(default)]
    pub last_lynched_player: Option<PlayerId>,
    #[serde(default)]
    pub healed_player: Option<PlayerId>,
    #[serde(default)]
    pub protected_player: Option<PlayerId>,
    #[serde(default)]
    pub poisoned_player: Option<PlayerId>,
    /// Roles published on death or by a mayor reveal.
    #[serde(default)]
    pub revealed_roles: HashMap<PlayerId, Role>,
    /// A dead Hunter who may still fire within the current phase.
    #[serde(default)]
    pub pending_hunter_shot: Option<PlayerId>,
    /// Tied lynch candidates awaiting the Mayor's deciding ballot.
    #[serde(default)]
    pub pending_mayor_tiebreak: Option<Vec<PlayerId>>,
}

/// One game of werewolf, owned by a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub session_id: SessionId,
    pub room_id: RoomId,
    pub status: SessionStatus,
    pub current_phase: GamePhase,
    /// Monotonic counter incremented on every transition; used as a fence
    /// against stale timers.
    pub phase_number: u32,
    /// Bumped on every night-to-day transition. Night 0 is the first night.
    pub day_number: u32,
    pub phase_started_at: DateTime<Utc>,
    /// None only when the session is finished.
    pub phase_ends_at: Option<DateTime<Utc>>,
    pub state: SessionState,
    pub werewolves_alive: u32,
    pub villagers_alive: u32,
    pub winning_team: Option<WinningTeam>,
}

impl GameSession {
    pub fn phase_label(&self) -> String {
        self.current_phase.label(self.day_number)
    }
}

/// Role-specific state carried by a player, stored as a JSON sub-document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleState {
    #[serde(default)]
    pub heal_used: bool,
    #[serde(default)]
    pub poison_used: bool,
    #[serde(default)]
    pub has_shot: bool,
    /// The Bodyguard's previous target; protecting the same player two
    /// consecutive nights is rejected.
    #[serde(default)]
    pub last_protected: Option<PlayerId>,
    #[serde(default)]
    pub has_chosen: bool,
}

/// A participant in a session. Created once at game start, never destroyed;
/// only `is_alive` and the per-role sub-state mutate afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamePlayer {
    pub player_id: PlayerId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub role: Role,
    pub team: Team,
    pub is_alive: bool,
    pub died_at_phase: Option<u32>,
    pub death_reason: Option<DeathReason>,
    pub role_state: RoleState,
    /// Symmetric weak back-reference: `a.lover_id == b.player_id` iff
    /// `b.lover_id == a.player_id`.
    pub lover_id: Option<PlayerId>,
    pub current_voice_channel: Option<VoiceChannel>,
    pub allowed_voice_channels: Vec<VoiceChannel>,
    pub seat_position: u8,
}

/// Action types clients can submit through `process_action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    WerewolfVote,
    SeerDivine,
    WitchHeal,
    WitchPoison,
    BodyguardProtect,
    CupidChoose,
    HunterShoot,
    VoteLynch,
    MayorReveal,
}

impl ActionType {
    /// The role an action type is bound to, if any. `VoteLynch` is open to
    /// every living player.
    pub fn required_role(self) -> Option<Role> {
        match self {
            ActionType::WerewolfVote => Some(Role::Werewolf),
            ActionType::SeerDivine => Some(Role::Seer),
            ActionType::WitchHeal | ActionType::WitchPoison => Some(Role::Witch),
            ActionType::BodyguardProtect => Some(Role::Bodyguard),
            ActionType::CupidChoose => Some(Role::Cupid),
            ActionType::HunterShoot => Some(Role::Hunter),
            ActionType::MayorReveal => Some(Role::Mayor),
            ActionType::VoteLynch => None,
        }
    }

    /// Whether the action is only legal during a night phase.
    pub fn is_night_action(self) -> bool {
        matches!(
            self,
            ActionType::WerewolfVote
                | ActionType::SeerDivine
                | ActionType::WitchHeal
                | ActionType::WitchPoison
                | ActionType::BodyguardProtect
                | ActionType::CupidChoose
        )
    }
}

/// A recorded action. `(session_id, player_id, phase_number, action_type)` is
/// unique; resubmission overwrites, which is how vote changes work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameAction {
    pub action_id: ActionId,
    pub session_id: SessionId,
    pub player_id: PlayerId,
    pub phase_number: u32,
    pub action_type: ActionType,
    pub target_player_id: Option<PlayerId>,
    /// Free-form result or annotation (e.g. the Seer's divination result,
    /// Cupid's second target).
    #[serde(default)]
    pub action_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Request payload for `process_action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action_type: ActionType,
    #[serde(default)]
    pub target_player_id: Option<PlayerId>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ActionRequest {
    pub fn new(action_type: ActionType, target_player_id: Option<PlayerId>) -> Self {
        Self {
            action_type,
            target_player_id,
            data: serde_json::Value::Null,
        }
    }

    /// Cupid's pairing request carries the second lover in `data`.
    pub fn second_lover(&self) -> Option<PlayerId> {
        self.data
            .get("second_lover")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_teams_match_rules() {
        assert_eq!(Role::Werewolf.team(), Team::Werewolves);
        assert_eq!(Role::Tanner.team(), Team::Neutral);
        for role in [
            Role::Villager,
            Role::Seer,
            Role::Witch,
            Role::Bodyguard,
            Role::Cupid,
            Role::Hunter,
            Role::Mayor,
            Role::Medium,
        ] {
            assert_eq!(role.team(), Team::Villagers, "{role:?} should be village");
        }
    }

    #[test]
    fn night_actors_are_the_collectable_roles() {
        let night: Vec<Role> = [
            Role::Werewolf,
            Role::Villager,
            Role::Seer,
            Role::Witch,
            Role::Bodyguard,
            Role::Cupid,
            Role::Hunter,
            Role::Mayor,
            Role::Medium,
            Role::Tanner,
        ]
        .into_iter()
        .filter(|r| r.acts_at_night())
        .collect();
        assert_eq!(
            night,
            vec![Role::Werewolf, Role::Seer, Role::Witch, Role::Bodyguard, Role::Cupid]
        );
    }

    #[test]
    fn action_types_bind_to_roles() {
        assert_eq!(ActionType::WerewolfVote.required_role(), Some(Role::Werewolf));
        assert_eq!(ActionType::WitchHeal.required_role(), Some(Role::Witch));
        assert_eq!(ActionType::WitchPoison.required_role(), Some(Role::Witch));
        assert_eq!(ActionType::VoteLynch.required_role(), None);
        assert!(!ActionType::HunterShoot.is_night_action());
        assert!(!ActionType::VoteLynch.is_night_action());
        assert!(ActionType::CupidChoose.is_night_action());
    }

    #[test]
    fn phase_labels_carry_the_night_ordinal() {
        assert_eq!(GamePhase::Night.label(0), "night_0");
        assert_eq!(GamePhase::Night.label(3), "night_3");
        assert_eq!(GamePhase::DayVoting.label(2), "day_voting");
    }

    #[test]
    fn second_lover_parses_from_action_data() {
        let lover = Uuid::new_v4();
        let req = ActionRequest {
            action_type: ActionType::CupidChoose,
            target_player_id: Some(Uuid::new_v4()),
            data: serde_json::json!({ "second_lover": lover.to_string() }),
        };
        assert_eq!(req.second_lover(), Some(lover));

        let bare = ActionRequest::new(ActionType::CupidChoose, None);
        assert_eq!(bare.second_lover(), None);
    }

    #[test]
    fn session_state_deserializes_from_empty_document() {
        let state: SessionState = serde_json::from_str("{}").expect("empty state should parse");
        assert!(state.werewolf_votes.is_empty());
        assert!(state.actions_remaining.is_empty());
        assert_eq!(state.pending_hunter_shot, None);
    }
}
