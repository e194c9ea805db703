// Protocol module: core data model, event payloads, validation, room codes

pub mod error_codes;
pub mod events;
pub mod room_codes;
pub mod types;
pub mod validation;

pub use error_codes::ErrorCode;

pub use types::{
    ActionId, ActionRequest, ActionType, DeathReason, EventId, GameAction, GamePhase, GamePlayer,
    GameSession, PlayerId, Role, RoleState, Room, RoomId, RoomPlayer, RoomStatus, SessionId,
    SessionState, SessionStatus, Team, UserId, VoiceChannel, WinningTeam, MAX_PLAYERS,
    MIN_PLAYERS, ROOM_CODE_LENGTH,
};

pub use events::{DeathNotice, EventType, GameEvent, ServerEvent, VoteKind};
