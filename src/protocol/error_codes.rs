use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes crossing the API boundary. The transport layer maps
/// each code to a localized message; no stack traces leave the core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Game start errors
    RoomNotWaiting,
    NotEnoughPlayers,
    SessionExists,
    InvalidComposition,

    // Not-found errors
    RoomNotFound,
    SessionNotFound,
    PlayerNotFound,

    // Action validation errors
    InvalidAction,
    InvalidPhase,
    DeadPlayer,
    TargetInvalid,
    ResourceUsed,
    AlreadyActed,

    // Room errors
    RoomFull,
    AlreadyInRoom,
    NotInRoom,
    NotHost,
    InvalidConfig,

    // State machine errors
    IllegalTransition,

    // Server errors
    Retryable,
    InternalError,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RoomNotWaiting => {
                "The room is not accepting a game start. Only waiting rooms can start a game."
            }
            Self::NotEnoughPlayers => {
                "Not enough ready players to start. At least six ready players are required."
            }
            Self::SessionExists => {
                "A game session already exists for this room. Finish it before starting another."
            }
            Self::InvalidComposition => {
                "The role composition is invalid for this player count. Reduce the werewolf count."
            }
            Self::RoomNotFound => {
                "The requested room could not be found. It may have been closed or purged."
            }
            Self::SessionNotFound => {
                "The requested game session could not be found. It may have finished long ago."
            }
            Self::PlayerNotFound => {
                "No player matches this request. The user may not be part of the session."
            }
            Self::InvalidAction => {
                "Your role cannot perform this action. Check the action type against your role."
            }
            Self::InvalidPhase => {
                "This action is not allowed in the current phase. Wait for the right phase."
            }
            Self::DeadPlayer => "Dead players cannot act. Spectate until the game ends.",
            Self::TargetInvalid => {
                "The chosen target is invalid. Targets must be alive and satisfy role rules."
            }
            Self::ResourceUsed => {
                "This one-shot ability has already been spent and cannot be used again."
            }
            Self::AlreadyActed => "You have already completed this action for the current phase.",
            Self::RoomFull => {
                "The room has reached its maximum player capacity. Try a different room."
            }
            Self::AlreadyInRoom => "You already occupy a seat in this room.",
            Self::NotInRoom => "You do not occupy a seat in this room.",
            Self::NotHost => "Only the room host may perform this operation.",
            Self::InvalidConfig => {
                "The room configuration is invalid. Check timing bounds and player limits."
            }
            Self::IllegalTransition => {
                "The game state changed while your request was in flight. Refetch and retry."
            }
            Self::Retryable => {
                "A transient storage error occurred. The request may be retried with backoff."
            }
            Self::InternalError => {
                "An internal server error occurred. Please try again or contact support."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
