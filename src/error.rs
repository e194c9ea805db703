//! Typed errors crossing the engine API boundary.
//!
//! Validation and not-found errors are returned without mutating persistent
//! state. Store failures surface as [`EngineError::Storage`] and are
//! retryable by the transport layer. [`EngineError::Fatal`] marks invariant
//! violations that must abort and alert, never be silently recovered.

use thiserror::Error;

use crate::protocol::{ActionType, ErrorCode, GamePhase};

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    // Game start
    #[error("room is not accepting a game start")]
    RoomNotWaiting,
    #[error("not enough ready players: {ready} ready, {required} required")]
    NotEnoughPlayers { ready: usize, required: usize },
    #[error("an active session already exists for this room")]
    SessionExists,
    #[error("invalid role composition: {0}")]
    InvalidComposition(String),

    // Not found
    #[error("room not found")]
    RoomNotFound,
    #[error("session not found")]
    SessionNotFound,
    #[error("player not found")]
    PlayerNotFound,

    // Action validation
    #[error("actor's role cannot perform {action:?}")]
    InvalidAction { action: ActionType },
    #[error("action not allowed during {phase:?}")]
    InvalidPhase { phase: GamePhase },
    #[error("dead players cannot act")]
    DeadPlayer,
    #[error("invalid target: {0}")]
    TargetInvalid(String),
    #[error("{0} has already been spent")]
    ResourceUsed(&'static str),
    #[error("action already recorded for this phase")]
    AlreadyActed,

    // Room membership
    #[error("room is full")]
    RoomFull,
    #[error("user already occupies a seat in this room")]
    AlreadyInRoom,
    #[error("user has no seat in this room")]
    NotInRoom,
    #[error("only the room host may perform this operation")]
    NotHost,
    #[error("invalid room configuration: {0}")]
    InvalidConfig(String),

    // State machine
    #[error("state changed while the request was in flight: expected {expected}, found {found}")]
    IllegalTransition { expected: String, found: String },

    // Invariant violations. Must abort and alert.
    #[error("invariant violation: {0}")]
    Fatal(String),

    // Transient store failures, wrapped with operation context.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable error code for the transport layer.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RoomNotWaiting => ErrorCode::RoomNotWaiting,
            Self::NotEnoughPlayers { .. } => ErrorCode::NotEnoughPlayers,
            Self::SessionExists => ErrorCode::SessionExists,
            Self::InvalidComposition(_) => ErrorCode::InvalidComposition,
            Self::RoomNotFound => ErrorCode::RoomNotFound,
            Self::SessionNotFound => ErrorCode::SessionNotFound,
            Self::PlayerNotFound => ErrorCode::PlayerNotFound,
            Self::InvalidAction { .. } => ErrorCode::InvalidAction,
            Self::InvalidPhase { .. } => ErrorCode::InvalidPhase,
            Self::DeadPlayer => ErrorCode::DeadPlayer,
            Self::TargetInvalid(_) => ErrorCode::TargetInvalid,
            Self::ResourceUsed(_) => ErrorCode::ResourceUsed,
            Self::AlreadyActed => ErrorCode::AlreadyActed,
            Self::RoomFull => ErrorCode::RoomFull,
            Self::AlreadyInRoom => ErrorCode::AlreadyInRoom,
            Self::NotInRoom => ErrorCode::NotInRoom,
            Self::NotHost => ErrorCode::NotHost,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::IllegalTransition { .. } => ErrorCode::IllegalTransition,
            Self::Fatal(_) => ErrorCode::InternalError,
            Self::Storage(_) => ErrorCode::Retryable,
        }
    }

    /// Whether the transport layer may retry the request with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_a_code() {
        assert_eq!(EngineError::RoomNotWaiting.code(), ErrorCode::RoomNotWaiting);
        assert_eq!(EngineError::DeadPlayer.code(), ErrorCode::DeadPlayer);
        assert_eq!(
            EngineError::ResourceUsed("heal potion").code(),
            ErrorCode::ResourceUsed
        );
        assert_eq!(
            EngineError::IllegalTransition {
                expected: "night_1".to_string(),
                found: "day_voting".to_string(),
            }
            .code(),
            ErrorCode::IllegalTransition
        );
    }

    #[test]
    fn only_storage_errors_are_retryable() {
        assert!(EngineError::Storage(anyhow::anyhow!("connection reset")).is_retryable());
        assert!(!EngineError::DeadPlayer.is_retryable());
        assert!(!EngineError::Fatal("count drift".to_string()).is_retryable());
    }
}
