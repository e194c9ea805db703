use anyhow::Result;
use async_trait::async_trait;

use crate::protocol::{
    GameAction, GameEvent, GamePlayer, GameSession, PlayerId, Room, RoomId, RoomPlayer, SessionId,
    UserId,
};

pub mod locks;
mod memory;

pub use locks::{SessionGuard, SessionLockMap};
pub use memory::MemoryStore;

/// Outcome of an atomic seat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatOutcome {
    Seated(RoomPlayer),
    RoomFull,
    AlreadySeated,
    RoomNotFound,
    /// The room is no longer in the waiting state.
    NotJoinable,
}

/// Storage abstraction for rooms, sessions, players, actions and events.
///
/// Each method is individually atomic. Multi-step mutations of one session
/// additionally run under the caller-held [`SessionLockMap`] guard, which is
/// the in-process stand-in for row-level locking by session id. A conforming
/// SQL-backed implementation maps these methods onto transactions with
/// `SELECT ... FOR UPDATE` and JSON document columns for the sub-documents.
#[async_trait]
pub trait GameStore: Send + Sync {
    // ---- rooms ----

    /// Insert a room together with its host's seat. Fails on a room code
    /// collision.
    async fn create_room(&self, room: Room, host_seat: RoomPlayer) -> Result<()>;

    async fn get_room(&self, room_id: &RoomId) -> Result<Option<Room>>;

    async fn get_room_by_code(&self, code: &str) -> Result<Option<Room>>;

    /// Whole-row update. Fails if the room no longer exists.
    async fn update_room(&self, room: Room) -> Result<()>;

    /// All rooms, for the lifecycle cleaner.
    async fn list_rooms(&self) -> Result<Vec<Room>>;

    /// Delete a room and everything it owns (seats, session, players,
    /// actions, events). Returns false if the room did not exist.
    async fn delete_room(&self, room_id: &RoomId) -> Result<bool>;

    /// Bump the room's `last_activity_at` to now.
    async fn touch_room(&self, room_id: &RoomId) -> Result<()>;

    // ---- room seats ----

    /// Atomically seat a user in a room: checks capacity and the one-seat
    /// invariant, allocates the lowest free seat position.
    async fn seat_player(&self, room_id: &RoomId, user_id: UserId, is_host: bool)
        -> Result<SeatOutcome>;

    /// Mark a seat as left. Returns the seat if the user was present.
    async fn mark_player_left(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Option<RoomPlayer>>;

    /// Returns false if the user holds no seat.
    async fn set_player_ready(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        is_ready: bool,
    ) -> Result<bool>;

    /// Currently seated (non-left) players, ordered by seat position.
    async fn list_room_players(&self, room_id: &RoomId) -> Result<Vec<RoomPlayer>>;

    // ---- sessions ----

    /// Insert a session and its players. Returns false (without writing)
    /// when the room already owns an active session.
    async fn create_session(&self, session: GameSession, players: Vec<GamePlayer>) -> Result<bool>;

    async fn get_session(&self, session_id: &SessionId) -> Result<Option<GameSession>>;

    async fn get_session_by_room(&self, room_id: &RoomId) -> Result<Option<GameSession>>;

    /// Whole-row update. Fails if the session no longer exists.
    async fn update_session(&self, session: GameSession) -> Result<()>;

    // ---- players ----

    async fn get_player(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
    ) -> Result<Option<GamePlayer>>;

    async fn get_player_by_user(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<Option<GamePlayer>>;

    /// All players of a session, ordered by seat position.
    async fn list_players(&self, session_id: &SessionId) -> Result<Vec<GamePlayer>>;

    /// Whole-row update of one player. Fails if the player does not exist.
    async fn update_player(&self, player: GamePlayer) -> Result<()>;

    /// Whole-row update of several players in one atomic step.
    async fn update_players(&self, players: Vec<GamePlayer>) -> Result<()>;

    // ---- actions ----

    /// Insert or overwrite the action keyed by
    /// `(session, player, phase, action_type)`.
    async fn upsert_action(&self, action: GameAction) -> Result<()>;

    /// Actions of one phase in commit order.
    async fn list_actions(&self, session_id: &SessionId, phase_number: u32)
        -> Result<Vec<GameAction>>;

    // ---- event log ----

    async fn append_event(&self, event: GameEvent) -> Result<()>;

    /// Events in insertion order; `public_only` filters out private entries.
    async fn list_events(&self, session_id: &SessionId, public_only: bool)
        -> Result<Vec<GameEvent>>;

    /// Health check.
    async fn health_check(&self) -> bool;
}

/// Storage backend selection.
#[derive(Debug, Clone, Default)]
pub enum StoreConfig {
    #[default]
    InMemory,
}

/// Create a store instance based on configuration.
pub fn create_store(config: StoreConfig) -> std::sync::Arc<dyn GameStore> {
    match config {
        StoreConfig::InMemory => std::sync::Arc::new(MemoryStore::new()),
    }
}
