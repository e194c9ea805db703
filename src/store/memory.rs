use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{GameStore, SeatOutcome};
use crate::protocol::{
    GameAction, GameEvent, GamePlayer, GameSession, PlayerId, Room, RoomId, RoomPlayer,
    RoomStatus, SessionId, SessionStatus, UserId,
};

/// In-memory store for tests and single-instance deployments.
///
/// Lock ordering, whenever more than one table is touched:
/// rooms → room_codes → seats → sessions → room_sessions → players →
/// actions → events. All write paths follow this order, so no two methods can
/// deadlock against each other.
pub struct MemoryStore {
    rooms: RwLock<HashMap<RoomId, Room>>,
    room_codes: RwLock<HashMap<String, RoomId>>,
    seats: RwLock<HashMap<RoomId, Vec<RoomPlayer>>>,
    sessions: RwLock<HashMap<SessionId, GameSession>>,
    room_sessions: RwLock<HashMap<RoomId, SessionId>>,
    players: RwLock<HashMap<SessionId, Vec<GamePlayer>>>,
    actions: RwLock<HashMap<SessionId, Vec<GameAction>>>,
    events: RwLock<HashMap<SessionId, Vec<GameEvent>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            room_codes: RwLock::new(HashMap::new()),
            seats: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            room_sessions: RwLock::new(HashMap::new()),
            players: RwLock::new(HashMap::new()),
            actions: RwLock::new(HashMap::new()),
            events: RwLock::new(HashMap::new()),
        }
    }

    async fn try_seat(&self, room_id: &RoomId, user_id: UserId, is_host: bool) -> SeatOutcome {
        let rooms = self.rooms.read().await;
        let mut seats = self.seats.write().await;

        let Some(room) = rooms.get(room_id) else {
            return SeatOutcome::RoomNotFound;
        };
        if room.status != RoomStatus::Waiting {
            return SeatOutcome::NotJoinable;
        }

        let room_seats = seats.entry(*room_id).or_default();
        if room_seats
            .iter()
            .any(|s| s.user_id == user_id && s.left_at.is_none())
        {
            return SeatOutcome::AlreadySeated;
        }

        let occupied = room_seats.iter().filter(|s| s.left_at.is_none()).count();
        if occupied >= usize::from(room.max_players) {
            return SeatOutcome::RoomFull;
        }

        // Lowest seat position not currently held by a seated player.
        let taken: Vec<u8> = room_seats
            .iter()
            .filter(|s| s.left_at.is_none())
            .map(|s| s.seat_position)
            .collect();
        let seat_position = (0..room.max_players)
            .find(|pos| !taken.contains(pos))
            .unwrap_or(room.max_players);

        let seat = RoomPlayer {
            room_id: *room_id,
            user_id,
            is_ready: false,
            is_host,
            seat_position,
            joined_at: Utc::now(),
            left_at: None,
        };
        room_seats.push(seat.clone());
        SeatOutcome::Seated(seat)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn create_room(&self, room: Room, host_seat: RoomPlayer) -> Result<()> {
        // Both locks held together so no task can observe a code entry
        // without its room.
        let mut rooms = self.rooms.write().await;
        let mut room_codes = self.room_codes.write().await;

        if room_codes.contains_key(&room.code) {
            bail!("room code {} already exists", room.code);
        }
        if rooms.contains_key(&room.room_id) {
            bail!("room id {} already exists", room.room_id);
        }

        room_codes.insert(room.code.clone(), room.room_id);
        let room_id = room.room_id;
        rooms.insert(room_id, room);
        drop(rooms);
        drop(room_codes);

        let mut seats = self.seats.write().await;
        seats.entry(room_id).or_default().push(host_seat);
        Ok(())
    }

    async fn get_room(&self, room_id: &RoomId) -> Result<Option<Room>> {
        let rooms = self.rooms.read().await;
        Ok(rooms.get(room_id).cloned())
    }

    async fn get_room_by_code(&self, code: &str) -> Result<Option<Room>> {
        let rooms = self.rooms.read().await;
        let room_codes = self.room_codes.read().await;
        Ok(room_codes.get(code).and_then(|id| rooms.get(id)).cloned())
    }

    async fn update_room(&self, room: Room) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        match rooms.get_mut(&room.room_id) {
            Some(slot) => {
                *slot = room;
                Ok(())
            }
            None => bail!("room {} not found", room.room_id),
        }
    }

    async fn list_rooms(&self) -> Result<Vec<Room>> {
        let rooms = self.rooms.read().await;
        Ok(rooms.values().cloned().collect())
    }

    async fn delete_room(&self, room_id: &RoomId) -> Result<bool> {
        let mut rooms = self.rooms.write().await;
        let mut room_codes = self.room_codes.write().await;
        let mut seats = self.seats.write().await;
        let mut sessions = self.sessions.write().await;
        let mut room_sessions = self.room_sessions.write().await;
        let mut players = self.players.write().await;
        let mut actions = self.actions.write().await;
        let mut events = self.events.write().await;

        let Some(room) = rooms.remove(room_id) else {
            return Ok(false);
        };
        room_codes.remove(&room.code);
        seats.remove(room_id);

        if let Some(session_id) = room_sessions.remove(room_id) {
            sessions.remove(&session_id);
            players.remove(&session_id);
            actions.remove(&session_id);
            events.remove(&session_id);
        }
        Ok(true)
    }

    async fn touch_room(&self, room_id: &RoomId) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(room_id) {
            room.last_activity_at = Utc::now();
        }
        Ok(())
    }

    async fn seat_player(
        &self,
        room_id: &RoomId,
        user_id: UserId,
        is_host: bool,
    ) -> Result<SeatOutcome> {
        Ok(self.try_seat(room_id, user_id, is_host).await)
    }

    async fn mark_player_left(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Option<RoomPlayer>> {
        let mut seats = self.seats.write().await;
        let Some(room_seats) = seats.get_mut(room_id) else {
            return Ok(None);
        };
        for seat in room_seats.iter_mut() {
            if seat.user_id == *user_id && seat.left_at.is_none() {
                seat.left_at = Some(Utc::now());
                return Ok(Some(seat.clone()));
            }
        }
        Ok(None)
    }

    async fn set_player_ready(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        is_ready: bool,
    ) -> Result<bool> {
        let mut seats = self.seats.write().await;
        let Some(room_seats) = seats.get_mut(room_id) else {
            return Ok(false);
        };
        for seat in room_seats.iter_mut() {
            if seat.user_id == *user_id && seat.left_at.is_none() {
                seat.is_ready = is_ready;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn list_room_players(&self, room_id: &RoomId) -> Result<Vec<RoomPlayer>> {
        let seats = self.seats.read().await;
        let mut result: Vec<RoomPlayer> = seats
            .get(room_id)
            .map(|room_seats| {
                room_seats
                    .iter()
                    .filter(|s| s.left_at.is_none())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        result.sort_by_key(|s| s.seat_position);
        Ok(result)
    }

    async fn create_session(
        &self,
        session: GameSession,
        session_players: Vec<GamePlayer>,
    ) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let mut room_sessions = self.room_sessions.write().await;
        let mut players = self.players.write().await;

        if let Some(existing_id) = room_sessions.get(&session.room_id) {
            let active = sessions
                .get(existing_id)
                .is_some_and(|s| s.status == SessionStatus::Active);
            if active {
                return Ok(false);
            }
        }

        let session_id = session.session_id;
        room_sessions.insert(session.room_id, session_id);
        sessions.insert(session_id, session);
        players.insert(session_id, session_players);
        Ok(true)
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<Option<GameSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn get_session_by_room(&self, room_id: &RoomId) -> Result<Option<GameSession>> {
        let sessions = self.sessions.read().await;
        let room_sessions = self.room_sessions.read().await;
        Ok(room_sessions
            .get(room_id)
            .and_then(|id| sessions.get(id))
            .cloned())
    }

    async fn update_session(&self, session: GameSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.session_id) {
            Some(slot) => {
                *slot = session;
                Ok(())
            }
            None => bail!("session {} not found", session.session_id),
        }
    }

    async fn get_player(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
    ) -> Result<Option<GamePlayer>> {
        let players = self.players.read().await;
        Ok(players
            .get(session_id)
            .and_then(|list| list.iter().find(|p| p.player_id == *player_id))
            .cloned())
    }

    async fn get_player_by_user(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<Option<GamePlayer>> {
        let players = self.players.read().await;
        Ok(players
            .get(session_id)
            .and_then(|list| list.iter().find(|p| p.user_id == *user_id))
            .cloned())
    }

    async fn list_players(&self, session_id: &SessionId) -> Result<Vec<GamePlayer>> {
        let players = self.players.read().await;
        let mut result = players.get(session_id).cloned().unwrap_or_default();
        result.sort_by_key(|p| p.seat_position);
        Ok(result)
    }

    async fn update_player(&self, player: GamePlayer) -> Result<()> {
        self.update_players(vec![player]).await
    }

    async fn update_players(&self, updated: Vec<GamePlayer>) -> Result<()> {
        let mut players = self.players.write().await;
        for player in updated {
            let Some(list) = players.get_mut(&player.session_id) else {
                bail!("session {} has no players", player.session_id);
            };
            match list.iter_mut().find(|p| p.player_id == player.player_id) {
                Some(slot) => *slot = player,
                None => bail!("player {} not found", player.player_id),
            }
        }
        Ok(())
    }

    async fn upsert_action(&self, action: GameAction) -> Result<()> {
        let mut actions = self.actions.write().await;
        let list = actions.entry(action.session_id).or_default();
        // UPSERT keyed by (session, player, phase, action_type). The row keeps
        // its position in the table so store ordering is stable across vote
        // changes; the primary key survives, the payload and timestamp do not.
        if let Some(existing) = list.iter_mut().find(|a| {
            a.player_id == action.player_id
                && a.phase_number == action.phase_number
                && a.action_type == action.action_type
        }) {
            existing.target_player_id = action.target_player_id;
            existing.action_data = action.action_data;
            existing.created_at = action.created_at;
        } else {
            list.push(action);
        }
        Ok(())
    }

    async fn list_actions(
        &self,
        session_id: &SessionId,
        phase_number: u32,
    ) -> Result<Vec<GameAction>> {
        let actions = self.actions.read().await;
        Ok(actions
            .get(session_id)
            .map(|list| {
                list.iter()
                    .filter(|a| a.phase_number == phase_number)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append_event(&self, event: GameEvent) -> Result<()> {
        let mut events = self.events.write().await;
        events.entry(event.session_id).or_default().push(event);
        Ok(())
    }

    async fn list_events(
        &self,
        session_id: &SessionId,
        public_only: bool,
    ) -> Result<Vec<GameEvent>> {
        let events = self.events.read().await;
        Ok(events
            .get(session_id)
            .map(|list| {
                list.iter()
                    .filter(|e| !public_only || e.is_public)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameRulesConfig;
    use crate::protocol::{ActionType, EventType};
    use std::sync::Arc;
    use uuid::Uuid;

    fn sample_room(code: &str, max_players: u8) -> (Room, RoomPlayer) {
        let room_id = Uuid::new_v4();
        let host = Uuid::new_v4();
        let now = Utc::now();
        let room = Room {
            room_id,
            code: code.to_string(),
            host_user_id: host,
            status: RoomStatus::Waiting,
            max_players,
            config: GameRulesConfig::default(),
            timeout_warning_sent: false,
            created_at: now,
            last_activity_at: now,
            finished_at: None,
        };
        let seat = RoomPlayer {
            room_id,
            user_id: host,
            is_ready: false,
            is_host: true,
            seat_position: 0,
            joined_at: now,
            left_at: None,
        };
        (room, seat)
    }

    #[tokio::test]
    async fn room_code_collision_rejected() {
        let store = MemoryStore::new();
        let (room, seat) = sample_room("WOLF42", 8);
        store
            .create_room(room, seat)
            .await
            .expect("first room should be created");

        let (dup, dup_seat) = sample_room("WOLF42", 8);
        let result = store.create_room(dup, dup_seat).await;
        assert!(result.is_err(), "duplicate room code must be rejected");
        assert!(result.unwrap_err().to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn seating_allocates_lowest_free_position() {
        let store = MemoryStore::new();
        let (room, seat) = sample_room("SEAT01", 8);
        let room_id = room.room_id;
        store.create_room(room, seat).await.expect("room created");

        let seat = |outcome: SeatOutcome| match outcome {
            SeatOutcome::Seated(seat) => seat,
            other => panic!("expected a seat, got {other:?}"),
        };
        let a = seat(store.try_seat(&room_id, Uuid::new_v4(), false).await);
        let b = seat(store.try_seat(&room_id, Uuid::new_v4(), false).await);
        assert_eq!(a.seat_position, 1);
        assert_eq!(b.seat_position, 2);

        // Vacate seat 1, the next join reuses it.
        store
            .mark_player_left(&room_id, &a.user_id)
            .await
            .expect("leave should not error");
        let c = seat(store.try_seat(&room_id, Uuid::new_v4(), false).await);
        assert_eq!(c.seat_position, 1);
    }

    #[tokio::test]
    async fn one_seat_per_user_enforced() {
        let store = MemoryStore::new();
        let (room, seat) = sample_room("ONCE01", 8);
        let room_id = room.room_id;
        let host = seat.user_id;
        store.create_room(room, seat).await.expect("room created");

        assert_eq!(
            store.try_seat(&room_id, host, false).await,
            SeatOutcome::AlreadySeated
        );
    }

    #[tokio::test]
    async fn concurrent_seating_respects_capacity() {
        let store = Arc::new(MemoryStore::new());
        let (room, seat) = sample_room("FULL01", 6);
        let room_id = room.room_id;
        store.create_room(room, seat).await.expect("room created");

        let mut handles = Vec::new();
        for _ in 0..12 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.try_seat(&room_id, Uuid::new_v4(), false).await
            }));
        }

        let mut seated = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.expect("task should not panic") {
                SeatOutcome::Seated(_) => seated += 1,
                SeatOutcome::RoomFull => rejected += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        // Host already holds one of the six seats.
        assert_eq!(seated, 5);
        assert_eq!(rejected, 7);
    }

    #[tokio::test]
    async fn upsert_overwrites_by_key_and_keeps_position() {
        let store = MemoryStore::new();
        let session_id = Uuid::new_v4();
        let first_voter = Uuid::new_v4();
        let second_voter = Uuid::new_v4();
        let target_a = Uuid::new_v4();
        let target_b = Uuid::new_v4();

        let make = |player, target| GameAction {
            action_id: Uuid::new_v4(),
            session_id,
            player_id: player,
            phase_number: 1,
            action_type: ActionType::WerewolfVote,
            target_player_id: Some(target),
            action_data: serde_json::Value::Null,
            created_at: Utc::now(),
        };

        store.upsert_action(make(first_voter, target_a)).await.unwrap();
        store.upsert_action(make(second_voter, target_b)).await.unwrap();
        // First voter changes their mind; the row is replaced in place.
        store.upsert_action(make(first_voter, target_b)).await.unwrap();

        let actions = store.list_actions(&session_id, 1).await.unwrap();
        assert_eq!(actions.len(), 2, "upsert must not create a second row");
        assert_eq!(actions[0].player_id, first_voter, "row keeps its position");
        assert_eq!(actions[0].target_player_id, Some(target_b));
    }

    #[tokio::test]
    async fn delete_room_cascades_to_session_data() {
        let store = MemoryStore::new();
        let (room, seat) = sample_room("CASC01", 8);
        let room_id = room.room_id;
        store.create_room(room, seat).await.expect("room created");

        let session_id = Uuid::new_v4();
        let session = GameSession {
            session_id,
            room_id,
            status: SessionStatus::Active,
            current_phase: crate::protocol::GamePhase::Night,
            phase_number: 1,
            day_number: 0,
            phase_started_at: Utc::now(),
            phase_ends_at: Some(Utc::now()),
            state: Default::default(),
            werewolves_alive: 2,
            villagers_alive: 4,
            winning_team: None,
        };
        store
            .create_session(session, Vec::new())
            .await
            .expect("session created");
        store
            .append_event(GameEvent::new(
                session_id,
                1,
                EventType::PhaseChange,
                serde_json::Value::Null,
                true,
            ))
            .await
            .expect("event appended");

        assert!(store.delete_room(&room_id).await.expect("delete"));
        assert!(store.get_session(&session_id).await.unwrap().is_none());
        assert!(store.list_events(&session_id, false).await.unwrap().is_empty());
        assert!(store.get_room(&room_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_active_session_rejected() {
        let store = MemoryStore::new();
        let (room, seat) = sample_room("TWIN01", 8);
        let room_id = room.room_id;
        store.create_room(room, seat).await.expect("room created");

        let make_session = || GameSession {
            session_id: Uuid::new_v4(),
            room_id,
            status: SessionStatus::Active,
            current_phase: crate::protocol::GamePhase::Night,
            phase_number: 1,
            day_number: 0,
            phase_started_at: Utc::now(),
            phase_ends_at: Some(Utc::now()),
            state: Default::default(),
            werewolves_alive: 2,
            villagers_alive: 4,
            winning_team: None,
        };

        assert!(store
            .create_session(make_session(), Vec::new())
            .await
            .expect("first session should be created"));
        assert!(
            !store
                .create_session(make_session(), Vec::new())
                .await
                .expect("second attempt should not error"),
            "second active session for the same room must be rejected"
        );
    }
}
