//! Room surface: create, join, ready, configure, extend.
//!
//! Rooms are the pre-game lobby. Every mutation of a waiting room bumps
//! `last_activity_at` so the lifecycle cleaner sees the room as live; once a
//! game is running the cleaner leaves the room alone.

use anyhow::Context;
use chrono::Utc;
use uuid::Uuid;

use super::GameEngine;
use crate::config::GameRulesConfig;
use crate::error::{EngineError, EngineResult};
use crate::protocol::{
    room_codes, validation, Room, RoomId, RoomPlayer, RoomStatus, UserId,
};
use crate::store::SeatOutcome;

/// Attempts at generating a collision-free room code before giving up.
const ROOM_CODE_ATTEMPTS: usize = 16;

impl GameEngine {
    /// Create a room with the host already seated.
    pub async fn create_room(
        &self,
        host_user_id: UserId,
        max_players: u8,
        config: Option<GameRulesConfig>,
    ) -> EngineResult<Room> {
        validation::validate_max_players(max_players).map_err(EngineError::InvalidConfig)?;
        let config = config.unwrap_or_else(|| self.config.game.clone());
        validation::validate_rules_config(&config).map_err(EngineError::InvalidConfig)?;

        let now = Utc::now();
        let mut last_error = None;
        for _ in 0..ROOM_CODE_ATTEMPTS {
            let room = Room {
                room_id: Uuid::new_v4(),
                code: room_codes::generate_room_code(),
                host_user_id,
                status: RoomStatus::Waiting,
                max_players,
                config: config.clone(),
                timeout_warning_sent: false,
                created_at: now,
                last_activity_at: now,
                finished_at: None,
            };
            let host_seat = RoomPlayer {
                room_id: room.room_id,
                user_id: host_user_id,
                is_ready: false,
                is_host: true,
                seat_position: 0,
                joined_at: now,
                left_at: None,
            };
            match self.store.create_room(room.clone(), host_seat).await {
                Ok(()) => {
                    tracing::info!(
                        room_id = %room.room_id,
                        code = %room.code,
                        host = %host_user_id,
                        "Room created"
                    );
                    return Ok(room);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(EngineError::Storage(
            last_error
                .unwrap_or_else(|| anyhow::anyhow!("no attempt made"))
                .context("create room"),
        ))
    }

    /// Seat a user in a waiting room.
    pub async fn join_room(&self, room_id: &RoomId, user_id: UserId) -> EngineResult<RoomPlayer> {
        let outcome = self
            .store
            .seat_player(room_id, user_id, false)
            .await
            .context("seat player")?;
        let seat = match outcome {
            SeatOutcome::Seated(seat) => seat,
            SeatOutcome::RoomFull => return Err(EngineError::RoomFull),
            SeatOutcome::AlreadySeated => return Err(EngineError::AlreadyInRoom),
            SeatOutcome::RoomNotFound => return Err(EngineError::RoomNotFound),
            SeatOutcome::NotJoinable => return Err(EngineError::RoomNotWaiting),
        };
        self.store.touch_room(room_id).await.context("touch room")?;
        tracing::info!(%room_id, user = %user_id, seat = seat.seat_position, "Player joined room");
        Ok(seat)
    }

    /// Vacate a seat. Leaving a playing room does not kill the player's
    /// in-game character; the session plays on.
    pub async fn leave_room(&self, room_id: &RoomId, user_id: &UserId) -> EngineResult<()> {
        let removed = self
            .store
            .mark_player_left(room_id, user_id)
            .await
            .context("mark player left")?;
        if removed.is_none() {
            return Err(EngineError::NotInRoom);
        }
        self.store.touch_room(room_id).await.context("touch room")?;
        tracing::info!(%room_id, user = %user_id, "Player left room");
        Ok(())
    }

    /// Flip a player's ready flag.
    pub async fn set_ready(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        is_ready: bool,
    ) -> EngineResult<()> {
        let room = self.must_room(room_id).await?;
        if room.status != RoomStatus::Waiting {
            return Err(EngineError::RoomNotWaiting);
        }
        let updated = self
            .store
            .set_player_ready(room_id, user_id, is_ready)
            .await
            .context("set player ready")?;
        if !updated {
            return Err(EngineError::NotInRoom);
        }
        self.store.touch_room(room_id).await.context("touch room")?;
        Ok(())
    }

    /// Replace the room's rule configuration. Host only, waiting rooms only.
    pub async fn update_room_config(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        config: GameRulesConfig,
    ) -> EngineResult<Room> {
        validation::validate_rules_config(&config).map_err(EngineError::InvalidConfig)?;
        let mut room = self.must_room(room_id).await?;
        if room.host_user_id != *user_id {
            return Err(EngineError::NotHost);
        }
        if room.status != RoomStatus::Waiting {
            return Err(EngineError::RoomNotWaiting);
        }
        room.config = config;
        room.last_activity_at = Utc::now();
        self.store
            .update_room(room.clone())
            .await
            .context("update room config")?;
        Ok(room)
    }

    /// Host-requested timeout extension: resets the activity clock and
    /// clears a pending inactivity warning.
    pub async fn extend_room_timeout(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> EngineResult<Room> {
        let mut room = self.must_room(room_id).await?;
        if room.host_user_id != *user_id {
            return Err(EngineError::NotHost);
        }
        if room.status != RoomStatus::Waiting {
            return Err(EngineError::RoomNotWaiting);
        }
        room.last_activity_at = Utc::now();
        room.timeout_warning_sent = false;
        self.store
            .update_room(room.clone())
            .await
            .context("extend room timeout")?;
        tracing::info!(%room_id, "Host extended room timeout");
        Ok(room)
    }

    /// A room and its seated players.
    pub async fn room_view(&self, room_id: &RoomId) -> EngineResult<(Room, Vec<RoomPlayer>)> {
        let room = self.must_room(room_id).await?;
        let players = self
            .store
            .list_room_players(room_id)
            .await
            .context("list room players")?;
        Ok((room, players))
    }
}
