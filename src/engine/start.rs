//! Game start: preconditions, role deal-out, session creation.

use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use super::GameEngine;
use crate::error::{EngineError, EngineResult};
use crate::game::{night, roles, voice};
use crate::protocol::{
    validation, EventType, GameEvent, GamePhase, GameSession, PlayerId, Role, RoomId, RoomStatus,
    ServerEvent, SessionState, SessionStatus, MIN_PLAYERS,
};

impl GameEngine {
    /// Start the game for a waiting room.
    ///
    /// Fails `room_not_waiting`, `not_enough_players` (fewer than six ready)
    /// or `session_exists`. On success the session is live in `night_0`,
    /// every player has received their private role reveal, and the night
    /// timer is armed.
    pub async fn start_game(&self, room_id: &RoomId) -> EngineResult<GameSession> {
        let mut room = self.must_room(room_id).await?;
        if room.status != RoomStatus::Waiting {
            return Err(EngineError::RoomNotWaiting);
        }

        let seats = self
            .store
            .list_room_players(room_id)
            .await
            .context("list room players")?;
        // The ready players are the cast; stragglers stay spectators.
        let ready: Vec<_> = seats.into_iter().filter(|s| s.is_ready).collect();
        if ready.len() < MIN_PLAYERS {
            return Err(EngineError::NotEnoughPlayers {
                ready: ready.len(),
                required: MIN_PLAYERS,
            });
        }
        validation::validate_composition(ready.len(), &room.config)
            .map_err(EngineError::InvalidComposition)?;

        let session_id = Uuid::new_v4();
        let mut rng = rand::rng();
        let mut players = roles::assign_roles(session_id, &ready, &room.config, &mut rng);
        for player in &mut players {
            voice::apply(GamePhase::Night, player);
        }

        let now = Utc::now();
        let night_seconds = room.config.night_phase_seconds;
        let mut session = GameSession {
            session_id,
            room_id: *room_id,
            status: SessionStatus::Active,
            current_phase: GamePhase::Night,
            phase_number: 1,
            day_number: 0,
            phase_started_at: now,
            phase_ends_at: Some(now + ChronoDuration::seconds(night_seconds as i64)),
            state: SessionState {
                actions_remaining: night::required_roles(&players, 0),
                ..SessionState::default()
            },
            werewolves_alive: 0,
            villagers_alive: 0,
            winning_team: None,
        };
        Self::recount_alive(&mut session, &players);
        Self::verify_invariants(&session, &players)?;

        let created = self
            .store
            .create_session(session.clone(), players.clone())
            .await
            .context("create session")?;
        if !created {
            return Err(EngineError::SessionExists);
        }

        room.status = RoomStatus::Playing;
        room.last_activity_at = now;
        self.store
            .update_room(room.clone())
            .await
            .context("mark room playing")?;

        // One private role_reveal log row per player.
        for player in &players {
            let event = GameEvent::new(
                session_id,
                session.phase_number,
                EventType::RoleReveal,
                serde_json::json!({
                    "player_id": player.player_id,
                    "role": player.role,
                    "team": player.team,
                }),
                false,
            );
            self.store
                .append_event(event)
                .await
                .context("append role_reveal event")?;
        }

        // Post-commit: deliver reveals, werewolves learn their pack.
        let werewolf_ids: Vec<PlayerId> = players
            .iter()
            .filter(|p| p.role == Role::Werewolf)
            .map(|p| p.player_id)
            .collect();
        for player in &players {
            let teammates = (player.role == Role::Werewolf).then(|| {
                werewolf_ids
                    .iter()
                    .copied()
                    .filter(|id| *id != player.player_id)
                    .collect::<Vec<_>>()
            });
            self.send_private(
                &player.user_id,
                ServerEvent::RoleReveal {
                    session_id,
                    your_role: player.role,
                    your_team: player.team,
                    teammates,
                },
            )
            .await;
        }

        self.scheduler.arm(
            session_id,
            session.phase_number,
            std::time::Duration::from_secs(night_seconds),
        );

        tracing::info!(
            %room_id,
            %session_id,
            players = players.len(),
            werewolves = session.werewolves_alive,
            "Game started"
        );
        Ok(session)
    }
}
