//! Engine entry point and shared plumbing.
//!
//! `GameEngine` coordinates the store, scheduler, broadcaster and the pure
//! rules modules. The public surface is `start_game`, `process_action`,
//! `get_state`, `get_history` plus the room operations in [`rooms`]; the
//! phase state machine lives in [`phase`].

pub mod actions;
pub mod phase;
pub mod rooms;
pub mod start;
pub mod state;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::broadcast::EventSink;
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::protocol::{
    GamePhase, GamePlayer, GameSession, PlayerId, Room, RoomId, ServerEvent, SessionId,
    SessionStatus, Team, UserId,
};
use crate::scheduler::{PhaseScheduler, TimerSignal};
use crate::store::{GameStore, SessionLockMap};

pub struct GameEngine {
    pub(crate) store: Arc<dyn GameStore>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) scheduler: Arc<PhaseScheduler>,
    pub(crate) locks: SessionLockMap,
    pub(crate) config: Config,
}

impl GameEngine {
    /// Build the engine and start draining timer signals. Must be called
    /// from within a tokio runtime.
    pub fn new(store: Arc<dyn GameStore>, events: Arc<dyn EventSink>, config: Config) -> Arc<Self> {
        let (scheduler, rx) = PhaseScheduler::new(Duration::from_secs(config.timer_sync_interval));
        let engine = Arc::new(Self {
            store,
            events,
            scheduler,
            locks: SessionLockMap::new(),
            config,
        });
        Self::spawn_timer_loop(Arc::clone(&engine), rx);
        engine
    }

    fn spawn_timer_loop(engine: Arc<Self>, mut rx: mpsc::UnboundedReceiver<TimerSignal>) {
        tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                match signal {
                    TimerSignal::Sync {
                        session_id,
                        phase_number,
                        remaining_seconds,
                    } => {
                        engine
                            .handle_timer_sync(session_id, phase_number, remaining_seconds)
                            .await;
                    }
                    TimerSignal::Expired {
                        session_id,
                        phase_number,
                    } => {
                        if let Err(e) = engine.handle_phase_timeout(session_id, phase_number).await
                        {
                            tracing::warn!(
                                %session_id,
                                phase_number,
                                error = %e,
                                "Phase timeout handling failed"
                            );
                        }
                    }
                }
            }
        });
    }

    /// Re-broadcast the countdown so clients stay in sync.
    async fn handle_timer_sync(
        &self,
        session_id: SessionId,
        phase_number: u32,
        remaining_seconds: u64,
    ) {
        let session = match self.store.get_session(&session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "Timer sync could not load session");
                return;
            }
        };
        // Stale-timer fence: a signal armed for an earlier phase is noise.
        if session.phase_number != phase_number || session.status != SessionStatus::Active {
            return;
        }
        self.broadcast(
            &session.room_id,
            ServerEvent::Timer {
                session_id,
                phase: session.current_phase,
                time_remaining_seconds: remaining_seconds,
            },
        )
        .await;
    }

    // ---- shared lookups ----

    pub(crate) async fn must_session(&self, session_id: &SessionId) -> EngineResult<GameSession> {
        self.store
            .get_session(session_id)
            .await
            .context("load session")?
            .ok_or(EngineError::SessionNotFound)
    }

    pub(crate) async fn must_room(&self, room_id: &RoomId) -> EngineResult<Room> {
        self.store
            .get_room(room_id)
            .await
            .context("load room")?
            .ok_or(EngineError::RoomNotFound)
    }

    pub(crate) async fn must_player_by_user(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> EngineResult<GamePlayer> {
        self.store
            .get_player_by_user(session_id, user_id)
            .await
            .context("load player by user")?
            .ok_or(EngineError::PlayerNotFound)
    }

    /// Load a target by `player_id`. Targets are session-scoped ids, never
    /// user ids.
    pub(crate) async fn must_target(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
    ) -> EngineResult<GamePlayer> {
        self.store
            .get_player(session_id, player_id)
            .await
            .context("load target player")?
            .ok_or_else(|| EngineError::TargetInvalid("target player not found".to_string()))
    }

    // ---- fan-out (best effort; never rolls back committed state) ----

    pub(crate) async fn broadcast(&self, room_id: &RoomId, event: ServerEvent) {
        if let Err(e) = self.events.broadcast_room(room_id, Arc::new(event)).await {
            tracing::warn!(%room_id, error = %e, "Room broadcast failed");
        }
    }

    pub(crate) async fn send_private(&self, user_id: &UserId, event: ServerEvent) {
        if let Err(e) = self.events.send_to_user(user_id, Arc::new(event)).await {
            tracing::warn!(%user_id, error = %e, "Private send failed");
        }
    }

    // ---- invariants ----

    /// Recompute the alive counters from the player rows. Neutral players
    /// are carried on the village side of the ledger; the win checker works
    /// from the rows themselves and never counts them for parity.
    pub(crate) fn recount_alive(session: &mut GameSession, players: &[GamePlayer]) {
        session.werewolves_alive = players
            .iter()
            .filter(|p| p.is_alive && p.team == Team::Werewolves)
            .count() as u32;
        session.villagers_alive = players
            .iter()
            .filter(|p| p.is_alive && p.team != Team::Werewolves)
            .count() as u32;
    }

    /// Fatal-grade consistency checks, run before committing a transition.
    pub(crate) fn verify_invariants(
        session: &GameSession,
        players: &[GamePlayer],
    ) -> EngineResult<()> {
        let alive_total = players.iter().filter(|p| p.is_alive).count() as u32;
        if session.werewolves_alive + session.villagers_alive != alive_total {
            return Err(EngineError::Fatal(format!(
                "alive count drift: {} + {} != {}",
                session.werewolves_alive, session.villagers_alive, alive_total
            )));
        }

        for player in players {
            if let Some(lover_id) = player.lover_id {
                let reciprocal = players
                    .iter()
                    .find(|p| p.player_id == lover_id)
                    .and_then(|p| p.lover_id);
                if reciprocal != Some(player.player_id) {
                    return Err(EngineError::Fatal(format!(
                        "asymmetric lovers: {} -> {lover_id}",
                        player.player_id
                    )));
                }
            }
        }

        if session.status == SessionStatus::Active {
            match session.phase_ends_at {
                Some(ends_at) if ends_at > session.phase_started_at => {}
                _ => {
                    return Err(EngineError::Fatal(
                        "active session without a valid phase deadline".to_string(),
                    ))
                }
            }
        }

        Ok(())
    }

    /// Duration of a phase according to the room's rules.
    pub(crate) fn phase_duration(room: &Room, phase: GamePhase) -> Duration {
        Duration::from_secs(room.config.phase_seconds(phase))
    }
}
