//! Read surface: filtered state and public history.

use anyhow::Context;

use super::GameEngine;
use crate::error::EngineResult;
use crate::game::{night, view, SessionView};
use crate::protocol::{GameEvent, GamePhase, Role, SessionId, UserId};

impl GameEngine {
    /// The session as one viewer is entitled to see it.
    pub async fn get_state(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> EngineResult<SessionView> {
        let session = self.must_session(&session_id).await?;
        let viewer = self.must_player_by_user(&session_id, &user_id).await?;
        let players = self
            .store
            .list_players(&session_id)
            .await
            .context("list players")?;

        // The provisional victim needs the raw rows; the denormalized map
        // loses the store order that breaks ties.
        let provisional_victim =
            if viewer.role == Role::Witch && session.current_phase == GamePhase::Night {
                let actions = self
                    .store
                    .list_actions(&session_id, session.phase_number)
                    .await
                    .context("list actions for provisional victim")?;
                night::provisional_victim(&actions)
            } else {
                None
            };

        Ok(view::filter_for_viewer(
            &session,
            &players,
            &viewer,
            provisional_victim,
        ))
    }

    /// The public event log in insertion order.
    pub async fn get_history(&self, session_id: SessionId) -> EngineResult<Vec<GameEvent>> {
        // Ensure the session exists so callers get a 404 rather than an
        // empty log for a bad id.
        self.must_session(&session_id).await?;
        let events = self
            .store
            .list_events(&session_id, true)
            .await
            .context("list public events")?;
        Ok(events)
    }
}
