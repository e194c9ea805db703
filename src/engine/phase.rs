//! The phase state machine.
//!
//! ```text
//! night_0 ──(timer OR all-actions)──► day_discussion
//! day_discussion ──(timer)──► day_voting
//! day_voting ──(timer OR all-voted OR mayor decision)──► night_k
//! night_k ──(timer OR all-actions)──► day_discussion
//! (any state) ──(win check → game over)──► finished
//! ```
//!
//! Each transition is one critical section under the session lock: assert
//! the expected source phase and phase number (stale timers and raced
//! requests fail the assert and no-op), resolve the subordinate, apply
//! deaths, write the new phase row and the event log entries. The win
//! check runs as its own critical section after commit; broadcasting, voice
//! reassignment and timer arming are post-commit and idempotent.

use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};

use super::GameEngine;
use crate::error::{EngineError, EngineResult};
use crate::game::{deaths, night, votes, voice, wins, DeathOutcome, NightActionResults};
use crate::protocol::{
    DeathNotice, EventType, GameEvent, GamePhase, GamePlayer, GameSession, PlayerId, Role,
    RoomStatus, ServerEvent, SessionId, SessionStatus,
};

impl GameEngine {
    /// Re-entry point for expired timers. Signals armed for an earlier
    /// phase are discarded here or by the per-transition assert, so an
    /// embedder (or a test) may call this at any time without corrupting
    /// the state machine.
    pub async fn handle_phase_timeout(
        &self,
        session_id: SessionId,
        phase_number: u32,
    ) -> EngineResult<()> {
        let session = match self.store.get_session(&session_id).await.context("load session")? {
            Some(session) => session,
            None => return Ok(()),
        };
        if session.status != SessionStatus::Active || session.phase_number != phase_number {
            return Ok(());
        }

        tracing::info!(%session_id, phase = %session.phase_label(), "Phase timer expired");
        let result = match session.current_phase {
            GamePhase::Night => self.advance_from_night(session_id, phase_number).await,
            GamePhase::DayDiscussion => {
                self.advance_from_day_discussion(session_id, phase_number).await
            }
            GamePhase::DayVoting => {
                self.advance_from_day_voting(session_id, phase_number, None).await
            }
            GamePhase::Finished => Ok(()),
        };
        match result {
            // The timer raced a completed transition; nothing to do.
            Err(EngineError::IllegalTransition { .. }) => Ok(()),
            other => other,
        }
    }

    /// Night resolution: aggregate the night's actions, let the death
    /// resolver speak, wake the village.
    pub(crate) async fn advance_from_night(
        &self,
        session_id: SessionId,
        expected_phase_number: u32,
    ) -> EngineResult<()> {
        let room_id;
        let mut broadcasts: Vec<ServerEvent> = Vec::new();
        {
            let _guard = self.locks.acquire(session_id).await;
            let mut session = self.must_session(&session_id).await?;
            Self::assert_phase(&session, GamePhase::Night, expected_phase_number)?;
            let room = self.must_room(&session.room_id).await?;
            let mut players = self
                .store
                .list_players(&session_id)
                .await
                .context("list players")?;
            let actions = self
                .store
                .list_actions(&session_id, session.phase_number)
                .await
                .context("list night actions")?;

            let results = NightActionResults::collect(&actions);

            // Consume one-shot resources and bodyguard memory now that the
            // night is settled. A heal blocked by the bodyguard is not
            // consumed; a heal with no werewolf target saves nobody and
            // costs nothing.
            let heal_consumed = results.is_healed() && results.werewolf_target.is_some();
            for action in &actions {
                let Some(actor) = players.iter_mut().find(|p| p.player_id == action.player_id)
                else {
                    continue;
                };
                match action.action_type {
                    crate::protocol::ActionType::WitchHeal if heal_consumed => {
                        actor.role_state.heal_used = true;
                    }
                    crate::protocol::ActionType::WitchPoison => {
                        actor.role_state.poison_used = true;
                    }
                    crate::protocol::ActionType::BodyguardProtect => {
                        actor.role_state.last_protected = action.target_player_id;
                    }
                    _ => {}
                }
            }

            let outcome = deaths::resolve_night(&players, &results);
            let notices = Self::apply_deaths(&mut session, &mut players, &outcome);

            session.state.healed_player = if heal_consumed {
                results.werewolf_target
            } else {
                None
            };
            session.state.protected_player = if results.is_protected() {
                results.bodyguard_target
            } else {
                None
            };
            session.state.poisoned_player = results.poison_target;
            session.state.pending_hunter_shot = outcome.pending_hunter;
            session.state.last_lynched_player = None;
            session.state.werewolf_votes.clear();
            session.state.actions_remaining.clear();

            Self::enter_phase(&mut session, GamePhase::DayDiscussion, &room);
            Self::recount_alive(&mut session, &players);
            Self::verify_invariants(&session, &players)?;

            self.store
                .update_players(players.clone())
                .await
                .context("persist players")?;
            self.store
                .update_session(session.clone())
                .await
                .context("persist session")?;

            let message = Self::dawn_message(&notices);
            self.log_phase_events(&session, &notices, &message).await?;
            broadcasts.extend(Self::phase_broadcasts(&session, &notices, message));
            room_id = session.room_id;
        }

        for event in broadcasts {
            self.broadcast(&room_id, event).await;
        }
        let game_over = self.finalize_if_won(session_id, None).await?;
        self.apply_voice_assignments(session_id).await?;
        if !game_over {
            self.arm_for_current_phase(session_id).await?;
        }
        Ok(())
    }

    /// Discussion ends by timer only; the floor closes and ballots open.
    pub(crate) async fn advance_from_day_discussion(
        &self,
        session_id: SessionId,
        expected_phase_number: u32,
    ) -> EngineResult<()> {
        let room_id;
        let mut broadcasts: Vec<ServerEvent> = Vec::new();
        {
            let _guard = self.locks.acquire(session_id).await;
            let mut session = self.must_session(&session_id).await?;
            Self::assert_phase(&session, GamePhase::DayDiscussion, expected_phase_number)?;
            let room = self.must_room(&session.room_id).await?;
            let players = self
                .store
                .list_players(&session_id)
                .await
                .context("list players")?;

            // Ballots from any earlier day are zeroed entering the vote.
            session.state.lynch_votes.clear();
            session.state.pending_mayor_tiebreak = None;
            // An unfired revenge shot expires with its phase.
            session.state.pending_hunter_shot = None;

            Self::enter_phase(&mut session, GamePhase::DayVoting, &room);
            Self::verify_invariants(&session, &players)?;
            self.store
                .update_session(session.clone())
                .await
                .context("persist session")?;

            let message = "Discussion is over. The village votes.".to_string();
            self.log_phase_events(&session, &[], &message).await?;
            broadcasts.extend(Self::phase_broadcasts(&session, &[], message));
            room_id = session.room_id;
        }

        for event in broadcasts {
            self.broadcast(&room_id, event).await;
        }
        self.apply_voice_assignments(session_id).await?;
        self.arm_for_current_phase(session_id).await?;
        Ok(())
    }

    /// Voting resolution. `forced_lynch` carries the Mayor's tiebreak
    /// decision; otherwise the tally of this round's raw ballots decides.
    /// A tie with a living Mayor holds the vote open for one more round
    /// instead of transitioning.
    pub(crate) async fn advance_from_day_voting(
        &self,
        session_id: SessionId,
        expected_phase_number: u32,
        forced_lynch: Option<PlayerId>,
    ) -> EngineResult<()> {
        let room_id;
        let mut broadcasts: Vec<ServerEvent> = Vec::new();
        let lynched: Option<PlayerId>;
        {
            let _guard = self.locks.acquire(session_id).await;
            let mut session = self.must_session(&session_id).await?;
            Self::assert_phase(&session, GamePhase::DayVoting, expected_phase_number)?;
            let room = self.must_room(&session.room_id).await?;
            let mut players = self
                .store
                .list_players(&session_id)
                .await
                .context("list players")?;
            let actions = self
                .store
                .list_actions(&session_id, session.phase_number)
                .await
                .context("list lynch votes")?;

            let tally = votes::tally_lynch(&actions);
            lynched = match forced_lynch {
                Some(target) => Some(target),
                None => match &tally.outcome {
                    votes::TallyOutcome::Lynched(target) => Some(*target),
                    votes::TallyOutcome::NoVotes => None,
                    votes::TallyOutcome::Tie(candidates) => {
                        let mayor_alive = players
                            .iter()
                            .any(|p| p.role == Role::Mayor && p.is_alive);
                        if mayor_alive && session.state.pending_mayor_tiebreak.is_none() {
                            // Hold the vote open: same phase, new round, so
                            // the old timer is fenced out by the counter.
                            session.state.pending_mayor_tiebreak = Some(candidates.clone());
                            session.phase_number += 1;
                            session.phase_started_at = Utc::now();
                            session.phase_ends_at = Some(
                                Utc::now()
                                    + ChronoDuration::seconds(room.config.voting_seconds as i64),
                            );
                            self.store
                                .update_session(session.clone())
                                .await
                                .context("persist tiebreak round")?;
                            self.store
                                .append_event(GameEvent::new(
                                    session_id,
                                    session.phase_number,
                                    EventType::VoteComplete,
                                    serde_json::json!({
                                        "outcome": "tie",
                                        "tied_candidates": candidates,
                                        "pending_mayor_tiebreak": true,
                                    }),
                                    true,
                                ))
                                .await
                                .context("append tie event")?;

                            let event = ServerEvent::VoteResult {
                                session_id,
                                target_id: None,
                                vote_count: 0,
                                total_votes: tally.total_votes,
                                tied_candidates: candidates.clone(),
                            };
                            let room_id = session.room_id;
                            let phase_number = session.phase_number;
                            drop(_guard);
                            self.broadcast(&room_id, event).await;
                            self.scheduler.arm(
                                session_id,
                                phase_number,
                                Self::phase_duration(&room, GamePhase::DayVoting),
                            );
                            return Ok(());
                        }
                        // No mayor to decide (or the tiebreak round itself
                        // expired): no one is lynched.
                        None
                    }
                },
            };

            let outcome = match lynched {
                Some(target) => deaths::resolve_lynch(&players, target),
                None => DeathOutcome::default(),
            };
            let notices = Self::apply_deaths(&mut session, &mut players, &outcome);

            session.state.last_lynched_player = lynched;
            session.state.pending_hunter_shot = outcome.pending_hunter;
            session.state.pending_mayor_tiebreak = None;
            session.state.lynch_votes = night::vote_counts(
                &actions,
                crate::protocol::ActionType::VoteLynch,
            );

            self.store
                .append_event(GameEvent::new(
                    session_id,
                    session.phase_number,
                    EventType::VoteComplete,
                    serde_json::json!({
                        "lynched": lynched,
                        "total_votes": tally.total_votes,
                    }),
                    true,
                ))
                .await
                .context("append vote_complete event")?;
            let vote_count = lynched
                .and_then(|id| tally.counts.get(&id).copied())
                .unwrap_or(0);
            broadcasts.push(ServerEvent::VoteResult {
                session_id,
                target_id: lynched,
                vote_count,
                total_votes: tally.total_votes,
                tied_candidates: Vec::new(),
            });

            // Seed the coming night from whoever is still standing.
            session.state.actions_remaining =
                night::required_roles(&players, session.day_number);
            session.state.werewolf_votes.clear();

            Self::enter_phase(&mut session, GamePhase::Night, &room);
            Self::recount_alive(&mut session, &players);
            Self::verify_invariants(&session, &players)?;

            self.store
                .update_players(players.clone())
                .await
                .context("persist players")?;
            self.store
                .update_session(session.clone())
                .await
                .context("persist session")?;

            let message = Self::dusk_message(&notices);
            self.log_phase_events(&session, &notices, &message).await?;
            broadcasts.extend(Self::phase_broadcasts(&session, &notices, message));
            room_id = session.room_id;
        }

        for event in broadcasts {
            self.broadcast(&room_id, event).await;
        }
        let game_over = self.finalize_if_won(session_id, lynched).await?;
        self.apply_voice_assignments(session_id).await?;
        if !game_over {
            self.arm_for_current_phase(session_id).await?;
        }
        Ok(())
    }

    /// Win check in its own critical section. Returns true when the game is
    /// over and the session has been finalized.
    pub(crate) async fn finalize_if_won(
        &self,
        session_id: SessionId,
        last_lynched: Option<PlayerId>,
    ) -> EngineResult<bool> {
        let room_id;
        let end_event;
        {
            let _guard = self.locks.acquire(session_id).await;
            let mut session = self.must_session(&session_id).await?;
            if session.status == SessionStatus::Finished {
                return Ok(true);
            }
            let players = self
                .store
                .list_players(&session_id)
                .await
                .context("list players")?;

            let condition = wins::evaluate(&players, last_lynched);
            let Some(winning_team) = condition.winning_team() else {
                return Ok(false);
            };
            let winners = condition.winners(&players);
            let roles_revealed: std::collections::HashMap<PlayerId, Role> = players
                .iter()
                .map(|p| (p.player_id, p.role))
                .collect();

            session.status = SessionStatus::Finished;
            session.current_phase = GamePhase::Finished;
            session.phase_number += 1;
            session.phase_ends_at = None;
            session.winning_team = Some(winning_team);
            self.store
                .update_session(session.clone())
                .await
                .context("finalize session")?;

            self.store
                .append_event(GameEvent::new(
                    session_id,
                    session.phase_number,
                    EventType::GameEnd,
                    serde_json::json!({
                        "winning_team": winning_team,
                        "winners": winners,
                        "roles_revealed": roles_revealed,
                    }),
                    true,
                ))
                .await
                .context("append game_end event")?;

            end_event = ServerEvent::GameEnd {
                session_id,
                winning_team,
                winners,
                roles_revealed,
            };
            room_id = session.room_id;

            tracing::info!(%session_id, ?winning_team, "Game over");
        }

        self.scheduler.cancel(&session_id);

        // The room follows its game into the finished state.
        match self.store.get_room(&room_id).await.context("load room")? {
            Some(mut room) => {
                room.status = RoomStatus::Finished;
                room.finished_at = Some(Utc::now());
                self.store
                    .update_room(room)
                    .await
                    .context("mark room finished")?;
            }
            None => {
                tracing::warn!(%room_id, "Finished session belongs to a missing room");
            }
        }

        self.broadcast(&room_id, end_event).await;
        self.locks.forget(&session_id);
        Ok(true)
    }

    // ---- shared helpers ----

    pub(crate) fn assert_phase(
        session: &GameSession,
        expected: GamePhase,
        expected_number: u32,
    ) -> EngineResult<()> {
        if session.status != SessionStatus::Active
            || session.current_phase != expected
            || session.phase_number != expected_number
        {
            return Err(EngineError::IllegalTransition {
                expected: format!("{}#{expected_number}", expected.label(session.day_number)),
                found: format!("{}#{}", session.phase_label(), session.phase_number),
            });
        }
        Ok(())
    }

    /// Mark the resolver's deaths on the rows: flip `is_alive`, stamp the
    /// phase and reason, publish the role.
    pub(crate) fn apply_deaths(
        session: &mut GameSession,
        players: &mut [GamePlayer],
        outcome: &DeathOutcome,
    ) -> Vec<DeathNotice> {
        let mut notices = Vec::with_capacity(outcome.deaths.len());
        for death in &outcome.deaths {
            let Some(player) = players.iter_mut().find(|p| p.player_id == death.player_id)
            else {
                continue;
            };
            player.is_alive = false;
            player.died_at_phase = Some(session.phase_number);
            player.death_reason = Some(death.reason);
            session
                .state
                .revealed_roles
                .insert(player.player_id, player.role);
            notices.push(DeathNotice {
                player_id: player.player_id,
                reason: death.reason,
                role_revealed: player.role,
            });
        }
        notices
    }

    /// Advance the phase row: bump the counters, restart the clock.
    fn enter_phase(session: &mut GameSession, next: GamePhase, room: &crate::protocol::Room) {
        if session.current_phase == GamePhase::Night && next == GamePhase::DayDiscussion {
            session.day_number += 1;
        }
        session.current_phase = next;
        session.phase_number += 1;
        let now = Utc::now();
        session.phase_started_at = now;
        session.phase_ends_at =
            Some(now + ChronoDuration::seconds(room.config.phase_seconds(next) as i64));
    }

    /// Append the `phase_change` row and one `player_death` row per death.
    pub(crate) async fn log_phase_events(
        &self,
        session: &GameSession,
        notices: &[DeathNotice],
        message: &str,
    ) -> EngineResult<()> {
        self.store
            .append_event(GameEvent::new(
                session.session_id,
                session.phase_number,
                EventType::PhaseChange,
                serde_json::json!({
                    "new_phase": session.current_phase,
                    "phase_label": session.phase_label(),
                    "day_number": session.day_number,
                    "message": message,
                    "deaths": notices,
                }),
                true,
            ))
            .await
            .context("append phase_change event")?;
        for notice in notices {
            self.store
                .append_event(GameEvent::new(
                    session.session_id,
                    session.phase_number,
                    EventType::PlayerDeath,
                    serde_json::json!({
                        "player_id": notice.player_id,
                        "reason": notice.reason,
                        "role_revealed": notice.role_revealed,
                    }),
                    true,
                ))
                .await
                .context("append player_death event")?;
        }
        Ok(())
    }

    /// Broadcast payloads matching [`Self::log_phase_events`].
    pub(crate) fn phase_broadcasts(
        session: &GameSession,
        notices: &[DeathNotice],
        message: String,
    ) -> Vec<ServerEvent> {
        let mut events = Vec::with_capacity(1 + notices.len());
        events.push(ServerEvent::PhaseChange {
            session_id: session.session_id,
            new_phase: session.current_phase,
            phase_label: session.phase_label(),
            phase_number: session.phase_number,
            day_number: session.day_number,
            message,
            deaths: notices.to_vec(),
            phase_ends_at: session.phase_ends_at,
        });
        for notice in notices {
            events.push(ServerEvent::PlayerDeath {
                session_id: session.session_id,
                player_id: notice.player_id,
                reason: notice.reason,
                role_revealed: notice.role_revealed,
            });
        }
        events
    }

    fn dawn_message(notices: &[DeathNotice]) -> String {
        if notices.is_empty() {
            "The sun rises. Everyone survived the night.".to_string()
        } else {
            let victims: Vec<String> = notices.iter().map(|n| n.player_id.to_string()).collect();
            format!(
                "The sun rises. {} did not survive the night.",
                victims.join(", ")
            )
        }
    }

    fn dusk_message(notices: &[DeathNotice]) -> String {
        if notices.is_empty() {
            "The vote ends without a lynch. Night falls.".to_string()
        } else {
            let victims: Vec<String> = notices.iter().map(|n| n.player_id.to_string()).collect();
            format!("The village has spoken: {}. Night falls.", victims.join(", "))
        }
    }

    /// Re-derive every player's voice channels for the session's phase.
    /// Runs under the session lock so it cannot clobber a concurrent
    /// player-row update; the write is idempotent on replay.
    pub(crate) async fn apply_voice_assignments(&self, session_id: SessionId) -> EngineResult<()> {
        let _guard = self.locks.acquire(session_id).await;
        let session = match self.store.get_session(&session_id).await.context("load session")? {
            Some(session) => session,
            None => return Ok(()),
        };
        let mut players = self
            .store
            .list_players(&session_id)
            .await
            .context("list players")?;
        for player in &mut players {
            voice::apply(session.current_phase, player);
        }
        self.store
            .update_players(players)
            .await
            .context("persist voice assignments")?;
        Ok(())
    }

    /// Arm the scheduler for whatever phase the session is in now.
    pub(crate) async fn arm_for_current_phase(&self, session_id: SessionId) -> EngineResult<()> {
        let session = match self.store.get_session(&session_id).await.context("load session")? {
            Some(session) => session,
            None => return Ok(()),
        };
        if session.status != SessionStatus::Active {
            return Ok(());
        }
        let room = self.must_room(&session.room_id).await?;
        self.scheduler.arm(
            session_id,
            session.phase_number,
            Self::phase_duration(&room, session.current_phase),
        );
        Ok(())
    }
}
