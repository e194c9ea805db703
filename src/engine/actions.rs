//! The action pipeline: validation, idempotent recording, provisional state
//! exposure.
//!
//! Every handler runs under the session lock and shares the same
//! obligations: load the actor by `(session, user)`, check the role binding,
//! check liveness (the Hunter's revenge being the one exception), load the
//! target by `player_id`, re-check the phase, then UPSERT the action keyed
//! by `(session, player, phase, action_type)`. Validation failures return
//! before anything is written. Early phase completion and the Hunter's
//! immediate resolution happen after the lock drops.

use anyhow::Context;
use chrono::Utc;
use uuid::Uuid;

use super::GameEngine;
use crate::error::{EngineError, EngineResult};
use crate::game::{deaths, night};
use crate::protocol::{
    ActionRequest, ActionType, EventType, GameAction, GameEvent, GamePhase, GamePlayer,
    GameSession, PlayerId, Role, ServerEvent, SessionId, SessionStatus, Team, UserId, VoteKind,
};

/// Work deferred until after the action's critical section commits.
enum FollowUp {
    None,
    /// A night duty was recorded; the night may now be complete.
    NightProgress { phase_number: u32, all_done: bool },
    /// Every living player has a lynch ballot in.
    VotingComplete { phase_number: u32 },
    /// The Mayor picked one of the tied candidates.
    MayorDecision { phase_number: u32, target: PlayerId },
    /// The Hunter fired; deaths are committed, the win check is pending.
    HunterResolved { last_lynched: Option<PlayerId> },
}

impl GameEngine {
    /// Validate, record and apply one player action.
    pub async fn process_action(
        &self,
        session_id: SessionId,
        user_id: UserId,
        req: ActionRequest,
    ) -> EngineResult<()> {
        let mut broadcasts: Vec<ServerEvent> = Vec::new();
        let mut privates: Vec<(UserId, ServerEvent)> = Vec::new();
        let follow_up;
        let room_id;
        {
            let _guard = self.locks.acquire(session_id).await;
            let mut session = self.must_session(&session_id).await?;
            if session.status != SessionStatus::Active {
                return Err(EngineError::InvalidPhase {
                    phase: GamePhase::Finished,
                });
            }
            let actor = self.must_player_by_user(&session_id, &user_id).await?;
            room_id = session.room_id;

            follow_up = match req.action_type {
                ActionType::WerewolfVote => {
                    self.handle_werewolf_vote(&mut session, &actor, &req, &mut privates)
                        .await?
                }
                ActionType::SeerDivine => {
                    self.handle_seer_divine(&mut session, &actor, &req, &mut privates)
                        .await?
                }
                ActionType::WitchHeal => {
                    self.handle_witch_heal(&mut session, &actor, &req).await?
                }
                ActionType::WitchPoison => {
                    self.handle_witch_poison(&mut session, &actor, &req).await?
                }
                ActionType::BodyguardProtect => {
                    self.handle_bodyguard_protect(&mut session, &actor, &req).await?
                }
                ActionType::CupidChoose => {
                    self.handle_cupid_choose(&mut session, &actor, &req).await?
                }
                ActionType::HunterShoot => {
                    self.handle_hunter_shoot(&mut session, &actor, &req, &mut broadcasts)
                        .await?
                }
                ActionType::VoteLynch => {
                    self.handle_vote_lynch(&mut session, &actor, &req, &mut broadcasts)
                        .await?
                }
                ActionType::MayorReveal => {
                    self.handle_mayor_reveal(&mut session, &actor, &mut broadcasts)
                        .await?
                }
            };

            self.store
                .update_session(session)
                .await
                .context("persist session after action")?;
        }

        for event in broadcasts {
            self.broadcast(&room_id, event).await;
        }
        for (target_user, event) in privates {
            self.send_private(&target_user, event).await;
        }

        match follow_up {
            FollowUp::None => {}
            FollowUp::NightProgress {
                phase_number,
                all_done,
            } => {
                if all_done {
                    self.broadcast(
                        &room_id,
                        ServerEvent::NightActionsComplete {
                            session_id,
                            all_submitted: true,
                        },
                    )
                    .await;
                    self.ignore_raced_transition(
                        self.advance_from_night(session_id, phase_number).await,
                    )?;
                }
            }
            FollowUp::VotingComplete { phase_number } => {
                self.ignore_raced_transition(
                    self.advance_from_day_voting(session_id, phase_number, None).await,
                )?;
            }
            FollowUp::MayorDecision {
                phase_number,
                target,
            } => {
                self.ignore_raced_transition(
                    self.advance_from_day_voting(session_id, phase_number, Some(target))
                        .await,
                )?;
            }
            FollowUp::HunterResolved { last_lynched } => {
                self.finalize_if_won(session_id, last_lynched).await?;
                self.apply_voice_assignments(session_id).await?;
            }
        }
        Ok(())
    }

    /// An early-advance that loses the race against the timer is success,
    /// not an error.
    fn ignore_raced_transition(&self, result: EngineResult<()>) -> EngineResult<()> {
        match result {
            Err(EngineError::IllegalTransition { .. }) => Ok(()),
            other => other,
        }
    }

    // ---- shared checks ----

    fn ensure_role(actor: &GamePlayer, action: ActionType) -> EngineResult<()> {
        match action.required_role() {
            Some(role) if actor.role != role => Err(EngineError::InvalidAction { action }),
            _ => Ok(()),
        }
    }

    fn ensure_alive(actor: &GamePlayer) -> EngineResult<()> {
        if actor.is_alive {
            Ok(())
        } else {
            Err(EngineError::DeadPlayer)
        }
    }

    fn ensure_night(session: &GameSession) -> EngineResult<()> {
        if session.current_phase == GamePhase::Night {
            Ok(())
        } else {
            Err(EngineError::InvalidPhase {
                phase: session.current_phase,
            })
        }
    }

    fn required_target(req: &ActionRequest) -> EngineResult<PlayerId> {
        req.target_player_id
            .ok_or_else(|| EngineError::TargetInvalid("a target player is required".to_string()))
    }

    /// Load and liveness-check a target by `player_id`.
    async fn living_target(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
    ) -> EngineResult<GamePlayer> {
        let target = self.must_target(session_id, player_id).await?;
        if !target.is_alive {
            return Err(EngineError::TargetInvalid(
                "target is no longer alive".to_string(),
            ));
        }
        Ok(target)
    }

    async fn record_action(
        &self,
        session: &GameSession,
        actor: &GamePlayer,
        action_type: ActionType,
        target: Option<PlayerId>,
        data: serde_json::Value,
    ) -> EngineResult<()> {
        self.store
            .upsert_action(GameAction {
                action_id: Uuid::new_v4(),
                session_id: session.session_id,
                player_id: actor.player_id,
                phase_number: session.phase_number,
                action_type,
                target_player_id: target,
                action_data: data,
                created_at: Utc::now(),
            })
            .await
            .context("upsert action")?;
        Ok(())
    }

    /// A role's first submission completes its duty; later changes do not
    /// re-open it.
    fn night_progress(session: &mut GameSession, role: Role) -> FollowUp {
        session.state.actions_remaining.remove(&role);
        FollowUp::NightProgress {
            phase_number: session.phase_number,
            all_done: session.state.actions_remaining.is_empty(),
        }
    }

    // ---- handlers ----

    async fn handle_werewolf_vote(
        &self,
        session: &mut GameSession,
        actor: &GamePlayer,
        req: &ActionRequest,
        privates: &mut Vec<(UserId, ServerEvent)>,
    ) -> EngineResult<FollowUp> {
        Self::ensure_role(actor, ActionType::WerewolfVote)?;
        Self::ensure_alive(actor)?;
        Self::ensure_night(session)?;
        let target_id = Self::required_target(req)?;
        let target = self.living_target(&session.session_id, &target_id).await?;
        if target.team == Team::Werewolves {
            return Err(EngineError::TargetInvalid(
                "werewolves cannot target their own pack".to_string(),
            ));
        }

        self.record_action(session, actor, ActionType::WerewolfVote, Some(target_id), serde_json::Value::Null)
            .await?;

        // Denormalized tally for the Witch's provisional view, recomputed
        // from the raw rows on every commit.
        let actions = self
            .store
            .list_actions(&session.session_id, session.phase_number)
            .await
            .context("list actions for tally")?;
        session.state.werewolf_votes = night::vote_counts(&actions, ActionType::WerewolfVote);

        // The ballot is private to the pack.
        let players = self
            .store
            .list_players(&session.session_id)
            .await
            .context("list players")?;
        for wolf in players.iter().filter(|p| p.role == Role::Werewolf) {
            privates.push((
                wolf.user_id,
                ServerEvent::PlayerVoted {
                    session_id: session.session_id,
                    voter_id: actor.player_id,
                    target_id,
                    vote_type: VoteKind::WerewolfVote,
                },
            ));
        }

        Ok(Self::night_progress(session, Role::Werewolf))
    }

    async fn handle_seer_divine(
        &self,
        session: &mut GameSession,
        actor: &GamePlayer,
        req: &ActionRequest,
        privates: &mut Vec<(UserId, ServerEvent)>,
    ) -> EngineResult<FollowUp> {
        Self::ensure_role(actor, ActionType::SeerDivine)?;
        Self::ensure_alive(actor)?;
        Self::ensure_night(session)?;
        let target_id = Self::required_target(req)?;
        let target = self.living_target(&session.session_id, &target_id).await?;

        let is_werewolf = target.role == Role::Werewolf;
        self.record_action(
            session,
            actor,
            ActionType::SeerDivine,
            Some(target_id),
            serde_json::json!({ "is_werewolf": is_werewolf }),
        )
        .await?;

        self.store
            .append_event(GameEvent::new(
                session.session_id,
                session.phase_number,
                EventType::RoleReveal,
                serde_json::json!({
                    "seer": actor.player_id,
                    "target": target_id,
                    "is_werewolf": is_werewolf,
                }),
                false,
            ))
            .await
            .context("append divination event")?;

        privates.push((
            actor.user_id,
            ServerEvent::DivinationResult {
                session_id: session.session_id,
                target_id,
                is_werewolf,
            },
        ));

        Ok(Self::night_progress(session, Role::Seer))
    }

    async fn handle_witch_heal(
        &self,
        session: &mut GameSession,
        actor: &GamePlayer,
        _req: &ActionRequest,
    ) -> EngineResult<FollowUp> {
        Self::ensure_role(actor, ActionType::WitchHeal)?;
        Self::ensure_alive(actor)?;
        Self::ensure_night(session)?;
        if actor.role_state.heal_used {
            return Err(EngineError::ResourceUsed("heal potion"));
        }

        // Targetless: the heal saves whoever the pack picked. Whether the
        // potion is consumed is settled at resolution.
        self.record_action(session, actor, ActionType::WitchHeal, None, serde_json::Value::Null)
            .await?;
        Ok(Self::night_progress(session, Role::Witch))
    }

    async fn handle_witch_poison(
        &self,
        session: &mut GameSession,
        actor: &GamePlayer,
        req: &ActionRequest,
    ) -> EngineResult<FollowUp> {
        Self::ensure_role(actor, ActionType::WitchPoison)?;
        Self::ensure_alive(actor)?;
        Self::ensure_night(session)?;
        if actor.role_state.poison_used {
            return Err(EngineError::ResourceUsed("poison potion"));
        }
        let target_id = Self::required_target(req)?;
        // Any living player will do. The Witch poisoning herself is legal.
        self.living_target(&session.session_id, &target_id).await?;

        self.record_action(session, actor, ActionType::WitchPoison, Some(target_id), serde_json::Value::Null)
            .await?;
        Ok(Self::night_progress(session, Role::Witch))
    }

    async fn handle_bodyguard_protect(
        &self,
        session: &mut GameSession,
        actor: &GamePlayer,
        req: &ActionRequest,
    ) -> EngineResult<FollowUp> {
        Self::ensure_role(actor, ActionType::BodyguardProtect)?;
        Self::ensure_alive(actor)?;
        Self::ensure_night(session)?;
        let target_id = Self::required_target(req)?;
        // Self-protection is allowed; repeating last night's target is not.
        if actor.role_state.last_protected == Some(target_id) {
            return Err(EngineError::TargetInvalid(
                "cannot protect the same player two consecutive nights".to_string(),
            ));
        }
        self.living_target(&session.session_id, &target_id).await?;

        self.record_action(
            session,
            actor,
            ActionType::BodyguardProtect,
            Some(target_id),
            serde_json::Value::Null,
        )
        .await?;
        Ok(Self::night_progress(session, Role::Bodyguard))
    }

    async fn handle_cupid_choose(
        &self,
        session: &mut GameSession,
        actor: &GamePlayer,
        req: &ActionRequest,
    ) -> EngineResult<FollowUp> {
        Self::ensure_role(actor, ActionType::CupidChoose)?;
        Self::ensure_alive(actor)?;
        Self::ensure_night(session)?;
        // Cupid only works the first night; afterwards the duty is silently
        // skipped even if alive.
        if session.day_number > 0 {
            return Err(EngineError::InvalidPhase {
                phase: session.current_phase,
            });
        }
        if actor.role_state.has_chosen {
            return Err(EngineError::AlreadyActed);
        }
        let first_id = Self::required_target(req)?;
        let second_id = req.second_lover().ok_or_else(|| {
            EngineError::TargetInvalid("data.second_lover is required".to_string())
        })?;
        if first_id == second_id {
            return Err(EngineError::TargetInvalid(
                "lovers must be two distinct players".to_string(),
            ));
        }
        self.living_target(&session.session_id, &first_id).await?;
        self.living_target(&session.session_id, &second_id).await?;

        // Bind the pair symmetrically; Cupid may include themself.
        let mut players = self
            .store
            .list_players(&session.session_id)
            .await
            .context("list players")?;
        for player in &mut players {
            if player.player_id == first_id {
                player.lover_id = Some(second_id);
            } else if player.player_id == second_id {
                player.lover_id = Some(first_id);
            }
            if player.player_id == actor.player_id {
                player.role_state.has_chosen = true;
            }
        }
        Self::verify_invariants(session, &players)?;
        self.store
            .update_players(players)
            .await
            .context("persist lovers")?;

        self.record_action(
            session,
            actor,
            ActionType::CupidChoose,
            Some(first_id),
            serde_json::json!({ "second_lover": second_id.to_string() }),
        )
        .await?;
        Ok(Self::night_progress(session, Role::Cupid))
    }

    async fn handle_hunter_shoot(
        &self,
        session: &mut GameSession,
        actor: &GamePlayer,
        req: &ActionRequest,
        broadcasts: &mut Vec<ServerEvent>,
    ) -> EngineResult<FollowUp> {
        Self::ensure_role(actor, ActionType::HunterShoot)?;
        // The one action reserved for the dead: the revenge window opens at
        // the Hunter's death and closes at the next transition.
        if actor.is_alive {
            return Err(EngineError::InvalidAction {
                action: ActionType::HunterShoot,
            });
        }
        if actor.role_state.has_shot {
            return Err(EngineError::ResourceUsed("revenge shot"));
        }
        if session.state.pending_hunter_shot != Some(actor.player_id) {
            return Err(EngineError::InvalidPhase {
                phase: session.current_phase,
            });
        }
        let target_id = Self::required_target(req)?;
        if target_id == actor.player_id {
            return Err(EngineError::TargetInvalid(
                "the hunter cannot shoot themself".to_string(),
            ));
        }
        self.living_target(&session.session_id, &target_id).await?;

        self.record_action(session, actor, ActionType::HunterShoot, Some(target_id), serde_json::Value::Null)
            .await?;

        let mut players = self
            .store
            .list_players(&session.session_id)
            .await
            .context("list players")?;
        let outcome = deaths::resolve_hunter_shot(&players, target_id);
        let notices = Self::apply_deaths(session, &mut players, &outcome);
        for player in &mut players {
            if player.player_id == actor.player_id {
                player.role_state.has_shot = true;
            }
        }
        session.state.pending_hunter_shot = outcome.pending_hunter;
        Self::recount_alive(session, &players);
        Self::verify_invariants(session, &players)?;
        self.store
            .update_players(players)
            .await
            .context("persist hunter shot")?;

        for notice in &notices {
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
                .context("append hunter death event")?;
            broadcasts.push(ServerEvent::PlayerDeath {
                session_id: session.session_id,
                player_id: notice.player_id,
                reason: notice.reason,
                role_revealed: notice.role_revealed,
            });
        }

        tracing::info!(
            session_id = %session.session_id,
            hunter = %actor.player_id,
            target = %target_id,
            "Hunter fired their revenge shot"
        );
        Ok(FollowUp::HunterResolved {
            last_lynched: session.state.last_lynched_player,
        })
    }

    async fn handle_vote_lynch(
        &self,
        session: &mut GameSession,
        actor: &GamePlayer,
        req: &ActionRequest,
        broadcasts: &mut Vec<ServerEvent>,
    ) -> EngineResult<FollowUp> {
        Self::ensure_alive(actor)?;
        if session.current_phase != GamePhase::DayVoting {
            return Err(EngineError::InvalidPhase {
                phase: session.current_phase,
            });
        }

        // While a tiebreak is pending, only the Mayor's deciding ballot is
        // accepted.
        if let Some(candidates) = session.state.pending_mayor_tiebreak.clone() {
            if actor.role != Role::Mayor {
                return Err(EngineError::InvalidPhase {
                    phase: session.current_phase,
                });
            }
            let target_id = Self::required_target(req)?;
            if !candidates.contains(&target_id) {
                return Err(EngineError::TargetInvalid(
                    "the tiebreak must pick one of the tied candidates".to_string(),
                ));
            }
            self.living_target(&session.session_id, &target_id).await?;
            self.record_action(session, actor, ActionType::VoteLynch, Some(target_id), serde_json::Value::Null)
                .await?;
            broadcasts.push(ServerEvent::PlayerVoted {
                session_id: session.session_id,
                voter_id: actor.player_id,
                target_id,
                vote_type: VoteKind::Lynch,
            });
            return Ok(FollowUp::MayorDecision {
                phase_number: session.phase_number,
                target: target_id,
            });
        }

        let target_id = Self::required_target(req)?;
        self.living_target(&session.session_id, &target_id).await?;

        // Changeable until phase end: the UPSERT replaces any prior ballot
        // by this voter.
        self.record_action(session, actor, ActionType::VoteLynch, Some(target_id), serde_json::Value::Null)
            .await?;

        let actions = self
            .store
            .list_actions(&session.session_id, session.phase_number)
            .await
            .context("list actions for tally")?;
        session.state.lynch_votes = night::vote_counts(&actions, ActionType::VoteLynch);

        broadcasts.push(ServerEvent::PlayerVoted {
            session_id: session.session_id,
            voter_id: actor.player_id,
            target_id,
            vote_type: VoteKind::Lynch,
        });

        // Early close once every living player has a ballot in.
        let players = self
            .store
            .list_players(&session.session_id)
            .await
            .context("list players")?;
        let all_voted = players.iter().filter(|p| p.is_alive).all(|p| {
            actions.iter().any(|a| {
                a.action_type == ActionType::VoteLynch && a.player_id == p.player_id
            })
        });
        if all_voted {
            Ok(FollowUp::VotingComplete {
                phase_number: session.phase_number,
            })
        } else {
            Ok(FollowUp::None)
        }
    }

    async fn handle_mayor_reveal(
        &self,
        session: &mut GameSession,
        actor: &GamePlayer,
        broadcasts: &mut Vec<ServerEvent>,
    ) -> EngineResult<FollowUp> {
        Self::ensure_role(actor, ActionType::MayorReveal)?;
        Self::ensure_alive(actor)?;
        if !matches!(
            session.current_phase,
            GamePhase::DayDiscussion | GamePhase::DayVoting
        ) {
            return Err(EngineError::InvalidPhase {
                phase: session.current_phase,
            });
        }
        if session.state.revealed_roles.contains_key(&actor.player_id) {
            return Err(EngineError::AlreadyActed);
        }

        self.record_action(session, actor, ActionType::MayorReveal, None, serde_json::Value::Null)
            .await?;
        session
            .state
            .revealed_roles
            .insert(actor.player_id, Role::Mayor);

        self.store
            .append_event(GameEvent::new(
                session.session_id,
                session.phase_number,
                EventType::RoleReveal,
                serde_json::json!({
                    "player_id": actor.player_id,
                    "role": Role::Mayor,
                }),
                true,
            ))
            .await
            .context("append mayor reveal event")?;

        broadcasts.push(ServerEvent::RoleAnnounced {
            session_id: session.session_id,
            player_id: actor.player_id,
            role: Role::Mayor,
        });
        Ok(FollowUp::None)
    }
}
