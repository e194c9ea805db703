//! Background room lifecycle cleaner.
//!
//! A periodic pass over all rooms, in order: warn waiting rooms nearing the
//! inactivity timeout, abandon rooms past it (or past the absolute age
//! cap), purge abandoned and finished rooms past their retention. Rooms
//! with a running game are exempt; room activity is only tracked while
//! waiting.

use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::broadcast::EventSink;
use crate::config::LifecycleConfig;
use crate::protocol::{Room, RoomStatus, ServerEvent};
use crate::store::GameStore;

/// Summary of one cleaner pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub rooms_warned: usize,
    pub rooms_abandoned: usize,
    pub rooms_purged: usize,
}

impl CleanupOutcome {
    pub fn is_empty(&self) -> bool {
        self.rooms_warned == 0 && self.rooms_abandoned == 0 && self.rooms_purged == 0
    }
}

pub struct RoomLifecycle {
    store: Arc<dyn GameStore>,
    events: Arc<dyn EventSink>,
    config: LifecycleConfig,
}

impl RoomLifecycle {
    pub fn new(
        store: Arc<dyn GameStore>,
        events: Arc<dyn EventSink>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            events,
            config,
        }
    }

    /// Run the cleaner until the token fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.cleanup_interval_duration());
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    _ = interval.tick() => {}
                }
                match self.run_once().await {
                    Ok(outcome) if !outcome.is_empty() => {
                        tracing::info!(
                            warned = outcome.rooms_warned,
                            abandoned = outcome.rooms_abandoned,
                            purged = outcome.rooms_purged,
                            "Room cleanup pass"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Room cleanup pass failed: {e}");
                    }
                }
            }
        })
    }

    /// One cleanup pass. Split out for tests and manual triggering.
    pub async fn run_once(&self) -> anyhow::Result<CleanupOutcome> {
        let mut outcome = CleanupOutcome::default();
        let now = Utc::now();
        let rooms = self.store.list_rooms().await?;

        for room in rooms {
            match room.status {
                // A running game keeps its room alive indefinitely.
                RoomStatus::Playing => {}
                RoomStatus::Waiting => {
                    self.sweep_waiting_room(room, now, &mut outcome).await?;
                }
                RoomStatus::Abandoned => {
                    let anchor = room.finished_at.unwrap_or(room.created_at);
                    if now - anchor >= self.config.abandoned_retention_threshold() {
                        self.purge(&room, &mut outcome).await?;
                    }
                }
                RoomStatus::Finished => {
                    let anchor = room.finished_at.unwrap_or(room.created_at);
                    if now - anchor >= self.config.finished_retention_threshold() {
                        self.purge(&room, &mut outcome).await?;
                    }
                }
            }
        }
        Ok(outcome)
    }

    async fn sweep_waiting_room(
        &self,
        mut room: Room,
        now: chrono::DateTime<Utc>,
        outcome: &mut CleanupOutcome,
    ) -> anyhow::Result<()> {
        let idle = now - room.last_activity_at;
        let age = now - room.created_at;

        if idle >= self.config.inactivity_threshold() || age >= self.config.absolute_threshold() {
            let reason = if idle >= self.config.inactivity_threshold() {
                "inactivity timeout"
            } else {
                "absolute timeout"
            };
            room.status = RoomStatus::Abandoned;
            room.finished_at = Some(now);
            let room_id = room.room_id;
            self.store.update_room(room).await?;
            outcome.rooms_abandoned += 1;
            tracing::info!(%room_id, reason, "Room abandoned");
            let _ = self
                .events
                .broadcast_room(
                    &room_id,
                    Arc::new(ServerEvent::RoomClosed {
                        room_id,
                        reason: reason.to_string(),
                    }),
                )
                .await;
            return Ok(());
        }

        if idle >= self.config.warning_threshold() && !room.timeout_warning_sent {
            room.timeout_warning_sent = true;
            let room_id = room.room_id;
            let closes_in = (self.config.inactivity_threshold() - idle)
                .num_seconds()
                .max(0) as u64;
            self.store.update_room(room).await?;
            outcome.rooms_warned += 1;
            tracing::debug!(%room_id, closes_in, "Room inactivity warning");
            let _ = self
                .events
                .broadcast_room(
                    &room_id,
                    Arc::new(ServerEvent::RoomTimeoutWarning {
                        room_id,
                        closes_in_seconds: closes_in,
                    }),
                )
                .await;
        }
        Ok(())
    }

    async fn purge(&self, room: &Room, outcome: &mut CleanupOutcome) -> anyhow::Result<()> {
        if self.store.delete_room(&room.room_id).await? {
            outcome.rooms_purged += 1;
            tracing::debug!(room_id = %room.room_id, "Room purged");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::NullEventSink;
    use crate::config::GameRulesConfig;
    use crate::protocol::RoomPlayer;
    use crate::store::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    fn test_config() -> LifecycleConfig {
        LifecycleConfig {
            cleanup_interval: 120,
            inactivity_timeout: 1200,
            warning_window: 300,
            absolute_timeout: 3600,
            abandoned_retention: 86_400,
            finished_retention: 604_800,
        }
    }

    async fn seeded_room(store: &MemoryStore, status: RoomStatus) -> Room {
        let now = Utc::now();
        let host = Uuid::new_v4();
        let room = Room {
            room_id: Uuid::new_v4(),
            code: crate::protocol::room_codes::generate_room_code(),
            host_user_id: host,
            status,
            max_players: 8,
            config: GameRulesConfig::default(),
            timeout_warning_sent: false,
            created_at: now,
            last_activity_at: now,
            finished_at: None,
        };
        let seat = RoomPlayer {
            room_id: room.room_id,
            user_id: host,
            is_ready: false,
            is_host: true,
            seat_position: 0,
            joined_at: now,
            left_at: None,
        };
        // create_room only accepts waiting rooms implicitly; write the
        // status afterwards for the non-waiting fixtures.
        let mut waiting = room.clone();
        waiting.status = RoomStatus::Waiting;
        store
            .create_room(waiting, seat)
            .await
            .expect("fixture room should be created");
        store
            .update_room(room.clone())
            .await
            .expect("fixture status should persist");
        room
    }

    fn lifecycle(store: &Arc<MemoryStore>) -> RoomLifecycle {
        RoomLifecycle::new(
            Arc::clone(store) as Arc<dyn GameStore>,
            Arc::new(NullEventSink),
            test_config(),
        )
    }

    async fn backdate(
        store: &MemoryStore,
        room: &Room,
        idle_seconds: i64,
        age_seconds: i64,
    ) -> Room {
        let mut room = room.clone();
        room.last_activity_at = Utc::now() - ChronoDuration::seconds(idle_seconds);
        room.created_at = Utc::now() - ChronoDuration::seconds(age_seconds);
        store
            .update_room(room.clone())
            .await
            .expect("backdate should persist");
        room
    }

    #[tokio::test]
    async fn fresh_rooms_are_left_alone() {
        let store = Arc::new(MemoryStore::new());
        let room = seeded_room(&store, RoomStatus::Waiting).await;
        let outcome = lifecycle(&store).run_once().await.expect("pass should run");
        assert!(outcome.is_empty());
        let reloaded = store.get_room(&room.room_id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, RoomStatus::Waiting);
        assert!(!reloaded.timeout_warning_sent);
    }

    #[tokio::test]
    async fn idle_rooms_get_one_warning() {
        let store = Arc::new(MemoryStore::new());
        let room = seeded_room(&store, RoomStatus::Waiting).await;
        backdate(&store, &room, 1000, 1000).await;

        let cleaner = lifecycle(&store);
        let outcome = cleaner.run_once().await.expect("pass should run");
        assert_eq!(outcome.rooms_warned, 1);
        let reloaded = store.get_room(&room.room_id).await.unwrap().unwrap();
        assert!(reloaded.timeout_warning_sent);

        // Second pass does not warn again.
        let outcome = cleaner.run_once().await.expect("pass should run");
        assert_eq!(outcome.rooms_warned, 0);
    }

    #[tokio::test]
    async fn inactivity_abandons_the_room() {
        let store = Arc::new(MemoryStore::new());
        let room = seeded_room(&store, RoomStatus::Waiting).await;
        backdate(&store, &room, 1300, 1300).await;

        let outcome = lifecycle(&store).run_once().await.expect("pass should run");
        assert_eq!(outcome.rooms_abandoned, 1);
        let reloaded = store.get_room(&room.room_id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, RoomStatus::Abandoned);
        assert!(reloaded.finished_at.is_some());
    }

    #[tokio::test]
    async fn old_rooms_abandon_regardless_of_activity() {
        let store = Arc::new(MemoryStore::new());
        let room = seeded_room(&store, RoomStatus::Waiting).await;
        // Active recently, but created over an hour ago.
        backdate(&store, &room, 10, 4000).await;

        let outcome = lifecycle(&store).run_once().await.expect("pass should run");
        assert_eq!(outcome.rooms_abandoned, 1);
    }

    #[tokio::test]
    async fn playing_rooms_are_exempt() {
        let store = Arc::new(MemoryStore::new());
        let room = seeded_room(&store, RoomStatus::Playing).await;
        backdate(&store, &room, 100_000, 100_000).await;
        let outcome = lifecycle(&store).run_once().await.expect("pass should run");
        assert!(outcome.is_empty());
        let reloaded = store.get_room(&room.room_id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, RoomStatus::Playing);
    }

    #[tokio::test]
    async fn stale_abandoned_rooms_are_purged() {
        let store = Arc::new(MemoryStore::new());
        let room = seeded_room(&store, RoomStatus::Abandoned).await;
        let mut stale = room.clone();
        stale.finished_at = Some(Utc::now() - ChronoDuration::seconds(90_000));
        store.update_room(stale).await.expect("backdate should persist");

        let outcome = lifecycle(&store).run_once().await.expect("pass should run");
        assert_eq!(outcome.rooms_purged, 1);
        assert!(store.get_room(&room.room_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finished_rooms_outlive_abandoned_ones() {
        let store = Arc::new(MemoryStore::new());
        let room = seeded_room(&store, RoomStatus::Finished).await;
        let mut finished = room.clone();
        // Two days old: past abandoned retention, inside finished retention.
        finished.finished_at = Some(Utc::now() - ChronoDuration::seconds(172_800));
        store
            .update_room(finished.clone())
            .await
            .expect("backdate should persist");

        let cleaner = lifecycle(&store);
        let outcome = cleaner.run_once().await.expect("pass should run");
        assert_eq!(outcome.rooms_purged, 0);

        // Eight days old: past finished retention.
        finished.finished_at = Some(Utc::now() - ChronoDuration::seconds(691_200));
        store.update_room(finished).await.expect("backdate should persist");
        let outcome = cleaner.run_once().await.expect("pass should run");
        assert_eq!(outcome.rooms_purged, 1);
    }
}
