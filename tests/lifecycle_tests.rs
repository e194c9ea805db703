//! Room lifecycle behavior through the engine surface, plus the real
//! timer-driven phase loop.


use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;

use moonhowl_server::broadcast::{ChannelEventSink, EventSink, NullEventSink};
use moonhowl_server::config::{Config, LifecycleConfig};
use moonhowl_server::engine::GameEngine;
use moonhowl_server::error::EngineError;
use moonhowl_server::lifecycle::RoomLifecycle;
use moonhowl_server::protocol::{GamePhase, Role, RoomStatus};
use moonhowl_server::store::{GameStore, MemoryStore};
use test_helpers::test_rules;
use uuid::Uuid;

fn build_engine(store: &Arc<MemoryStore>) -> Arc<GameEngine> {
    GameEngine::new(
        Arc::clone(store) as Arc<dyn GameStore>,
        Arc::new(NullEventSink),
        Config::default(),
    )
}

fn cleaner(store: &Arc<MemoryStore>) -> RoomLifecycle {
    RoomLifecycle::new(
        Arc::clone(store) as Arc<dyn GameStore>,
        Arc::new(NullEventSink),
        LifecycleConfig::default(),
    )
}

#[tokio::test]
async fn host_extension_clears_the_warning_and_resets_the_clock() {
    let store = Arc::new(MemoryStore::new());
    let engine = build_engine(&store);
    let host = Uuid::new_v4();
    let room = engine
        .create_room(host, 8, None)
        .await
        .expect("room creation should succeed");

    // Idle long enough to draw a warning.
    let mut stale = store.get_room(&room.room_id).await.unwrap().unwrap();
    stale.last_activity_at = Utc::now() - ChronoDuration::seconds(1000);
    store.update_room(stale).await.expect("backdate should persist");

    let cleanup = cleaner(&store);
    let outcome = cleanup.run_once().await.expect("pass should run");
    assert_eq!(outcome.rooms_warned, 1);
    assert!(store
        .get_room(&room.room_id)
        .await
        .unwrap()
        .unwrap()
        .timeout_warning_sent);

    // Only the host may extend.
    let stranger = Uuid::new_v4();
    let err = engine
        .extend_room_timeout(&room.room_id, &stranger)
        .await
        .expect_err("non-hosts cannot extend");
    assert!(matches!(err, EngineError::NotHost));

    let extended = engine
        .extend_room_timeout(&room.room_id, &host)
        .await
        .expect("host extension should succeed");
    assert!(!extended.timeout_warning_sent);

    // With the clock reset, the cleaner leaves the room alone again.
    let outcome = cleanup.run_once().await.expect("pass should run");
    assert_eq!(outcome.rooms_warned, 0);
    assert_eq!(outcome.rooms_abandoned, 0);
    assert_eq!(
        store.get_room(&room.room_id).await.unwrap().unwrap().status,
        RoomStatus::Waiting
    );
}

#[tokio::test]
async fn joins_and_ready_toggles_count_as_activity() {
    let store = Arc::new(MemoryStore::new());
    let engine = build_engine(&store);
    let host = Uuid::new_v4();
    let room = engine
        .create_room(host, 8, None)
        .await
        .expect("room creation should succeed");

    let mut stale = store.get_room(&room.room_id).await.unwrap().unwrap();
    stale.last_activity_at = Utc::now() - ChronoDuration::seconds(1100);
    store.update_room(stale).await.expect("backdate should persist");

    // A join refreshes the activity clock before the cleaner looks.
    let guest = Uuid::new_v4();
    engine
        .join_room(&room.room_id, guest)
        .await
        .expect("join should succeed");

    let outcome = cleaner(&store).run_once().await.expect("pass should run");
    assert_eq!(outcome.rooms_abandoned, 0);

    let refreshed = store.get_room(&room.room_id).await.unwrap().unwrap();
    assert!(Utc::now() - refreshed.last_activity_at < ChronoDuration::seconds(10));

    // Ready toggles refresh it too.
    let before = refreshed.last_activity_at;
    engine
        .set_ready(&room.room_id, &guest, true)
        .await
        .expect("ready toggle should succeed");
    let after = store.get_room(&room.room_id).await.unwrap().unwrap();
    assert!(after.last_activity_at >= before);
}

#[tokio::test(start_paused = true)]
async fn timers_drive_the_phase_machine_without_any_client_input() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(ChannelEventSink::new());
    let engine = GameEngine::new(
        Arc::clone(&store) as Arc<dyn GameStore>,
        Arc::clone(&sink) as Arc<dyn EventSink>,
        Config::default(),
    );

    let host = Uuid::new_v4();
    let room = engine
        .create_room(host, 6, Some(test_rules(2, vec![Role::Seer])))
        .await
        .expect("room creation should succeed");
    engine
        .set_ready(&room.room_id, &host, true)
        .await
        .expect("ready toggle should succeed");
    for _ in 0..5 {
        let user = Uuid::new_v4();
        engine
            .join_room(&room.room_id, user)
            .await
            .expect("join should succeed");
        engine
            .set_ready(&room.room_id, &user, true)
            .await
            .expect("ready toggle should succeed");
    }
    let session = engine
        .start_game(&room.room_id)
        .await
        .expect("start should succeed");

    // Nobody submits anything: the scheduler alone must walk the machine
    // out of night 0 and through the first day.
    let mut reached_voting = false;
    for _ in 0..200 {
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        let current = store
            .get_session(&session.session_id)
            .await
            .expect("session lookup should not error")
            .expect("session should exist");
        if current.current_phase == GamePhase::DayVoting {
            reached_voting = true;
            break;
        }
    }
    assert!(
        reached_voting,
        "timer expiry should advance night_0 through discussion into voting"
    );

    let current = store
        .get_session(&session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.day_number, 1);
    assert!(current.phase_number >= 3);
}
