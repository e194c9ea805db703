//! Event fan-out to connected clients.
//!
//! The core publishes [`ServerEvent`]s through the [`EventSink`] trait; the
//! transport adapter implements delivery. Messages are Arc-wrapped so a room
//! broadcast clones a pointer per recipient, not the payload. Delivery is
//! best-effort: failures are logged by callers and never roll back game
//! state.

use async_trait::async_trait;
use dashmap::DashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::{RoomId, ServerEvent, UserId};

/// Room sizes the fan-out path optimizes for; membership lists up to this
/// length stay on the stack.
pub const TYPICAL_ROOM_SIZE: usize = 8;

/// List of user ids optimized for typical room sizes.
pub type UserIdList = SmallVec<[UserId; TYPICAL_ROOM_SIZE]>;

/// Outbound event delivery interface.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver to a single user, wherever they are connected.
    async fn send_to_user(&self, user_id: &UserId, event: Arc<ServerEvent>) -> anyhow::Result<()>;

    /// Deliver to every user subscribed to a room.
    async fn broadcast_room(&self, room_id: &RoomId, event: Arc<ServerEvent>)
        -> anyhow::Result<()>;
}

/// Sink that drops every event. Useful for tools that replay state without
/// an audience.
#[derive(Debug, Default)]
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn send_to_user(&self, _user_id: &UserId, _event: Arc<ServerEvent>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn broadcast_room(
        &self,
        _room_id: &RoomId,
        _event: Arc<ServerEvent>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// In-process sink backed by per-user unbounded channels. Serves tests and
/// single-process deployments; the production adapter replaces it with the
/// real socket fan-out.
#[derive(Default)]
pub struct ChannelEventSink {
    subscribers: DashMap<UserId, mpsc::UnboundedSender<Arc<ServerEvent>>>,
    rooms: DashMap<RoomId, UserIdList>,
}

impl ChannelEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user and hand back their event stream. Re-registering
    /// replaces the previous stream.
    pub fn register_user(&self, user_id: UserId) -> mpsc::UnboundedReceiver<Arc<ServerEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(user_id, tx);
        rx
    }

    pub fn unregister_user(&self, user_id: &UserId) {
        self.subscribers.remove(user_id);
        self.rooms.iter_mut().for_each(|mut entry| {
            entry.value_mut().retain(|u| u != user_id);
        });
    }

    /// Subscribe a user to a room's broadcasts.
    pub fn join_room(&self, room_id: RoomId, user_id: UserId) {
        let mut members = self.rooms.entry(room_id).or_default();
        if !members.contains(&user_id) {
            members.push(user_id);
        }
    }

    pub fn leave_room(&self, room_id: &RoomId, user_id: &UserId) {
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            members.retain(|u| u != user_id);
        }
    }

    pub fn room_member_count(&self, room_id: &RoomId) -> usize {
        self.rooms.get(room_id).map(|m| m.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn send_to_user(&self, user_id: &UserId, event: Arc<ServerEvent>) -> anyhow::Result<()> {
        match self.subscribers.get(user_id) {
            Some(tx) => {
                if tx.send(event).is_err() {
                    drop(tx);
                    // Receiver dropped; forget the dead subscription.
                    self.subscribers.remove(user_id);
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn broadcast_room(
        &self,
        room_id: &RoomId,
        event: Arc<ServerEvent>,
    ) -> anyhow::Result<()> {
        // Snapshot membership before sending so the DashMap guard is not
        // held while touching the subscriber map.
        let members: UserIdList = match self.rooms.get(room_id) {
            Some(members) => members.clone(),
            None => return Ok(()),
        };
        for user_id in members {
            self.send_to_user(&user_id, Arc::clone(&event)).await?;
        }
        Ok(())
    }
}
