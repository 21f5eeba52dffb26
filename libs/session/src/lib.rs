//! Conversation sessions for helpdesk chat rooms.
//!
//! A [`Room`] is the persisted aggregate (handoff marker, history, channels). A
//! [`BotSession`] wraps one room together with the collaborators the bot needs to act on it
//! and is the only place that mutates the room.

mod conversation;
mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;
mod room;
mod schedule;

use std::{env, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use hdesk_bus::TransportError;
use hdesk_core::{BlockNotFoundError, HistoryPage, Timetoken, UnconfirmedEnvelopeError};
use thiserror::Error;
#[cfg(not(feature = "redis-store"))]
use tracing::warn;

pub use conversation::{BotSession, SessionConfig, SessionDeps};
pub use memory::MemoryRoomStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisRoomStore;
pub use room::{BotState, HandoffCounts, Room, RoomAttributes};
pub use schedule::{BotTimings, ScheduledSend, SendPlan};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    BlockNotFound(#[from] BlockNotFoundError),
    /// The `stoppedFAQs` event could not be published; the room still serves FAQs.
    #[error("handoff failed")]
    Handoff(#[source] TransportError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Unconfirmed(#[from] UnconfirmedEnvelopeError),
    #[error("room store failure")]
    Store(#[source] anyhow::Error),
}

impl SessionError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::BlockNotFound(_) => "block_not_found",
            SessionError::Handoff(_) => "handoff",
            SessionError::Transport(_) => "transport",
            SessionError::Unconfirmed(_) => "unconfirmed",
            SessionError::Store(_) => "store",
        }
    }
}

/// Shared room store handle used across rooms.
pub type SharedRoomStore = Arc<dyn RoomStore>;

/// Append-only, time-ordered room persistence keyed by room id.
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn load(&self, room_id: &str) -> Result<Option<Room>>;
    async fn save(&self, room: &Room) -> Result<()>;
    async fn delete(&self, room_id: &str) -> Result<()>;

    /// Newest `limit` messages strictly before `before`, oldest first.
    async fn history_page(
        &self,
        room_id: &str,
        before: Option<Timetoken>,
        limit: usize,
    ) -> Result<HistoryPage> {
        Ok(match self.load(room_id).await? {
            Some(room) => room.history().page(before, limit),
            None => HistoryPage {
                messages: Vec::new(),
                next_before: None,
            },
        })
    }
}

/// Returns an in-memory room store wrapped in an [`Arc`].
pub fn shared_memory_store() -> SharedRoomStore {
    Arc::new(MemoryRoomStore::new())
}

/// Builds a room store from environment variables.
///
/// If `ROOM_REDIS_URL` is present and the `redis-store` feature is enabled, a Redis-backed
/// store is created. Otherwise, the function falls back to the in-memory implementation.
pub async fn store_from_env() -> Result<SharedRoomStore> {
    match env::var("ROOM_REDIS_URL") {
        Ok(url) => {
            let namespace = env::var("ROOM_NAMESPACE").unwrap_or_else(|_| "hdesk".into());
            build_redis_store(&url, &namespace).await
        }
        Err(_) => Ok(shared_memory_store()),
    }
}

#[cfg(feature = "redis-store")]
async fn build_redis_store(url: &str, namespace: &str) -> Result<SharedRoomStore> {
    let store = RedisRoomStore::connect(url, namespace).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis-store"))]
async fn build_redis_store(_url: &str, _namespace: &str) -> Result<SharedRoomStore> {
    warn!("redis-store feature disabled; using in-memory room store");
    Ok(shared_memory_store())
}
