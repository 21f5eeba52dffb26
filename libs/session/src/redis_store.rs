use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::{Room, RoomStore};

/// Rooms stored as one JSON document per key.
pub struct RedisRoomStore {
    namespace: String,
    connection: Mutex<redis::aio::ConnectionManager>,
}

impl RedisRoomStore {
    pub async fn connect(url: &str, namespace: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            namespace: namespace.into(),
            connection: Mutex::new(manager),
        })
    }

    fn room_key(&self, room_id: &str) -> String {
        format!("{}:room:{}", self.namespace, room_id)
    }
}

#[async_trait]
impl RoomStore for RedisRoomStore {
    async fn load(&self, room_id: &str) -> Result<Option<Room>> {
        let mut conn = self.connection.lock().await;
        let payload: Option<String> = conn.get(self.room_key(room_id)).await?;
        match payload {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, room: &Room) -> Result<()> {
        let payload = serde_json::to_string(room)?;
        let mut conn = self.connection.lock().await;
        conn.set::<_, _, ()>(self.room_key(&room.id), payload).await?;
        Ok(())
    }

    async fn delete(&self, room_id: &str) -> Result<()> {
        let mut conn = self.connection.lock().await;
        conn.del::<_, ()>(self.room_key(room_id)).await?;
        Ok(())
    }
}
