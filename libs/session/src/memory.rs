use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Room, RoomStore};

#[derive(Default)]
pub struct MemoryRoomStore {
    rooms: DashMap<String, Room>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn load(&self, room_id: &str) -> Result<Option<Room>> {
        Ok(self.rooms.get(room_id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, room: &Room) -> Result<()> {
        self.rooms.insert(room.id.clone(), room.clone());
        Ok(())
    }

    async fn delete(&self, room_id: &str) -> Result<()> {
        self.rooms.remove(room_id);
        Ok(())
    }
}
