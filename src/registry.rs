// src/registry.rs

//! The id → room map.
//!
//! The registry lock guards only the map itself: create, lookup and
//! removal. Everything that happens inside a room goes through that room's
//! own event loop.

use crate::{
    config::RoomSettings,
    error::AppError,
    models::{GridSnapshot, RoomId},
    room::{Room, RoomTask},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

type IdSource = Arc<dyn Fn() -> RoomId + Send + Sync>;

struct RoomEntry {
    room: Room,
    task: RoomTask,
}

pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, RoomEntry>>,
    settings: RoomSettings,
    id_source: IdSource,
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings) -> Self {
        Self::with_id_source(settings, RoomId::random)
    }

    /// Registry drawing room ids from `id_source` instead of random UUIDs.
    pub fn with_id_source<F>(settings: RoomSettings, id_source: F) -> Self
    where
        F: Fn() -> RoomId + Send + Sync + 'static,
    {
        Self {
            rooms: Mutex::new(HashMap::new()),
            settings,
            id_source: Arc::new(id_source),
        }
    }

    /// Creates a room holding `headers` and `rows` and starts its loop.
    ///
    /// Fails with [`AppError::ResourceExhausted`] if no unused id turns up
    /// within the configured number of attempts.
    pub async fn create_room(
        &self,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<Room, AppError> {
        let mut rooms = self.rooms.lock().await;

        let id = (0..self.settings.max_id_attempts)
            .map(|_| (self.id_source)())
            .find(|candidate| !rooms.contains_key(candidate))
            .ok_or_else(|| {
                warn!(
                    attempts = self.settings.max_id_attempts,
                    "room id generation exhausted"
                );
                AppError::ResourceExhausted("Could not allocate a room id".to_string())
            })?;

        let (room, task) = Room::open(id, GridSnapshot::new(headers, rows), &self.settings);
        rooms.insert(
            id,
            RoomEntry {
                room: room.clone(),
                task,
            },
        );
        info!(room_id = %id, total_rooms = rooms.len(), "room created");
        Ok(room)
    }

    pub async fn get_room(&self, id: RoomId) -> Result<Room, AppError> {
        self.rooms
            .lock()
            .await
            .get(&id)
            .map(|entry| entry.room.clone())
            .ok_or_else(|| AppError::NotFound("Room not found".to_string()))
    }

    /// Unregisters the room and waits for its loop to stop. Every member's
    /// mailbox is closed as part of that.
    pub async fn remove_room(&self, id: RoomId) -> Result<(), AppError> {
        let entry = self
            .rooms
            .lock()
            .await
            .remove(&id)
            .ok_or_else(|| AppError::NotFound("Room not found".to_string()))?;

        entry.task.terminate().await;
        info!(room_id = %id, "room removed");
        Ok(())
    }

    /// Removes and stops every room.
    pub async fn shutdown(&self) {
        let entries: Vec<RoomEntry> = {
            let mut rooms = self.rooms.lock().await;
            rooms.drain().map(|(_, entry)| entry).collect()
        };
        let count = entries.len();
        for entry in entries {
            entry.task.terminate().await;
        }
        info!(count, "all rooms shut down");
    }

    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.lock().await.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn grid() -> (Vec<String>, Vec<Vec<String>>) {
        (
            vec!["a".into(), "b".into()],
            vec![vec!["1".into(), "2".into()]],
        )
    }

    #[tokio::test]
    async fn created_room_can_be_looked_up() {
        let registry = RoomRegistry::new(RoomSettings::default());
        let (headers, rows) = grid();
        let room = registry.create_room(headers, rows).await.unwrap();

        let found = registry.get_room(room.id()).await.unwrap();
        assert_eq!(found.id(), room.id());
        assert_eq!(found.snapshot().headers, vec!["a", "b"]);
        assert!(found.members().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let registry = RoomRegistry::new(RoomSettings::default());
        let err = registry.get_room(RoomId::random()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn removed_room_is_gone_and_stopped() {
        let registry = RoomRegistry::new(RoomSettings::default());
        let (headers, rows) = grid();
        let room = registry.create_room(headers, rows).await.unwrap();
        let (member, mut mailbox) = room.new_member(None);
        room.join(member).await.unwrap();
        room.members().await.unwrap();

        registry.remove_room(room.id()).await.unwrap();

        assert!(matches!(
            registry.get_room(room.id()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(room.is_closed());
        assert_eq!(mailbox.recv().await, None);
        assert!(matches!(
            registry.remove_room(room.id()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_creates_never_share_an_id() {
        let registry = Arc::new(RoomRegistry::new(RoomSettings::default()));
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.create_room(vec![], vec![]).await.unwrap().id()
            }));
        }

        let mut ids = HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap());
        }
        assert_eq!(ids.len(), 32);
        let registered: HashSet<RoomId> = registry.room_ids().await.into_iter().collect();
        assert_eq!(registered, ids);
    }

    #[tokio::test]
    async fn colliding_id_source_exhausts() {
        let fixed = RoomId::from_uuid(Uuid::nil());
        let registry = RoomRegistry::with_id_source(RoomSettings::default(), move || fixed);

        registry.create_room(vec![], vec![]).await.unwrap();
        let err = registry.create_room(vec![], vec![]).await.unwrap_err();
        assert!(matches!(err, AppError::ResourceExhausted(_)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn shutdown_stops_every_room() {
        let registry = RoomRegistry::new(RoomSettings::default());
        let first = registry.create_room(vec![], vec![]).await.unwrap();
        let second = registry.create_room(vec![], vec![]).await.unwrap();

        registry.shutdown().await;

        assert!(registry.is_empty().await);
        assert!(first.is_closed());
        assert!(second.is_closed());
    }
}
