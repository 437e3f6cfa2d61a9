use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;
use tokio::sync::RwLock;

use crate::error::Result;

/// Membership interface over the externally-owned `room_queue(roomId)`
/// table (spec §6): the assignment protocol only reads it, another
/// subsystem maintains it.
///
/// Grounded on the teacher's own pattern of depending on `Arc<dyn VmManager>`
/// rather than a concrete Firecracker type — C5 depends on this interface,
/// not a concrete table, so tests never need a live Postgres instance.
#[async_trait]
pub trait RoomQueue: Send + Sync {
    async fn is_waiting(&self, room_id: &str) -> Result<bool>;
}

/// `SELECT 1 FROM room_queue WHERE roomId = $1` (spec §4.5 step 3).
pub struct PostgresRoomQueue {
    pool: PgPool,
}

impl PostgresRoomQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomQueue for PostgresRoomQueue {
    async fn is_waiting(&self, room_id: &str) -> Result<bool> {
        let row: Option<i32> = sqlx::query_scalar("select 1 from room_queue where room_id = $1")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

/// An in-memory room queue double for the assignment protocol's tests.
pub struct InMemoryRoomQueue {
    waiting: RwLock<HashSet<String>>,
}

impl InMemoryRoomQueue {
    pub fn new() -> Self {
        Self {
            waiting: RwLock::new(HashSet::new()),
        }
    }

    pub async fn enqueue(&self, room_id: &str) {
        self.waiting.write().await.insert(room_id.to_string());
    }

    pub async fn dequeue(&self, room_id: &str) {
        self.waiting.write().await.remove(room_id);
    }
}

impl Default for InMemoryRoomQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomQueue for InMemoryRoomQueue {
    async fn is_waiting(&self, room_id: &str) -> Result<bool> {
        Ok(self.waiting.read().await.contains(room_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueued_room_is_waiting() {
        let queue = InMemoryRoomQueue::new();
        queue.enqueue("room-a").await;
        assert!(queue.is_waiting("room-a").await.unwrap());
        assert!(!queue.is_waiting("room-b").await.unwrap());
    }

    #[tokio::test]
    async fn dequeued_room_stops_waiting() {
        let queue = InMemoryRoomQueue::new();
        queue.enqueue("room-a").await;
        queue.dequeue("room-a").await;
        assert!(!queue.is_waiting("room-a").await.unwrap());
    }
}
