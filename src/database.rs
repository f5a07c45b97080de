// src/database.rs

use crate::{error::AppError, models::RoomId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{
    FromRow,
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};
use std::str::FromStr;
use tracing::info;

/// Metadata persisted for every created room. `id` is the store's own key;
/// `room_id` is the live room it was created for.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RoomRecord {
    pub id: i64,
    pub room_id: String,
    pub file_name: String,
    pub file_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct RoomStore {
    pool: SqlitePool,
}

impl RoomStore {
    /// Opens (creating if needed) the database at `url` and ensures the
    /// schema exists.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // An in-memory database lives and dies with its connection.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "room store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), AppError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS room (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_hash TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS room_room_id ON room (room_id)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records a newly created room and returns the stored row.
    pub async fn create_room(
        &self,
        room_id: RoomId,
        file_name: &str,
        file_hash: &str,
    ) -> Result<RoomRecord, AppError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO room (room_id, file_name, file_hash, created_at, updated_at)
             VALUES (?, ?, ?, ?, NULL)",
        )
        .bind(room_id.to_string())
        .bind(file_name)
        .bind(file_hash)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let record = sqlx::query_as::<_, RoomRecord>("SELECT * FROM room WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(record)
    }

    pub async fn get_room_by_id(&self, id: i64) -> Result<RoomRecord, AppError> {
        sqlx::query_as::<_, RoomRecord>("SELECT * FROM room WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Room record {id} not found")))
    }

    /// Latest record created for a live room id.
    pub async fn get_room_by_room_id(&self, room_id: RoomId) -> Result<RoomRecord, AppError> {
        sqlx::query_as::<_, RoomRecord>(
            "SELECT * FROM room WHERE room_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(room_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Room record not found".to_string()))
    }

    pub async fn count(&self) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM room")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
