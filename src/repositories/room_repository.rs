use crate::error::{AppError, Result};
use crate::models::{Room, RoomStatus};
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for room reads and creation. Operational status writes
/// happen only inside lifecycle-manager transactions.
pub struct RoomRepository {
    pool: PgPool,
}

impl RoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a new room.
    pub async fn create(&self, room: &Room) -> Result<Room> {
        let row = sqlx::query_as::<_, Room>(
            r#"
            INSERT INTO rooms (id, number, room_type, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, number, room_type, status, created_at, updated_at
            "#,
        )
        .bind(room.id)
        .bind(&room.number)
        .bind(&room.room_type)
        .bind(room.status)
        .bind(room.created_at)
        .bind(room.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds a room by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Room>> {
        let row = sqlx::query_as::<_, Room>(
            r#"
            SELECT id, number, room_type, status, created_at, updated_at
            FROM rooms
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Updates a room's operational status outside the lifecycle
    /// (maintenance/blocked flips by staff).
    pub async fn update_status(&self, id: Uuid, status: RoomStatus) -> Result<Option<Room>> {
        let row = sqlx::query_as::<_, Room>(
            r#"
            UPDATE rooms
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, number, room_type, status, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
