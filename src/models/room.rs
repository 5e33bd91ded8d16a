use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Operational status of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "room_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Free,
    Occupied,
    Blocked,
    Maintenance,
}

impl RoomStatus {
    /// Returns true if a guest can be checked into the room.
    pub fn accepts_check_in(&self) -> bool {
        matches!(self, RoomStatus::Free)
    }
}

/// A physical room. Status is mutated only by the lifecycle manager as a
/// side effect of check-in, check-out and no-show.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Room {
    pub id: Uuid,
    pub number: String,
    pub room_type: String,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn new(number: impl Into<String>, room_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            number: number.into(),
            room_type: room_type.into(),
            status: RoomStatus::Free,
            created_at: now,
            updated_at: now,
        }
    }
}
