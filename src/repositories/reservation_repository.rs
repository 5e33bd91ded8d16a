use crate::error::{AppError, Result};
use crate::models::Reservation;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for reservation reads and inserts. Status writes happen only
/// inside lifecycle-manager transactions.
pub struct ReservationRepository {
    pool: PgPool,
}

impl ReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds a reservation by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Reservation>> {
        let row = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT id, room_id, client_id, status, financial_status, policy, planned_check_in, planned_check_out, actual_check_in, actual_check_out, daily_rate, nights, review_hold_until, created_at, updated_at
            FROM reservations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds reservations with occupying status (CONFIRMED, CHECKED_IN)
    /// whose planned stay overlaps [start, end) on the given room.
    /// Intervals conflict iff start1 < end2 AND end1 > start2.
    pub async fn find_conflicts(
        &self,
        room_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_reservation_id: Option<Uuid>,
    ) -> Result<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT id, room_id, client_id, status, financial_status, policy, planned_check_in, planned_check_out, actual_check_in, actual_check_out, daily_rate, nights, review_hold_until, created_at, updated_at
            FROM reservations
            WHERE room_id = $1
              AND status IN ('CONFIRMED', 'CHECKED_IN')
              AND planned_check_in < $3
              AND planned_check_out > $2
              AND ($4::uuid IS NULL OR id != $4)
            ORDER BY planned_check_in
            "#,
        )
        .bind(room_id)
        .bind(start)
        .bind(end)
        .bind(exclude_reservation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Lists reservations for a client, most recent first.
    pub async fn list_by_client(&self, client_id: Uuid, limit: i64) -> Result<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT id, room_id, client_id, status, financial_status, policy, planned_check_in, planned_check_out, actual_check_in, actual_check_out, daily_rate, nights, review_hold_until, created_at, updated_at
            FROM reservations
            WHERE client_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(client_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
