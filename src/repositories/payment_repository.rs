use crate::error::{AppError, Result};
use crate::models::{Payment, PaymentMethod, PaymentStatus};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for payment records. Creation is idempotent on the unique
/// idempotency key; status moves go through `update_status` only.
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a payment, or returns the existing row when the idempotency
    /// key is already taken. The boolean is true when this call inserted.
    pub async fn insert_idempotent(&self, payment: &Payment) -> Result<(Payment, bool)> {
        // The no-op DO UPDATE makes the conflicting row visible to RETURNING.
        let row = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (id, reservation_id, amount, method, status, idempotency_key, gateway_ref, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (idempotency_key) DO UPDATE SET idempotency_key = payments.idempotency_key
            RETURNING id, reservation_id, amount, method, status, idempotency_key, gateway_ref, created_at, updated_at
            "#,
        )
        .bind(payment.id)
        .bind(payment.reservation_id)
        .bind(payment.amount)
        .bind(payment.method)
        .bind(payment.status)
        .bind(&payment.idempotency_key)
        .bind(&payment.gateway_ref)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        let inserted = row.id == payment.id;
        Ok((row, inserted))
    }

    /// Finds a payment by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, reservation_id, amount, method, status, idempotency_key, gateway_ref, created_at, updated_at
            FROM payments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds a payment by its idempotency key.
    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, reservation_id, amount, method, status, idempotency_key, gateway_ref, created_at, updated_at
            FROM payments
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds a non-denied payment with the same reservation, amount and
    /// method created within the last `window_secs` seconds. Catches
    /// client-side retries that regenerated the idempotency key.
    pub async fn find_recent_duplicate(
        &self,
        reservation_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
        window_secs: i64,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, reservation_id, amount, method, status, idempotency_key, gateway_ref, created_at, updated_at
            FROM payments
            WHERE reservation_id = $1
              AND amount = $2
              AND method = $3
              AND status != 'DENIED'
              AND created_at > NOW() - make_interval(secs => $4)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(reservation_id)
        .bind(amount)
        .bind(method)
        .bind(window_secs as f64)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Lists all payments for a reservation.
    pub async fn list_by_reservation(&self, reservation_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, reservation_id, amount, method, status, idempotency_key, gateway_ref, created_at, updated_at
            FROM payments
            WHERE reservation_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(reservation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Moves a payment to a new status, guarded by the current status so a
    /// concurrent writer cannot race the same move. Returns None when the
    /// payment is missing or no longer in `from`.
    pub async fn update_status(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        gateway_ref: Option<&str>,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = $3, gateway_ref = COALESCE($4, gateway_ref), updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING id, reservation_id, amount, method, status, idempotency_key, gateway_ref, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(gateway_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Sweeps unsettled payments older than `max_age_hours` to DENIED.
    /// PROCESSING rows age out too, in case a charger died mid-claim.
    /// Returns the affected payments so the caller can audit each one.
    pub async fn expire_stale_pending(&self, max_age_hours: i64) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'DENIED', updated_at = NOW()
            WHERE status IN ('PENDING', 'PROCESSING')
              AND created_at < NOW() - make_interval(hours => $1)
            RETURNING id, reservation_id, amount, method, status, idempotency_key, gateway_ref, created_at, updated_at
            "#,
        )
        .bind(max_age_hours as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Counts denied payments across a client's reservations. Fraud signal.
    pub async fn count_denied_for_client(&self, client_id: Uuid) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM payments p
            JOIN reservations r ON r.id = p.reservation_id
            WHERE r.client_id = $1 AND p.status = 'DENIED'
            "#,
        )
        .bind(client_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }
}
