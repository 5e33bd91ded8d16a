use crate::error::{AppError, Result};
use crate::models::{PointsAccount, PointsTransaction};
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for points account and transaction reads. All balance
/// mutations go through the points ledger service, which holds a row lock
/// on the account for the duration of the read-modify-write.
pub struct PointsRepository {
    pool: PgPool,
}

impl PointsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds the points account for a client.
    pub async fn find_by_client(&self, client_id: Uuid) -> Result<Option<PointsAccount>> {
        let row = sqlx::query_as::<_, PointsAccount>(
            r#"
            SELECT id, client_id, balance, created_at, updated_at
            FROM points_accounts
            WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Gets or creates the points account for a client. Concurrent callers
    /// converge on the same row through the unique client_id constraint.
    pub async fn get_or_create(&self, client_id: Uuid) -> Result<PointsAccount> {
        let account = PointsAccount::new(client_id);
        let row = sqlx::query_as::<_, PointsAccount>(
            r#"
            INSERT INTO points_accounts (id, client_id, balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (client_id) DO UPDATE SET client_id = points_accounts.client_id
            RETURNING id, client_id, balance, created_at, updated_at
            "#,
        )
        .bind(account.id)
        .bind(account.client_id)
        .bind(account.balance)
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Lists ledger transactions for an account, most recent first.
    pub async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PointsTransaction>> {
        let rows = sqlx::query_as::<_, PointsTransaction>(
            r#"
            SELECT id, account_id, delta, origin, balance_before, balance_after, reservation_id, created_at
            FROM points_transactions
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Sum of all deltas for an account. Must always equal the stored
    /// balance; used for reconciliation and the audit property check.
    pub async fn sum_deltas(&self, account_id: Uuid) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(delta), 0)::bigint
            FROM points_transactions
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }
}
