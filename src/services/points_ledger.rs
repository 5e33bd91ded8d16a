use crate::error::{AppError, Result};
use crate::models::{PointsAccount, PointsOrigin, PointsTransaction};
use crate::observability::{audit::AuditEvent, metrics};
use crate::repositories::PointsRepository;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Atomic read-modify-write over loyalty balances. Every mutation locks
/// the account row, writes the new balance, and appends a ledger
/// transaction with before/after snapshots inside one database
/// transaction. The stored balance and the sum of ledger deltas can
/// never diverge.
pub struct PointsLedger {
    pool: PgPool,
    accounts: PointsRepository,
}

impl PointsLedger {
    pub fn new(pool: PgPool) -> Self {
        let accounts = PointsRepository::new(pool.clone());
        Self { pool, accounts }
    }

    pub fn accounts(&self) -> &PointsRepository {
        &self.accounts
    }

    /// Credits points to a client's account, creating the account on
    /// first touch.
    pub async fn credit(
        &self,
        client_id: Uuid,
        amount: i64,
        origin: PointsOrigin,
        reservation_id: Option<Uuid>,
    ) -> Result<PointsTransaction> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "credit amount must be positive".to_string(),
            ));
        }

        let account = self.accounts.get_or_create(client_id).await?;
        let started = std::time::Instant::now();

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let entry = apply_delta(&mut tx, account.id, amount, origin, reservation_id).await?;
        tx.commit().await.map_err(AppError::Database)?;

        metrics::record_ledger_write_latency(started.elapsed().as_secs_f64() * 1000.0);
        AuditEvent::PointsCredited {
            account_id: entry.account_id,
            delta: entry.delta,
            balance_after: entry.balance_after,
            reservation_id,
        }
        .record();

        tracing::info!(
            client_id = %client_id,
            delta = amount,
            balance_after = entry.balance_after,
            "Points credited"
        );

        Ok(entry)
    }

    /// Debits points from a client's account. Fails with
    /// InsufficientBalance when the locked balance cannot cover the
    /// debit; the balance check and the write happen under the same
    /// row lock.
    pub async fn debit(
        &self,
        client_id: Uuid,
        amount: i64,
        origin: PointsOrigin,
        reservation_id: Option<Uuid>,
    ) -> Result<PointsTransaction> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "debit amount must be positive".to_string(),
            ));
        }

        let account = self.accounts.get_or_create(client_id).await?;
        let started = std::time::Instant::now();

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let entry = apply_delta(&mut tx, account.id, -amount, origin, reservation_id).await?;
        tx.commit().await.map_err(AppError::Database)?;

        metrics::record_ledger_write_latency(started.elapsed().as_secs_f64() * 1000.0);
        AuditEvent::PointsDebited {
            account_id: entry.account_id,
            delta: entry.delta,
            balance_after: entry.balance_after,
        }
        .record();

        tracing::info!(
            client_id = %client_id,
            delta = -amount,
            balance_after = entry.balance_after,
            "Points debited"
        );

        Ok(entry)
    }

    /// Current balance for a client; zero for clients with no account yet.
    pub async fn balance(&self, client_id: Uuid) -> Result<i64> {
        Ok(self
            .accounts
            .find_by_client(client_id)
            .await?
            .map(|a| a.balance)
            .unwrap_or(0))
    }

    /// Verifies that the stored balance equals the sum of ledger deltas.
    pub async fn verify_consistency(&self, client_id: Uuid) -> Result<bool> {
        let account = match self.accounts.find_by_client(client_id).await? {
            Some(account) => account,
            None => return Ok(true),
        };
        let ledger_sum = self.accounts.sum_deltas(account.id).await?;
        Ok(account.balance == ledger_sum)
    }
}

/// Locks the account row, validates the resulting balance, writes it and
/// appends the ledger entry. Runs inside the caller's transaction so a
/// caller can combine the ledger write with its own state changes (the
/// checkout credit and redemption paths do).
pub async fn apply_delta(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    delta: i64,
    origin: PointsOrigin,
    reservation_id: Option<Uuid>,
) -> Result<PointsTransaction> {
    let account = lock_account(tx, account_id).await?;

    let new_balance = account.balance + delta;
    if new_balance < 0 {
        metrics::record_guard_rejection("insufficient_balance");
        return Err(AppError::InsufficientBalance {
            requested: -delta,
            available: account.balance,
        });
    }

    sqlx::query(
        r#"
        UPDATE points_accounts
        SET balance = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .bind(new_balance)
    .execute(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    let entry = PointsTransaction::new(account_id, delta, origin, account.balance, reservation_id);
    insert_entry(tx, &entry).await?;

    Ok(entry)
}

/// Credits the checkout reward for a reservation exactly once. Returns
/// None when a credit for this reservation already exists; the ledger row
/// keyed by (reservation id, CHECKOUT_REWARD) is the idempotency guard.
pub async fn credit_checkout(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    reservation_id: Uuid,
    amount: i64,
) -> Result<Option<PointsTransaction>> {
    if amount <= 0 {
        return Ok(None);
    }

    let existing = sqlx::query_as::<_, PointsTransaction>(
        r#"
        SELECT id, account_id, delta, origin, balance_before, balance_after, reservation_id, created_at
        FROM points_transactions
        WHERE reservation_id = $1 AND origin = 'CHECKOUT_REWARD' AND delta > 0
        "#,
    )
    .bind(reservation_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    if existing.is_some() {
        tracing::debug!(
            reservation_id = %reservation_id,
            "Checkout credit already recorded, skipping"
        );
        return Ok(None);
    }

    let entry = apply_delta(
        tx,
        account_id,
        amount,
        PointsOrigin::CheckoutReward,
        Some(reservation_id),
    )
    .await?;

    Ok(Some(entry))
}

async fn lock_account(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
) -> Result<PointsAccount> {
    let account = sqlx::query_as::<_, PointsAccount>(
        r#"
        SELECT id, client_id, balance, created_at, updated_at
        FROM points_accounts
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(account_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    account.ok_or_else(|| AppError::NotFound(format!("points account {} not found", account_id)))
}

async fn insert_entry(tx: &mut Transaction<'_, Postgres>, entry: &PointsTransaction) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO points_transactions
            (id, account_id, delta, origin, balance_before, balance_after, reservation_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(entry.id)
    .bind(entry.account_id)
    .bind(entry.delta)
    .bind(entry.origin)
    .bind(entry.balance_before)
    .bind(entry.balance_after)
    .bind(entry.reservation_id)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    Ok(())
}
