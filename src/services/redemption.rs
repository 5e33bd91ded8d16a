use crate::error::{AppError, Result};
use crate::models::{PointsOrigin, Reward, RewardRedemption};
use crate::notifications::{dispatch_best_effort, NotificationDispatcher, NotificationEvent};
use crate::observability::{audit::AuditEvent, metrics};
use crate::repositories::PointsRepository;
use crate::services::points_ledger;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

/// Result of a committed redemption.
#[derive(Debug, Clone)]
pub struct RedemptionOutcome {
    pub redemption: RewardRedemption,
    pub new_balance: i64,
}

/// Atomic reward redemption: points debit, stock decrement and redemption
/// record land in one transaction or not at all. Lock order within the
/// transaction is reward row first, then points account row; this is the
/// only path that locks both.
pub struct RedemptionService {
    pool: PgPool,
    accounts: PointsRepository,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl RedemptionService {
    pub fn new(pool: PgPool, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        let accounts = PointsRepository::new(pool.clone());
        Self {
            pool,
            accounts,
            notifier,
        }
    }

    pub async fn redeem(
        &self,
        reward_id: Uuid,
        client_id: Uuid,
        staff_ref: Option<String>,
    ) -> Result<RedemptionOutcome> {
        let account = self.accounts.get_or_create(client_id).await?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let reward = lock_reward(&mut tx, reward_id).await?;
        if !reward.active {
            metrics::record_guard_rejection("reward_inactive");
            return Err(AppError::RewardInactive);
        }
        if !reward.has_stock() {
            metrics::record_guard_rejection("stock_exhausted");
            return Err(AppError::StockExhausted);
        }

        let entry = points_ledger::apply_delta(
            &mut tx,
            account.id,
            -reward.points_cost,
            PointsOrigin::Redemption,
            None,
        )
        .await?;

        if reward.tracks_stock() {
            decrement_stock(&mut tx, reward_id).await?;
        }

        let redemption =
            RewardRedemption::new(reward_id, client_id, reward.points_cost, staff_ref);
        insert_redemption(&mut tx, &redemption).await?;

        tx.commit().await.map_err(AppError::Database)?;

        AuditEvent::RewardRedeemed {
            redemption_id: redemption.id,
            reward_id,
            client_id,
            points_spent: redemption.points_spent,
        }
        .record();

        tracing::info!(
            redemption_id = %redemption.id,
            reward_id = %reward_id,
            client_id = %client_id,
            points_spent = redemption.points_spent,
            balance_after = entry.balance_after,
            "Reward redeemed"
        );

        dispatch_best_effort(
            self.notifier.as_ref(),
            NotificationEvent::RewardRedeemed {
                redemption_id: redemption.id,
                reward_id,
                client_id,
                points_spent: redemption.points_spent,
            },
        )
        .await;

        Ok(RedemptionOutcome {
            redemption,
            new_balance: entry.balance_after,
        })
    }
}

async fn lock_reward(tx: &mut Transaction<'_, Postgres>, reward_id: Uuid) -> Result<Reward> {
    let reward = sqlx::query_as::<_, Reward>(
        r#"
        SELECT id, name, points_cost, stock, active, created_at, updated_at
        FROM rewards
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(reward_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    reward.ok_or_else(|| AppError::NotFound(format!("reward {} not found", reward_id)))
}

/// Guarded decrement: the WHERE clause re-checks stock under the row lock
/// so the counter can never go negative even if the earlier read raced.
async fn decrement_stock(tx: &mut Transaction<'_, Postgres>, reward_id: Uuid) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE rewards
        SET stock = stock - 1, updated_at = NOW()
        WHERE id = $1 AND stock > 0
        "#,
    )
    .bind(reward_id)
    .execute(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    if result.rows_affected() != 1 {
        metrics::record_guard_rejection("stock_exhausted");
        return Err(AppError::StockExhausted);
    }

    Ok(())
}

async fn insert_redemption(
    tx: &mut Transaction<'_, Postgres>,
    redemption: &RewardRedemption,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO reward_redemptions
            (id, reward_id, client_id, points_spent, status, staff_ref, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(redemption.id)
    .bind(redemption.reward_id)
    .bind(redemption.client_id)
    .bind(redemption.points_spent)
    .bind(redemption.status)
    .bind(redemption.staff_ref.as_deref())
    .bind(redemption.created_at)
    .execute(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    Ok(())
}
