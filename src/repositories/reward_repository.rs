use crate::error::{AppError, Result};
use crate::models::{Reward, RewardRedemption};
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for reward reads and creation. Stock decrements happen only
/// inside the redemption transactor's transaction.
pub struct RewardRepository {
    pool: PgPool,
}

impl RewardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a new reward.
    pub async fn create(&self, reward: &Reward) -> Result<Reward> {
        let row = sqlx::query_as::<_, Reward>(
            r#"
            INSERT INTO rewards (id, name, points_cost, stock, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, name, points_cost, stock, active, created_at, updated_at
            "#,
        )
        .bind(reward.id)
        .bind(&reward.name)
        .bind(reward.points_cost)
        .bind(reward.stock)
        .bind(reward.active)
        .bind(reward.created_at)
        .bind(reward.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds a reward by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Reward>> {
        let row = sqlx::query_as::<_, Reward>(
            r#"
            SELECT id, name, points_cost, stock, active, created_at, updated_at
            FROM rewards
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Flips a reward's active flag.
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<Option<Reward>> {
        let row = sqlx::query_as::<_, Reward>(
            r#"
            UPDATE rewards
            SET active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, points_cost, stock, active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Lists a client's redemptions, most recent first.
    pub async fn list_redemptions_by_client(
        &self,
        client_id: Uuid,
        limit: i64,
    ) -> Result<Vec<RewardRedemption>> {
        let rows = sqlx::query_as::<_, RewardRedemption>(
            r#"
            SELECT id, reward_id, client_id, points_spent, status, staff_ref, created_at
            FROM reward_redemptions
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

    /// Marks a redemption delivered.
    pub async fn mark_delivered(&self, redemption_id: Uuid) -> Result<Option<RewardRedemption>> {
        let row = sqlx::query_as::<_, RewardRedemption>(
            r#"
            UPDATE reward_redemptions
            SET status = 'DELIVERED'
            WHERE id = $1 AND status = 'PENDING'
            RETURNING id, reward_id, client_id, points_spent, status, staff_ref, created_at
            "#,
        )
        .bind(redemption_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
