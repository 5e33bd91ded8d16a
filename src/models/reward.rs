use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A redeemable reward. `stock` of None means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reward {
    pub id: Uuid,
    pub name: String,
    pub points_cost: i64,
    pub stock: Option<i32>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reward {
    pub fn new(name: impl Into<String>, points_cost: i64, stock: Option<i32>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            points_cost,
            stock,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tracks_stock(&self) -> bool {
        self.stock.is_some()
    }

    pub fn has_stock(&self) -> bool {
        match self.stock {
            Some(remaining) => remaining > 0,
            None => true,
        }
    }
}

/// Fulfillment status of a redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "redemption_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedemptionStatus {
    Pending,
    Delivered,
}

/// A committed reward redemption, written only by the redemption
/// transactor in the same transaction as the points debit and stock
/// decrement.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RewardRedemption {
    pub id: Uuid,
    pub reward_id: Uuid,
    pub client_id: Uuid,
    pub points_spent: i64,
    pub status: RedemptionStatus,
    pub staff_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RewardRedemption {
    pub fn new(
        reward_id: Uuid,
        client_id: Uuid,
        points_spent: i64,
        staff_ref: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reward_id,
            client_id,
            points_spent,
            status: RedemptionStatus::Pending,
            staff_ref,
            created_at: Utc::now(),
        }
    }
}
