use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Origin tag of a points mutation. Checkout credits are keyed by
/// (reservation id, CHECKOUT_REWARD) for idempotency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "points_origin", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointsOrigin {
    CheckoutReward,
    Redemption,
    ManualAdjustment,
    Referral,
}

/// One loyalty account per client. The balance is never written directly;
/// every mutation goes through a signed delta recorded in a
/// PointsTransaction within the same database transaction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PointsAccount {
    pub id: Uuid,
    pub client_id: Uuid,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PointsAccount {
    pub fn new(client_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_id,
            balance: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_sufficient_balance(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}

/// Append-only ledger row. The sole source of truth for balance
/// reconstruction and auditing; the sum of deltas must always equal the
/// account balance.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PointsTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub delta: i64,
    pub origin: PointsOrigin,
    pub balance_before: i64,
    pub balance_after: i64,
    pub reservation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl PointsTransaction {
    pub fn new(
        account_id: Uuid,
        delta: i64,
        origin: PointsOrigin,
        balance_before: i64,
        reservation_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            delta,
            origin,
            balance_before,
            balance_after: balance_before + delta,
            reservation_id,
            created_at: Utc::now(),
        }
    }
}
