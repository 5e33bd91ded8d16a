use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Pix,
    Cash,
    BankTransfer,
}

impl PaymentMethod {
    /// Returns true if refunds can be pushed back through the gateway.
    /// Cash refunds always require manual handling.
    pub fn supports_gateway_refund(&self) -> bool {
        matches!(self, PaymentMethod::Card | PaymentMethod::Pix)
    }
}

/// Status of a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    /// Claimed by an in-flight gateway charge. The claim is a guarded
    /// PENDING -> PROCESSING move, so at most one charger per payment
    /// ever reaches the gateway.
    Processing,
    Approved,
    Denied,
    Refunded,
}

impl PaymentStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, PaymentStatus::Denied | PaymentStatus::Refunded)
    }

    /// Valid status moves, driven from exactly one authoritative path
    /// (gateway webhook or manual approval) per payment. PROCESSING may
    /// fall back to PENDING when the gateway call fails, so a retry with
    /// the same key can settle.
    pub fn can_move_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Processing)
                | (PaymentStatus::Pending, PaymentStatus::Approved)
                | (PaymentStatus::Pending, PaymentStatus::Denied)
                | (PaymentStatus::Processing, PaymentStatus::Approved)
                | (PaymentStatus::Processing, PaymentStatus::Denied)
                | (PaymentStatus::Processing, PaymentStatus::Pending)
                | (PaymentStatus::Approved, PaymentStatus::Refunded)
        )
    }
}

/// A recorded payment attempt. The idempotency key is unique: two creation
/// requests with the same key yield the same stored row. Immutable once
/// approved/refunded except for status and gateway reference.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub idempotency_key: String,
    pub gateway_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        reservation_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
        idempotency_key: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reservation_id,
            amount,
            method,
            status: PaymentStatus::Pending,
            idempotency_key,
            gateway_ref: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_moves() {
        assert!(PaymentStatus::Pending.can_move_to(PaymentStatus::Approved));
        assert!(PaymentStatus::Pending.can_move_to(PaymentStatus::Denied));
        assert!(PaymentStatus::Approved.can_move_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Denied.can_move_to(PaymentStatus::Approved));
        assert!(!PaymentStatus::Refunded.can_move_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Pending.can_move_to(PaymentStatus::Refunded));
    }

    #[test]
    fn test_processing_claim_moves() {
        assert!(PaymentStatus::Pending.can_move_to(PaymentStatus::Processing));
        assert!(PaymentStatus::Processing.can_move_to(PaymentStatus::Approved));
        assert!(PaymentStatus::Processing.can_move_to(PaymentStatus::Denied));
        assert!(PaymentStatus::Processing.can_move_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Processing.can_move_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Approved.can_move_to(PaymentStatus::Processing));
        assert!(!PaymentStatus::Processing.is_final());
        assert!(PaymentStatus::Denied.is_final());
    }

    #[test]
    fn test_gateway_refund_support() {
        assert!(PaymentMethod::Card.supports_gateway_refund());
        assert!(PaymentMethod::Pix.supports_gateway_refund());
        assert!(!PaymentMethod::Cash.supports_gateway_refund());
        assert!(!PaymentMethod::BankTransfer.supports_gateway_refund());
    }

    #[test]
    fn test_new_payment_is_pending() {
        let payment = Payment::new(
            Uuid::new_v4(),
            dec!(300),
            PaymentMethod::Pix,
            "key-001".to_string(),
        );
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.gateway_ref.is_none());
    }
}
