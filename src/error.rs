use rust_decimal::Decimal;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, AppError>;

/// Application error taxonomy.
///
/// Guard failures surface as typed variants so callers can distinguish
/// retryable conflicts from terminal rejections. Ledger transactions roll
/// back entirely on any error; partial mutations are never observable.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed input, caller's fault.
    #[error("validation error: {0}")]
    Validation(String),

    /// A lifecycle guard condition failed (wrong current status,
    /// insufficient payment, outstanding balance, review hold).
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// An overlapping occupying reservation exists for the room.
    #[error("room unavailable: {} conflicting reservation(s)", conflicts.len())]
    RoomUnavailable { conflicts: Vec<Uuid> },

    /// Lock timeout or optimistic-check failure. Safe to retry.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Points debit would drive the balance negative.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    /// Reward stock is exhausted.
    #[error("reward stock exhausted")]
    StockExhausted,

    /// Reward is not active.
    #[error("reward is not active")]
    RewardInactive,

    /// Upstream gateway failure. Retry with the same idempotency key.
    #[error("payment gateway error: {0}")]
    PaymentGateway(String),

    /// A second payment for the same reservation/amount/method arrived
    /// inside the duplicate-detection window without a matching key.
    #[error("duplicate payment: {method} of {amount} for reservation {reservation_id} within the duplicate window")]
    DuplicatePayment {
        reservation_id: Uuid,
        amount: Decimal,
        method: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("redis error: {0}")]
    Redis(redis::RedisError),

    #[error("internal error: {0}")]
    Internal(anyhow::Error),
}

impl AppError {
    /// Returns true if the caller may safely retry the operation
    /// (with the same idempotency key where one applies).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ConcurrencyConflict(_) | AppError::PaymentGateway(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::ConcurrencyConflict("lock timeout".to_string()).is_retryable());
        assert!(AppError::PaymentGateway("upstream 503".to_string()).is_retryable());
        assert!(!AppError::StockExhausted.is_retryable());
        assert!(!AppError::InvalidTransition("wrong status".to_string()).is_retryable());
        assert!(!AppError::InsufficientBalance {
            requested: 50,
            available: 40
        }
        .is_retryable());
    }

    #[test]
    fn test_room_unavailable_display() {
        let err = AppError::RoomUnavailable {
            conflicts: vec![Uuid::new_v4(), Uuid::new_v4()],
        };
        assert!(err.to_string().contains("2 conflicting"));
    }
}
