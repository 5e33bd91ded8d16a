use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Structured, queryable audit events for sensitive financial operations.
/// Emitted strictly after the owning transaction commits; an audit line
/// never describes state that was rolled back.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    ReservationCreated {
        reservation_id: Uuid,
        room_id: Uuid,
        client_id: Uuid,
    },
    LifecycleTransition {
        reservation_id: Uuid,
        from: String,
        to: String,
    },
    PaymentRecorded {
        payment_id: Uuid,
        reservation_id: Uuid,
        amount: Decimal,
    },
    PaymentStatusChanged {
        payment_id: Uuid,
        from: String,
        to: String,
    },
    PaymentExpired {
        payment_id: Uuid,
        reservation_id: Uuid,
    },
    PointsCredited {
        account_id: Uuid,
        delta: i64,
        balance_after: i64,
        reservation_id: Option<Uuid>,
    },
    PointsDebited {
        account_id: Uuid,
        delta: i64,
        balance_after: i64,
    },
    RewardRedeemed {
        redemption_id: Uuid,
        reward_id: Uuid,
        client_id: Uuid,
        points_spent: i64,
    },
    RefundExecuted {
        reservation_id: Uuid,
        amount: Decimal,
    },
    ManualRefundFlagged {
        reservation_id: Uuid,
        amount: Decimal,
        reason: String,
    },
}

impl AuditEvent {
    /// Writes the event to the audit log target.
    pub fn record(&self) {
        let payload = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(target: "audit", event = %payload, "audit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_event_serialization() {
        let event = AuditEvent::PaymentRecorded {
            payment_id: Uuid::new_v4(),
            reservation_id: Uuid::new_v4(),
            amount: dec!(850),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "payment_recorded");
        assert_eq!(json["amount"], "850");
    }

    #[test]
    fn test_transition_event_carries_both_statuses() {
        let event = AuditEvent::LifecycleTransition {
            reservation_id: Uuid::new_v4(),
            from: "PENDING".to_string(),
            to: "CONFIRMED".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["from"], "PENDING");
        assert_eq!(json["to"], "CONFIRMED");
    }
}
