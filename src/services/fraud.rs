use crate::models::{FraudAssessment, RiskTier};
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Behavioural inputs to the risk score, gathered from plain reads before
/// any lock or transaction is opened.
#[derive(Debug, Clone, Default)]
pub struct FraudSignals {
    pub total_reservations: i64,
    pub cancelled_reservations: i64,
    pub no_shows: i64,
    pub denied_payments: i64,
    pub account_age_days: i64,
    pub booking_amount: Decimal,
    pub hours_until_check_in: i64,
}

/// Additive rule-based risk scorer. Each triggered rule contributes a
/// fixed weight; the tier thresholds live in `RiskTier::from_score`.
pub struct FraudScorer;

impl FraudScorer {
    pub fn assess(
        reservation_id: Uuid,
        client_id: Uuid,
        signals: &FraudSignals,
    ) -> FraudAssessment {
        let mut score: u32 = 0;
        let mut triggered_rules = Vec::new();

        if signals.no_shows >= 2 {
            score += 35;
            triggered_rules.push("repeat_no_show".to_string());
        } else if signals.no_shows == 1 {
            score += 15;
            triggered_rules.push("prior_no_show".to_string());
        }

        if signals.cancelled_reservations >= 3 {
            score += 20;
            triggered_rules.push("frequent_cancellation".to_string());
        }

        if signals.denied_payments >= 2 {
            score += 25;
            triggered_rules.push("repeat_denied_payment".to_string());
        } else if signals.denied_payments == 1 {
            score += 10;
            triggered_rules.push("prior_denied_payment".to_string());
        }

        if signals.account_age_days < 7 {
            score += 15;
            triggered_rules.push("new_account".to_string());
        }

        if signals.total_reservations == 0 {
            score += 10;
            triggered_rules.push("first_booking".to_string());
        }

        if signals.booking_amount >= Decimal::from(5000u32) {
            score += 15;
            triggered_rules.push("high_value_booking".to_string());
        }

        if signals.hours_until_check_in < 24 {
            score += 10;
            triggered_rules.push("last_minute_booking".to_string());
        }

        let tier = RiskTier::from_score(score);

        FraudAssessment {
            reservation_id,
            client_id,
            score,
            tier,
            triggered_rules,
            assessed_at: Utc::now(),
        }
    }
}
