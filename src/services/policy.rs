use crate::config::{PolicySettings, PolicyTier};
use crate::models::CancellationPolicy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Penalty/refund split for a prospective cancellation. `penalty` plus
/// `refund` always equals the approved total the quote was computed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundQuote {
    pub penalty: Decimal,
    pub refund: Decimal,
    pub retained_pct: u32,
    pub explanation: String,
}

/// Pure penalty calculator over the configured policy tables. Takes no
/// locks and touches no storage; callers apply the quote inside their
/// own transaction.
pub struct CancellationEngine {
    policies: PolicySettings,
}

impl CancellationEngine {
    pub fn new(policies: PolicySettings) -> Self {
        Self { policies }
    }

    /// Quotes the penalty for cancelling `hours_until_check_in` hours
    /// before the planned check-in, given the approved payment total.
    /// Hours at or past the planned check-in quote as the final tier.
    pub fn quote(
        &self,
        policy: CancellationPolicy,
        hours_until_check_in: i64,
        paid_total: Decimal,
    ) -> RefundQuote {
        // Callers pass wall-clock deltas; anything past check-in is 0h.
        let hours_until_check_in = hours_until_check_in.max(0);
        let tier = self.select_tier(policy, hours_until_check_in);
        let retained_pct = tier.map(|t| t.retained_pct).unwrap_or(100);

        let penalty =
            (paid_total * Decimal::from(retained_pct) / Decimal::from(100u32)).round_dp(2);
        let refund = paid_total - penalty;

        RefundQuote {
            penalty,
            refund,
            retained_pct,
            explanation: format!(
                "{:?} policy, {}h before check-in: {}% of {} retained",
                policy,
                hours_until_check_in,
                retained_pct,
                paid_total
            ),
        }
    }

    fn select_tier(&self, policy: CancellationPolicy, hours: i64) -> Option<&PolicyTier> {
        let table = match policy {
            CancellationPolicy::Flexible => &self.policies.flexible,
            CancellationPolicy::Moderate => &self.policies.moderate,
            CancellationPolicy::Strict => &self.policies.strict,
            CancellationPolicy::NonRefundable => &self.policies.non_refundable,
        };

        // Most generous tier whose threshold the remaining hours still meet.
        table
            .iter()
            .filter(|t| hours >= t.min_hours)
            .max_by_key(|t| t.min_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn engine() -> CancellationEngine {
        CancellationEngine::new(PolicySettings::default())
    }

    #[test]
    fn test_flexible_early_cancel_is_free() {
        let quote = engine().quote(CancellationPolicy::Flexible, 48, dec!(1000));
        assert_eq!(quote.penalty, dec!(0));
        assert_eq!(quote.refund, dec!(1000));
    }

    #[test]
    fn test_flexible_late_cancel_retains_half() {
        // 10 hours out falls below the 24h tier.
        let quote = engine().quote(CancellationPolicy::Flexible, 10, dec!(1000));
        assert_eq!(quote.penalty, dec!(500.00));
        assert_eq!(quote.refund, dec!(500.00));
    }

    #[test]
    fn test_moderate_tiers() {
        let e = engine();
        assert_eq!(
            e.quote(CancellationPolicy::Moderate, 72, dec!(1000)).penalty,
            dec!(0)
        );
        assert_eq!(
            e.quote(CancellationPolicy::Moderate, 30, dec!(1000)).penalty,
            dec!(300.00)
        );
        assert_eq!(
            e.quote(CancellationPolicy::Moderate, 5, dec!(1000)).penalty,
            dec!(700.00)
        );
    }

    #[test]
    fn test_strict_always_retains_something() {
        let e = engine();
        assert_eq!(
            e.quote(CancellationPolicy::Strict, 100, dec!(1000)).penalty,
            dec!(200.00)
        );
        assert_eq!(
            e.quote(CancellationPolicy::Strict, 48, dec!(1000)).penalty,
            dec!(600.00)
        );
        assert_eq!(
            e.quote(CancellationPolicy::Strict, 1, dec!(1000)).penalty,
            dec!(900.00)
        );
    }

    #[test]
    fn test_non_refundable_retains_everything() {
        let quote = engine().quote(CancellationPolicy::NonRefundable, 500, dec!(850.50));
        assert_eq!(quote.penalty, dec!(850.50));
        assert_eq!(quote.refund, dec!(0));
    }

    #[test]
    fn test_tier_boundary_is_inclusive() {
        // Exactly 24h out qualifies for the 24h tier.
        let quote = engine().quote(CancellationPolicy::Flexible, 24, dec!(1000));
        assert_eq!(quote.penalty, dec!(0));
    }

    #[test]
    fn test_past_check_in_hours_use_final_tier() {
        let quote = engine().quote(CancellationPolicy::Flexible, 0, dec!(1000));
        assert_eq!(quote.penalty, dec!(500.00));
    }

    #[test]
    fn test_negative_hours_clamp_to_final_tier() {
        let quote = engine().quote(CancellationPolicy::Flexible, -5, dec!(1000));
        assert_eq!(quote.penalty, dec!(500.00));
        assert_eq!(quote.refund, dec!(500.00));
    }

    #[test]
    fn test_penalty_and_refund_partition_the_paid_total() {
        let paid = dec!(333.33);
        let quote = engine().quote(CancellationPolicy::Moderate, 30, paid);
        assert_eq!(quote.penalty + quote.refund, paid);
    }

    #[test]
    fn test_zero_paid_quotes_zero() {
        let quote = engine().quote(CancellationPolicy::Strict, 1, dec!(0));
        assert_eq!(quote.penalty, dec!(0));
        assert_eq!(quote.refund, dec!(0));
    }
}
