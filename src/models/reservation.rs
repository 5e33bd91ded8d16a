use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Status of a reservation in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Booked, awaiting deposit.
    Pending,
    /// Deposit received, room allocation held.
    Confirmed,
    /// Guest is in the room.
    CheckedIn,
    /// Stay completed. Terminal.
    CheckedOut,
    /// Cancelled before check-in. Terminal.
    Cancelled,
    /// Guest never arrived. Terminal.
    NoShow,
}

impl ReservationStatus {
    /// Returns true if no further transition is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::CheckedOut | ReservationStatus::Cancelled | ReservationStatus::NoShow
        )
    }

    /// Returns true if this status holds the room against overlapping stays.
    pub fn is_occupying(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Confirmed | ReservationStatus::CheckedIn
        )
    }
}

/// Financial sub-state tracked alongside the lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "financial_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinancialStatus {
    None,
    DepositPaid,
    Settled,
}

/// Cancellation policy tag attached to a reservation at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "cancellation_policy", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationPolicy {
    Flexible,
    Moderate,
    Strict,
    NonRefundable,
}

/// Events the lifecycle manager can apply to a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Confirm,
    CheckIn,
    CheckOut,
    Cancel,
    NoShow,
}

/// Explicit transition table: (from-status, event) -> to-status.
/// Guards (payment coverage, room availability, balance tolerance, grace
/// windows) are evaluated by the lifecycle manager; this table only encodes
/// which transitions exist at all.
#[derive(Debug, Clone)]
pub struct ReservationStateMachine;

impl ReservationStateMachine {
    /// Returns the target status for an event, or None if the event is not
    /// permitted from the current status.
    pub fn target(from: ReservationStatus, event: LifecycleEvent) -> Option<ReservationStatus> {
        use LifecycleEvent::*;
        use ReservationStatus::*;
        match (from, event) {
            (Pending, Confirm) => Some(Confirmed),
            (Confirmed, CheckIn) => Some(CheckedIn),
            (CheckedIn, CheckOut) => Some(CheckedOut),
            (Pending | Confirmed, Cancel) => Some(Cancelled),
            (Pending | Confirmed, LifecycleEvent::NoShow) => Some(ReservationStatus::NoShow),
            _ => None,
        }
    }

    pub fn can_fire(from: ReservationStatus, event: LifecycleEvent) -> bool {
        Self::target(from, event).is_some()
    }

    /// Resolves the target status or fails with a typed rejection.
    pub fn fire(from: ReservationStatus, event: LifecycleEvent) -> Result<ReservationStatus> {
        Self::target(from, event).ok_or_else(|| {
            AppError::InvalidTransition(format!(
                "event {:?} is not permitted from status {:?}",
                event, from
            ))
        })
    }
}

/// A room booking from request to completion. Never physically deleted;
/// cancellation is a terminal status, not a row removal. Status is mutated
/// only by the lifecycle manager.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub room_id: Uuid,
    pub client_id: Uuid,
    pub status: ReservationStatus,
    pub financial_status: FinancialStatus,
    pub policy: CancellationPolicy,
    /// Nominal check-in instant (stay date + configured check-in hour).
    pub planned_check_in: DateTime<Utc>,
    /// Nominal check-out instant (stay date + configured check-out hour).
    pub planned_check_out: DateTime<Utc>,
    pub actual_check_in: Option<DateTime<Utc>>,
    pub actual_check_out: Option<DateTime<Utc>>,
    pub daily_rate: Decimal,
    pub nights: i32,
    /// HIGH-risk reservations may not be confirmed before this instant.
    pub review_hold_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(
        room_id: Uuid,
        client_id: Uuid,
        policy: CancellationPolicy,
        planned_check_in: DateTime<Utc>,
        planned_check_out: DateTime<Utc>,
        daily_rate: Decimal,
        nights: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            room_id,
            client_id,
            status: ReservationStatus::Pending,
            financial_status: FinancialStatus::None,
            policy,
            planned_check_in,
            planned_check_out,
            actual_check_in: None,
            actual_check_out: None,
            daily_rate,
            nights,
            review_hold_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Forecast total for the stay: daily rate times nights.
    pub fn forecast_total(&self) -> Decimal {
        self.daily_rate * Decimal::from(self.nights)
    }

    /// Whole hours remaining until the planned check-in, clamped at zero.
    pub fn hours_until_check_in(&self, now: DateTime<Utc>) -> i64 {
        (self.planned_check_in - now).num_hours().max(0)
    }

    pub fn is_under_review_hold(&self, now: DateTime<Utc>) -> bool {
        self.review_hold_until.is_some_and(|until| now < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample() -> Reservation {
        Reservation::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            CancellationPolicy::Flexible,
            Utc.with_ymd_and_hms(2024, 1, 10, 14, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 12, 11, 0, 0).unwrap(),
            dec!(500),
            2,
        )
    }

    #[test]
    fn test_forward_path() {
        use LifecycleEvent::*;
        use ReservationStatus::*;
        assert_eq!(ReservationStateMachine::target(Pending, Confirm), Some(Confirmed));
        assert_eq!(ReservationStateMachine::target(Confirmed, CheckIn), Some(CheckedIn));
        assert_eq!(ReservationStateMachine::target(CheckedIn, CheckOut), Some(CheckedOut));
    }

    #[test]
    fn test_side_exits() {
        use LifecycleEvent::*;
        use ReservationStatus::*;
        assert_eq!(ReservationStateMachine::target(Pending, Cancel), Some(Cancelled));
        assert_eq!(ReservationStateMachine::target(Confirmed, Cancel), Some(Cancelled));
        assert_eq!(
            ReservationStateMachine::target(Pending, LifecycleEvent::NoShow),
            Some(ReservationStatus::NoShow)
        );
        assert_eq!(
            ReservationStateMachine::target(Confirmed, LifecycleEvent::NoShow),
            Some(ReservationStatus::NoShow)
        );
    }

    #[test]
    fn test_no_exit_from_terminal_states() {
        use LifecycleEvent::*;
        use ReservationStatus::*;
        for terminal in [CheckedOut, Cancelled, ReservationStatus::NoShow] {
            for event in [Confirm, CheckIn, CheckOut, Cancel, LifecycleEvent::NoShow] {
                assert!(
                    !ReservationStateMachine::can_fire(terminal, event),
                    "{:?} must not accept {:?}",
                    terminal,
                    event
                );
            }
        }
    }

    #[test]
    fn test_cancel_forbidden_after_check_in() {
        assert!(!ReservationStateMachine::can_fire(
            ReservationStatus::CheckedIn,
            LifecycleEvent::Cancel
        ));
    }

    #[test]
    fn test_fire_rejects_with_typed_error() {
        let err = ReservationStateMachine::fire(
            ReservationStatus::CheckedOut,
            LifecycleEvent::Confirm,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn test_occupying_statuses() {
        assert!(ReservationStatus::Confirmed.is_occupying());
        assert!(ReservationStatus::CheckedIn.is_occupying());
        assert!(!ReservationStatus::Pending.is_occupying());
        assert!(!ReservationStatus::Cancelled.is_occupying());
    }

    #[test]
    fn test_forecast_total() {
        let reservation = sample();
        assert_eq!(reservation.forecast_total(), dec!(1000));
    }

    #[test]
    fn test_hours_until_check_in_clamped() {
        let reservation = sample();
        let before = Utc.with_ymd_and_hms(2024, 1, 10, 4, 0, 0).unwrap();
        assert_eq!(reservation.hours_until_check_in(before), 10);
        let after = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();
        assert_eq!(reservation.hours_until_check_in(after), 0);
    }

    #[test]
    fn test_review_hold() {
        let mut reservation = sample();
        let now = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        assert!(!reservation.is_under_review_hold(now));
        reservation.review_hold_until = Some(now + chrono::Duration::hours(24));
        assert!(reservation.is_under_review_hold(now));
        assert!(!reservation.is_under_review_hold(now + chrono::Duration::hours(25)));
    }
}
