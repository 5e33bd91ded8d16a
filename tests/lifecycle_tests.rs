mod common;

use async_trait::async_trait;
use reservation_engine::error::{AppError, Result};
use reservation_engine::gateway::{
    ChargeResult, GatewayStatus, PaymentGateway, PaymentInstrument, RefundResult,
};
use reservation_engine::models::{
    CancellationPolicy, FinancialStatus, PaymentMethod, PaymentStatus, ReservationStatus,
    RoomStatus,
};
use reservation_engine::repositories::{PointsRepository, RoomRepository};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_full_lifecycle_happy_path() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager(&pool);
    let payments = common::payment_service(&pool);
    let room = common::create_room(&pool).await;
    let client_id = Uuid::new_v4();

    let reservation = manager
        .create_reservation(common::booking_request(room.id, client_id, 30))
        .await
        .expect("Failed to create reservation");
    assert_eq!(reservation.status, ReservationStatus::Pending);
    assert_eq!(reservation.financial_status, FinancialStatus::None);
    assert_eq!(reservation.forecast_total(), dec!(1000));

    // 30% deposit unlocks CONFIRM.
    common::approve_payment(&payments, reservation.id, dec!(300)).await;
    let confirmed = manager.confirm(reservation.id).await.expect("Failed to confirm");
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert_eq!(confirmed.financial_status, FinancialStatus::DepositPaid);

    // 85% total unlocks CHECK_IN.
    common::approve_payment(&payments, reservation.id, dec!(550)).await;
    let checked_in = manager.check_in(reservation.id).await.expect("Failed to check in");
    assert_eq!(checked_in.status, ReservationStatus::CheckedIn);
    assert!(checked_in.actual_check_in.is_some());

    let rooms = RoomRepository::new(pool.clone());
    let occupied = rooms.find_by_id(room.id).await.unwrap().unwrap();
    assert_eq!(occupied.status, RoomStatus::Occupied);

    // Settle the remainder, then CHECK_OUT credits floor(1000 / 10) points.
    common::approve_payment(&payments, reservation.id, dec!(150)).await;
    let outcome = manager.check_out(reservation.id).await.expect("Failed to check out");
    assert_eq!(outcome.reservation.status, ReservationStatus::CheckedOut);
    assert_eq!(outcome.reservation.financial_status, FinancialStatus::Settled);
    assert_eq!(outcome.points_credited, 100);

    let freed = rooms.find_by_id(room.id).await.unwrap().unwrap();
    assert_eq!(freed.status, RoomStatus::Free);

    let points = PointsRepository::new(pool.clone());
    let account = points.find_by_client(client_id).await.unwrap().unwrap();
    assert_eq!(account.balance, 100);

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn test_confirm_rejected_below_deposit_threshold() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager(&pool);
    let payments = common::payment_service(&pool);
    let room = common::create_room(&pool).await;

    let reservation = manager
        .create_reservation(common::booking_request(room.id, Uuid::new_v4(), 30))
        .await
        .expect("Failed to create reservation");

    // 25% of the 1000 forecast is below the 30% deposit.
    common::approve_payment(&payments, reservation.id, dec!(250)).await;

    let err = manager.confirm(reservation.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let unchanged = manager
        .reservations()
        .find_by_id(reservation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.status, ReservationStatus::Pending);

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn test_check_in_requires_eighty_percent_paid() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager(&pool);
    let payments = common::payment_service(&pool);
    let room = common::create_room(&pool).await;

    let reservation = manager
        .create_reservation(common::booking_request(room.id, Uuid::new_v4(), 30))
        .await
        .expect("Failed to create reservation");

    // 75% paid: enough to confirm, not enough to check in.
    common::approve_payment(&payments, reservation.id, dec!(750)).await;
    manager.confirm(reservation.id).await.expect("Failed to confirm");

    let err = manager.check_in(reservation.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    // Topping up to 85% clears the guard.
    common::approve_payment(&payments, reservation.id, dec!(100)).await;
    let checked_in = manager.check_in(reservation.id).await.expect("Failed to check in");
    assert_eq!(checked_in.status, ReservationStatus::CheckedIn);

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn test_check_out_outstanding_balance_tolerance() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager(&pool);
    let payments = common::payment_service(&pool);
    let room = common::create_room(&pool).await;

    let reservation = manager
        .create_reservation(common::booking_request(room.id, Uuid::new_v4(), 30))
        .await
        .expect("Failed to create reservation");

    common::approve_payment(&payments, reservation.id, dec!(999.98)).await;
    manager.confirm(reservation.id).await.expect("Failed to confirm");
    manager.check_in(reservation.id).await.expect("Failed to check in");

    // Outstanding 0.02 exceeds the 0.01 tolerance.
    let err = manager.check_out(reservation.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    // One more cent brings the outstanding inside the tolerance.
    common::approve_payment(&payments, reservation.id, dec!(0.01)).await;
    let outcome = manager.check_out(reservation.id).await.expect("Failed to check out");
    assert_eq!(outcome.reservation.status, ReservationStatus::CheckedOut);
    assert_eq!(outcome.points_credited, 99);

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn test_checkout_points_credited_exactly_once() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager(&pool);
    let payments = common::payment_service(&pool);
    let room = common::create_room(&pool).await;
    let client_id = Uuid::new_v4();

    let reservation = manager
        .create_reservation(common::booking_request(room.id, client_id, 30))
        .await
        .expect("Failed to create reservation");
    common::approve_payment(&payments, reservation.id, dec!(1000)).await;
    manager.confirm(reservation.id).await.expect("Failed to confirm");
    manager.check_in(reservation.id).await.expect("Failed to check in");
    manager.check_out(reservation.id).await.expect("Failed to check out");

    // A replayed check-out is rejected by the state machine and must not
    // credit again.
    let err = manager.check_out(reservation.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let points = PointsRepository::new(pool.clone());
    let account = points.find_by_client(client_id).await.unwrap().unwrap();
    assert_eq!(account.balance, 100);
    assert_eq!(points.sum_deltas(account.id).await.unwrap(), 100);

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn test_cancel_flexible_inside_24h_splits_evenly() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager(&pool);
    let payments = common::payment_service(&pool);
    let room = common::create_room(&pool).await;

    let reservation = manager
        .create_reservation(common::booking_request(room.id, Uuid::new_v4(), 30))
        .await
        .expect("Failed to create reservation");
    common::approve_payment(&payments, reservation.id, dec!(300)).await;
    manager.confirm(reservation.id).await.expect("Failed to confirm");
    common::approve_payment(&payments, reservation.id, dec!(700)).await;

    // 10 hours before check-in, FLEXIBLE retains 50% of the 1000 paid.
    common::shift_planned_check_in(&pool, reservation.id, 10).await;
    let outcome = manager.cancel(reservation.id).await.expect("Failed to cancel");

    assert_eq!(outcome.reservation.status, ReservationStatus::Cancelled);
    assert_eq!(outcome.penalty, dec!(500.00));
    assert_eq!(outcome.refund, dec!(500.00));
    assert_eq!(outcome.refunded, dec!(500.00));
    assert!(!outcome.manual_refund_required);

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn test_cancel_refund_falls_back_to_manual_flag() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager =
        common::lifecycle_manager_with_gateway(&pool, Arc::new(common::DecliningGateway));
    let payments = common::payment_service(&pool);
    let room = common::create_room(&pool).await;

    let reservation = manager
        .create_reservation(common::booking_request(room.id, Uuid::new_v4(), 30))
        .await
        .expect("Failed to create reservation");
    common::approve_payment(&payments, reservation.id, dec!(1000)).await;

    common::shift_planned_check_in(&pool, reservation.id, 48).await;
    let outcome = manager.cancel(reservation.id).await.expect("Failed to cancel");

    // FLEXIBLE at 48h refunds everything, but the gateway declined.
    assert_eq!(outcome.refund, dec!(1000));
    assert_eq!(outcome.refunded, dec!(0));
    assert!(outcome.manual_refund_required);
    assert_eq!(outcome.reservation.status, ReservationStatus::Cancelled);

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn test_cash_refund_always_needs_manual_handling() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager(&pool);
    let payments = common::payment_service(&pool);
    let room = common::create_room(&pool).await;

    let reservation = manager
        .create_reservation(common::booking_request(room.id, Uuid::new_v4(), 30))
        .await
        .expect("Failed to create reservation");

    let cash = payments
        .create_payment(reservation.id, dec!(400), PaymentMethod::Cash, None)
        .await
        .expect("Failed to create payment");
    payments
        .update_status(cash.id, PaymentStatus::Approved, None)
        .await
        .expect("Failed to approve payment");

    common::shift_planned_check_in(&pool, reservation.id, 48).await;
    let outcome = manager.cancel(reservation.id).await.expect("Failed to cancel");

    assert_eq!(outcome.refund, dec!(400));
    assert_eq!(outcome.refunded, dec!(0));
    assert!(outcome.manual_refund_required);

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn test_cancel_forbidden_after_check_in() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager(&pool);
    let payments = common::payment_service(&pool);
    let room = common::create_room(&pool).await;

    let reservation = manager
        .create_reservation(common::booking_request(room.id, Uuid::new_v4(), 30))
        .await
        .expect("Failed to create reservation");
    common::approve_payment(&payments, reservation.id, dec!(1000)).await;
    manager.confirm(reservation.id).await.expect("Failed to confirm");
    manager.check_in(reservation.id).await.expect("Failed to check in");

    let err = manager.cancel(reservation.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn test_no_show_respects_grace_window() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager(&pool);
    let payments = common::payment_service(&pool);
    let room = common::create_room(&pool).await;

    let reservation = manager
        .create_reservation(common::booking_request(room.id, Uuid::new_v4(), 30))
        .await
        .expect("Failed to create reservation");
    common::approve_payment(&payments, reservation.id, dec!(300)).await;

    // One hour past the planned check-in: still inside the 2h grace.
    common::shift_planned_check_in(&pool, reservation.id, -1).await;
    let err = manager.mark_no_show(reservation.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    // Three hours past: grace elapsed, payments retained.
    common::shift_planned_check_in(&pool, reservation.id, -3).await;
    let outcome = manager
        .mark_no_show(reservation.id)
        .await
        .expect("Failed to mark no-show");
    assert_eq!(outcome.reservation.status, ReservationStatus::NoShow);
    assert_eq!(outcome.retained, dec!(300));

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn test_no_show_flexible_refunds_above_the_deposit() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager(&pool);
    let payments = common::payment_service(&pool);
    let room = common::create_room(&pool).await;

    let reservation = manager
        .create_reservation(common::booking_request(room.id, Uuid::new_v4(), 30))
        .await
        .expect("Failed to create reservation");
    common::approve_payment(&payments, reservation.id, dec!(1000)).await;

    // FLEXIBLE forfeits only the 30% deposit of the 1000 forecast; the
    // other 700 goes back through the gateway.
    common::shift_planned_check_in(&pool, reservation.id, -3).await;
    let outcome = manager
        .mark_no_show(reservation.id)
        .await
        .expect("Failed to mark no-show");

    assert_eq!(outcome.reservation.status, ReservationStatus::NoShow);
    assert_eq!(outcome.retained, dec!(300.00));
    assert_eq!(outcome.refunded, dec!(700.00));
    assert!(!outcome.manual_refund_required);

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn test_no_show_strict_retains_everything() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager(&pool);
    let payments = common::payment_service(&pool);
    let room = common::create_room(&pool).await;

    let mut req = common::booking_request(room.id, Uuid::new_v4(), 30);
    req.policy = CancellationPolicy::Strict;
    let reservation = manager
        .create_reservation(req)
        .await
        .expect("Failed to create reservation");
    common::approve_payment(&payments, reservation.id, dec!(1000)).await;

    common::shift_planned_check_in(&pool, reservation.id, -3).await;
    let outcome = manager
        .mark_no_show(reservation.id)
        .await
        .expect("Failed to mark no-show");

    assert_eq!(outcome.retained, dec!(1000));
    assert_eq!(outcome.refunded, dec!(0));
    assert!(!outcome.manual_refund_required);

    common::cleanup_test_data(&pool).await;
}

/// Approves refunds, but flips the payment to REFUNDED out of band first,
/// the way a gateway webhook landing mid-call would.
struct WebhookRacingGateway {
    pool: PgPool,
}

#[async_trait]
impl PaymentGateway for WebhookRacingGateway {
    async fn charge(
        &self,
        _amount: Decimal,
        _instrument: &PaymentInstrument,
        _idempotency_key: &str,
    ) -> Result<ChargeResult> {
        Ok(ChargeResult {
            gateway_ref: format!("gw-{}", Uuid::new_v4()),
            status: GatewayStatus::Approved,
            auth_code: None,
        })
    }

    async fn refund(&self, gateway_ref: &str, _amount: Decimal) -> Result<RefundResult> {
        sqlx::query(
            "UPDATE payments SET status = 'REFUNDED', updated_at = NOW() WHERE gateway_ref = $1",
        )
        .bind(gateway_ref)
        .execute(&self.pool)
        .await
        .expect("Failed to race the refund");
        Ok(RefundResult {
            status: GatewayStatus::Approved,
        })
    }

    async fn query_status(&self, _gateway_ref: &str) -> Result<GatewayStatus> {
        Ok(GatewayStatus::Approved)
    }
}

#[tokio::test]
async fn test_refund_raced_by_webhook_is_flagged_for_manual_handling() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager_with_gateway(
        &pool,
        Arc::new(WebhookRacingGateway { pool: pool.clone() }),
    );
    let payments = common::payment_service(&pool);
    let room = common::create_room(&pool).await;

    let reservation = manager
        .create_reservation(common::booking_request(room.id, Uuid::new_v4(), 30))
        .await
        .expect("Failed to create reservation");
    let payment = common::approve_payment(&payments, reservation.id, dec!(1000)).await;

    common::shift_planned_check_in(&pool, reservation.id, 48).await;
    let outcome = manager.cancel(reservation.id).await.expect("Failed to cancel");

    // The guarded APPROVED -> REFUNDED move found the row already moved,
    // so nothing counts as refunded here and staff must reconcile.
    assert_eq!(outcome.refund, dec!(1000));
    assert_eq!(outcome.refunded, dec!(0));
    assert!(outcome.manual_refund_required);

    let stored = payments.payments().find_by_id(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Refunded);

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn test_terminal_reservation_accepts_no_events() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager(&pool);
    let room = common::create_room(&pool).await;

    let reservation = manager
        .create_reservation(common::booking_request(room.id, Uuid::new_v4(), 30))
        .await
        .expect("Failed to create reservation");
    manager.cancel(reservation.id).await.expect("Failed to cancel");

    assert!(manager.confirm(reservation.id).await.is_err());
    assert!(manager.check_in(reservation.id).await.is_err());
    assert!(manager.check_out(reservation.id).await.is_err());
    assert!(manager.cancel(reservation.id).await.is_err());
    assert!(manager.mark_no_show(reservation.id).await.is_err());

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn test_high_risk_client_is_held_for_review() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let manager = common::lifecycle_manager(&pool);
    let payments = common::payment_service(&pool);
    let client_id = Uuid::new_v4();

    // Build a history: two no-shows and two denied payments.
    for _ in 0..2 {
        let room = common::create_room(&pool).await;
        let r = manager
            .create_reservation(common::booking_request(room.id, client_id, 30))
            .await
            .expect("Failed to create reservation");
        common::shift_planned_check_in(&pool, r.id, -3).await;
        manager.mark_no_show(r.id).await.expect("Failed to mark no-show");
    }
    {
        let room = common::create_room(&pool).await;
        let r = manager
            .create_reservation(common::booking_request(room.id, client_id, 30))
            .await
            .expect("Failed to create reservation");
        for amount in [dec!(100), dec!(200)] {
            let p = payments
                .create_payment(r.id, amount, PaymentMethod::Card, None)
                .await
                .expect("Failed to create payment");
            payments
                .update_status(p.id, PaymentStatus::Denied, None)
                .await
                .expect("Failed to deny payment");
        }
    }

    // repeat_no_show + repeat_denied_payment + new_account crosses the
    // HIGH threshold, so the booking lands under a review hold.
    let room = common::create_room(&pool).await;
    let held = manager
        .create_reservation(common::booking_request(room.id, client_id, 30))
        .await
        .expect("Failed to create reservation");
    assert!(held.review_hold_until.is_some());

    common::approve_payment(&payments, held.id, dec!(300)).await;
    let err = manager.confirm(held.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    common::cleanup_test_data(&pool).await;
}
