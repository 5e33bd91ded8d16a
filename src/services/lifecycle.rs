use crate::config::{BookingSettings, PolicySettings};
use crate::error::{AppError, Result};
use crate::gateway::{GatewayStatus, PaymentGateway};
use crate::locks::{AllocationLockConfig, RoomAllocationLock};
use crate::models::{
    CancellationPolicy, FinancialStatus, LifecycleEvent, Payment, Reservation,
    ReservationStateMachine, ReservationStatus, Room, RoomStatus,
};
use crate::notifications::{dispatch_best_effort, NotificationDispatcher, NotificationEvent};
use crate::observability::{audit::AuditEvent, metrics};
use crate::repositories::{
    PaymentRepository, PointsRepository, ReservationRepository, RoomRepository,
};
use crate::services::availability::{stay_interval, AvailabilityResolver};
use crate::services::fraud::{FraudScorer, FraudSignals};
use crate::services::points_ledger;
use crate::services::policy::CancellationEngine;
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

/// Request to open a reservation. Stay boundaries arrive as dates; the
/// manager expands them to nominal instants with the configured hours.
#[derive(Debug, Clone)]
pub struct CreateReservationRequest {
    pub room_id: Uuid,
    pub client_id: Uuid,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub daily_rate: Decimal,
    pub policy: CancellationPolicy,
}

/// Result of a completed check-out.
#[derive(Debug, Clone)]
pub struct CheckOutOutcome {
    pub reservation: Reservation,
    pub points_credited: i64,
}

/// Result of a committed cancellation, including how the refund landed.
#[derive(Debug, Clone)]
pub struct CancellationOutcome {
    pub reservation: Reservation,
    pub penalty: Decimal,
    pub refund: Decimal,
    pub refunded: Decimal,
    pub manual_refund_required: bool,
}

/// Result of recording a no-show, including how any refundable excess
/// landed.
#[derive(Debug, Clone)]
pub struct NoShowOutcome {
    pub reservation: Reservation,
    pub retained: Decimal,
    pub refunded: Decimal,
    pub manual_refund_required: bool,
}

/// Owns every reservation status write. All transitions are guarded by the
/// state machine plus per-operation conditions, applied under a row lock
/// on the reservation (and its room where the room changes). Lock order is
/// always room, then reservation, then points account.
pub struct LifecycleManager {
    pool: PgPool,
    booking: BookingSettings,
    reservations: ReservationRepository,
    rooms: RoomRepository,
    payments: PaymentRepository,
    points: PointsRepository,
    availability: AvailabilityResolver,
    cancellation: CancellationEngine,
    allocation_lock: RoomAllocationLock,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl LifecycleManager {
    pub fn new(
        pool: PgPool,
        redis_client: redis::Client,
        booking: BookingSettings,
        policies: PolicySettings,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        let lock_config = AllocationLockConfig {
            acquire_timeout: std::time::Duration::from_secs(booking.lock_timeout_secs),
            retry_delay: std::time::Duration::from_millis(booking.lock_retry_ms),
            lease: std::time::Duration::from_secs(booking.lock_lease_secs),
            ..AllocationLockConfig::default()
        };

        Self {
            reservations: ReservationRepository::new(pool.clone()),
            rooms: RoomRepository::new(pool.clone()),
            payments: PaymentRepository::new(pool.clone()),
            points: PointsRepository::new(pool.clone()),
            availability: AvailabilityResolver::new(pool.clone()),
            cancellation: CancellationEngine::new(policies),
            allocation_lock: RoomAllocationLock::new(redis_client, lock_config),
            pool,
            booking,
            gateway,
            notifier,
        }
    }

    pub fn reservations(&self) -> &ReservationRepository {
        &self.reservations
    }

    /// Opens a PENDING reservation. The room is protected twice: the
    /// distributed allocation lock serializes concurrent bookers across
    /// instances, and the conflict re-check inside the insert transaction
    /// is the authoritative backstop.
    pub async fn create_reservation(&self, req: CreateReservationRequest) -> Result<Reservation> {
        if req.check_out_date <= req.check_in_date {
            return Err(AppError::Validation(
                "check-out date must be after check-in date".to_string(),
            ));
        }
        if req.daily_rate <= Decimal::ZERO {
            return Err(AppError::Validation(
                "daily rate must be positive".to_string(),
            ));
        }

        let room = self
            .rooms
            .find_by_id(req.room_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("room {} not found", req.room_id)))?;
        if matches!(room.status, RoomStatus::Blocked | RoomStatus::Maintenance) {
            return Err(AppError::Validation(format!(
                "room {} is not bookable ({:?})",
                room.number, room.status
            )));
        }

        let nights = (req.check_out_date - req.check_in_date).num_days() as i32;
        let (start, end) = stay_interval(req.check_in_date, req.check_out_date, &self.booking);

        let mut reservation = Reservation::new(
            req.room_id,
            req.client_id,
            req.policy,
            start,
            end,
            req.daily_rate,
            nights,
        );

        // Risk assessment runs on plain reads before any lock is taken.
        let signals = self.gather_fraud_signals(&reservation).await?;
        let assessment = FraudScorer::assess(reservation.id, req.client_id, &signals);
        if assessment.requires_manual_review() {
            reservation.review_hold_until =
                Some(Utc::now() + Duration::hours(self.booking.review_hold_hours));
            tracing::warn!(
                reservation_id = %reservation.id,
                score = assessment.score,
                rules = ?assessment.triggered_rules,
                "High-risk reservation placed under manual review hold"
            );
        }

        let guard = self.allocation_lock.acquire(req.room_id, start, end).await?;
        let result = self.persist_reservation(&reservation).await;
        if let Err(e) = guard.release().await {
            tracing::warn!(error = %e, "allocation lock release failed; lease will expire it");
        }
        let reservation = result?;

        AuditEvent::ReservationCreated {
            reservation_id: reservation.id,
            room_id: reservation.room_id,
            client_id: reservation.client_id,
        }
        .record();
        metrics::record_transition("create");
        tracing::info!(
            reservation_id = %reservation.id,
            room_id = %reservation.room_id,
            nights = reservation.nights,
            "Reservation created"
        );

        Ok(reservation)
    }

    async fn persist_reservation(&self, reservation: &Reservation) -> Result<Reservation> {
        let availability = self
            .availability
            .is_available(
                reservation.room_id,
                reservation.planned_check_in,
                reservation.planned_check_out,
                None,
            )
            .await?;
        if !availability.available {
            metrics::record_guard_rejection("room_unavailable");
            return Err(AppError::RoomUnavailable {
                conflicts: availability.conflicts,
            });
        }

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        // Authoritative re-check under the transaction; the allocation lock
        // alone is not trusted for correctness.
        let conflicts = conflicts_in_tx(
            &mut tx,
            reservation.room_id,
            reservation.planned_check_in,
            reservation.planned_check_out,
            None,
        )
        .await?;
        if !conflicts.is_empty() {
            metrics::record_guard_rejection("room_unavailable");
            return Err(AppError::RoomUnavailable { conflicts });
        }

        let stored = insert_reservation(&mut tx, reservation).await?;
        tx.commit().await.map_err(AppError::Database)?;

        Ok(stored)
    }

    /// PENDING -> CONFIRMED. Requires the deposit share of the forecast
    /// total in approved payments and no active review hold. Locks the
    /// room row before the reservation row: concurrent confirms (and
    /// check-ins) for a room serialize on that lock, so the conflict
    /// re-check below never runs on a stale read.
    pub async fn confirm(&self, reservation_id: Uuid) -> Result<Reservation> {
        let current = self
            .reservations
            .find_by_id(reservation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("reservation {} not found", reservation_id))
            })?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        lock_room(&mut tx, current.room_id).await?;
        let reservation = lock_reservation(&mut tx, reservation_id).await?;
        let target = ReservationStateMachine::fire(reservation.status, LifecycleEvent::Confirm)?;

        let now = Utc::now();
        if reservation.is_under_review_hold(now) {
            metrics::record_guard_rejection("review_hold");
            return Err(AppError::InvalidTransition(format!(
                "reservation is under manual review until {}",
                reservation
                    .review_hold_until
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default()
            )));
        }

        let paid = approved_total_in_tx(&mut tx, reservation_id).await?;
        let required = deposit_required(&reservation, self.booking.deposit_pct);
        if paid < required {
            metrics::record_guard_rejection("deposit_below_threshold");
            return Err(AppError::InvalidTransition(format!(
                "approved payments {} below the required deposit {}",
                paid, required
            )));
        }

        // Entering an occupying status: the overlap invariant is enforced
        // here, not only at creation, because two PENDING stays may overlap.
        let conflicts = conflicts_in_tx(
            &mut tx,
            reservation.room_id,
            reservation.planned_check_in,
            reservation.planned_check_out,
            Some(reservation_id),
        )
        .await?;
        if !conflicts.is_empty() {
            metrics::record_guard_rejection("room_unavailable");
            return Err(AppError::RoomUnavailable { conflicts });
        }

        let updated = update_reservation_status(
            &mut tx,
            reservation_id,
            target,
            Some(FinancialStatus::DepositPaid),
        )
        .await?;
        tx.commit().await.map_err(AppError::Database)?;

        self.finish_transition(&reservation, &updated, "confirm");
        dispatch_best_effort(
            self.notifier.as_ref(),
            NotificationEvent::ReservationConfirmed {
                reservation_id,
                client_id: updated.client_id,
            },
        )
        .await;

        Ok(updated)
    }

    /// CONFIRMED -> CHECKED_IN. Requires the check-in payment share, a
    /// free room and no conflicting occupying stay. Locks the room row
    /// before the reservation row.
    pub async fn check_in(&self, reservation_id: Uuid) -> Result<Reservation> {
        let current = self
            .reservations
            .find_by_id(reservation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("reservation {} not found", reservation_id))
            })?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let room = lock_room(&mut tx, current.room_id).await?;
        let reservation = lock_reservation(&mut tx, reservation_id).await?;
        let target = ReservationStateMachine::fire(reservation.status, LifecycleEvent::CheckIn)?;

        if !room.status.accepts_check_in() {
            metrics::record_guard_rejection("room_not_free");
            let occupants = occupying_checked_in(&mut tx, room.id).await?;
            return Err(AppError::RoomUnavailable {
                conflicts: occupants,
            });
        }

        let conflicts = conflicts_in_tx(
            &mut tx,
            reservation.room_id,
            reservation.planned_check_in,
            reservation.planned_check_out,
            Some(reservation_id),
        )
        .await?;
        if !conflicts.is_empty() {
            metrics::record_guard_rejection("room_unavailable");
            return Err(AppError::RoomUnavailable { conflicts });
        }

        let paid = approved_total_in_tx(&mut tx, reservation_id).await?;
        let required = reservation.forecast_total() * Decimal::from(self.booking.check_in_pct)
            / Decimal::from(100u32);
        if paid < required {
            metrics::record_guard_rejection("payment_below_check_in_threshold");
            return Err(AppError::InvalidTransition(format!(
                "approved payments {} below the {}% check-in threshold {}",
                paid, self.booking.check_in_pct, required
            )));
        }

        update_room_status(&mut tx, room.id, RoomStatus::Occupied).await?;
        let updated = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET status = $2, actual_check_in = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING id, room_id, client_id, status, financial_status, policy, planned_check_in, planned_check_out, actual_check_in, actual_check_out, daily_rate, nights, review_hold_until, created_at, updated_at
            "#,
        )
        .bind(reservation_id)
        .bind(target)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;
        tx.commit().await.map_err(AppError::Database)?;

        self.finish_transition(&reservation, &updated, "check_in");
        dispatch_best_effort(
            self.notifier.as_ref(),
            NotificationEvent::CheckInCompleted {
                reservation_id,
                room_id: updated.room_id,
            },
        )
        .await;

        Ok(updated)
    }

    /// CHECKED_IN -> CHECKED_OUT. Requires the outstanding balance within
    /// the rounding tolerance, frees the room and credits loyalty points.
    /// The credit is idempotent per reservation and lands in the same
    /// transaction as the status write.
    pub async fn check_out(&self, reservation_id: Uuid) -> Result<CheckOutOutcome> {
        let current = self
            .reservations
            .find_by_id(reservation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("reservation {} not found", reservation_id))
            })?;
        let account = self.points.get_or_create(current.client_id).await?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let room = lock_room(&mut tx, current.room_id).await?;
        let reservation = lock_reservation(&mut tx, reservation_id).await?;
        let target = ReservationStateMachine::fire(reservation.status, LifecycleEvent::CheckOut)?;

        let paid = approved_total_in_tx(&mut tx, reservation_id).await?;
        let outstanding = reservation.forecast_total() - paid;
        if outstanding > self.booking.balance_tolerance {
            metrics::record_guard_rejection("outstanding_balance");
            return Err(AppError::InvalidTransition(format!(
                "outstanding balance of {} must be settled before check-out",
                outstanding
            )));
        }

        let points_amount = (paid / Decimal::from(self.booking.points_divisor))
            .floor()
            .to_i64()
            .unwrap_or(0);
        let credited =
            points_ledger::credit_checkout(&mut tx, account.id, reservation_id, points_amount)
                .await?;

        update_room_status(&mut tx, room.id, RoomStatus::Free).await?;
        let updated = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET status = $2, financial_status = $3, actual_check_out = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING id, room_id, client_id, status, financial_status, policy, planned_check_in, planned_check_out, actual_check_in, actual_check_out, daily_rate, nights, review_hold_until, created_at, updated_at
            "#,
        )
        .bind(reservation_id)
        .bind(target)
        .bind(FinancialStatus::Settled)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;
        tx.commit().await.map_err(AppError::Database)?;

        self.finish_transition(&reservation, &updated, "check_out");
        let points_credited = credited.as_ref().map(|c| c.delta).unwrap_or(0);
        if let Some(entry) = &credited {
            AuditEvent::PointsCredited {
                account_id: entry.account_id,
                delta: entry.delta,
                balance_after: entry.balance_after,
                reservation_id: Some(reservation_id),
            }
            .record();
        }

        dispatch_best_effort(
            self.notifier.as_ref(),
            NotificationEvent::CheckOutCompleted {
                reservation_id,
                points_credited,
            },
        )
        .await;

        Ok(CheckOutOutcome {
            reservation: updated,
            points_credited,
        })
    }

    /// PENDING/CONFIRMED -> CANCELLED. The penalty is quoted from the
    /// policy table inside the transaction; refund execution happens after
    /// commit, outside any lock, and falls back to a manual flag when the
    /// gateway cannot complete it.
    pub async fn cancel(&self, reservation_id: Uuid) -> Result<CancellationOutcome> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let reservation = lock_reservation(&mut tx, reservation_id).await?;
        let target = ReservationStateMachine::fire(reservation.status, LifecycleEvent::Cancel)?;

        let paid = approved_total_in_tx(&mut tx, reservation_id).await?;
        let hours = reservation.hours_until_check_in(Utc::now());
        let quote = self.cancellation.quote(reservation.policy, hours, paid);

        let updated = update_reservation_status(&mut tx, reservation_id, target, None).await?;
        tx.commit().await.map_err(AppError::Database)?;

        self.finish_transition(&reservation, &updated, "cancel");
        tracing::info!(
            reservation_id = %reservation_id,
            penalty = %quote.penalty,
            refund = %quote.refund,
            explanation = %quote.explanation,
            "Reservation cancelled"
        );

        let (refunded, manual_refund_required) =
            self.execute_refund(&updated, quote.refund).await?;

        dispatch_best_effort(
            self.notifier.as_ref(),
            NotificationEvent::ReservationCancelled {
                reservation_id,
                penalty: quote.penalty,
                refund: quote.refund,
            },
        )
        .await;

        Ok(CancellationOutcome {
            reservation: updated,
            penalty: quote.penalty,
            refund: quote.refund,
            refunded,
            manual_refund_required,
        })
    }

    /// PENDING/CONFIRMED -> NO_SHOW, once the grace window past the
    /// planned check-in has elapsed. FLEXIBLE forfeits only the deposit
    /// share and the excess flows back through the refund path; stricter
    /// policies retain the full approved amount.
    pub async fn mark_no_show(&self, reservation_id: Uuid) -> Result<NoShowOutcome> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let reservation = lock_reservation(&mut tx, reservation_id).await?;
        let target = ReservationStateMachine::fire(reservation.status, LifecycleEvent::NoShow)?;

        let eligible_at =
            reservation.planned_check_in + Duration::hours(self.booking.no_show_grace_hours);
        if Utc::now() < eligible_at {
            metrics::record_guard_rejection("no_show_grace_window");
            return Err(AppError::InvalidTransition(format!(
                "no-show cannot be recorded before {}",
                eligible_at.to_rfc3339()
            )));
        }

        let paid = approved_total_in_tx(&mut tx, reservation_id).await?;
        let retained = match reservation.policy {
            CancellationPolicy::Flexible => {
                paid.min(deposit_required(&reservation, self.booking.deposit_pct))
            }
            _ => paid,
        };
        let refund = paid - retained;

        let updated = update_reservation_status(&mut tx, reservation_id, target, None).await?;
        tx.commit().await.map_err(AppError::Database)?;

        self.finish_transition(&reservation, &updated, "no_show");

        let (refunded, manual_refund_required) =
            self.execute_refund(&updated, refund).await?;

        dispatch_best_effort(
            self.notifier.as_ref(),
            NotificationEvent::NoShowRecorded {
                reservation_id,
                retained,
            },
        )
        .await;

        Ok(NoShowOutcome {
            reservation: updated,
            retained,
            refunded,
            manual_refund_required,
        })
    }

    /// Pushes the refundable portion back through the gateway, payment by
    /// payment. Anything the gateway cannot return (cash, missing
    /// reference, upstream failure, a payment that left APPROVED
    /// concurrently) is flagged for manual handling instead of being
    /// silently dropped.
    async fn execute_refund(
        &self,
        reservation: &Reservation,
        refund_total: Decimal,
    ) -> Result<(Decimal, bool)> {
        if refund_total <= Decimal::ZERO {
            return Ok((Decimal::ZERO, false));
        }

        let payments = self.payments.list_by_reservation(reservation.id).await?;
        let mut remaining = refund_total;
        let mut refunded = Decimal::ZERO;
        let mut manual = false;

        for payment in payments
            .iter()
            .filter(|p| p.status == crate::models::PaymentStatus::Approved)
        {
            if remaining <= Decimal::ZERO {
                break;
            }
            let portion = payment.amount.min(remaining);

            match self.refund_one(payment, portion).await {
                Ok(true) => {
                    refunded += portion;
                    remaining -= portion;
                }
                Ok(false) => manual = true,
                Err(e) => {
                    tracing::warn!(
                        payment_id = %payment.id,
                        error = %e,
                        "Gateway refund failed, flagging for manual handling"
                    );
                    manual = true;
                }
            }
        }

        // Any shortfall means some approved money could not be returned.
        if remaining > Decimal::ZERO {
            manual = true;
        }

        if refunded > Decimal::ZERO {
            AuditEvent::RefundExecuted {
                reservation_id: reservation.id,
                amount: refunded,
            }
            .record();
        }
        if manual {
            let amount = remaining;
            AuditEvent::ManualRefundFlagged {
                reservation_id: reservation.id,
                amount,
                reason: "gateway could not return the full refundable amount".to_string(),
            }
            .record();
            dispatch_best_effort(
                self.notifier.as_ref(),
                NotificationEvent::ManualRefundRequired {
                    reservation_id: reservation.id,
                    amount,
                    reason: "gateway could not return the full refundable amount".to_string(),
                },
            )
            .await;
        }

        Ok((refunded, manual))
    }

    /// Returns Ok(true) when the gateway returned the portion, Ok(false)
    /// when this payment needs manual handling.
    async fn refund_one(&self, payment: &Payment, portion: Decimal) -> Result<bool> {
        if !payment.method.supports_gateway_refund() {
            return Ok(false);
        }
        let gateway_ref = match &payment.gateway_ref {
            Some(r) => r,
            None => return Ok(false),
        };

        let result = self
            .gateway
            .refund(gateway_ref, portion)
            .await
            .map_err(|e| {
                metrics::record_gateway_failure("refund");
                e
            })?;

        if result.status != GatewayStatus::Approved {
            return Ok(false);
        }

        // Guarded move: if the payment left APPROVED while the gateway
        // call was in flight (a webhook raced us), no REFUNDED write
        // happened here and staff must reconcile by hand.
        let moved = self
            .payments
            .update_status(
                payment.id,
                crate::models::PaymentStatus::Approved,
                crate::models::PaymentStatus::Refunded,
                None,
            )
            .await?;
        if moved.is_none() {
            tracing::warn!(
                payment_id = %payment.id,
                "payment status changed during gateway refund; flagging for manual handling"
            );
            return Ok(false);
        }

        Ok(true)
    }

    async fn gather_fraud_signals(&self, reservation: &Reservation) -> Result<FraudSignals> {
        let history = self
            .reservations
            .list_by_client(reservation.client_id, 500)
            .await?;
        let denied_payments = self
            .payments
            .count_denied_for_client(reservation.client_id)
            .await?;

        let now = Utc::now();
        let account_age_days = history
            .iter()
            .map(|r| r.created_at)
            .min()
            .map(|first| (now - first).num_days())
            .unwrap_or(0);

        Ok(FraudSignals {
            total_reservations: history.len() as i64,
            cancelled_reservations: history
                .iter()
                .filter(|r| r.status == ReservationStatus::Cancelled)
                .count() as i64,
            no_shows: history
                .iter()
                .filter(|r| r.status == ReservationStatus::NoShow)
                .count() as i64,
            denied_payments,
            account_age_days,
            booking_amount: reservation.forecast_total(),
            hours_until_check_in: reservation.hours_until_check_in(now),
        })
    }

    fn finish_transition(&self, before: &Reservation, after: &Reservation, event: &str) {
        AuditEvent::LifecycleTransition {
            reservation_id: after.id,
            from: format!("{:?}", before.status),
            to: format!("{:?}", after.status),
        }
        .record();
        metrics::record_transition(event);
    }
}

fn deposit_required(reservation: &Reservation, deposit_pct: u32) -> Decimal {
    reservation.forecast_total() * Decimal::from(deposit_pct) / Decimal::from(100u32)
}

async fn lock_reservation(
    tx: &mut Transaction<'_, Postgres>,
    reservation_id: Uuid,
) -> Result<Reservation> {
    let row = sqlx::query_as::<_, Reservation>(
        r#"
        SELECT id, room_id, client_id, status, financial_status, policy, planned_check_in, planned_check_out, actual_check_in, actual_check_out, daily_rate, nights, review_hold_until, created_at, updated_at
        FROM reservations
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(reservation_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    row.ok_or_else(|| AppError::NotFound(format!("reservation {} not found", reservation_id)))
}

async fn lock_room(tx: &mut Transaction<'_, Postgres>, room_id: Uuid) -> Result<Room> {
    let row = sqlx::query_as::<_, Room>(
        r#"
        SELECT id, number, room_type, status, created_at, updated_at
        FROM rooms
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(room_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    row.ok_or_else(|| AppError::NotFound(format!("room {} not found", room_id)))
}

async fn conflicts_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    room_id: Uuid,
    start: chrono::DateTime<Utc>,
    end: chrono::DateTime<Utc>,
    exclude_reservation_id: Option<Uuid>,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id
        FROM reservations
        WHERE room_id = $1
          AND status IN ('CONFIRMED', 'CHECKED_IN')
          AND planned_check_in < $3
          AND planned_check_out > $2
          AND ($4::uuid IS NULL OR id != $4)
        "#,
    )
    .bind(room_id)
    .bind(start)
    .bind(end)
    .bind(exclude_reservation_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

async fn occupying_checked_in(
    tx: &mut Transaction<'_, Postgres>,
    room_id: Uuid,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM reservations WHERE room_id = $1 AND status = 'CHECKED_IN'
        "#,
    )
    .bind(room_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

async fn approved_total_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    reservation_id: Uuid,
) -> Result<Decimal> {
    let row: (Decimal,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM payments
        WHERE reservation_id = $1 AND status = 'APPROVED'
        "#,
    )
    .bind(reservation_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    Ok(row.0)
}

async fn insert_reservation(
    tx: &mut Transaction<'_, Postgres>,
    reservation: &Reservation,
) -> Result<Reservation> {
    let row = sqlx::query_as::<_, Reservation>(
        r#"
        INSERT INTO reservations
            (id, room_id, client_id, status, financial_status, policy, planned_check_in, planned_check_out, actual_check_in, actual_check_out, daily_rate, nights, review_hold_until, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING id, room_id, client_id, status, financial_status, policy, planned_check_in, planned_check_out, actual_check_in, actual_check_out, daily_rate, nights, review_hold_until, created_at, updated_at
        "#,
    )
    .bind(reservation.id)
    .bind(reservation.room_id)
    .bind(reservation.client_id)
    .bind(reservation.status)
    .bind(reservation.financial_status)
    .bind(reservation.policy)
    .bind(reservation.planned_check_in)
    .bind(reservation.planned_check_out)
    .bind(reservation.actual_check_in)
    .bind(reservation.actual_check_out)
    .bind(reservation.daily_rate)
    .bind(reservation.nights)
    .bind(reservation.review_hold_until)
    .bind(reservation.created_at)
    .bind(reservation.updated_at)
    .fetch_one(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    Ok(row)
}

async fn update_reservation_status(
    tx: &mut Transaction<'_, Postgres>,
    reservation_id: Uuid,
    status: ReservationStatus,
    financial_status: Option<FinancialStatus>,
) -> Result<Reservation> {
    let row = sqlx::query_as::<_, Reservation>(
        r#"
        UPDATE reservations
        SET status = $2, financial_status = COALESCE($3, financial_status), updated_at = NOW()
        WHERE id = $1
        RETURNING id, room_id, client_id, status, financial_status, policy, planned_check_in, planned_check_out, actual_check_in, actual_check_out, daily_rate, nights, review_hold_until, created_at, updated_at
        "#,
    )
    .bind(reservation_id)
    .bind(status)
    .bind(financial_status)
    .fetch_one(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    Ok(row)
}

async fn update_room_status(
    tx: &mut Transaction<'_, Postgres>,
    room_id: Uuid,
    status: RoomStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE rooms SET status = $2, updated_at = NOW() WHERE id = $1
        "#,
    )
    .bind(room_id)
    .bind(status)
    .execute(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    Ok(())
}
