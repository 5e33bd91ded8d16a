use crate::config::PaymentSettings;
use crate::error::{AppError, Result};
use crate::gateway::{GatewayStatus, PaymentGateway, PaymentInstrument};
use crate::models::{Payment, PaymentMethod, PaymentStatus};
use crate::observability::{audit::AuditEvent, logging::mask_idempotency_key, metrics};
use crate::repositories::{PaymentRepository, ReservationRepository};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Records and settles payments. Creation is idempotent on the client or
/// server generated key; a secondary window guard catches keyless
/// retries. All status moves funnel through `update_status`, and gateway
/// calls always happen outside locks and transactions.
pub struct PaymentService {
    payments: PaymentRepository,
    reservations: ReservationRepository,
    gateway: Arc<dyn PaymentGateway>,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(pool: PgPool, gateway: Arc<dyn PaymentGateway>, settings: PaymentSettings) -> Self {
        Self {
            payments: PaymentRepository::new(pool.clone()),
            reservations: ReservationRepository::new(pool),
            gateway,
            settings,
        }
    }

    pub fn payments(&self) -> &PaymentRepository {
        &self.payments
    }

    /// Records a pending payment. Replays with the same idempotency key
    /// return the stored row; a second keyless request with the same
    /// reservation, amount and method inside the duplicate window is
    /// rejected.
    pub async fn create_payment(
        &self,
        reservation_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
        idempotency_key: Option<String>,
    ) -> Result<Payment> {
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "payment amount must be positive".to_string(),
            ));
        }

        let reservation = self
            .reservations
            .find_by_id(reservation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("reservation {} not found", reservation_id))
            })?;
        if reservation.status.is_terminal() {
            return Err(AppError::Validation(format!(
                "reservation {} is closed and accepts no payments",
                reservation_id
            )));
        }

        let key = match idempotency_key {
            Some(key) => {
                if let Some(existing) = self.payments.find_by_idempotency_key(&key).await? {
                    if existing.reservation_id != reservation_id
                        || existing.amount != amount
                        || existing.method != method
                    {
                        return Err(AppError::Validation(format!(
                            "idempotency key {} was already used with different attributes",
                            mask_idempotency_key(&key)
                        )));
                    }
                    metrics::record_duplicate_payment();
                    tracing::info!(
                        payment_id = %existing.id,
                        key = %mask_idempotency_key(&key),
                        "Replayed payment request resolved to existing record"
                    );
                    return Ok(existing);
                }
                key
            }
            None => generate_idempotency_key(reservation_id, amount, method),
        };

        if let Some(duplicate) = self
            .payments
            .find_recent_duplicate(
                reservation_id,
                amount,
                method,
                self.settings.duplicate_window_secs,
            )
            .await?
        {
            if duplicate.idempotency_key != key {
                metrics::record_duplicate_payment();
                return Err(AppError::DuplicatePayment {
                    reservation_id,
                    amount,
                    method: format!("{:?}", method),
                });
            }
        }

        let payment = Payment::new(reservation_id, amount, method, key);
        let (stored, inserted) = self.payments.insert_idempotent(&payment).await?;

        if inserted {
            AuditEvent::PaymentRecorded {
                payment_id: stored.id,
                reservation_id,
                amount,
            }
            .record();
            tracing::info!(
                payment_id = %stored.id,
                reservation_id = %reservation_id,
                amount = %amount,
                "Payment recorded"
            );
        } else {
            metrics::record_duplicate_payment();
        }

        Ok(stored)
    }

    /// Records a payment and settles it against the gateway. Before the
    /// gateway call the payment is claimed with a guarded PENDING ->
    /// PROCESSING move, so concurrent charges with the same key produce
    /// exactly one gateway request; the loser returns the stored record.
    /// The gateway call carries no lock and no open transaction, and a
    /// gateway failure releases the claim back to PENDING so the caller
    /// can retry with the same key.
    pub async fn charge(
        &self,
        reservation_id: Uuid,
        amount: Decimal,
        instrument: &PaymentInstrument,
        idempotency_key: Option<String>,
    ) -> Result<Payment> {
        let payment = self
            .create_payment(reservation_id, amount, instrument.method, idempotency_key)
            .await?;

        // A replay that already settled must not hit the gateway again.
        if payment.status != PaymentStatus::Pending {
            return Ok(payment);
        }

        let claimed = self
            .payments
            .update_status(
                payment.id,
                PaymentStatus::Pending,
                PaymentStatus::Processing,
                None,
            )
            .await?;
        if claimed.is_none() {
            // Another charger holds or held the claim.
            metrics::record_duplicate_payment();
            tracing::info!(
                payment_id = %payment.id,
                "Concurrent charge lost the claim, returning stored payment"
            );
            return self
                .payments
                .find_by_id(payment.id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("payment {} not found", payment.id)));
        }

        let charge = match self
            .gateway
            .charge(amount, instrument, &payment.idempotency_key)
            .await
        {
            Ok(charge) => charge,
            Err(e) => {
                metrics::record_gateway_failure("charge");
                self.payments
                    .update_status(
                        payment.id,
                        PaymentStatus::Processing,
                        PaymentStatus::Pending,
                        None,
                    )
                    .await?;
                return Err(e);
            }
        };

        let next = match charge.status {
            GatewayStatus::Approved => PaymentStatus::Approved,
            GatewayStatus::Declined => PaymentStatus::Denied,
        };

        self.update_status(payment.id, next, Some(&charge.gateway_ref))
            .await
    }

    /// The single path for payment status moves. Validates the move
    /// against the status machine and applies it guarded by the current
    /// status, so a racing writer loses cleanly.
    pub async fn update_status(
        &self,
        payment_id: Uuid,
        to: PaymentStatus,
        gateway_ref: Option<&str>,
    ) -> Result<Payment> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment {} not found", payment_id)))?;

        if !payment.status.can_move_to(to) {
            return Err(AppError::Validation(format!(
                "payment cannot move from {:?} to {:?}",
                payment.status, to
            )));
        }

        let updated = self
            .payments
            .update_status(payment_id, payment.status, to, gateway_ref)
            .await?
            .ok_or_else(|| {
                AppError::ConcurrencyConflict(format!(
                    "payment {} status changed concurrently",
                    payment_id
                ))
            })?;

        AuditEvent::PaymentStatusChanged {
            payment_id,
            from: format!("{:?}", payment.status),
            to: format!("{:?}", to),
        }
        .record();

        Ok(updated)
    }

    /// Sweeps payments stuck in PENDING or PROCESSING past the configured
    /// expiry to DENIED. Returns the number of payments expired.
    pub async fn run_reconciliation(&self) -> Result<usize> {
        let expired = self
            .payments
            .expire_stale_pending(self.settings.pending_expiry_hours)
            .await?;

        for payment in &expired {
            AuditEvent::PaymentExpired {
                payment_id: payment.id,
                reservation_id: payment.reservation_id,
            }
            .record();
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired stale pending payments");
        }

        Ok(expired.len())
    }
}

/// Server-side idempotency key: a salted hash over the payment attributes.
/// The random nonce keeps distinct requests distinct; retry collapsing for
/// keyless clients is the duplicate window's job, not the key's.
pub fn generate_idempotency_key(
    reservation_id: Uuid,
    amount: Decimal,
    method: PaymentMethod,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(reservation_id.as_bytes());
    hasher.update(amount.to_string().as_bytes());
    hasher.update(format!("{:?}", method).as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    let digest = hasher.finalize();
    format!("pay_{}", &hex::encode(digest)[..32])
}

/// Periodic sweep that expires stale pending payments so forecast totals
/// do not carry dead weight.
pub struct PaymentReconciliationJob {
    service: Arc<PaymentService>,
    interval_secs: u64,
}

impl PaymentReconciliationJob {
    pub fn new(service: Arc<PaymentService>, interval_secs: u64) -> Self {
        Self {
            service,
            interval_secs,
        }
    }

    /// Spawns the sweep loop. Runs until the handle is aborted.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(self.interval_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if let Err(e) = self.service.run_reconciliation().await {
                    tracing::error!(error = %e, "Payment reconciliation sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_generated_keys_are_unique_per_request() {
        let reservation_id = Uuid::new_v4();
        let a = generate_idempotency_key(reservation_id, dec!(300), PaymentMethod::Pix);
        let b = generate_idempotency_key(reservation_id, dec!(300), PaymentMethod::Pix);
        assert_ne!(a, b);
        assert!(a.starts_with("pay_"));
        assert_eq!(a.len(), 4 + 32);
    }
}
