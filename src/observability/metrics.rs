use metrics::{counter, histogram};

/// Counts a completed lifecycle transition.
pub fn record_transition(event: &str) {
    counter!("reservation_transitions_total", "event" => event.to_string()).increment(1);
}

/// Counts a guard rejection by error kind.
pub fn record_guard_rejection(kind: &str) {
    counter!("reservation_guard_rejections_total", "kind" => kind.to_string()).increment(1);
}

/// Counts an allocation lock acquisition timeout.
pub fn record_lock_timeout() {
    counter!("allocation_lock_timeouts_total").increment(1);
}

/// Counts a payment gateway failure.
pub fn record_gateway_failure(operation: &str) {
    counter!("payment_gateway_failures_total", "operation" => operation.to_string()).increment(1);
}

/// Counts a duplicate payment request resolved idempotently.
pub fn record_duplicate_payment() {
    counter!("payment_duplicates_total").increment(1);
}

/// Counts a failed best-effort notification dispatch.
pub fn record_notification_failure() {
    counter!("notification_failures_total").increment(1);
}

/// Records the duration of a ledger transaction in milliseconds.
pub fn record_ledger_write_latency(duration_ms: f64) {
    histogram!("points_ledger_write_duration_ms").record(duration_ms);
}
