pub mod availability;
pub mod fraud;
pub mod lifecycle;
pub mod payments;
pub mod points_ledger;
pub mod policy;
pub mod redemption;

pub use availability::{intervals_overlap, stay_interval, Availability, AvailabilityResolver};
pub use fraud::{FraudScorer, FraudSignals};
pub use lifecycle::{
    CancellationOutcome, CheckOutOutcome, CreateReservationRequest, LifecycleManager,
    NoShowOutcome,
};
pub use payments::{PaymentReconciliationJob, PaymentService};
pub use points_ledger::PointsLedger;
pub use policy::{CancellationEngine, RefundQuote};
pub use redemption::{RedemptionOutcome, RedemptionService};
