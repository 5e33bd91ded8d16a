pub mod fraud;
pub mod payment;
pub mod points;
pub mod reservation;
pub mod reward;
pub mod room;

pub use fraud::{FraudAssessment, RiskTier};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use points::{PointsAccount, PointsOrigin, PointsTransaction};
pub use reservation::{
    CancellationPolicy, FinancialStatus, LifecycleEvent, Reservation, ReservationStateMachine,
    ReservationStatus,
};
pub use reward::{RedemptionStatus, Reward, RewardRedemption};
pub use room::{Room, RoomStatus};
