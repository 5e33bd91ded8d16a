pub mod payment_repository;
pub mod points_repository;
pub mod reservation_repository;
pub mod reward_repository;
pub mod room_repository;

pub use payment_repository::PaymentRepository;
pub use points_repository::PointsRepository;
pub use reservation_repository::ReservationRepository;
pub use reward_repository::RewardRepository;
pub use room_repository::RoomRepository;
