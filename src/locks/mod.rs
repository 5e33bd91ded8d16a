pub mod allocation;

pub use allocation::{AllocationGuard, AllocationLockConfig, RoomAllocationLock};
