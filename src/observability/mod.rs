pub mod audit;
pub mod logging;
pub mod metrics;

pub use audit::AuditEvent;
pub use logging::{init_logging, mask_idempotency_key, mask_sensitive, LogConfig, LogFormat};
