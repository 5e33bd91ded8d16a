use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub application: ApplicationSettings,
    #[serde(default)]
    pub booking: BookingSettings,
    #[serde(default)]
    pub payments: PaymentSettings,
    #[serde(default)]
    pub policies: PolicySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub log_level: String,
}

/// Rules governing the reservation lifecycle. All thresholds are
/// configuration with the documented defaults, not frozen business logic.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingSettings {
    /// Nominal check-in hour (UTC) used to build planned stay intervals.
    pub check_in_hour: u32,
    /// Nominal check-out hour (UTC).
    pub check_out_hour: u32,
    /// Bounded wait for the room allocation lock, in seconds.
    pub lock_timeout_secs: u64,
    /// Delay between allocation lock acquisition attempts, in milliseconds.
    pub lock_retry_ms: u64,
    /// Lease applied to a held allocation lock, in seconds.
    pub lock_lease_secs: u64,
    /// Minimum approved-payment share of the forecast total to CONFIRM.
    pub deposit_pct: u32,
    /// Minimum approved-payment share of the forecast total to CHECK_IN.
    pub check_in_pct: u32,
    /// Outstanding-balance rounding tolerance at CHECK_OUT.
    pub balance_tolerance: rust_decimal::Decimal,
    /// One loyalty point is credited per this many currency units paid.
    pub points_divisor: u32,
    /// Grace window after the planned check-in before NO_SHOW, in hours.
    pub no_show_grace_hours: i64,
    /// Manual-review hold applied to HIGH-risk reservations, in hours.
    pub review_hold_hours: i64,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            check_in_hour: 14,
            check_out_hour: 11,
            lock_timeout_secs: 10,
            lock_retry_ms: 100,
            lock_lease_secs: 30,
            deposit_pct: 30,
            check_in_pct: 80,
            balance_tolerance: rust_decimal::Decimal::new(1, 2),
            points_divisor: 10,
            no_show_grace_hours: 2,
            review_hold_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSettings {
    /// Secondary duplicate-detection window for keyless retries, in seconds.
    pub duplicate_window_secs: i64,
    /// Age after which a still-pending payment is swept to DENIED, in hours.
    pub pending_expiry_hours: i64,
    /// Interval between reconciliation sweeps, in seconds.
    pub reconciliation_interval_secs: u64,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            duplicate_window_secs: 300,
            pending_expiry_hours: 24,
            reconciliation_interval_secs: 3600,
        }
    }
}

/// One penalty tier: applies when at least `min_hours` remain before the
/// planned check-in. Tables are evaluated in descending `min_hours` order.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyTier {
    pub min_hours: i64,
    pub retained_pct: u32,
}

impl PolicyTier {
    pub fn new(min_hours: i64, retained_pct: u32) -> Self {
        Self {
            min_hours,
            retained_pct,
        }
    }
}

/// Cancellation penalty tables per policy tag.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySettings {
    pub flexible: Vec<PolicyTier>,
    pub moderate: Vec<PolicyTier>,
    pub strict: Vec<PolicyTier>,
    pub non_refundable: Vec<PolicyTier>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            flexible: vec![PolicyTier::new(24, 0), PolicyTier::new(0, 50)],
            moderate: vec![
                PolicyTier::new(48, 0),
                PolicyTier::new(24, 30),
                PolicyTier::new(0, 70),
            ],
            strict: vec![
                PolicyTier::new(72, 20),
                PolicyTier::new(24, 60),
                PolicyTier::new(0, 90),
            ],
            non_refundable: vec![PolicyTier::new(0, 100)],
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
