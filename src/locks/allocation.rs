use crate::error::{AppError, Result};
use crate::observability::metrics;
use chrono::{DateTime, Datelike, Utc};
use redis::AsyncCommands;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Configuration for the room allocation lock.
#[derive(Debug, Clone)]
pub struct AllocationLockConfig {
    pub key_prefix: String,
    /// Bounded total wait for acquisition.
    pub acquire_timeout: Duration,
    /// Delay between acquisition attempts.
    pub retry_delay: Duration,
    /// Lease applied to held keys so a crashed holder cannot wedge the
    /// room forever.
    pub lease: Duration,
}

impl Default for AllocationLockConfig {
    fn default() -> Self {
        Self {
            key_prefix: "alloc".to_string(),
            acquire_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_millis(100),
            lease: Duration::from_secs(30),
        }
    }
}

/// Distributed exclusive lock keyed by (room, month bucket), held for the
/// duration of an availability check plus write. Redis SET NX PX with a
/// per-holder token; correctness must hold across service instances, so
/// process-local memory is never used.
///
/// This is the cheap fast-fail layer. The database conflict re-check inside
/// the write transaction is the second, authoritative layer.
pub struct RoomAllocationLock {
    client: redis::Client,
    config: AllocationLockConfig,
}

impl RoomAllocationLock {
    pub fn new(client: redis::Client, config: AllocationLockConfig) -> Self {
        Self { client, config }
    }

    /// Keys for every month bucket the stay interval touches, in sorted
    /// order so concurrent multi-bucket acquirers cannot deadlock.
    fn bucket_keys(&self, room_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
        let mut keys = Vec::new();
        let (mut year, mut month) = (start.year(), start.month());
        loop {
            keys.push(format!(
                "{}:{}:{:04}{:02}",
                self.config.key_prefix, room_id, year, month
            ));
            let past_end = year > end.year() || (year == end.year() && month >= end.month());
            if past_end {
                break;
            }
            if month == 12 {
                year += 1;
                month = 1;
            } else {
                month += 1;
            }
        }
        keys
    }

    /// Acquires the allocation lock for a room over a stay interval.
    /// Bounded wait; on timeout the caller receives a retryable
    /// `ConcurrencyConflict`, never a silent partial state.
    pub async fn acquire(
        &self,
        room_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AllocationGuard> {
        let keys = self.bucket_keys(room_id, start, end);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.config.acquire_timeout;
        let lease_ms = self.config.lease.as_millis() as u64;

        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        loop {
            let mut held: Vec<&str> = Vec::with_capacity(keys.len());
            let mut all_acquired = true;

            for key in &keys {
                let set: Option<String> = conn
                    .set_options(
                        key,
                        token.as_str(),
                        redis::SetOptions::default()
                            .conditional_set(redis::ExistenceCheck::NX)
                            .with_expiration(redis::SetExpiry::PX(lease_ms as usize)),
                    )
                    .await
                    .map_err(AppError::Redis)?;

                if set.is_some() {
                    held.push(key);
                } else {
                    all_acquired = false;
                    break;
                }
            }

            if all_acquired {
                return Ok(AllocationGuard {
                    client: self.client.clone(),
                    keys,
                    token,
                    released: false,
                });
            }

            // Partial acquisition: give back what we took before retrying.
            for key in held {
                release_if_owner(&mut conn, key, &token).await?;
            }

            if Instant::now() + self.config.retry_delay >= deadline {
                metrics::record_lock_timeout();
                return Err(AppError::ConcurrencyConflict(format!(
                    "allocation lock for room {} not acquired within {:?}",
                    room_id, self.config.acquire_timeout
                )));
            }

            tokio::time::sleep(self.config.retry_delay).await;
        }
    }
}

/// A held allocation lock. Must be released on every exit path; release is
/// explicit because it needs the async connection. An unreleased guard
/// expires with the lease and logs a warning on drop.
pub struct AllocationGuard {
    client: redis::Client,
    keys: Vec<String>,
    token: String,
    released: bool,
}

impl AllocationGuard {
    /// Releases every held bucket key. Only keys still owned by this
    /// guard's token are deleted.
    pub async fn release(mut self) -> Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        for key in &self.keys {
            release_if_owner(&mut conn, key, &self.token).await?;
        }
        self.released = true;
        Ok(())
    }
}

impl Drop for AllocationGuard {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                keys = ?self.keys,
                "allocation lock dropped without release; lease will expire it"
            );
        }
    }
}

/// Compare-and-delete so one holder can never release another's lock.
async fn release_if_owner(
    conn: &mut redis::aio::MultiplexedConnection,
    key: &str,
    token: &str,
) -> Result<()> {
    let script = redis::Script::new(
        r#"
        if redis.call("GET", KEYS[1]) == ARGV[1] then
            return redis.call("DEL", KEYS[1])
        else
            return 0
        end
        "#,
    );
    let _: i64 = script
        .key(key)
        .arg(token)
        .invoke_async(conn)
        .await
        .map_err(AppError::Redis)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lock() -> RoomAllocationLock {
        let client = redis::Client::open("redis://localhost:6379").unwrap();
        RoomAllocationLock::new(client, AllocationLockConfig::default())
    }

    #[test]
    fn test_single_month_stay_locks_one_bucket() {
        let room_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 14, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 12, 11, 0, 0).unwrap();

        let keys = lock().bucket_keys(room_id, start, end);
        assert_eq!(keys, vec![format!("alloc:{}:202401", room_id)]);
    }

    #[test]
    fn test_cross_month_stay_locks_both_buckets() {
        let room_id = Uuid::new_v4();
        let start = Utc.with_ymd_and_hms(2024, 1, 30, 14, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 2, 11, 0, 0).unwrap();

        let keys = lock().bucket_keys(room_id, start, end);
        assert_eq!(keys.len(), 2);
        assert!(keys[0].ends_with("202401"));
        assert!(keys[1].ends_with("202402"));
    }

    #[test]
    fn test_year_rollover() {
        let room_id = Uuid::new_v4();
        let start = Utc.with_ymd_and_hms(2024, 12, 30, 14, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 2, 11, 0, 0).unwrap();

        let keys = lock().bucket_keys(room_id, start, end);
        assert_eq!(keys.len(), 2);
        assert!(keys[0].ends_with("202412"));
        assert!(keys[1].ends_with("202501"));
    }
}
