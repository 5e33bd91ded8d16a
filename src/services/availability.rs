use crate::config::BookingSettings;
use crate::error::Result;
use crate::repositories::ReservationRepository;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Result of an availability check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    pub conflicts: Vec<Uuid>,
}

/// Two intervals conflict iff start1 < end2 AND end1 > start2.
pub fn intervals_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && end1 > start2
}

/// Builds the nominal stay interval from the stay dates and the configured
/// check-in/check-out hours. Check-in and check-out are distinct nominal
/// times, not midnight boundaries: a same-day 11:00 checkout never
/// conflicts with a 14:00 check-in.
pub fn stay_interval(
    check_in_date: NaiveDate,
    check_out_date: NaiveDate,
    booking: &BookingSettings,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = nominal_datetime(check_in_date, booking.check_in_hour);
    let end = nominal_datetime(check_out_date, booking.check_out_hour);
    (start, end)
}

fn nominal_datetime(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = date
        .and_hms_opt(hour.min(23), 0, 0)
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN));
    Utc.from_utc_datetime(&time)
}

/// Read-side resolver for room availability. The fast-fail layer before
/// the allocation lock and the in-transaction conflict re-check.
pub struct AvailabilityResolver {
    reservations: ReservationRepository,
}

impl AvailabilityResolver {
    pub fn new(pool: PgPool) -> Self {
        Self {
            reservations: ReservationRepository::new(pool),
        }
    }

    /// Checks whether a room is free of occupying reservations over
    /// [start, end), optionally excluding one reservation (rebooking paths).
    pub async fn is_available(
        &self,
        room_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_reservation_id: Option<Uuid>,
    ) -> Result<Availability> {
        let conflicts = self
            .reservations
            .find_conflicts(room_id, start, end, exclude_reservation_id)
            .await?;

        Ok(Availability {
            available: conflicts.is_empty(),
            conflicts: conflicts.into_iter().map(|r| r.id).collect(),
        })
    }
}
