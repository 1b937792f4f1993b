//! Reset window arithmetic. Everything here is pure and works in UTC, the
//! zone task creation times are stored in.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};
use crate::errors::{PurgeError, PurgeResult};
use crate::models::User;

/// A validated daily reset time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetTime {
    time: NaiveTime,
}

impl ResetTime {
    pub fn new(hour: u32, minute: u32) -> PurgeResult<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(|time| Self { time })
            .ok_or(PurgeError::InvalidResetConfiguration { hour, minute })
    }

    pub fn of_user(user: &User) -> PurgeResult<Self> {
        Self::new(user.reset_hour, user.reset_minute)
    }

    pub fn hour(&self) -> u32 {
        self.time.hour()
    }

    pub fn minute(&self) -> u32 {
        self.time.minute()
    }

    /// The most recent occurrence of this time of day at or before `now`.
    pub fn boundary_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let candidate = Utc.from_utc_datetime(&now.date_naive().and_time(self.time));
        if now < candidate {
            candidate - Duration::days(1)
        } else {
            candidate
        }
    }

    /// The first occurrence strictly after `now`.
    pub fn next_reset_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.boundary_at(now) + Duration::days(1)
    }
}

/// Most recently passed reset boundary for a `reset_hour:reset_minute`
/// configuration. Reaching the reset minute exactly counts as passed.
pub fn compute_boundary(
    now: DateTime<Utc>,
    reset_hour: u32,
    reset_minute: u32,
) -> PurgeResult<DateTime<Utc>> {
    Ok(ResetTime::new(reset_hour, reset_minute)?.boundary_at(now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn exact_reset_minute_counts_as_passed() {
        let now = at(2024, 6, 15, 22, 0, 0);
        assert_eq!(compute_boundary(now, 22, 0).unwrap(), now);
    }

    #[test]
    fn one_minute_early_falls_back_to_yesterday() {
        let now = at(2024, 6, 15, 21, 59, 0);
        assert_eq!(compute_boundary(now, 22, 0).unwrap(), at(2024, 6, 14, 22, 0, 0));
    }

    #[test]
    fn morning_check_sees_last_nights_reset() {
        let now = at(2024, 1, 2, 6, 0, 0);
        assert_eq!(compute_boundary(now, 22, 0).unwrap(), at(2024, 1, 1, 22, 0, 0));
    }

    #[test]
    fn rolls_back_across_year_and_month_ends() {
        assert_eq!(
            compute_boundary(at(2024, 1, 1, 0, 10, 0), 23, 30).unwrap(),
            at(2023, 12, 31, 23, 30, 0)
        );
        assert_eq!(
            compute_boundary(at(2024, 3, 1, 5, 0, 0), 6, 0).unwrap(),
            at(2024, 2, 29, 6, 0, 0)
        );
        assert_eq!(
            compute_boundary(at(2023, 3, 1, 5, 0, 0), 6, 0).unwrap(),
            at(2023, 2, 28, 6, 0, 0)
        );
    }

    #[test]
    fn seconds_and_subseconds_are_dropped_from_the_boundary() {
        let now = at(2024, 6, 15, 9, 30, 42) + Duration::milliseconds(250);
        assert_eq!(compute_boundary(now, 9, 30).unwrap(), at(2024, 6, 15, 9, 30, 0));
    }

    #[test]
    fn boundary_is_never_after_now_and_is_deterministic() {
        let start = at(2024, 12, 30, 0, 0, 0);
        for step in 0..(72 * 4) {
            let now = start + Duration::minutes(step * 15 + 7);
            for (hour, minute) in [(0, 0), (6, 45), (12, 0), (22, 0), (23, 59)] {
                let first = compute_boundary(now, hour, minute).unwrap();
                let second = compute_boundary(now, hour, minute).unwrap();
                assert_eq!(first, second);
                assert!(first <= now);
                assert!(now - first < Duration::days(1));
            }
        }
    }

    #[test]
    fn out_of_range_configuration_is_rejected() {
        let now = at(2024, 6, 15, 12, 0, 0);
        assert_eq!(
            compute_boundary(now, 24, 0),
            Err(PurgeError::InvalidResetConfiguration { hour: 24, minute: 0 })
        );
        assert_eq!(
            compute_boundary(now, 3, 60),
            Err(PurgeError::InvalidResetConfiguration { hour: 3, minute: 60 })
        );
    }

    #[test]
    fn next_reset_is_a_day_after_the_boundary() {
        let reset = ResetTime::new(22, 0).unwrap();
        let now = at(2024, 1, 2, 6, 0, 0);
        assert_eq!(reset.next_reset_after(now), at(2024, 1, 2, 22, 0, 0));
    }
}
