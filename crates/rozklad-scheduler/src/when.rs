//! Next-occurrence math for recurring triggers.
//!
//! Pure civil-time functions: scan forward day by day in the bot
//! timezone and return the first matching instant strictly after
//! `after`. A day where the wall-clock time does not exist (DST gap)
//! contributes the first instant after the gap instead of being skipped.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::Recurrence;
use crate::clock::resolve_in_tz;

/// First instant strictly after `after` where the local clock in `tz`
/// reads `at`.
pub fn next_daily_occurrence(after: DateTime<Utc>, tz: Tz, at: NaiveTime) -> Option<DateTime<Utc>> {
    let local_date = after.with_timezone(&tz).date_naive();
    for offset in 0..=2 {
        let date = local_date + Duration::days(offset);
        if let Some(instant) = resolve_in_tz(tz, date, at) {
            if instant > after {
                return Some(instant);
            }
        }
    }
    None
}

/// First instant strictly after `after` falling on `weekday` where the
/// local clock in `tz` reads `at`.
pub fn next_weekly_occurrence(
    after: DateTime<Utc>,
    tz: Tz,
    weekday: Weekday,
    at: NaiveTime,
) -> Option<DateTime<Utc>> {
    let local_date = after.with_timezone(&tz).date_naive();
    for offset in 0..=8 {
        let date = local_date + Duration::days(offset);
        if date.weekday() != weekday {
            continue;
        }
        if let Some(instant) = resolve_in_tz(tz, date, at) {
            if instant > after {
                return Some(instant);
            }
        }
    }
    None
}

/// Next fire instant for a recurrence, strictly after `after`.
pub fn next_occurrence(recurrence: Recurrence, tz: Tz, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match recurrence {
        Recurrence::Daily { hour, minute } => {
            let at = NaiveTime::from_hms_opt(hour as u32, minute as u32, 0)?;
            next_daily_occurrence(after, tz, at)
        }
        Recurrence::Weekly {
            weekday,
            hour,
            minute,
        } => {
            let at = NaiveTime::from_hms_opt(hour as u32, minute as u32, 0)?;
            next_weekly_occurrence(after, tz, weekday, at)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kyiv() -> Tz {
        chrono_tz::Europe::Kyiv
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_daily_later_today() {
        // 2025-09-01 07:00 Kyiv is 04:00 UTC; 05:00 Kyiv tomorrow.
        let after = utc(2025, 9, 1, 4, 0);
        assert_eq!(
            next_daily_occurrence(after, kyiv(), hm(5, 0)),
            Some(utc(2025, 9, 2, 2, 0))
        );
        // 23:00 Kyiv is still today.
        assert_eq!(
            next_daily_occurrence(after, kyiv(), hm(23, 0)),
            Some(utc(2025, 9, 1, 20, 0))
        );
    }

    #[test]
    fn test_daily_is_strictly_after() {
        // Exactly 05:00 Kyiv now: today's occurrence has passed.
        let after = utc(2025, 9, 1, 2, 0);
        assert_eq!(
            next_daily_occurrence(after, kyiv(), hm(5, 0)),
            Some(utc(2025, 9, 2, 2, 0))
        );
    }

    #[test]
    fn test_weekly_same_day_and_wrap() {
        // 2025-09-01 is a Monday. 00:05 Monday has already passed at
        // 07:00 local, so the next one is a week out.
        let after = utc(2025, 9, 1, 4, 0);
        assert_eq!(
            next_weekly_occurrence(after, kyiv(), Weekday::Mon, hm(0, 5)),
            Some(utc(2025, 9, 7, 21, 5))
        );
        // A later slot on the same Monday still counts.
        assert_eq!(
            next_weekly_occurrence(after, kyiv(), Weekday::Mon, hm(8, 0)),
            Some(utc(2025, 9, 1, 5, 0))
        );
        // Friday from a Monday.
        assert_eq!(
            next_weekly_occurrence(after, kyiv(), Weekday::Fri, hm(0, 5)),
            Some(utc(2025, 9, 4, 21, 5))
        );
    }

    #[test]
    fn test_daily_through_spring_gap() {
        // 03:30 does not exist on 2025-03-30 in Kyiv; the occurrence
        // lands at 04:00 local, 01:00 UTC.
        let after = utc(2025, 3, 29, 23, 0);
        assert_eq!(
            next_daily_occurrence(after, kyiv(), hm(3, 30)),
            Some(utc(2025, 3, 30, 1, 0))
        );
    }

    #[test]
    fn test_daily_through_autumn_overlap() {
        // 03:30 happens twice on 2025-10-26; the first pass wins.
        let after = utc(2025, 10, 25, 23, 0);
        assert_eq!(
            next_daily_occurrence(after, kyiv(), hm(3, 30)),
            Some(utc(2025, 10, 26, 0, 30))
        );
    }

    #[test]
    fn test_recurrence_dispatch() {
        let after = utc(2025, 9, 1, 4, 0);
        assert_eq!(
            next_occurrence(Recurrence::Daily { hour: 5, minute: 0 }, kyiv(), after),
            Some(utc(2025, 9, 2, 2, 0))
        );
        assert_eq!(
            next_occurrence(
                Recurrence::Weekly {
                    weekday: Weekday::Mon,
                    hour: 0,
                    minute: 5
                },
                kyiv(),
                after
            ),
            Some(utc(2025, 9, 7, 21, 5))
        );
    }
}
