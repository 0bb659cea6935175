//! Time-convertibles and calendar generators.
//!
//! Everything the scheduler consumes is a lazy, forward-iterable sequence
//! of values convertible to an instant. The generators here produce the
//! common shapes (fixed period, daily, workdays, month-end, first/last
//! weekday of a month) as infinite iterators of zoned datetimes; the
//! scheduler treats them like any other sequence.
//!
//! Local times that fall in a DST gap are skipped; times in a DST fold
//! resolve to the earliest mapping.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;

/// A value the scheduler can fire on.
///
/// The original value is preserved and handed to the callback verbatim;
/// only scheduling arithmetic uses the converted instant.
pub trait ChimeTime: Send + 'static {
    /// The absolute point on the timeline this value refers to.
    fn instant(&self) -> DateTime<Utc>;
}

impl<Z> ChimeTime for DateTime<Z>
where
    Z: TimeZone + Send + 'static,
    Z::Offset: Send,
{
    fn instant(&self) -> DateTime<Utc> {
        self.with_timezone(&Utc)
    }
}

impl ChimeTime for std::time::SystemTime {
    fn instant(&self) -> DateTime<Utc> {
        (*self).into()
    }
}

/// Fixed-interval sequence: `start`, `start + every`, `start + 2*every`, ...
///
/// Consecutive elements differ by exactly `every`.
pub fn periodic(start: DateTime<Utc>, every: Duration) -> impl Iterator<Item = DateTime<Utc>> {
    std::iter::successors(Some(start), move |t| Some(*t + every))
}

/// Every day at a local time, starting on `from`.
pub fn daily_at(from: NaiveDate, time: NaiveTime, tz: Tz) -> impl Iterator<Item = DateTime<Tz>> {
    from.iter_days()
        .filter_map(move |day| resolve_local(day, time, tz))
}

/// Every Monday through Friday at a local time, starting on `from`.
pub fn workdays_at(from: NaiveDate, time: NaiveTime, tz: Tz) -> impl Iterator<Item = DateTime<Tz>> {
    from.iter_days()
        .filter(|day| day.weekday().number_from_monday() <= 5)
        .filter_map(move |day| resolve_local(day, time, tz))
}

/// Every Saturday and Sunday at a local time, starting on `from`.
pub fn weekends_at(from: NaiveDate, time: NaiveTime, tz: Tz) -> impl Iterator<Item = DateTime<Tz>> {
    from.iter_days()
        .filter(|day| day.weekday().number_from_monday() >= 6)
        .filter_map(move |day| resolve_local(day, time, tz))
}

/// The last calendar day of each month at a local time, starting on `from`.
pub fn month_end_at(from: NaiveDate, time: NaiveTime, tz: Tz) -> impl Iterator<Item = DateTime<Tz>> {
    from.iter_days()
        .filter(|day| day.day() == last_day_of_month(day.year(), day.month()))
        .filter_map(move |day| resolve_local(day, time, tz))
}

/// The first `weekday` of each month at a local time, starting on `from`.
pub fn first_weekday_of_month_at(
    weekday: Weekday,
    from: NaiveDate,
    time: NaiveTime,
    tz: Tz,
) -> impl Iterator<Item = DateTime<Tz>> {
    from.iter_days()
        .filter(move |day| day.weekday() == weekday && day.day() <= 7)
        .filter_map(move |day| resolve_local(day, time, tz))
}

/// The last `weekday` of each month at a local time, starting on `from`.
pub fn last_weekday_of_month_at(
    weekday: Weekday,
    from: NaiveDate,
    time: NaiveTime,
    tz: Tz,
) -> impl Iterator<Item = DateTime<Tz>> {
    from.iter_days()
        .filter(move |day| {
            day.weekday() == weekday && day.day() + 7 > last_day_of_month(day.year(), day.month())
        })
        .filter_map(move |day| resolve_local(day, time, tz))
}

/// The number of the last day of the given month.
pub(crate) fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Map a local date-time into `tz`: skip DST gaps, take the earliest
/// mapping on folds.
pub(crate) fn resolve_local(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn periodic_spacing_is_exact() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let every = Duration::seconds(90);

        let seq: Vec<_> = periodic(start, every).take(50).collect();
        for pair in seq.windows(2) {
            assert_eq!(pair[1] - pair[0], every);
        }
        assert_eq!(seq[0], start);
    }

    #[test]
    fn workdays_skip_weekends() {
        // 2026-01-02 is a Friday.
        let seq: Vec<_> = workdays_at(d(2026, 1, 2), t(9, 0), Tz::UTC)
            .take(4)
            .collect();

        let days: Vec<u32> = seq.iter().map(|dt| dt.day()).collect();
        assert_eq!(days, vec![2, 5, 6, 7]); // Fri, Mon, Tue, Wed
        for dt in &seq {
            assert!(dt.weekday().number_from_monday() <= 5);
            assert_eq!((dt.hour(), dt.minute()), (9, 0));
        }
    }

    #[test]
    fn weekends_only_saturday_sunday() {
        let seq: Vec<_> = weekends_at(d(2026, 1, 1), t(10, 30), Tz::UTC)
            .take(4)
            .collect();
        let days: Vec<u32> = seq.iter().map(|dt| dt.day()).collect();
        assert_eq!(days, vec![3, 4, 10, 11]);
    }

    #[test]
    fn month_end_handles_short_months() {
        let seq: Vec<_> = month_end_at(d(2026, 1, 1), t(17, 0), Tz::UTC)
            .take(3)
            .collect();
        let dates: Vec<(u32, u32)> = seq.iter().map(|dt| (dt.month(), dt.day())).collect();
        assert_eq!(dates, vec![(1, 31), (2, 28), (3, 31)]);
    }

    #[test]
    fn month_end_leap_february() {
        let seq: Vec<_> = month_end_at(d(2028, 2, 1), t(12, 0), Tz::UTC)
            .take(1)
            .collect();
        assert_eq!((seq[0].month(), seq[0].day()), (2, 29));
    }

    #[test]
    fn last_weekday_of_month() {
        // Last Thursday of June 2026 is the 25th.
        let seq: Vec<_> = last_weekday_of_month_at(Weekday::Thu, d(2026, 6, 1), t(10, 30), Tz::UTC)
            .take(2)
            .collect();
        assert_eq!((seq[0].month(), seq[0].day()), (6, 25));
        // Last Thursday of July 2026 is the 30th.
        assert_eq!((seq[1].month(), seq[1].day()), (7, 30));
    }

    #[test]
    fn first_weekday_of_month() {
        // First Monday of June 2026 is the 1st.
        let seq: Vec<_> = first_weekday_of_month_at(Weekday::Mon, d(2026, 6, 1), t(8, 0), Tz::UTC)
            .take(2)
            .collect();
        assert_eq!((seq[0].month(), seq[0].day()), (6, 1));
        assert_eq!((seq[1].month(), seq[1].day()), (7, 6));
    }

    #[test]
    fn daily_at_skips_dst_gap() {
        // Europe/London springs forward 2026-03-29; 01:30 does not exist.
        let seq: Vec<_> = daily_at(d(2026, 3, 28), t(1, 30), chrono_tz::Europe::London)
            .take(2)
            .collect();
        assert_eq!(seq[0].day(), 28);
        assert_eq!(seq[1].day(), 30);
    }

    #[test]
    fn generators_are_monotone() {
        let seq: Vec<_> = month_end_at(d(2026, 1, 1), t(23, 59), Tz::UTC)
            .take(24)
            .collect();
        for pair in seq.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn last_day_of_month_table() {
        assert_eq!(last_day_of_month(2026, 1), 31);
        assert_eq!(last_day_of_month(2026, 2), 28);
        assert_eq!(last_day_of_month(2028, 2), 29);
        assert_eq!(last_day_of_month(2026, 4), 30);
        assert_eq!(last_day_of_month(2026, 12), 31);
    }

    #[test]
    fn system_time_converts() {
        let now = std::time::SystemTime::now();
        let instant = ChimeTime::instant(&now);
        assert!((Utc::now() - instant).num_seconds().abs() < 2);
    }
}
