//! Lazy enumeration of matching timestamps.
//!
//! Walks the cartesian product `year x month x day x hour x minute x
//! second` in calendar order, skipping invalid dates (e.g. 31 February)
//! silently and filtering by the day-of-week constraint and the `L` flags.
//! Local times in a DST gap are skipped; folds resolve to the earliest
//! mapping.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;

use crate::times::{last_day_of_month, resolve_local};

use super::{CronSchedule, DaySpec, DowSpec, FieldRange};

/// Lazy iterator over the timestamps matching a [`CronSchedule`].
pub struct CronIter {
    years: Vec<u32>,
    months: Vec<u32>,
    days: Vec<u32>,
    hours: Vec<u32>,
    minutes: Vec<u32>,
    seconds: Vec<u32>,
    day: DaySpec,
    day_of_week: DowSpec,
    tz: Tz,
    from: NaiveDateTime,
    // Odometer position: seconds roll fastest.
    iy: usize,
    im: usize,
    id: usize,
    ih: usize,
    imin: usize,
    is: usize,
}

impl CronIter {
    pub(super) fn new(schedule: &CronSchedule, from: DateTime<Tz>) -> Self {
        let day_values = match &schedule.day {
            DaySpec::Ranges(ranges) => expand(ranges),
            DaySpec::LastOfMonth => (21..=31).collect(),
        };
        // Last-DoM / last-DoW can only land on the final week of a month.
        let day_values = if matches!(schedule.day_of_week, DowSpec::LastInMonth(_)) {
            day_values.into_iter().filter(|&d| d >= 21).collect()
        } else {
            day_values
        };

        Self {
            years: expand(&schedule.year),
            months: expand(&schedule.month),
            days: day_values,
            hours: expand(&schedule.hour),
            minutes: expand(&schedule.minute),
            seconds: expand(&schedule.second),
            day: schedule.day.clone(),
            day_of_week: schedule.day_of_week.clone(),
            tz: from.timezone(),
            from: from.naive_local(),
            iy: 0,
            im: 0,
            id: 0,
            ih: 0,
            imin: 0,
            is: 0,
        }
    }

    fn date_matches(&self, date: NaiveDate) -> bool {
        if matches!(self.day, DaySpec::LastOfMonth)
            && date.day() != last_day_of_month(date.year(), date.month())
        {
            return false;
        }
        let weekday = date.weekday().number_from_monday();
        match &self.day_of_week {
            DowSpec::Ranges(ranges) => ranges.iter().any(|r| r.contains(weekday)),
            DowSpec::LastInMonth(dow) => {
                weekday == *dow && date.day() + 7 > last_day_of_month(date.year(), date.month())
            }
        }
    }

    /// Advance past the current date, resetting the time positions.
    fn bump_day(&mut self) {
        self.is = 0;
        self.imin = 0;
        self.ih = 0;
        self.id += 1;
        if self.id == self.days.len() {
            self.id = 0;
            self.im += 1;
            if self.im == self.months.len() {
                self.im = 0;
                self.iy += 1;
            }
        }
    }

    /// Advance past the current second.
    fn bump_second(&mut self) {
        self.is += 1;
        if self.is == self.seconds.len() {
            self.is = 0;
            self.imin += 1;
            if self.imin == self.minutes.len() {
                self.imin = 0;
                self.ih += 1;
                if self.ih == self.hours.len() {
                    self.bump_day();
                }
            }
        }
    }
}

impl Iterator for CronIter {
    type Item = DateTime<Tz>;

    fn next(&mut self) -> Option<DateTime<Tz>> {
        loop {
            let year = *self.years.get(self.iy)? as i32;
            let month = self.months[self.im];
            let day = self.days[self.id];

            let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                // Invalid calendar combination, e.g. 31 February.
                self.bump_day();
                continue;
            };
            if date < self.from.date() || !self.date_matches(date) {
                self.bump_day();
                continue;
            }

            let hour = self.hours[self.ih];
            if date == self.from.date() && hour < self.from.hour() {
                // Skip whole hours before the start point.
                self.is = 0;
                self.imin = 0;
                self.ih += 1;
                if self.ih == self.hours.len() {
                    self.bump_day();
                }
                continue;
            }

            let minute = self.minutes[self.imin];
            let second = self.seconds[self.is];
            let naive = date
                .and_hms_opt(hour, minute, second)
                .expect("field bounds guarantee a valid time");
            self.bump_second();

            if naive < self.from {
                continue;
            }
            if let Some(resolved) = resolve_local(date, naive.time(), self.tz) {
                return Some(resolved);
            }
            // DST gap: this local time does not exist; fall through.
        }
    }
}

fn expand(ranges: &[FieldRange]) -> Vec<u32> {
    let mut values: Vec<u32> = ranges.iter().flat_map(|r| r.values()).collect();
    values.sort_unstable();
    values.dedup();
    values
}

use chrono::Timelike;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::{CronField, parse, parse_with_fields};
    use chrono::{TimeZone, Utc, Weekday};

    fn from_utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Tz> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s)
            .unwrap()
            .with_timezone(&Tz::UTC)
    }

    #[test]
    fn noon_every_day() {
        let schedule = parse("0 12 * * ?").unwrap();
        let seq: Vec<_> = schedule
            .iter_from(from_utc(2097, 1, 1, 0, 0, 0))
            .take(40)
            .collect();

        assert_eq!(seq.len(), 40);
        for dt in &seq {
            assert_eq!(dt.hour(), 12);
            assert_eq!(dt.minute(), 0);
            assert_eq!(dt.second(), 0);
        }
        // One per day, consecutive.
        assert_eq!(seq[0].day(), 1);
        assert_eq!(seq[1].day(), 2);
    }

    #[test]
    fn stepped_minutes_at_two_hours() {
        let schedule = parse("0-55/5 13,18 * * ?").unwrap();
        let seq: Vec<_> = schedule
            .iter_from(from_utc(2097, 1, 1, 0, 0, 0))
            .take(48)
            .collect();

        for dt in &seq {
            assert_eq!(dt.minute() % 5, 0);
            assert!(dt.hour() == 13 || dt.hour() == 18);
        }
        // 12 matches per hour run; hours alternate 13 and 18 within a day.
        assert!(seq[..12].iter().all(|dt| dt.hour() == 13 && dt.day() == 1));
        assert!(seq[12..24].iter().all(|dt| dt.hour() == 18 && dt.day() == 1));
        assert!(seq[24..36].iter().all(|dt| dt.hour() == 13 && dt.day() == 2));
    }

    #[test]
    fn six_consecutive_minutes() {
        let schedule = parse("0-5 13 * * ?").unwrap();
        let seq: Vec<_> = schedule
            .iter_from(from_utc(2097, 6, 1, 0, 0, 0))
            .take(12)
            .collect();

        let minutes: Vec<u32> = seq[..6].iter().map(|dt| dt.minute()).collect();
        assert_eq!(minutes, vec![0, 1, 2, 3, 4, 5]);
        assert!(seq[..6].iter().all(|dt| dt.hour() == 13 && dt.day() == 1));
        assert!(seq[6..].iter().all(|dt| dt.day() == 2));
    }

    #[test]
    fn june_tuesdays_at_quarter_marks() {
        let schedule = parse("15,45 13 ? 6 TUE").unwrap();
        let seq: Vec<_> = schedule
            .iter_from(from_utc(2097, 1, 1, 0, 0, 0))
            .take(16)
            .collect();

        for dt in &seq {
            assert_eq!(dt.month(), 6);
            assert_eq!(dt.weekday(), Weekday::Tue);
            assert_eq!(dt.hour(), 13);
            assert!(dt.minute() == 15 || dt.minute() == 45);
        }
    }

    #[test]
    fn last_thursday_of_each_month() {
        let schedule = parse("30 10 ? * thuL").unwrap();
        let seq: Vec<_> = schedule
            .iter_from(from_utc(2097, 1, 1, 0, 0, 0))
            .take(12)
            .collect();

        for dt in &seq {
            assert_eq!(dt.weekday(), Weekday::Thu);
            assert_eq!((dt.hour(), dt.minute()), (10, 30));
            // No later Thursday fits in the month.
            assert!(dt.day() + 7 > last_day_of_month(dt.year(), dt.month()));
        }
        // One match per month.
        let months: Vec<u32> = seq.iter().map(|dt| dt.month()).collect();
        assert_eq!(months, (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn every_five_minutes() {
        let schedule = parse("*/5 * * * *").unwrap();
        let seq: Vec<_> = schedule
            .iter_from(from_utc(2097, 3, 10, 7, 2, 11))
            .take(20)
            .collect();

        for dt in &seq {
            assert_eq!(dt.minute() % 5, 0);
        }
        // Starts at the next matching slot after the from instant.
        assert_eq!((seq[0].hour(), seq[0].minute()), (7, 5));
    }

    #[test]
    fn last_day_of_month_sequence() {
        let schedule = parse("0 17 L * ?").unwrap();
        let seq: Vec<_> = schedule
            .iter_from(from_utc(2097, 1, 1, 0, 0, 0))
            .take(4)
            .collect();

        let dates: Vec<(u32, u32)> = seq.iter().map(|dt| (dt.month(), dt.day())).collect();
        // 2097 is not a leap year.
        assert_eq!(dates, vec![(1, 31), (2, 28), (3, 31), (4, 30)]);
    }

    #[test]
    fn invalid_dates_skipped_silently() {
        let schedule = parse("0 0 31 * ?").unwrap();
        let seq: Vec<_> = schedule
            .iter_from(from_utc(2097, 1, 1, 0, 0, 0))
            .take(4)
            .collect();

        // Only 31-day months produce a match.
        let months: Vec<u32> = seq.iter().map(|dt| dt.month()).collect();
        assert_eq!(months, vec![1, 3, 5, 7]);
    }

    #[test]
    fn from_instant_is_inclusive() {
        let schedule = parse("0 12 * * ?").unwrap();
        let from = from_utc(2097, 5, 1, 12, 0, 0);
        assert_eq!(schedule.next_after(from), Some(from));
    }

    #[test]
    fn seconds_field_via_custom_list() {
        let schedule = parse_with_fields(
            "15,45 0 12 * * ?",
            &[
                CronField::Second,
                CronField::Minute,
                CronField::Hour,
                CronField::Day,
                CronField::Month,
                CronField::DayOfWeek,
            ],
        )
        .unwrap();
        let seq: Vec<_> = schedule
            .iter_from(from_utc(2097, 1, 1, 0, 0, 0))
            .take(4)
            .collect();

        let seconds: Vec<u32> = seq.iter().map(|dt| dt.second()).collect();
        assert_eq!(seconds, vec![15, 45, 15, 45]);
        assert!(seq.iter().all(|dt| dt.hour() == 12 && dt.minute() == 0));
    }

    #[test]
    fn year_bound_exhausts() {
        let schedule = parse_with_fields(
            "0 12 1 1 ? 2097",
            &[
                CronField::Minute,
                CronField::Hour,
                CronField::Day,
                CronField::Month,
                CronField::DayOfWeek,
                CronField::Year,
            ],
        )
        .unwrap();
        let seq: Vec<_> = schedule.iter_from(from_utc(2096, 1, 1, 0, 0, 0)).collect();
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].year(), 2097);
    }

    #[test]
    fn enumeration_is_monotone() {
        let schedule = parse("*/17 */3 * * ?").unwrap();
        let seq: Vec<_> = schedule
            .iter_from(from_utc(2097, 2, 25, 9, 0, 0))
            .take(200)
            .collect();
        for pair in seq.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn upcoming_starts_at_the_clock() {
        use crate::clock::ManualClock;

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2097, 5, 4, 9, 15, 0).unwrap());
        let schedule = parse("0 12 * * ?").unwrap();

        let next = schedule.upcoming(&clock).next().unwrap();
        assert_eq!((next.month(), next.day(), next.hour()), (5, 4, 12));

        // A clock past noon rolls to the next day.
        clock.advance(chrono::Duration::hours(4));
        let next = schedule.upcoming(&clock).next().unwrap();
        assert_eq!((next.month(), next.day(), next.hour()), (5, 5, 12));
    }

    #[test]
    fn dst_gap_is_skipped() {
        // Europe/London springs forward 2097-03-31 (last Sunday of March);
        // 01:30 local does not exist that day.
        let schedule = parse("30 1 * * ?").unwrap();
        let from = chrono_tz::Europe::London
            .with_ymd_and_hms(2097, 3, 30, 0, 0, 0)
            .unwrap();
        let seq: Vec<_> = schedule.iter_from(from).take(2).collect();
        assert_eq!(seq[0].day(), 30);
        assert_eq!(seq[1].day(), 1); // April 1st; the 31st had no 01:30
    }
}
