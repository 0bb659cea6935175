//! Cron expression compiler.
//!
//! Compiles classical 5-field cron expressions (`minute hour day month
//! day-of-week`) into a [`CronSchedule`], then lazily enumerates the
//! matching zoned timestamps in calendar order. An alternate entry point
//! accepts a custom field-key list of identical length.
//!
//! Supported grammar per field: comma-separated items, each a `*`/`?`
//! wildcard, a value, or a `from-to` range, optionally with a `/step`;
//! values may be integers, `MON..SUN`, or `JAN..DEC` (case-insensitive).
//! The day field accepts `L` (last day of month); the day-of-week field
//! accepts `<dow>L` (last such weekday of the month, digit or name).

mod enumerate;
mod parse;

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;

use crate::clock::Clock;
use crate::error::CronError;

pub use enumerate::CronIter;

/// Field keys for cron expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CronField {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    DayOfWeek,
    Year,
}

impl CronField {
    /// Inclusive bounds for values of this field.
    pub(crate) fn bounds(self) -> (u32, u32) {
        match self {
            CronField::Second | CronField::Minute => (0, 59),
            CronField::Hour => (0, 23),
            CronField::Day => (1, 31),
            CronField::Month => (1, 12),
            CronField::DayOfWeek => (1, 7),
            CronField::Year => (1970, 9999),
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CronField::Second => "second",
            CronField::Minute => "minute",
            CronField::Hour => "hour",
            CronField::Day => "day",
            CronField::Month => "month",
            CronField::DayOfWeek => "day-of-week",
            CronField::Year => "year",
        };
        f.write_str(name)
    }
}

/// The classical field order: `minute hour day month day-of-week`.
pub const DEFAULT_FIELDS: [CronField; 5] = [
    CronField::Minute,
    CronField::Hour,
    CronField::Day,
    CronField::Month,
    CronField::DayOfWeek,
];

/// An inclusive value range with a step, e.g. `0-55/5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRange {
    pub from: u32,
    pub to: u32,
    pub step: u32,
}

impl FieldRange {
    pub(crate) fn exact(value: u32) -> Self {
        Self {
            from: value,
            to: value,
            step: 1,
        }
    }

    pub(crate) fn full(field: CronField) -> Self {
        let (lower, upper) = field.bounds();
        Self {
            from: lower,
            to: upper,
            step: 1,
        }
    }

    pub(crate) fn contains(&self, value: u32) -> bool {
        value >= self.from && value <= self.to && (value - self.from) % self.step == 0
    }

    pub(crate) fn values(self) -> impl Iterator<Item = u32> {
        (self.from..=self.to).step_by(self.step as usize)
    }
}

/// Day-of-month constraint: explicit ranges or the last day of the month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaySpec {
    Ranges(Vec<FieldRange>),
    LastOfMonth,
}

/// Day-of-week constraint: explicit ranges or the last occurrence of a
/// weekday (1 = MON .. 7 = SUN) within the month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DowSpec {
    Ranges(Vec<FieldRange>),
    LastInMonth(u32),
}

/// A compiled cron expression: per-field range lists plus the `L` flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    pub second: Vec<FieldRange>,
    pub minute: Vec<FieldRange>,
    pub hour: Vec<FieldRange>,
    pub day: DaySpec,
    pub month: Vec<FieldRange>,
    pub day_of_week: DowSpec,
    pub year: Vec<FieldRange>,
}

impl CronSchedule {
    /// Defaults for fields absent from the key list: second `0`, minute `0`,
    /// hour `0`, day `*`, month `*`, day-of-week `*`, year from the current
    /// year through 9999.
    fn unconstrained() -> Self {
        Self {
            second: vec![FieldRange::exact(0)],
            minute: vec![FieldRange::exact(0)],
            hour: vec![FieldRange::exact(0)],
            day: DaySpec::Ranges(vec![FieldRange::full(CronField::Day)]),
            month: vec![FieldRange::full(CronField::Month)],
            day_of_week: DowSpec::Ranges(vec![FieldRange::full(CronField::DayOfWeek)]),
            year: vec![FieldRange {
                from: Utc::now().year() as u32,
                to: 9999,
                step: 1,
            }],
        }
    }

    /// Lazily enumerate matching timestamps at or after `from`, in `from`'s
    /// zone.
    pub fn iter_from(&self, from: DateTime<Tz>) -> CronIter {
        CronIter::new(self, from)
    }

    /// Lazily enumerate matching timestamps from the clock's now, in the
    /// clock's zone.
    pub fn upcoming(&self, clock: &dyn Clock) -> CronIter {
        self.iter_from(clock.now().with_timezone(&clock.zone()))
    }

    /// The first matching timestamp at or after `from`.
    pub fn next_after(&self, from: DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.iter_from(from).next()
    }
}

/// Parse a cron expression in the classical field order
/// `minute hour day month day-of-week`.
pub fn parse(expr: &str) -> Result<CronSchedule, CronError> {
    parse_with_fields(expr, &DEFAULT_FIELDS)
}

/// Parse a cron expression against a custom field-key list.
///
/// The expression must have exactly as many whitespace-separated fields as
/// `fields` has keys; omitted fields take their defaults.
pub fn parse_with_fields(expr: &str, fields: &[CronField]) -> Result<CronSchedule, CronError> {
    parse::parse_with_fields(expr, fields)
}
