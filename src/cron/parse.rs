//! Field grammar parser.

use crate::error::CronError;

use super::{CronField, CronSchedule, DaySpec, DowSpec, FieldRange};

pub(super) fn parse_with_fields(
    expr: &str,
    fields: &[CronField],
) -> Result<CronSchedule, CronError> {
    let tokens: Vec<&str> = expr.split_whitespace().collect();
    if tokens.len() != fields.len() {
        return Err(CronError::FieldCount {
            expected: fields.len(),
            got: tokens.len(),
            expr: expr.to_string(),
        });
    }

    let mut schedule = CronSchedule::unconstrained();
    for (&field, &token) in fields.iter().zip(&tokens) {
        match field {
            CronField::Second => schedule.second = parse_ranges(field, token)?,
            CronField::Minute => schedule.minute = parse_ranges(field, token)?,
            CronField::Hour => schedule.hour = parse_ranges(field, token)?,
            CronField::Day => schedule.day = parse_day(token)?,
            CronField::Month => schedule.month = parse_ranges(field, token)?,
            CronField::DayOfWeek => schedule.day_of_week = parse_dow(token)?,
            CronField::Year => schedule.year = parse_ranges(field, token)?,
        }
    }
    Ok(schedule)
}

/// Day field: `L` means the last day of the month.
fn parse_day(token: &str) -> Result<DaySpec, CronError> {
    if token.eq_ignore_ascii_case("l") {
        return Ok(DaySpec::LastOfMonth);
    }
    Ok(DaySpec::Ranges(parse_ranges(CronField::Day, token)?))
}

/// Day-of-week field: `<dow>L` (digit or name) means the last occurrence of
/// that weekday within the month.
fn parse_dow(token: &str) -> Result<DowSpec, CronError> {
    if token.len() > 1
        && let Some(prefix) = token
            .strip_suffix('L')
            .or_else(|| token.strip_suffix('l'))
    {
        let dow = parse_value(CronField::DayOfWeek, prefix)?;
        return Ok(DowSpec::LastInMonth(dow));
    }
    Ok(DowSpec::Ranges(parse_ranges(CronField::DayOfWeek, token)?))
}

fn parse_ranges(field: CronField, token: &str) -> Result<Vec<FieldRange>, CronError> {
    token
        .split(',')
        .map(|item| parse_item(field, item))
        .collect()
}

fn parse_item(field: CronField, item: &str) -> Result<FieldRange, CronError> {
    let (range_part, step_part) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };

    let step = match step_part {
        None => 1,
        Some(text) => text
            .parse::<u32>()
            .ok()
            .filter(|&s| s > 0)
            .ok_or_else(|| CronError::InvalidStep {
                field,
                step: text.to_string(),
            })?,
    };

    let (lower, upper) = field.bounds();
    let (from, to, explicit_upper) = if range_part == "*" || range_part == "?" {
        (lower, upper, true)
    } else if let Some((a, b)) = range_part.split_once('-') {
        (parse_value(field, a)?, parse_value(field, b)?, true)
    } else {
        let value = parse_value(field, range_part)?;
        (value, value, false)
    };

    // A step on a bare value extends the range to the field's upper bound.
    let to = if step_part.is_some() && !explicit_upper {
        upper
    } else {
        to
    };

    if from > to {
        return Err(CronError::ReversedRange {
            field,
            token: item.to_string(),
        });
    }

    Ok(FieldRange { from, to, step })
}

fn parse_value(field: CronField, text: &str) -> Result<u32, CronError> {
    let value = match text.parse::<u32>() {
        Ok(v) => v,
        Err(_) => match field {
            CronField::Month => month_name(text).ok_or_else(|| CronError::InvalidToken {
                field,
                token: text.to_string(),
            })?,
            CronField::DayOfWeek => weekday_name(text).ok_or_else(|| CronError::InvalidToken {
                field,
                token: text.to_string(),
            })?,
            _ => {
                return Err(CronError::InvalidToken {
                    field,
                    token: text.to_string(),
                });
            }
        },
    };

    let (lower, upper) = field.bounds();
    if value < lower || value > upper {
        return Err(CronError::OutOfBounds {
            field,
            value,
            lower,
            upper,
        });
    }
    Ok(value)
}

/// `MON..SUN` map to 1..7.
fn weekday_name(text: &str) -> Option<u32> {
    let n = match text.to_ascii_uppercase().as_str() {
        "MON" => 1,
        "TUE" => 2,
        "WED" => 3,
        "THU" => 4,
        "FRI" => 5,
        "SAT" => 6,
        "SUN" => 7,
        _ => return None,
    };
    Some(n)
}

/// `JAN..DEC` map to 1..12.
fn month_name(text: &str) -> Option<u32> {
    let n = match text.to_ascii_uppercase().as_str() {
        "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AUG" => 8,
        "SEP" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DEC" => 12,
        _ => return None,
    };
    Some(n)
}
