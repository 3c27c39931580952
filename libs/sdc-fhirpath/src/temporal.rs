//! Partial-precision FHIR date, dateTime and time values.
//!
//! FHIR allows `2020`, `2020-03` and `2020-03-14` as dates and dateTimes with
//! optional time and offset. Values keep their precision so that comparisons
//! between different precisions can report "unknown" instead of guessing.

use chrono::{
    Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DateTimePrecision {
    Year,
    Month,
    Day,
    Minute,
    Second,
    Millisecond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimePrecision {
    Hour,
    Minute,
    Second,
    Millisecond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FhirDate {
    pub date: NaiveDate,
    pub precision: DatePrecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FhirDateTime {
    /// Local wall-clock value as written
    pub value: NaiveDateTime,
    /// Offset in seconds east of UTC, `None` when the literal had no zone
    pub offset: Option<i32>,
    pub precision: DateTimePrecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FhirTime {
    pub time: NaiveTime,
    pub precision: TimePrecision,
}

/// Calendar units understood by date arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

static CALENDAR_UNITS: phf::Map<&'static str, CalendarUnit> = phf::phf_map! {
    "year" => CalendarUnit::Year,
    "years" => CalendarUnit::Year,
    "a" => CalendarUnit::Year,
    "month" => CalendarUnit::Month,
    "months" => CalendarUnit::Month,
    "mo" => CalendarUnit::Month,
    "week" => CalendarUnit::Week,
    "weeks" => CalendarUnit::Week,
    "wk" => CalendarUnit::Week,
    "day" => CalendarUnit::Day,
    "days" => CalendarUnit::Day,
    "d" => CalendarUnit::Day,
    "hour" => CalendarUnit::Hour,
    "hours" => CalendarUnit::Hour,
    "h" => CalendarUnit::Hour,
    "minute" => CalendarUnit::Minute,
    "minutes" => CalendarUnit::Minute,
    "min" => CalendarUnit::Minute,
    "second" => CalendarUnit::Second,
    "seconds" => CalendarUnit::Second,
    "s" => CalendarUnit::Second,
    "millisecond" => CalendarUnit::Millisecond,
    "milliseconds" => CalendarUnit::Millisecond,
    "ms" => CalendarUnit::Millisecond,
};

impl CalendarUnit {
    pub fn from_unit(unit: &str) -> Option<Self> {
        CALENDAR_UNITS.get(unit).copied()
    }

    /// Unquoted calendar keywords accepted after a number literal (`3 months`)
    pub fn is_keyword(unit: &str) -> bool {
        matches!(
            unit,
            "year"
                | "years"
                | "month"
                | "months"
                | "week"
                | "weeks"
                | "day"
                | "days"
                | "hour"
                | "hours"
                | "minute"
                | "minutes"
                | "second"
                | "seconds"
                | "millisecond"
                | "milliseconds"
        )
    }
}

impl FhirDate {
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim();
        let (date, precision) = match s.len() {
            4 => (
                NaiveDate::parse_from_str(&format!("{s}-01-01"), "%Y-%m-%d").ok()?,
                DatePrecision::Year,
            ),
            7 => (
                NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d").ok()?,
                DatePrecision::Month,
            ),
            10 => (
                NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?,
                DatePrecision::Day,
            ),
            _ => return None,
        };
        Some(Self { date, precision })
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        Self {
            date,
            precision: DatePrecision::Day,
        }
    }

    pub fn to_date_time(self) -> FhirDateTime {
        FhirDateTime {
            value: self.date.and_time(NaiveTime::MIN),
            offset: None,
            precision: match self.precision {
                DatePrecision::Year => DateTimePrecision::Year,
                DatePrecision::Month => DateTimePrecision::Month,
                DatePrecision::Day => DateTimePrecision::Day,
            },
        }
    }

    /// Compares at the coarser of the two precisions; `None` when the answer
    /// depends on the missing components.
    pub fn partial_compare(&self, other: &FhirDate) -> Option<Ordering> {
        let common = self.precision.min(other.precision);
        let key = |d: &FhirDate| match common {
            DatePrecision::Year => (d.date.year(), 0, 0),
            DatePrecision::Month => (d.date.year(), d.date.month(), 0),
            DatePrecision::Day => (d.date.year(), d.date.month(), d.date.day()),
        };
        match key(self).cmp(&key(other)) {
            Ordering::Equal if self.precision != other.precision => None,
            ordering => Some(ordering),
        }
    }

    pub fn add(&self, amount: Decimal, unit: CalendarUnit) -> Option<Self> {
        let whole = amount.trunc().to_i64()?;
        let date = match unit {
            CalendarUnit::Year => shift_months(self.date, whole.checked_mul(12)?)?,
            CalendarUnit::Month => shift_months(self.date, whole)?,
            CalendarUnit::Week => self.date.checked_add_signed(Duration::try_weeks(whole)?)?,
            CalendarUnit::Day => self.date.checked_add_signed(Duration::try_days(whole)?)?,
            // Sub-day units do not change a date value.
            _ => self.date,
        };
        Some(Self {
            date,
            precision: self.precision,
        })
    }
}

impl FhirDateTime {
    pub fn parse(input: &str) -> Option<Self> {
        let raw = input.trim();
        let Some((date_part, rest)) = raw.split_once('T') else {
            return FhirDate::parse(raw).map(FhirDate::to_date_time);
        };
        let date = FhirDate::parse(date_part)?;
        let (time_part, offset) = split_offset(rest)?;
        if time_part.is_empty() {
            let mut value = date.to_date_time();
            value.offset = offset;
            return Some(value);
        }

        let (main, frac) = match time_part.split_once('.') {
            Some((main, frac)) => (main, Some(frac)),
            None => (time_part, None),
        };
        let parts: Vec<&str> = main.split(':').collect();
        let (h, m, s, precision) = match parts.as_slice() {
            [h] => (*h, "0", "0", DateTimePrecision::Minute),
            [h, m] => (*h, *m, "0", DateTimePrecision::Minute),
            [h, m, s] if frac.is_some() => (*h, *m, *s, DateTimePrecision::Millisecond),
            [h, m, s] => (*h, *m, *s, DateTimePrecision::Second),
            _ => return None,
        };
        let millis = match frac {
            Some(frac) => format!("{:0<3}", frac.chars().take(3).collect::<String>())
                .parse::<u32>()
                .ok()?,
            None => 0,
        };
        let time = NaiveTime::from_hms_milli_opt(
            h.parse().ok()?,
            m.parse().ok()?,
            s.parse().ok()?,
            millis,
        )?;
        Some(Self {
            value: date.date.and_time(time),
            offset,
            precision,
        })
    }

    pub fn from_fixed(value: chrono::DateTime<FixedOffset>) -> Self {
        Self {
            value: value.naive_local(),
            offset: Some(value.offset().local_minus_utc()),
            precision: DateTimePrecision::Millisecond,
        }
    }

    /// Instant in UTC; values without a zone are read as UTC.
    fn utc(&self) -> NaiveDateTime {
        Duration::try_seconds(i64::from(self.offset.unwrap_or(0)))
            .and_then(|offset| self.value.checked_sub_signed(offset))
            .unwrap_or(self.value)
    }

    pub fn date(&self) -> FhirDate {
        FhirDate {
            date: self.value.date(),
            precision: match self.precision {
                DateTimePrecision::Year => DatePrecision::Year,
                DateTimePrecision::Month => DatePrecision::Month,
                _ => DatePrecision::Day,
            },
        }
    }

    pub fn partial_compare(&self, other: &FhirDateTime) -> Option<Ordering> {
        let common = self.precision.min(other.precision);
        let (a, b) = if common >= DateTimePrecision::Minute {
            (self.utc(), other.utc())
        } else {
            (self.value, other.value)
        };
        let key = |d: NaiveDateTime| -> (i32, u32, u32, u32, u32, u32, u32) {
            let full = (
                d.year(),
                d.month(),
                d.day(),
                d.hour(),
                d.minute(),
                d.second(),
                d.nanosecond() / 1_000_000,
            );
            match common {
                DateTimePrecision::Year => (full.0, 0, 0, 0, 0, 0, 0),
                DateTimePrecision::Month => (full.0, full.1, 0, 0, 0, 0, 0),
                DateTimePrecision::Day => (full.0, full.1, full.2, 0, 0, 0, 0),
                DateTimePrecision::Minute => (full.0, full.1, full.2, full.3, full.4, 0, 0),
                DateTimePrecision::Second => (full.0, full.1, full.2, full.3, full.4, full.5, 0),
                DateTimePrecision::Millisecond => full,
            }
        };
        match key(a).cmp(&key(b)) {
            Ordering::Equal if self.precision != other.precision => None,
            ordering => Some(ordering),
        }
    }

    pub fn add(&self, amount: Decimal, unit: CalendarUnit) -> Option<Self> {
        let whole = amount.trunc().to_i64()?;
        let value = match unit {
            CalendarUnit::Year => shift_months_dt(self.value, whole.checked_mul(12)?)?,
            CalendarUnit::Month => shift_months_dt(self.value, whole)?,
            CalendarUnit::Week => self.value.checked_add_signed(Duration::try_weeks(whole)?)?,
            CalendarUnit::Day => self.value.checked_add_signed(Duration::try_days(whole)?)?,
            CalendarUnit::Hour => self.value.checked_add_signed(Duration::try_hours(whole)?)?,
            CalendarUnit::Minute => {
                self.value.checked_add_signed(Duration::try_minutes(whole)?)?
            }
            CalendarUnit::Second => {
                let millis = amount.checked_mul(Decimal::from(1000))?.trunc().to_i64()?;
                self.value
                    .checked_add_signed(Duration::try_milliseconds(millis)?)?
            }
            CalendarUnit::Millisecond => {
                self.value.checked_add_signed(Duration::try_milliseconds(whole)?)?
            }
        };
        Some(Self { value, ..*self })
    }
}

impl FhirTime {
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim();
        let precision = if s.contains('.') {
            TimePrecision::Millisecond
        } else {
            match s.matches(':').count() {
                0 => TimePrecision::Hour,
                1 => TimePrecision::Minute,
                _ => TimePrecision::Second,
            }
        };
        let time = NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .ok()
            .or_else(|| {
                let hour: u32 = s.parse().ok()?;
                NaiveTime::from_hms_opt(hour, 0, 0)
            })?;
        Some(Self { time, precision })
    }

    pub fn partial_compare(&self, other: &FhirTime) -> Option<Ordering> {
        let common = self.precision.min(other.precision);
        let key = |t: &FhirTime| {
            let full = (
                t.time.hour(),
                t.time.minute(),
                t.time.second(),
                t.time.nanosecond() / 1_000_000,
            );
            match common {
                TimePrecision::Hour => (full.0, 0, 0, 0),
                TimePrecision::Minute => (full.0, full.1, 0, 0),
                TimePrecision::Second => (full.0, full.1, full.2, 0),
                TimePrecision::Millisecond => full,
            }
        };
        match key(self).cmp(&key(other)) {
            Ordering::Equal if self.precision != other.precision => None,
            ordering => Some(ordering),
        }
    }
}

fn shift_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

fn shift_months_dt(value: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    Some(shift_months(value.date(), months)?.and_time(value.time()))
}

fn split_offset(rest: &str) -> Option<(&str, Option<i32>)> {
    if let Some(stripped) = rest.strip_suffix('Z') {
        return Some((stripped, Some(0)));
    }
    let Some(pos) = rest.rfind(['+', '-']) else {
        return Some((rest, None));
    };
    let (time, tz) = rest.split_at(pos);
    let sign = if tz.starts_with('-') { -1 } else { 1 };
    let digits = tz[1..].replace(':', "");
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[0..2].parse().ok()?;
    let minutes: i32 = digits[2..4].parse().ok()?;
    Some((time, Some(sign * (hours * 3600 + minutes * 60))))
}

impl fmt::Display for FhirDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.precision {
            DatePrecision::Year => write!(f, "{}", self.date.format("%Y")),
            DatePrecision::Month => write!(f, "{}", self.date.format("%Y-%m")),
            DatePrecision::Day => write!(f, "{}", self.date.format("%Y-%m-%d")),
        }
    }
}

impl fmt::Display for FhirDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pattern = match self.precision {
            DateTimePrecision::Year => return write!(f, "{}", self.value.format("%Y")),
            DateTimePrecision::Month => return write!(f, "{}", self.value.format("%Y-%m")),
            DateTimePrecision::Day => return write!(f, "{}", self.value.format("%Y-%m-%d")),
            DateTimePrecision::Minute => "%Y-%m-%dT%H:%M",
            DateTimePrecision::Second => "%Y-%m-%dT%H:%M:%S",
            DateTimePrecision::Millisecond => "%Y-%m-%dT%H:%M:%S%.3f",
        };
        write!(f, "{}", self.value.format(pattern))?;
        match self.offset {
            Some(0) => write!(f, "Z"),
            Some(seconds) => match FixedOffset::east_opt(seconds) {
                Some(offset) => write!(
                    f,
                    "{}",
                    offset
                        .from_utc_datetime(&NaiveDateTime::MIN)
                        .format("%:z")
                ),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}

impl fmt::Display for FhirTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pattern = match self.precision {
            TimePrecision::Hour => "%H",
            TimePrecision::Minute => "%H:%M",
            TimePrecision::Second => "%H:%M:%S",
            TimePrecision::Millisecond => "%H:%M:%S%.3f",
        };
        write!(f, "{}", self.time.format(pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_dates_keep_precision() {
        let year = FhirDate::parse("2020").unwrap();
        assert_eq!(year.precision, DatePrecision::Year);
        assert_eq!(year.to_string(), "2020");
        assert_eq!(FhirDate::parse("2020-03").unwrap().to_string(), "2020-03");
    }

    #[test]
    fn test_compare_across_precisions() {
        let a = FhirDate::parse("2020").unwrap();
        let b = FhirDate::parse("2020-05-01").unwrap();
        let c = FhirDate::parse("2021-01-01").unwrap();
        assert_eq!(a.partial_compare(&b), None);
        assert_eq!(b.partial_compare(&c), Some(Ordering::Less));
        assert_eq!(a.partial_compare(&c), Some(Ordering::Less));
    }

    #[test]
    fn test_out_of_range_arithmetic_is_empty() {
        let date = FhirDate::parse("2024-03-15").unwrap();
        let huge = Decimal::from(9_999_999_999_999_999_i64);
        assert_eq!(date.add(huge, CalendarUnit::Day), None);
        assert_eq!(date.add(huge, CalendarUnit::Week), None);

        let moment = FhirDateTime::parse("2024-03-15T09:00:00Z").unwrap();
        for unit in [
            CalendarUnit::Week,
            CalendarUnit::Day,
            CalendarUnit::Hour,
            CalendarUnit::Minute,
            CalendarUnit::Second,
            CalendarUnit::Millisecond,
        ] {
            assert_eq!(moment.add(huge, unit), None, "{unit:?}");
        }
        assert_eq!(moment.add(Decimal::MAX, CalendarUnit::Second), None);
    }

    #[test]
    fn test_non_ascii_offset_is_rejected() {
        assert_eq!(FhirDateTime::parse("2024-01-01T10:00+1\u{e9}2"), None);
        assert_eq!(FhirDateTime::parse("2024-01-01T10:00+\u{e9}\u{e9}"), None);
        assert_eq!(FhirDateTime::parse("2024-01-01T10:00+0a:00"), None);
    }

    #[test]
    fn test_date_time_with_offset_round_trip() {
        let value = FhirDateTime::parse("2021-06-01T10:15:00+02:00").unwrap();
        assert_eq!(value.offset, Some(7200));
        assert_eq!(value.to_string(), "2021-06-01T10:15:00+02:00");

        let utc = FhirDateTime::parse("2021-06-01T08:15:00Z").unwrap();
        assert_eq!(value.partial_compare(&utc), Some(Ordering::Equal));
    }

    #[test]
    fn test_add_calendar_months_clamps_day() {
        let date = FhirDate::parse("2021-01-31").unwrap();
        let shifted = date.add(Decimal::ONE, CalendarUnit::Month).unwrap();
        assert_eq!(shifted.to_string(), "2021-02-28");
        let back = date.add(Decimal::from(-18), CalendarUnit::Year).unwrap();
        assert_eq!(back.to_string(), "2003-01-31");
    }

    #[test]
    fn test_time_parse() {
        let time = FhirTime::parse("14:30").unwrap();
        assert_eq!(time.precision, TimePrecision::Minute);
        assert_eq!(time.to_string(), "14:30");
    }
}
