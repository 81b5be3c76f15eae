//! Validated alarm records.
//!
//! [`AlarmRow`] is whatever the store hands back; [`AlarmRecord`] is a row that
//! passed validation. Conversion failures are data-quality problems: they are
//! reported per record and never abort an evaluation pass.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::Serialize;
use thiserror::Error;

use crate::db::helpers::{parse_date, parse_timestamp};
use crate::db::models::AlarmRow;

const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("invalid time {0:?}, expected HH:MM")]
    InvalidTime(String),
    #[error("invalid weekday list {0:?}, expected indices 0-6")]
    InvalidDays(String),
    #[error("invalid specific_date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid created_at {0:?}")]
    InvalidCreatedAt(String),
    #[error("neither weekdays nor a specific date is set")]
    NoRecurrence,
}

/// A record skipped during evaluation, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataQualityWarning {
    pub alarm_id: i64,
    pub error: RecordError,
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alarm {} skipped: {}", self.alarm_id, self.error)
    }
}

/// Set of weekdays, indexed 0 = Sunday through 6 = Saturday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn from_indices<I: IntoIterator<Item = u8>>(indices: I) -> Option<Self> {
        let mut bits = 0u8;
        for index in indices {
            if index > 6 {
                return None;
            }
            bits |= 1 << index;
        }
        Some(Self(bits))
    }

    /// Parses the wire form, e.g. `"1,2,3,4,5"`. Separators other than commas
    /// and whitespace are rejected; a bare digit run such as `"135"` is read
    /// digit by digit.
    pub fn parse(raw: &str) -> Result<Self, RecordError> {
        let invalid = || RecordError::InvalidDays(raw.to_string());
        let mut indices = Vec::new();

        for token in raw.split(|c: char| c == ',' || c.is_whitespace()) {
            if token.is_empty() {
                continue;
            }
            if !token.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            indices.extend(token.bytes().map(|b| b - b'0'));
        }

        Self::from_indices(indices).ok_or_else(invalid)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_sunday()) != 0
    }

    pub fn indices(&self) -> impl Iterator<Item = u8> + '_ {
        (0..7u8).filter(move |index| self.0 & (1 << index) != 0)
    }

    pub fn to_wire(&self) -> String {
        self.indices()
            .map(|index| index.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Recurrence {
    Weekly(WeekdaySet),
    OneOff(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmRecord {
    pub id: i64,
    pub time: NaiveTime,
    pub label: Option<String>,
    pub recurrence: Recurrence,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl AlarmRecord {
    pub fn is_one_off(&self) -> bool {
        matches!(self.recurrence, Recurrence::OneOff(_))
    }

    /// A one-off alarm whose date lies strictly before `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        matches!(self.recurrence, Recurrence::OneOff(date) if date < today)
    }

    /// Whether this alarm's trigger condition matches `now`, ignoring the
    /// active flag and the single-fire cache.
    pub fn matches(&self, now: NaiveDateTime) -> bool {
        if truncate_to_minute(now.time()) != self.time {
            return false;
        }
        match self.recurrence {
            Recurrence::Weekly(days) => days.contains(now.weekday()),
            Recurrence::OneOff(date) => date == now.date(),
        }
    }

    pub fn display_time(&self) -> String {
        self.time.format(TIME_FORMAT).to_string()
    }
}

impl TryFrom<&AlarmRow> for AlarmRecord {
    type Error = RecordError;

    fn try_from(row: &AlarmRow) -> Result<Self, Self::Error> {
        let time = parse_time(&row.time)?;

        // A dated alarm is more specific than a weekday pattern; its `days`
        // are never consulted.
        let recurrence = match non_empty(row.specific_date.as_deref()) {
            Some(raw) => Recurrence::OneOff(
                parse_date(raw).ok_or_else(|| RecordError::InvalidDate(raw.to_string()))?,
            ),
            None => {
                let days = match non_empty(row.days.as_deref()) {
                    Some(raw) => WeekdaySet::parse(raw)?,
                    None => WeekdaySet::default(),
                };
                if days.is_empty() {
                    return Err(RecordError::NoRecurrence);
                }
                Recurrence::Weekly(days)
            }
        };

        let created_at = parse_timestamp(&row.created_at)
            .ok_or_else(|| RecordError::InvalidCreatedAt(row.created_at.clone()))?;

        Ok(Self {
            id: row.id,
            time,
            label: row.label.clone().filter(|label| !label.trim().is_empty()),
            recurrence,
            is_active: row.is_active,
            created_at,
        })
    }
}

pub fn parse_time(raw: &str) -> Result<NaiveTime, RecordError> {
    NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT)
        .map_err(|_| RecordError::InvalidTime(raw.to_string()))
}

pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|raw| !raw.is_empty())
}
