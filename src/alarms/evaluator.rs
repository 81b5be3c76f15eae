//! Decides which alarms are due at a given instant.
//!
//! Evaluation is a pure function of the clock, the record snapshot and a
//! small [`FiredCache`]. The caller owns the cache and polls on its own
//! cadence; nothing here sleeps or touches the store.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::warn;

use crate::db::models::AlarmRow;

use super::record::{truncate_to_minute, AlarmRecord, DataQualityWarning};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FiredKey {
    alarm_id: i64,
    date: NaiveDate,
    time: NaiveTime,
}

/// Remembers which `(alarm, date, minute)` triples were already reported so
/// that several polls inside one minute trigger an alarm once.
#[derive(Debug, Default)]
pub struct FiredCache {
    fired: HashSet<FiredKey>,
}

impl FiredCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }

    /// Drops every entry whose minute is not the current one.
    fn expire(&mut self, date: NaiveDate, minute: NaiveTime) {
        self.fired
            .retain(|key| key.date == date && key.time == minute);
    }

    /// Returns `false` when the key was already present.
    fn record(&mut self, key: FiredKey) -> bool {
        self.fired.insert(key)
    }
}

/// Outcome of one evaluation pass.
#[derive(Debug, Default)]
pub struct Evaluation {
    /// Due alarms, oldest `created_at` first.
    pub due: Vec<AlarmRecord>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Validates every row, keeping the good ones. Bad rows are logged and
/// returned as warnings.
pub fn parse_rows(rows: &[AlarmRow]) -> (Vec<AlarmRecord>, Vec<DataQualityWarning>) {
    let mut records = Vec::with_capacity(rows.len());
    let mut warnings = Vec::new();

    for row in rows {
        match AlarmRecord::try_from(row) {
            Ok(record) => records.push(record),
            Err(error) => {
                let warning = DataQualityWarning {
                    alarm_id: row.id,
                    error,
                };
                warn!("{warning}");
                warnings.push(warning);
            }
        }
    }

    (records, warnings)
}

pub fn due_alarms(now: NaiveDateTime, rows: &[AlarmRow], cache: &mut FiredCache) -> Evaluation {
    let (records, warnings) = parse_rows(rows);
    let due = due_records(now, records, cache);
    Evaluation { due, warnings }
}

/// Same as [`due_alarms`] for records that were already validated.
pub fn due_records(
    now: NaiveDateTime,
    records: Vec<AlarmRecord>,
    cache: &mut FiredCache,
) -> Vec<AlarmRecord> {
    let today = now.date();
    let minute = truncate_to_minute(now.time());
    cache.expire(today, minute);

    let mut due: Vec<AlarmRecord> = records
        .into_iter()
        .filter(|record| record.is_active)
        .filter(|record| !record.is_expired(today))
        .filter(|record| record.matches(now))
        .filter(|record| {
            cache.record(FiredKey {
                alarm_id: record.id,
                date: today,
                time: minute,
            })
        })
        .collect();

    due.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    due
}
