//! Read-only dashboard views over validated records. These never consult or
//! update the single-fire cache.

use chrono::{Datelike, NaiveDate};

use super::record::{AlarmRecord, Recurrence};

/// Active weekly alarms scheduled on `today`'s weekday, earliest first.
pub fn regular_alarms_for(today: NaiveDate, records: &[AlarmRecord]) -> Vec<AlarmRecord> {
    let weekday = today.weekday();
    let mut alarms: Vec<AlarmRecord> = records
        .iter()
        .filter(|record| record.is_active)
        .filter(|record| matches!(record.recurrence, Recurrence::Weekly(days) if days.contains(weekday)))
        .cloned()
        .collect();

    alarms.sort_by(|a, b| a.time.cmp(&b.time).then(a.created_at.cmp(&b.created_at)));
    alarms
}

/// Active one-off alarms dated today or later, soonest first.
pub fn upcoming_one_off(today: NaiveDate, records: &[AlarmRecord]) -> Vec<AlarmRecord> {
    let mut alarms: Vec<(NaiveDate, AlarmRecord)> = records
        .iter()
        .filter(|record| record.is_active)
        .filter_map(|record| match record.recurrence {
            Recurrence::OneOff(date) if date >= today => Some((date, record.clone())),
            _ => None,
        })
        .collect();

    alarms.sort_by(|(da, a), (db, b)| da.cmp(db).then(a.time.cmp(&b.time)));
    alarms.into_iter().map(|(_, record)| record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarms::evaluator::parse_rows;
    use crate::db::models::AlarmRow;

    fn row(id: i64, time: &str, days: Option<&str>, date: Option<&str>) -> AlarmRow {
        AlarmRow {
            id,
            time: time.into(),
            label: None,
            days: days.map(Into::into),
            specific_date: date.map(Into::into),
            is_active: true,
            created_at: "2024-01-01 00:00:00".into(),
        }
    }

    fn ids(records: &[AlarmRecord]) -> Vec<i64> {
        records.iter().map(|record| record.id).collect()
    }

    #[test]
    fn regular_alarms_sorted_by_time_for_today() {
        let mut inactive = row(4, "05:00", Some("2"), None);
        inactive.is_active = false;
        let (records, _) = parse_rows(&[
            row(1, "08:00", Some("1,2"), None),
            row(2, "06:45", Some("2"), None),
            row(3, "07:00", Some("3"), None),
            inactive,
            row(5, "06:00", None, Some("2024-03-12")),
        ]);

        // Tuesday
        let today = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
        assert_eq!(ids(&regular_alarms_for(today, &records)), vec![2, 1]);
    }

    #[test]
    fn upcoming_one_offs_skip_past_dates() {
        let (records, _) = parse_rows(&[
            row(1, "06:30", None, Some("2024-03-10")),
            row(2, "09:00", None, Some("2024-03-12")),
            row(3, "06:00", None, Some("2024-03-13")),
            row(4, "06:00", None, Some("2024-03-12")),
            row(5, "06:00", Some("2"), None),
        ]);

        let today = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
        assert_eq!(ids(&upcoming_one_off(today, &records)), vec![4, 2, 3]);
    }
}
