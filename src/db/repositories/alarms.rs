use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use rusqlite::{params, OptionalExtension, Row};

use crate::alarms::record::{parse_time, WeekdaySet};
use crate::db::{
    connection::Database,
    helpers::{format_timestamp, non_blank, parse_date},
    models::{AlarmRow, AlarmUpdate, NewAlarm},
};

const SELECT_ALARM: &str =
    "SELECT id, time, label, days, specific_date, is_active, created_at FROM alarms";

fn row_to_alarm(row: &Row) -> Result<AlarmRow, rusqlite::Error> {
    Ok(AlarmRow {
        id: row.get("id")?,
        time: row.get("time")?,
        label: row.get("label")?,
        days: row.get("days")?,
        specific_date: row.get("specific_date")?,
        is_active: row.get("is_active")?,
        created_at: row.get("created_at")?,
    })
}

/// Write-side validation. Reads stay lenient so rows written by other tools
/// surface as data-quality warnings instead of failing the whole listing.
fn validate_fields(time: &str, days: Option<&str>, specific_date: Option<&str>) -> Result<()> {
    parse_time(time)?;
    if let Some(days) = days {
        WeekdaySet::parse(days)?;
    }
    if let Some(date) = specific_date {
        if parse_date(date).is_none() {
            bail!("invalid specific_date {date:?}, expected YYYY-MM-DD");
        }
    }
    Ok(())
}

impl Database {
    pub async fn list_alarms(&self) -> Result<Vec<AlarmRow>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_ALARM} ORDER BY id ASC"))?;
            let alarms = stmt
                .query_map([], row_to_alarm)?
                .collect::<Result<Vec<_>, _>>()
                .context("failed to read alarms")?;
            Ok(alarms)
        })
        .await
    }

    pub async fn get_alarm(&self, alarm_id: i64) -> Result<Option<AlarmRow>> {
        self.execute(move |conn| {
            let alarm = conn
                .query_row(
                    &format!("{SELECT_ALARM} WHERE id = ?1"),
                    params![alarm_id],
                    row_to_alarm,
                )
                .optional()?;
            Ok(alarm)
        })
        .await
    }

    pub async fn create_alarm(&self, alarm: NewAlarm) -> Result<AlarmRow> {
        let days = non_blank(alarm.days);
        let specific_date = non_blank(alarm.specific_date);
        validate_fields(&alarm.time, days.as_deref(), specific_date.as_deref())?;
        if days.is_none() && specific_date.is_none() {
            bail!("an alarm needs weekdays or a specific date");
        }

        let time = alarm.time.trim().to_string();
        let created_at = format_timestamp(Local::now().naive_local());

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO alarms (time, label, days, specific_date, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                params![time, alarm.label, days, specific_date, created_at],
            )
            .context("failed to insert alarm")?;

            let alarm_id = conn.last_insert_rowid();
            conn.query_row(
                &format!("{SELECT_ALARM} WHERE id = ?1"),
                params![alarm_id],
                row_to_alarm,
            )
            .map_err(|err| anyhow!("alarm {alarm_id} not found after insert: {err}"))
        })
        .await
    }

    /// Read, merge and write happen in one transaction on the worker thread,
    /// so a concurrent `mark_alarm_consumed` is never overwritten.
    pub async fn update_alarm(&self, alarm_id: i64, update: AlarmUpdate) -> Result<AlarmRow> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let current = tx
                .query_row(
                    &format!("{SELECT_ALARM} WHERE id = ?1"),
                    params![alarm_id],
                    row_to_alarm,
                )
                .optional()?
                .ok_or_else(|| anyhow!("alarm {alarm_id} not found"))?;

            let merged = AlarmRow {
                id: current.id,
                time: update.time.map(|t| t.trim().to_string()).unwrap_or(current.time),
                label: update.label.or(current.label),
                days: update.days.map(|d| non_blank(Some(d))).unwrap_or(current.days),
                // An empty date in an update keeps the stored one, as the CRUD layer does.
                specific_date: non_blank(update.specific_date).or(current.specific_date),
                is_active: update.is_active.unwrap_or(current.is_active),
                created_at: current.created_at,
            };
            if merged.days.is_none() && merged.specific_date.is_none() {
                bail!("an alarm needs weekdays or a specific date");
            }
            validate_fields(
                &merged.time,
                merged.days.as_deref(),
                merged.specific_date.as_deref(),
            )?;

            tx.execute(
                "UPDATE alarms
                 SET time = ?1,
                     label = ?2,
                     days = ?3,
                     specific_date = ?4,
                     is_active = ?5
                 WHERE id = ?6",
                params![
                    merged.time,
                    merged.label,
                    merged.days,
                    merged.specific_date,
                    merged.is_active,
                    merged.id,
                ],
            )
            .context("failed to update alarm")?;
            tx.commit().context("failed to commit alarm update")?;
            Ok(merged)
        })
        .await
    }

    /// Returns whether a row was removed.
    pub async fn delete_alarm(&self, alarm_id: i64) -> Result<bool> {
        self.execute(move |conn| {
            let removed = conn.execute("DELETE FROM alarms WHERE id = ?1", params![alarm_id])?;
            Ok(removed > 0)
        })
        .await
    }

    /// Flags a fired one-off alarm so it is not offered again.
    pub async fn mark_alarm_consumed(&self, alarm_id: i64) -> Result<()> {
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE alarms SET is_active = 0 WHERE id = ?1",
                    params![alarm_id],
                )
                .context("failed to mark alarm consumed")?;
            if updated == 0 {
                bail!("alarm {alarm_id} no longer exists");
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekday_alarm() -> NewAlarm {
        NewAlarm {
            time: "07:00".into(),
            label: Some("work".into()),
            days: Some("1,2,3,4,5".into()),
            specific_date: None,
        }
    }

    #[tokio::test]
    async fn create_and_list_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_alarm(weekday_alarm()).await.unwrap();

        assert!(created.is_active);
        assert_eq!(created.days.as_deref(), Some("1,2,3,4,5"));

        let alarms = db.list_alarms().await.unwrap();
        assert_eq!(alarms, vec![created]);
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let db = Database::open_in_memory().unwrap();

        let mut bad_time = weekday_alarm();
        bad_time.time = "25:00".into();
        assert!(db.create_alarm(bad_time).await.is_err());

        let mut no_recurrence = weekday_alarm();
        no_recurrence.days = Some("".into());
        assert!(db.create_alarm(no_recurrence).await.is_err());

        assert!(db.list_alarms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_alarm(weekday_alarm()).await.unwrap();

        let updated = db
            .update_alarm(
                created.id,
                AlarmUpdate {
                    time: Some("07:30".into()),
                    specific_date: Some("".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.time, "07:30");
        assert_eq!(updated.label.as_deref(), Some("work"));
        assert_eq!(updated.specific_date, None);
        assert_eq!(db.get_alarm(created.id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn label_edit_keeps_consumed_alarm_inactive() {
        let db = Database::open_in_memory().unwrap();
        let created = db
            .create_alarm(NewAlarm {
                time: "06:30".into(),
                specific_date: Some("2024-03-10".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        db.mark_alarm_consumed(created.id).await.unwrap();

        let updated = db
            .update_alarm(
                created.id,
                AlarmUpdate {
                    label: Some("airport".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!updated.is_active);
        let stored = db.get_alarm(created.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.label.as_deref(), Some("airport"));
    }

    #[tokio::test]
    async fn update_of_missing_alarm_errors() {
        let db = Database::open_in_memory().unwrap();
        assert!(db
            .update_alarm(404, AlarmUpdate::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn consume_deactivates_and_missing_id_errors() {
        let db = Database::open_in_memory().unwrap();
        let created = db
            .create_alarm(NewAlarm {
                time: "06:30".into(),
                specific_date: Some("2024-03-10".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        db.mark_alarm_consumed(created.id).await.unwrap();
        let stored = db.get_alarm(created.id).await.unwrap().unwrap();
        assert!(!stored.is_active);

        assert!(db.delete_alarm(created.id).await.unwrap());
        assert!(db.mark_alarm_consumed(created.id).await.is_err());
        assert!(!db.delete_alarm(created.id).await.unwrap());
    }
}
