use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{format_timestamp, non_blank, parse_date},
    models::MemoRow,
};

fn row_to_memo(row: &Row) -> Result<MemoRow, rusqlite::Error> {
    Ok(MemoRow {
        id: row.get("id")?,
        content: row.get("content")?,
        date: row.get("date")?,
        created_at: row.get("created_at")?,
    })
}

impl Database {
    pub async fn list_memos(&self) -> Result<Vec<MemoRow>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, date, created_at FROM memos ORDER BY id ASC",
            )?;
            let memos = stmt
                .query_map([], row_to_memo)?
                .collect::<Result<Vec<_>, _>>()
                .context("failed to read memos")?;
            Ok(memos)
        })
        .await
    }

    pub async fn create_memo(&self, content: String, date: Option<String>) -> Result<MemoRow> {
        let date = non_blank(date);
        if let Some(raw) = &date {
            if parse_date(raw).is_none() {
                bail!("invalid memo date {raw:?}, expected YYYY-MM-DD");
            }
        }
        let created_at = format_timestamp(Local::now().naive_local());

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO memos (content, date, created_at) VALUES (?1, ?2, ?3)",
                params![content, date, created_at],
            )
            .context("failed to insert memo")?;

            let memo_id = conn.last_insert_rowid();
            conn.query_row(
                "SELECT id, content, date, created_at FROM memos WHERE id = ?1",
                params![memo_id],
                row_to_memo,
            )
            .map_err(|err| anyhow!("memo {memo_id} not found after insert: {err}"))
        })
        .await
    }

    pub async fn delete_memo(&self, memo_id: i64) -> Result<bool> {
        self.execute(move |conn| {
            let removed = conn.execute("DELETE FROM memos WHERE id = ?1", params![memo_id])?;
            Ok(removed > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memos_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let regular = db.create_memo("stretch first".into(), None).await.unwrap();
        let dated = db
            .create_memo("dentist".into(), Some("2024-03-11".into()))
            .await
            .unwrap();

        assert_eq!(regular.date, None);
        assert_eq!(dated.date.as_deref(), Some("2024-03-11"));
        assert_eq!(db.list_memos().await.unwrap(), vec![regular.clone(), dated]);

        assert!(db.delete_memo(regular.id).await.unwrap());
        assert_eq!(db.list_memos().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bad_memo_date_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(db
            .create_memo("x".into(), Some("tomorrow".into()))
            .await
            .is_err());
    }
}
