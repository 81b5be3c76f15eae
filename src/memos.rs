//! Memo lookups for the ringing screen.
//!
//! "Most recently created wins" for both views; when two memos share a
//! `created_at`, the later-inserted one (higher id) wins.

use chrono::{NaiveDate, NaiveDateTime};
use log::warn;

use crate::db::helpers::{parse_date, parse_timestamp};
use crate::db::models::MemoRow;

fn created_at(memo: &MemoRow) -> Option<NaiveDateTime> {
    let parsed = parse_timestamp(&memo.created_at);
    if parsed.is_none() {
        warn!("memo {} skipped: invalid created_at {:?}", memo.id, memo.created_at);
    }
    parsed
}

fn latest<'a, I>(memos: I) -> Option<&'a MemoRow>
where
    I: Iterator<Item = &'a MemoRow>,
{
    memos
        .filter_map(|memo| created_at(memo).map(|ts| (ts, memo)))
        .max_by(|(ta, a), (tb, b)| ta.cmp(tb).then(a.id.cmp(&b.id)))
        .map(|(_, memo)| memo)
}

fn is_undated(memo: &MemoRow) -> bool {
    memo.date.as_deref().map_or(true, |date| date.trim().is_empty())
}

/// Content of the newest undated memo, if any.
pub fn regular_memo(memos: &[MemoRow]) -> Option<&str> {
    latest(memos.iter().filter(|memo| is_undated(memo))).map(|memo| memo.content.as_str())
}

/// Content of the newest memo dated `today`, if any.
pub fn today_memo(today: NaiveDate, memos: &[MemoRow]) -> Option<&str> {
    latest(
        memos
            .iter()
            .filter(|memo| memo.date.as_deref().and_then(parse_date) == Some(today)),
    )
    .map(|memo| memo.content.as_str())
}
