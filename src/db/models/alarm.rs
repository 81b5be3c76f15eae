//! Alarm rows in the wire shape shared with the CRUD layer.
//!
//! Field names and text layouts (`time` as `HH:MM`, `days` as a comma list of
//! weekday indices with 0 = Sunday, `specific_date` as `YYYY-MM-DD`) are part
//! of the interchange contract and must not change.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlarmRow {
    pub id: i64,
    pub time: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub days: Option<String>,
    #[serde(default)]
    pub specific_date: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

/// Input for creating an alarm. New alarms start active.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAlarm {
    pub time: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub days: Option<String>,
    #[serde(default)]
    pub specific_date: Option<String>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlarmUpdate {
    pub time: Option<String>,
    pub label: Option<String>,
    pub days: Option<String>,
    pub specific_date: Option<String>,
    pub is_active: Option<bool>,
}
