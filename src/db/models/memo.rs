use serde::{Deserialize, Serialize};

/// Memo row. Undated memos are "regular"; dated ones belong to a single day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoRow {
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub date: Option<String>,
    pub created_at: String,
}
