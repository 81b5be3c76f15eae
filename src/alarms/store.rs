use anyhow::Result;
use async_trait::async_trait;

use crate::db::{AlarmRow, Database, MemoRow};

/// Store operations the core depends on. Writes must be visible to the next
/// `list_alarms` call; nothing stronger is assumed.
#[async_trait]
pub trait AlarmStore: Send + Sync {
    async fn list_alarms(&self) -> Result<Vec<AlarmRow>>;

    async fn mark_consumed(&self, alarm_id: i64) -> Result<()>;

    async fn list_memos(&self) -> Result<Vec<MemoRow>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl AlarmStore for Database {
    async fn list_alarms(&self) -> Result<Vec<AlarmRow>> {
        Database::list_alarms(self).await
    }

    async fn mark_consumed(&self, alarm_id: i64) -> Result<()> {
        self.mark_alarm_consumed(alarm_id).await
    }

    async fn list_memos(&self) -> Result<Vec<MemoRow>> {
        Database::list_memos(self).await
    }
}
