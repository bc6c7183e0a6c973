use std::sync::Arc;

use serde_json::{json, Map};

use super::{from_item, from_items, to_item, SCHEDULES, STUDENT_INDEX};
use crate::error::AppResult;
use crate::infrastructure::{DocumentStore, IndexQuery, ScanFilter, Table};
use crate::models::RecurringSchedule;

/// 固定课表仓储
pub struct ScheduleRepository {
    store: Arc<dyn DocumentStore>,
    table: Table,
}

impl ScheduleRepository {
    pub fn new(store: Arc<dyn DocumentStore>, table_prefix: &str) -> Self {
        Self {
            store,
            table: SCHEDULES.resolve(table_prefix),
        }
    }

    pub async fn get(&self, schedule_id: &str) -> AppResult<Option<RecurringSchedule>> {
        match self.store.get_item(&self.table, schedule_id).await? {
            Some(item) => Ok(Some(from_item(&self.table, item)?)),
            None => Ok(None),
        }
    }

    /// 全部课表（含停用的）
    pub async fn list_all(&self) -> AppResult<Vec<RecurringSchedule>> {
        let items = self.store.scan(&self.table, &ScanFilter::new(), None).await?;
        Ok(from_items(&self.table, items)?)
    }

    pub async fn list_for_student(&self, student_id: &str) -> AppResult<Vec<RecurringSchedule>> {
        let query = IndexQuery::new(STUDENT_INDEX, student_id);
        let items = self.store.query_index(&self.table, &query).await?;
        Ok(from_items(&self.table, items)?)
    }

    pub async fn put(&self, schedule: &RecurringSchedule) -> AppResult<()> {
        let item = to_item(&self.table, schedule)?;
        self.store.put_item(&self.table, item).await?;
        Ok(())
    }

    /// 停用课表（条件更新，课表不存在时报 NotFound）
    pub async fn deactivate(&self, schedule_id: &str, updated_at: &str) -> AppResult<RecurringSchedule> {
        let mut attributes = Map::new();
        attributes.insert("is_active".to_string(), json!(false));
        attributes.insert("updated_at".to_string(), json!(updated_at));
        let updated = self
            .store
            .update_item(&self.table, schedule_id, attributes)
            .await?;
        Ok(from_item(&self.table, updated)?)
    }

    pub async fn delete(&self, schedule_id: &str) -> AppResult<()> {
        self.store.delete_item(&self.table, schedule_id).await?;
        Ok(())
    }
}
