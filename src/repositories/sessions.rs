use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Map};
use tracing::debug;

use super::{from_item, from_items, to_item, SESSIONS, STUDENT_INDEX};
use crate::error::AppResult;
use crate::infrastructure::{DocumentStore, IndexQuery, ScanFilter, Table};
use crate::models::Session;

/// 课次仓储
pub struct SessionRepository {
    store: Arc<dyn DocumentStore>,
    table: Table,
}

fn date_range(start: NaiveDate, end: NaiveDate) -> ScanFilter {
    ScanFilter::new().between("date", start.to_string(), end.to_string())
}

impl SessionRepository {
    pub fn new(store: Arc<dyn DocumentStore>, table_prefix: &str) -> Self {
        Self {
            store,
            table: SESSIONS.resolve(table_prefix),
        }
    }

    pub async fn get(&self, session_id: &str) -> AppResult<Option<Session>> {
        match self.store.get_item(&self.table, session_id).await? {
            Some(item) => Ok(Some(from_item(&self.table, item)?)),
            None => Ok(None),
        }
    }

    /// `[start, end]` 闭区间内的所有课次
    pub async fn list_in_range(&self, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<Session>> {
        let items = self.store.scan(&self.table, &date_range(start, end), None).await?;
        debug!("{} ~ {} 已有课次 {} 个", start, end, items.len());
        Ok(from_items(&self.table, items)?)
    }

    /// 某学生的课次，可限定日期范围（按日期升序）
    pub async fn list_for_student(
        &self,
        student_id: &str,
        range: Option<(NaiveDate, NaiveDate)>,
        limit: usize,
    ) -> AppResult<Vec<Session>> {
        let mut query = IndexQuery::new(STUDENT_INDEX, student_id).limit(limit);
        if let Some((start, end)) = range {
            query = query.with_filter(date_range(start, end));
        }
        let items = self.store.query_index(&self.table, &query).await?;
        Ok(from_items(&self.table, items)?)
    }

    pub async fn put(&self, session: &Session) -> AppResult<()> {
        let item = to_item(&self.table, session)?;
        self.store.put_item(&self.table, item).await?;
        Ok(())
    }

    /// 为已有课次关联课程计划（课次不存在时报 NotFound）
    pub async fn attach_lesson_plan(&self, session_id: &str, lesson_plan_id: &str) -> AppResult<Session> {
        let mut attributes = Map::new();
        attributes.insert("lesson_plan_id".to_string(), json!(lesson_plan_id));
        let updated = self
            .store
            .update_item(&self.table, session_id, attributes)
            .await?;
        Ok(from_item(&self.table, updated)?)
    }
}
