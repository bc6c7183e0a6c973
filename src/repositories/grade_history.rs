use std::sync::Arc;

use super::{from_items, to_item, GRADE_HISTORY, STUDENT_INDEX};
use crate::error::AppResult;
use crate::infrastructure::{DocumentStore, IndexQuery, Table};
use crate::models::GradeRecord;

/// 批改记录仓储
pub struct GradeHistoryRepository {
    store: Arc<dyn DocumentStore>,
    table: Table,
}

impl GradeHistoryRepository {
    pub fn new(store: Arc<dyn DocumentStore>, table_prefix: &str) -> Self {
        Self {
            store,
            table: GRADE_HISTORY.resolve(table_prefix),
        }
    }

    /// 某学生最近的批改记录（最新在前）
    pub async fn list_for_student(&self, student_id: &str, limit: usize) -> AppResult<Vec<GradeRecord>> {
        let query = IndexQuery::new(STUDENT_INDEX, student_id)
            .descending()
            .limit(limit);
        let items = self.store.query_index(&self.table, &query).await?;
        Ok(from_items(&self.table, items)?)
    }

    pub async fn put(&self, record: &GradeRecord) -> AppResult<()> {
        let item = to_item(&self.table, record)?;
        self.store.put_item(&self.table, item).await?;
        Ok(())
    }
}
