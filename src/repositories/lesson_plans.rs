use std::sync::Arc;

use super::{from_item, from_items, to_item, LESSON_PLANS, STUDENT_INDEX};
use crate::error::AppResult;
use crate::infrastructure::{DocumentStore, IndexQuery, ScanFilter, Table};
use crate::models::LessonPlan;

/// 课程计划仓储
pub struct LessonPlanRepository {
    store: Arc<dyn DocumentStore>,
    table: Table,
}

impl LessonPlanRepository {
    pub fn new(store: Arc<dyn DocumentStore>, table_prefix: &str) -> Self {
        Self {
            store,
            table: LESSON_PLANS.resolve(table_prefix),
        }
    }

    pub async fn get(&self, lesson_plan_id: &str) -> AppResult<Option<LessonPlan>> {
        match self.store.get_item(&self.table, lesson_plan_id).await? {
            Some(item) => Ok(Some(from_item(&self.table, item)?)),
            None => Ok(None),
        }
    }

    /// 指定学生时走索引（最新在前），否则全表扫描
    pub async fn list(&self, student_id: Option<&str>, limit: usize) -> AppResult<Vec<LessonPlan>> {
        let items = match student_id {
            Some(student_id) => {
                let query = IndexQuery::new(STUDENT_INDEX, student_id)
                    .descending()
                    .limit(limit);
                self.store.query_index(&self.table, &query).await?
            }
            None => {
                self.store
                    .scan(&self.table, &ScanFilter::new(), Some(limit))
                    .await?
            }
        };
        Ok(from_items(&self.table, items)?)
    }

    pub async fn put(&self, plan: &LessonPlan) -> AppResult<()> {
        let item = to_item(&self.table, plan)?;
        self.store.put_item(&self.table, item).await?;
        Ok(())
    }
}
