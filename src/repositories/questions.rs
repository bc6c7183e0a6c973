use std::sync::Arc;

use tracing::debug;

use super::{from_item, from_items, to_item, QUESTIONS};
use crate::error::AppResult;
use crate::infrastructure::{DocumentStore, ScanFilter, Table};
use crate::models::{Difficulty, Question};

/// 题库仓储
pub struct QuestionRepository {
    store: Arc<dyn DocumentStore>,
    table: Table,
}

impl QuestionRepository {
    pub fn new(store: Arc<dyn DocumentStore>, table_prefix: &str) -> Self {
        Self {
            store,
            table: QUESTIONS.resolve(table_prefix),
        }
    }

    pub async fn get(&self, question_id: &str) -> AppResult<Option<Question>> {
        match self.store.get_item(&self.table, question_id).await? {
            Some(item) => Ok(Some(from_item(&self.table, item)?)),
            None => Ok(None),
        }
    }

    /// 按知识点（包含，忽略大小写）和难度（相等）筛选
    pub async fn search(
        &self,
        topic: Option<&str>,
        difficulty: Option<Difficulty>,
        limit: usize,
    ) -> AppResult<Vec<Question>> {
        let mut filter = ScanFilter::new();
        if let Some(topic) = topic.filter(|t| !t.trim().is_empty()) {
            filter = filter.contains_ignore_case("topic", topic.trim());
        }
        if let Some(difficulty) = difficulty {
            filter = filter.eq("difficulty", difficulty.as_str());
        }
        let items = self.store.scan(&self.table, &filter, Some(limit)).await?;
        debug!(
            "题库筛选 topic={:?} difficulty={:?}：{} 道",
            topic,
            difficulty,
            items.len()
        );
        Ok(from_items(&self.table, items)?)
    }

    pub async fn put(&self, question: &Question) -> AppResult<()> {
        let item = to_item(&self.table, question)?;
        self.store.put_item(&self.table, item).await?;
        Ok(())
    }
}
