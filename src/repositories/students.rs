use std::sync::Arc;

use tracing::debug;

use super::{from_item, from_items, to_item, STUDENTS};
use crate::error::AppResult;
use crate::infrastructure::{DocumentStore, ScanFilter, Table};
use crate::models::Student;

/// 学生仓储
pub struct StudentRepository {
    store: Arc<dyn DocumentStore>,
    table: Table,
}

impl StudentRepository {
    pub fn new(store: Arc<dyn DocumentStore>, table_prefix: &str) -> Self {
        Self {
            store,
            table: STUDENTS.resolve(table_prefix),
        }
    }

    pub async fn get(&self, student_id: &str) -> AppResult<Option<Student>> {
        debug!("读取学生 {}", student_id);
        match self.store.get_item(&self.table, student_id).await? {
            Some(item) => Ok(Some(from_item(&self.table, item)?)),
            None => Ok(None),
        }
    }

    /// 按姓名模糊查找（忽略大小写），返回第一个匹配
    pub async fn find_by_name(&self, name: &str) -> AppResult<Option<Student>> {
        let filter = ScanFilter::new().contains_ignore_case("name", name);
        let items = self.store.scan(&self.table, &filter, None).await?;
        debug!("按姓名 '{}' 找到 {} 个学生", name, items.len());
        match items.into_iter().next() {
            Some(item) => Ok(Some(from_item(&self.table, item)?)),
            None => Ok(None),
        }
    }

    pub async fn list_all(&self) -> AppResult<Vec<Student>> {
        let items = self.store.scan(&self.table, &ScanFilter::new(), None).await?;
        Ok(from_items(&self.table, items)?)
    }

    pub async fn put(&self, student: &Student) -> AppResult<()> {
        let item = to_item(&self.table, student)?;
        self.store.put_item(&self.table, item).await?;
        Ok(())
    }
}
