use std::sync::Arc;

use super::{from_item, to_item, WORKSHEETS};
use crate::error::AppResult;
use crate::infrastructure::{DocumentStore, Table};
use crate::models::Worksheet;

/// 练习卷仓储
pub struct WorksheetRepository {
    store: Arc<dyn DocumentStore>,
    table: Table,
}

impl WorksheetRepository {
    pub fn new(store: Arc<dyn DocumentStore>, table_prefix: &str) -> Self {
        Self {
            store,
            table: WORKSHEETS.resolve(table_prefix),
        }
    }

    pub async fn get(&self, worksheet_id: &str) -> AppResult<Option<Worksheet>> {
        match self.store.get_item(&self.table, worksheet_id).await? {
            Some(item) => Ok(Some(from_item(&self.table, item)?)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, worksheet: &Worksheet) -> AppResult<()> {
        let item = to_item(&self.table, worksheet)?;
        self.store.put_item(&self.table, item).await?;
        Ok(())
    }
}
