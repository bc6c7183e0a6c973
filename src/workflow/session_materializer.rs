//! 课次生成流程 - 流程层
//!
//! 核心职责：把启用中的固定课表展开成日期范围内的具体课次
//!
//! 流程顺序：
//! 1. 读取全部固定课表，丢弃已停用的（没有剩余则直接返回，不写库）
//! 2. 读取范围内已有课次，记下它们的 ID
//! 3. 对每个课表，枚举范围内星期相符的日期（含首尾）
//! 4. 按 `sess_<YYYYMMDD>_<student_id>` 去重后逐个写入
//!
//! 任何一次写入失败都会中止整个流程，之前已写入的课次保留。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, error, info};

use crate::error::AppResult;
use crate::models::Session;
use crate::repositories::{ScheduleRepository, SessionRepository};

/// 课次生成流程
///
/// - 只依赖数据访问层
/// - 以确定性 ID 去重，重复执行不会产生重复课次
pub struct SessionMaterializer {
    schedules: Arc<ScheduleRepository>,
    sessions: Arc<SessionRepository>,
}

impl SessionMaterializer {
    pub fn new(schedules: Arc<ScheduleRepository>, sessions: Arc<SessionRepository>) -> Self {
        Self { schedules, sessions }
    }

    /// 生成 `[start, end]` 内的课次
    ///
    /// # 返回
    /// 本次新建的课次（已存在的不返回）。`start > end` 视为空范围。
    ///
    /// # 示例
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use chrono::NaiveDate;
    /// # use tutor_assistant::infrastructure::{DocumentStore, MemoryDocumentStore};
    /// # use tutor_assistant::models::RecurringSchedule;
    /// # use tutor_assistant::repositories::{ScheduleRepository, SessionRepository};
    /// # use tutor_assistant::SessionMaterializer;
    /// # tokio_test::block_on(async {
    /// let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    /// let schedules = Arc::new(ScheduleRepository::new(store.clone(), "demo"));
    /// let sessions = Arc::new(SessionRepository::new(store, "demo"));
    /// schedules
    ///     .put(&RecurringSchedule {
    ///         schedule_id: "sch1".to_string(),
    ///         student_id: "s1".to_string(),
    ///         day_of_week: 1,
    ///         time: "16:00".to_string(),
    ///         duration_minutes: 60,
    ///         focus_topics: vec![],
    ///         is_active: true,
    ///         created_at: String::new(),
    ///         updated_at: String::new(),
    ///     })
    ///     .await?;
    ///
    /// let materializer = SessionMaterializer::new(schedules, sessions);
    /// let monday = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
    /// let created = materializer.materialize(monday, monday).await?;
    /// assert_eq!(created[0].session_id, "sess_20250106_s1");
    /// # Ok::<(), tutor_assistant::AppError>(())
    /// # }).unwrap();
    /// ```
    pub async fn materialize(&self, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<Session>> {
        if start > end {
            debug!("日期范围为空: {} > {}", start, end);
            return Ok(Vec::new());
        }

        // ========== 步骤 1: 启用中的课表 ==========
        let schedules: Vec<_> = self
            .schedules
            .list_all()
            .await?
            .into_iter()
            .filter(|s| s.is_active)
            .collect();
        if schedules.is_empty() {
            info!("没有启用中的固定课表，跳过课次生成");
            return Ok(Vec::new());
        }

        // ========== 步骤 2: 已有课次 ==========
        // 本轮新建的 ID 也加入集合，同一学生同一天只生成一次
        let mut known_ids: HashSet<String> = self
            .sessions
            .list_in_range(start, end)
            .await?
            .into_iter()
            .map(|s| s.session_id)
            .collect();

        info!(
            "🗓️ 生成课次 {} ~ {}：{} 个固定课表，已有 {} 个课次",
            start,
            end,
            schedules.len(),
            known_ids.len()
        );

        // ========== 步骤 3/4: 展开并写入 ==========
        let created_at = Utc::now().to_rfc3339();
        let mut created = Vec::new();
        for schedule in &schedules {
            let dates = start
                .iter_days()
                .take_while(|date| *date <= end)
                .filter(|date| schedule.occurs_on(*date));

            for date in dates {
                let session = Session::from_schedule(schedule, date, &created_at);
                if !known_ids.insert(session.session_id.clone()) {
                    debug!("课次已存在，跳过: {}", session.session_id);
                    continue;
                }
                self.sessions.put(&session).await.map_err(|e| {
                    error!(
                        "❌ 写入课次 {} 失败，已生成 {} 个，流程中止: {}",
                        session.session_id,
                        created.len(),
                        e
                    );
                    e
                })?;
                created.push(session);
            }
        }

        info!("✓ 新建 {} 个课次", created.len());
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, StoreError};
    use crate::infrastructure::{DocumentStore, IndexQuery, MemoryDocumentStore, ScanFilter, Table};
    use crate::models::{RecurringSchedule, SessionOrigin};
    use crate::repositories::SESSIONS;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 课次表写入到第 N 次时失败
    struct FailingStore {
        inner: MemoryDocumentStore,
        session_table: String,
        fail_on_write: usize,
        session_writes: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn get_item(&self, table: &Table, key: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get_item(table, key).await
        }

        async fn scan(&self, table: &Table, filter: &ScanFilter, limit: Option<usize>) -> Result<Vec<Value>, StoreError> {
            self.inner.scan(table, filter, limit).await
        }

        async fn query_index(&self, table: &Table, query: &IndexQuery) -> Result<Vec<Value>, StoreError> {
            self.inner.query_index(table, query).await
        }

        async fn put_item(&self, table: &Table, item: Value) -> Result<(), StoreError> {
            if table.name == self.session_table {
                let n = self.session_writes.fetch_add(1, Ordering::SeqCst) + 1;
                if n == self.fail_on_write {
                    return Err(StoreError::BadResponse {
                        table: table.name.clone(),
                        status: 503,
                        body: "unavailable".to_string(),
                    });
                }
            }
            self.inner.put_item(table, item).await
        }

        async fn update_item(&self, table: &Table, key: &str, attributes: Map<String, Value>) -> Result<Value, StoreError> {
            self.inner.update_item(table, key, attributes).await
        }

        async fn delete_item(&self, table: &Table, key: &str) -> Result<(), StoreError> {
            self.inner.delete_item(table, key).await
        }
    }

    struct Fixture {
        schedules: Arc<ScheduleRepository>,
        sessions: Arc<SessionRepository>,
        materializer: SessionMaterializer,
    }

    fn fixture_with(store: Arc<dyn DocumentStore>) -> Fixture {
        let schedules = Arc::new(ScheduleRepository::new(store.clone(), "test"));
        let sessions = Arc::new(SessionRepository::new(store, "test"));
        let materializer = SessionMaterializer::new(schedules.clone(), sessions.clone());
        Fixture {
            schedules,
            sessions,
            materializer,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryDocumentStore::new()))
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn schedule(id: &str, student_id: &str, day_of_week: u8, active: bool) -> RecurringSchedule {
        RecurringSchedule {
            schedule_id: id.to_string(),
            student_id: student_id.to_string(),
            day_of_week,
            time: "14:00".to_string(),
            duration_minutes: 60,
            focus_topics: vec![],
            is_active: active,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[tokio::test]
    async fn test_single_week_scenario() {
        let f = fixture();
        f.schedules.put(&schedule("sch_1", "s1", 1, true)).await.unwrap();

        let created = f
            .materializer
            .materialize(date("2025-01-06"), date("2025-01-12"))
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        let session = &created[0];
        assert_eq!(session.session_id, "sess_20250106_s1");
        assert_eq!(session.student_id, "s1");
        assert_eq!(session.date, date("2025-01-06"));
        assert_eq!(session.time, "14:00");
        assert_eq!(session.duration_minutes, 60);
        assert_eq!(session.created_by, SessionOrigin::Auto);
        assert_eq!(session.schedule_id.as_deref(), Some("sch_1"));
        assert!(session.lesson_plan_id.is_none());

        let stored = f.sessions.get("sess_20250106_s1").await.unwrap().unwrap();
        assert_eq!(&stored, session);
    }

    #[tokio::test]
    async fn test_second_run_creates_nothing() {
        let f = fixture();
        f.schedules.put(&schedule("sch_1", "s1", 1, true)).await.unwrap();
        f.schedules.put(&schedule("sch_2", "s2", 4, true)).await.unwrap();

        let (start, end) = (date("2025-01-01"), date("2025-01-31"));
        let first = f.materializer.materialize(start, end).await.unwrap();
        assert_eq!(first.len(), 4 + 5);

        let second = f.materializer.materialize(start, end).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(f.sessions.list_in_range(start, end).await.unwrap().len(), 9);
    }

    #[tokio::test]
    async fn test_wednesdays_in_fourteen_days() {
        for offset in 0..7 {
            let f = fixture();
            f.schedules.put(&schedule("sch_w", "s1", 3, true)).await.unwrap();
            let start = date("2025-03-01") + chrono::Duration::days(offset);
            let end = start + chrono::Duration::days(13);

            let created = f.materializer.materialize(start, end).await.unwrap();
            assert_eq!(created.len(), 2, "start {}", start);
            assert!(created.iter().all(|s| s.date.format("%A").to_string() == "Wednesday"));
        }
    }

    #[tokio::test]
    async fn test_inactive_schedule_is_inert() {
        let f = fixture();
        f.schedules.put(&schedule("sch_off", "s1", 2, false)).await.unwrap();
        let created = f
            .materializer
            .materialize(date("2025-01-01"), date("2025-12-31"))
            .await
            .unwrap();
        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn test_day_never_in_range_and_reversed_range() {
        let f = fixture();
        f.schedules.put(&schedule("sch_sun", "s1", 0, true)).await.unwrap();
        // 周一到周五，没有周日
        let created = f
            .materializer
            .materialize(date("2025-01-06"), date("2025-01-10"))
            .await
            .unwrap();
        assert!(created.is_empty());

        let reversed = f
            .materializer
            .materialize(date("2025-01-12"), date("2025-01-06"))
            .await
            .unwrap();
        assert!(reversed.is_empty());
    }

    #[tokio::test]
    async fn test_same_student_same_day_created_once() {
        let f = fixture();
        f.schedules.put(&schedule("sch_a", "s1", 1, true)).await.unwrap();
        let mut evening = schedule("sch_b", "s1", 1, true);
        evening.time = "18:00".to_string();
        f.schedules.put(&evening).await.unwrap();

        let created = f
            .materializer
            .materialize(date("2025-01-06"), date("2025-01-12"))
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].session_id, "sess_20250106_s1");
    }

    #[tokio::test]
    async fn test_write_failure_aborts_without_rollback() {
        let store = Arc::new(FailingStore {
            inner: MemoryDocumentStore::new(),
            session_table: SESSIONS.resolve("test").name,
            fail_on_write: 2,
            session_writes: AtomicUsize::new(0),
        });
        let f = fixture_with(store);
        f.schedules.put(&schedule("sch_1", "s1", 1, true)).await.unwrap();

        let (start, end) = (date("2025-01-06"), date("2025-01-26"));
        let err = f.materializer.materialize(start, end).await.unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::BadResponse { status: 503, .. })));

        let persisted = f.sessions.list_in_range(start, end).await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].session_id, "sess_20250106_s1");
    }
}
