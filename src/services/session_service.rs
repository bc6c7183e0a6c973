//! 课表与课次服务
//!
//! - 固定课表的增删查
//! - 手动创建课次
//! - 未来 N 天的课程安排（是否已备课）
//! - 课次列表与备课统计

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::session::{parse_date, short_id, validate_time};
use crate::models::{manual_session_id, RecurringSchedule, Session, SessionOrigin};
use crate::repositories::{ScheduleRepository, SessionRepository};

/// 按学生列课次时的最大条数
const STUDENT_SESSION_LIMIT: usize = 100;
/// 未指定范围时默认列出的天数
const DEFAULT_LISTING_DAYS: i64 = 7;

/// 新建固定课表
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewSchedule {
    pub student_id: String,
    /// 0 = 周日
    pub day_of_week: u8,
    pub time: String,
    pub duration: u32,
    #[serde(default)]
    pub focus_topics: Vec<String>,
}

/// 手动新建课次
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewSession {
    pub student_id: String,
    pub session_date: String,
    pub time: String,
    pub duration: u32,
    #[serde(default)]
    pub lesson_plan_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// 未来的一次课（由固定课表推算，未必已落库）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingSession {
    pub schedule_id: String,
    pub student_id: String,
    pub date: NaiveDate,
    /// 星期名，如 `Monday`
    pub day: String,
    pub time: String,
    pub duration: u32,
    pub focus_topics: Vec<String>,
    pub has_lesson_plan: bool,
}

/// 课次列表
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionListing {
    pub sessions: Vec<Session>,
    pub summary: SessionSummary,
}

/// 备课统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub total: usize,
    pub needs_preparation: usize,
    pub ready: usize,
}

/// 课表与课次服务
pub struct SessionService {
    schedules: Arc<ScheduleRepository>,
    sessions: Arc<SessionRepository>,
}

impl SessionService {
    pub fn new(schedules: Arc<ScheduleRepository>, sessions: Arc<SessionRepository>) -> Self {
        Self { schedules, sessions }
    }

    // ========== 固定课表 ==========

    /// 新建固定课表（`schedule_<8 hex>`，默认启用）
    pub async fn create_schedule(&self, input: NewSchedule) -> AppResult<RecurringSchedule> {
        if input.student_id.trim().is_empty() {
            return Err(AppError::invalid_input("student_id 不能为空"));
        }
        if input.day_of_week > 6 {
            return Err(AppError::invalid_input(format!(
                "day_of_week 应在 0..=6 之间（0 为周日）: {}",
                input.day_of_week
            )));
        }
        validate_time(&input.time)?;
        if input.duration == 0 {
            return Err(AppError::invalid_input("duration 必须大于 0"));
        }

        let now = Utc::now().to_rfc3339();
        let schedule = RecurringSchedule {
            schedule_id: format!("schedule_{}", short_id()),
            student_id: input.student_id,
            day_of_week: input.day_of_week,
            time: input.time.trim().to_string(),
            duration_minutes: input.duration,
            focus_topics: input.focus_topics,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        };
        self.schedules.put(&schedule).await?;
        info!(
            "🗓️ 新建固定课表 {}：学生 {}，每周 {} {}",
            schedule.schedule_id, schedule.student_id, schedule.day_of_week, schedule.time
        );
        Ok(schedule)
    }

    pub async fn list_schedules(&self, student_id: Option<&str>) -> AppResult<Vec<RecurringSchedule>> {
        match student_id.filter(|id| !id.trim().is_empty()) {
            Some(student_id) => self.schedules.list_for_student(student_id).await,
            None => self.schedules.list_all().await,
        }
    }

    /// 停用固定课表（保留记录，不再生成课次）
    pub async fn deactivate_schedule(&self, schedule_id: &str) -> AppResult<RecurringSchedule> {
        let schedule = self
            .schedules
            .deactivate(schedule_id, &Utc::now().to_rfc3339())
            .await?;
        info!("⏸️ 固定课表已停用: {}", schedule_id);
        Ok(schedule)
    }

    /// 永久删除固定课表
    pub async fn delete_schedule(&self, schedule_id: &str) -> AppResult<()> {
        if self.schedules.get(schedule_id).await?.is_none() {
            return Err(AppError::not_found("固定课表", schedule_id));
        }
        self.schedules.delete(schedule_id).await?;
        info!("🗑️ 固定课表已删除: {}", schedule_id);
        Ok(())
    }

    // ========== 课次 ==========

    /// 手动新建课次
    ///
    /// ID 带随机后缀，不与自动课次去重。
    pub async fn create_manual_session(&self, input: NewSession) -> AppResult<Session> {
        if input.student_id.trim().is_empty() {
            return Err(AppError::invalid_input("student_id 不能为空"));
        }
        let date = parse_date("session_date", &input.session_date)?;
        validate_time(&input.time)?;
        if input.duration == 0 {
            return Err(AppError::invalid_input("duration 必须大于 0"));
        }

        let session = Session {
            session_id: manual_session_id(date, &input.student_id),
            student_id: input.student_id,
            schedule_id: None,
            date,
            time: input.time.trim().to_string(),
            duration_minutes: input.duration,
            lesson_plan_id: input.lesson_plan_id,
            notes: input.notes,
            created_by: SessionOrigin::Manual,
            created_at: Utc::now().to_rfc3339(),
        };
        self.sessions.put(&session).await?;
        info!("✓ {}", created_message(&session));
        Ok(session)
    }

    /// 未来 `days_ahead` 天（含今天）的课程安排，按日期、时间排序
    pub async fn upcoming(
        &self,
        student_id: Option<&str>,
        days_ahead: u32,
        today: NaiveDate,
    ) -> AppResult<Vec<UpcomingSession>> {
        if days_ahead == 0 {
            return Ok(Vec::new());
        }
        let schedules = self.list_schedules(student_id).await?;
        let last_day = today + Duration::days(i64::from(days_ahead) - 1);

        // 已备课的 (日期, 学生)
        let prepared: HashSet<(NaiveDate, String)> = self
            .sessions
            .list_in_range(today, last_day)
            .await?
            .into_iter()
            .filter(|s| s.lesson_plan_id.is_some())
            .map(|s| (s.date, s.student_id))
            .collect();

        let mut upcoming: Vec<UpcomingSession> = schedules
            .iter()
            .filter(|schedule| schedule.is_active)
            .flat_map(|schedule| {
                today
                    .iter_days()
                    .take(days_ahead as usize)
                    .filter(|date| schedule.occurs_on(*date))
                    .map(|date| UpcomingSession {
                        schedule_id: schedule.schedule_id.clone(),
                        student_id: schedule.student_id.clone(),
                        date,
                        day: date.format("%A").to_string(),
                        time: schedule.time.clone(),
                        duration: schedule.duration_minutes,
                        focus_topics: schedule.focus_topics.clone(),
                        has_lesson_plan: prepared.contains(&(date, schedule.student_id.clone())),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        upcoming.sort_by(|a, b| (a.date, &a.time).cmp(&(b.date, &b.time)));
        Ok(upcoming)
    }

    /// 列出课次并统计备课情况
    ///
    /// 未指定学生时必须有日期范围（缺省为从今天起 7 天）。
    pub async fn list_sessions(
        &self,
        student_id: Option<&str>,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> AppResult<SessionListing> {
        if let Some((start, end)) = range {
            if start > end {
                return Err(AppError::invalid_input(format!(
                    "start_date {} 晚于 end_date {}",
                    start, end
                )));
            }
        }

        let mut sessions = match student_id.filter(|id| !id.trim().is_empty()) {
            Some(student_id) => {
                self.sessions
                    .list_for_student(student_id, range, STUDENT_SESSION_LIMIT)
                    .await?
            }
            None => {
                let (start, end) = range.unwrap_or_else(|| {
                    let today = Utc::now().date_naive();
                    (today, today + Duration::days(DEFAULT_LISTING_DAYS))
                });
                self.sessions.list_in_range(start, end).await?
            }
        };
        sessions.sort_by(|a, b| (a.date, &a.time).cmp(&(b.date, &b.time)));

        let ready = sessions.iter().filter(|s| s.lesson_plan_id.is_some()).count();
        let summary = SessionSummary {
            total: sessions.len(),
            needs_preparation: sessions.len() - ready,
            ready,
        };
        Ok(SessionListing { sessions, summary })
    }
}

/// 新建课次的提示语
pub fn created_message(session: &Session) -> String {
    format!(
        "Created session {} for {} at {}",
        session.session_id,
        session.date.format("%Y-%m-%d"),
        session.time
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{DocumentStore, MemoryDocumentStore};

    fn service() -> (Arc<SessionRepository>, SessionService) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let sessions = Arc::new(SessionRepository::new(store.clone(), "test"));
        let service = SessionService::new(
            Arc::new(ScheduleRepository::new(store, "test")),
            sessions.clone(),
        );
        (sessions, service)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn new_schedule(student_id: &str, day_of_week: u8, time: &str) -> NewSchedule {
        NewSchedule {
            student_id: student_id.to_string(),
            day_of_week,
            time: time.to_string(),
            duration: 60,
            focus_topics: vec!["Algebra".to_string()],
        }
    }

    fn new_session(student_id: &str, session_date: &str) -> NewSession {
        NewSession {
            student_id: student_id.to_string(),
            session_date: session_date.to_string(),
            time: "16:30".to_string(),
            duration: 45,
            lesson_plan_id: None,
            notes: Some("exam prep".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_schedule_validates() {
        let (_, service) = service();
        assert!(service.create_schedule(new_schedule("s1", 7, "14:00")).await.is_err());
        assert!(service.create_schedule(new_schedule("s1", 1, "2pm")).await.is_err());

        let schedule = service.create_schedule(new_schedule("s1", 1, "14:00")).await.unwrap();
        assert!(schedule.schedule_id.starts_with("schedule_"));
        assert!(schedule.is_active);
        assert_eq!(service.list_schedules(Some("s1")).await.unwrap().len(), 1);
        assert!(service.list_schedules(Some("s2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_session() {
        let (sessions, service) = service();
        let session = service
            .create_manual_session(new_session("s1", "2025-03-14"))
            .await
            .unwrap();
        assert!(session.session_id.starts_with("sess_20250314_s1_"));
        assert_eq!(session.session_id.len(), "sess_20250314_s1_".len() + 8);
        assert_eq!(session.created_by, SessionOrigin::Manual);
        assert!(created_message(&session).ends_with("for 2025-03-14 at 16:30"));
        assert!(sessions.get(&session.session_id).await.unwrap().is_some());

        let err = service
            .create_manual_session(new_session("s1", "14/03/2025"))
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_upcoming_marks_prepared_sessions() {
        let (sessions, service) = service();
        // 2025-01-06 是周一
        service.create_schedule(new_schedule("s1", 1, "14:00")).await.unwrap();
        service.create_schedule(new_schedule("s2", 1, "09:00")).await.unwrap();
        let inactive = service.create_schedule(new_schedule("s3", 2, "10:00")).await.unwrap();
        service.deactivate_schedule(&inactive.schedule_id).await.unwrap();

        let mut prepared = Session::from_schedule(
            &service.list_schedules(Some("s1")).await.unwrap()[0],
            date("2025-01-06"),
            "",
        );
        prepared.lesson_plan_id = Some("lesson_1".to_string());
        sessions.put(&prepared).await.unwrap();

        let upcoming = service.upcoming(None, 7, date("2025-01-06")).await.unwrap();
        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].student_id, "s2");
        assert_eq!(upcoming[0].day, "Monday");
        assert!(!upcoming[0].has_lesson_plan);
        assert!(upcoming[1].has_lesson_plan);

        // 14 天内出现两次
        let two_weeks = service.upcoming(Some("s1"), 14, date("2025-01-06")).await.unwrap();
        assert_eq!(two_weeks.len(), 2);
        // 从周二开始的 6 天里没有周一
        assert!(service.upcoming(Some("s1"), 6, date("2025-01-07")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_sessions_summary() {
        let (sessions, service) = service();
        let first = service.create_manual_session(new_session("s1", "2025-02-03")).await.unwrap();
        service.create_manual_session(new_session("s1", "2025-02-01")).await.unwrap();
        service.create_manual_session(new_session("s2", "2025-02-02")).await.unwrap();
        sessions.attach_lesson_plan(&first.session_id, "lesson_x").await.unwrap();

        let range = Some((date("2025-02-01"), date("2025-02-28")));
        let all = service.list_sessions(None, range).await.unwrap();
        assert_eq!(
            all.summary,
            SessionSummary {
                total: 3,
                needs_preparation: 2,
                ready: 1
            }
        );
        assert_eq!(all.sessions[0].date, date("2025-02-01"));

        let mine = service.list_sessions(Some("s1"), None).await.unwrap();
        assert_eq!(mine.summary.total, 2);

        assert!(service
            .list_sessions(None, Some((date("2025-02-10"), date("2025-02-01"))))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_delete_schedule() {
        let (_, service) = service();
        let schedule = service.create_schedule(new_schedule("s1", 3, "11:00")).await.unwrap();
        service.delete_schedule(&schedule.schedule_id).await.unwrap();
        assert!(service.list_schedules(None).await.unwrap().is_empty());
        assert!(service
            .delete_schedule(&schedule.schedule_id)
            .await
            .unwrap_err()
            .is_not_found());
    }
}
