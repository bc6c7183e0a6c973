use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 每周固定课表
///
/// `day_of_week` 取 0..=6，0 表示周日。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringSchedule {
    pub schedule_id: String,
    pub student_id: String,
    pub day_of_week: u8,
    /// 24 小时制 `HH:MM`
    pub time: String,
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub focus_topics: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

fn default_active() -> bool {
    true
}

impl RecurringSchedule {
    /// 该日期是否落在本课表的星期上
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        date.weekday().num_days_from_sunday() == u32::from(self.day_of_week)
    }
}

/// 课次来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOrigin {
    /// 由固定课表自动生成
    Auto,
    /// 老师手动创建
    Manual,
}

/// 具体某一天的课次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
    pub date: NaiveDate,
    pub time: String,
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_by: SessionOrigin,
    #[serde(default)]
    pub created_at: String,
}

impl Session {
    /// 根据固定课表生成某一天的课次（尚未持久化）
    pub fn from_schedule(schedule: &RecurringSchedule, date: NaiveDate, created_at: &str) -> Self {
        Self {
            session_id: auto_session_id(date, &schedule.student_id),
            student_id: schedule.student_id.clone(),
            schedule_id: Some(schedule.schedule_id.clone()),
            date,
            time: schedule.time.clone(),
            duration_minutes: schedule.duration_minutes,
            lesson_plan_id: None,
            notes: None,
            created_by: SessionOrigin::Auto,
            created_at: created_at.to_string(),
        }
    }
}

/// 自动课次 ID：`sess_<YYYYMMDD>_<student_id>`
///
/// 只由日期和学生决定，是同一天同一学生去重的天然主键。
pub fn auto_session_id(date: NaiveDate, student_id: &str) -> String {
    format!("sess_{}_{}", date.format("%Y%m%d"), student_id)
}

/// 手动课次 ID：自动 ID 后追加 8 位随机后缀，不参与去重
pub fn manual_session_id(date: NaiveDate, student_id: &str) -> String {
    format!("{}_{}", auto_session_id(date, student_id), short_id())
}

/// 8 位十六进制随机串
pub fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// 解析 `YYYY-MM-DD` 日期
pub fn parse_date(field: &str, value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::invalid_input(format!("{} 应为 YYYY-MM-DD 格式: {}", field, value)))
}

/// 校验 `HH:MM` 时间
pub fn validate_time(value: &str) -> AppResult<()> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map(|_| ())
        .map_err(|_| AppError::invalid_input(format!("time 应为 HH:MM 格式: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_auto_session_id_is_stable() {
        let d = date("2025-03-14");
        let first = auto_session_id(d, "student_42");
        assert_eq!(first, "sess_20250314_student_42");
        assert_eq!(first, auto_session_id(d, "student_42"));
    }

    #[test]
    fn test_manual_session_id_has_random_suffix() {
        let d = date("2025-03-14");
        let a = manual_session_id(d, "s1");
        let b = manual_session_id(d, "s1");
        assert!(a.starts_with("sess_20250314_s1_"));
        assert_eq!(a.len(), "sess_20250314_s1_".len() + 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_occurs_on_uses_sunday_zero() {
        let schedule = RecurringSchedule {
            schedule_id: "sch1".to_string(),
            student_id: "s1".to_string(),
            day_of_week: 0,
            time: "10:00".to_string(),
            duration_minutes: 45,
            focus_topics: vec![],
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        };
        // 2025-01-12 是周日，2025-01-06 是周一
        assert!(schedule.occurs_on(date("2025-01-12")));
        assert!(!schedule.occurs_on(date("2025-01-06")));
    }

    #[test]
    fn test_session_wire_format() {
        let json = serde_json::json!({
            "session_id": "sess_20250106_s1",
            "student_id": "s1",
            "date": "2025-01-06",
            "time": "14:00",
            "duration": 60,
            "created_by": "auto"
        });
        let session: Session = serde_json::from_value(json).unwrap();
        assert_eq!(session.duration_minutes, 60);
        assert_eq!(session.created_by, SessionOrigin::Auto);
        let back = serde_json::to_value(&session).unwrap();
        assert_eq!(back["date"], "2025-01-06");
        assert!(back.get("lesson_plan_id").is_none());
    }

    #[test]
    fn test_parse_and_validate_inputs() {
        assert!(parse_date("session_date", "2025-02-30").is_err());
        assert_eq!(parse_date("d", "2025-01-06").unwrap(), date("2025-01-06"));
        assert!(validate_time("14:00").is_ok());
        assert!(validate_time("2pm").is_err());
    }
}
