use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::student::GradeRecord;

/// 课程计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonPlan {
    pub lesson_plan_id: String,
    pub student_id: String,
    pub topic: String,
    /// 课时（分钟）
    pub duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worksheet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub teaching_notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_context: Option<StudentContext>,
    #[serde(default)]
    pub objectives: Vec<String>,
    pub structure: LessonStructure,
    #[serde(default)]
    pub created_at: String,
}

/// 生成课程计划时参考的学生情况
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentContext {
    pub name: String,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub accuracy: BTreeMap<String, f64>,
    #[serde(default)]
    pub recent_performance: Vec<GradeRecord>,
    #[serde(default)]
    pub weak_areas: Vec<String>,
}

/// 课堂时间分配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonStructure {
    pub warmup: String,
    pub main_practice: String,
    pub challenge: String,
    pub homework: String,
}

impl LessonStructure {
    /// 按 15% / 50% / 20% / 15% 切分课时（向下取整）
    pub fn for_duration(duration: u32) -> Self {
        let part = |percent: u32| duration * percent / 100;
        Self {
            warmup: format!("{} minutes - Review fundamentals", part(15)),
            main_practice: format!("{} minutes - Guided problem solving", part(50)),
            challenge: format!("{} minutes - Advanced problems", part(20)),
            homework: format!("{} minutes - Assign practice", part(15)),
        }
    }
}

/// 课程目标
pub fn objectives_for(topic: &str, has_weak_areas: bool) -> Vec<String> {
    vec![
        format!("Review and strengthen understanding of {}", topic),
        if has_weak_areas {
            "Address identified weak areas".to_string()
        } else {
            "Build solid foundation".to_string()
        },
        "Practice problem-solving strategies".to_string(),
    ]
}
