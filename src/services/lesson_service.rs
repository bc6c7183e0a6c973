//! 课程计划服务
//!
//! 结合学生档案和最近成绩，生成并保存课程计划；
//! 指定课次时把计划挂到该课次上。

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::lesson_plan::objectives_for;
use crate::models::session::short_id;
use crate::models::{LessonPlan, LessonStructure, Student, StudentContext};
use crate::repositories::{
    GradeHistoryRepository, LessonPlanRepository, SessionRepository, StudentRepository,
};
use crate::services::llm_service::LlmService;

/// 参考的成绩记录条数
const HISTORY_LIMIT: usize = 5;
/// 写入课程计划的最近成绩条数
const RECENT_PERFORMANCE: usize = 3;

/// 课程计划生成请求
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LessonPlanRequest {
    pub topic: String,
    pub duration: u32,
    pub student_id: String,
    #[serde(default)]
    pub worksheet_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_use_student_data")]
    pub use_student_data: bool,
}

fn default_use_student_data() -> bool {
    true
}

/// 生成结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedLessonPlan {
    pub lesson_plan: LessonPlan,
    pub student_name: String,
}

impl GeneratedLessonPlan {
    pub fn summary(&self) -> String {
        format!(
            "Generated {}-minute lesson plan for {} on {}",
            self.lesson_plan.duration, self.student_name, self.lesson_plan.topic
        )
    }
}

/// 课程计划服务
pub struct LessonService {
    llm: Arc<LlmService>,
    students: Arc<StudentRepository>,
    grade_history: Arc<GradeHistoryRepository>,
    lesson_plans: Arc<LessonPlanRepository>,
    sessions: Arc<SessionRepository>,
}

impl LessonService {
    pub fn new(
        llm: Arc<LlmService>,
        students: Arc<StudentRepository>,
        grade_history: Arc<GradeHistoryRepository>,
        lesson_plans: Arc<LessonPlanRepository>,
        sessions: Arc<SessionRepository>,
    ) -> Self {
        Self {
            llm,
            students,
            grade_history,
            lesson_plans,
            sessions,
        }
    }

    /// 生成并保存课程计划
    ///
    /// # 错误
    /// - 学生不存在：`NotFound`
    /// - 讲义生成失败、存储失败：原样返回
    pub async fn generate_lesson_plan(&self, request: LessonPlanRequest) -> AppResult<GeneratedLessonPlan> {
        let topic = request.topic.trim();
        if topic.is_empty() {
            return Err(AppError::invalid_input("topic 不能为空"));
        }
        if request.duration == 0 {
            return Err(AppError::invalid_input("duration 必须大于 0"));
        }

        let student = self
            .students
            .get(&request.student_id)
            .await?
            .ok_or_else(|| AppError::not_found("学生", &request.student_id))?;

        let student_context = if request.use_student_data {
            Some(self.student_context(&student).await?)
        } else {
            None
        };
        let has_weak_areas = student_context
            .as_ref()
            .is_some_and(|ctx| !ctx.weak_areas.is_empty());

        let teaching_notes = self
            .llm
            .generate_lesson_notes(topic, request.duration, &student.student_id)
            .await?;

        let lesson_plan = LessonPlan {
            lesson_plan_id: format!("lesson_{}", short_id()),
            student_id: student.student_id.clone(),
            topic: topic.to_string(),
            duration: request.duration,
            worksheet_id: request.worksheet_id.clone(),
            session_id: request.session_id.clone(),
            teaching_notes,
            student_context,
            objectives: objectives_for(topic, has_weak_areas),
            structure: LessonStructure::for_duration(request.duration),
            created_at: Utc::now().to_rfc3339(),
        };
        self.lesson_plans.put(&lesson_plan).await?;

        if let Some(session_id) = &request.session_id {
            self.sessions
                .attach_lesson_plan(session_id, &lesson_plan.lesson_plan_id)
                .await?;
            debug!("课程计划已关联课次 {}", session_id);
        }

        let generated = GeneratedLessonPlan {
            lesson_plan,
            student_name: student.name,
        };
        info!("📚 {}", generated.summary());
        Ok(generated)
    }

    async fn student_context(&self, student: &Student) -> AppResult<StudentContext> {
        let mut history = self
            .grade_history
            .list_for_student(&student.student_id, HISTORY_LIMIT)
            .await?;
        history.truncate(RECENT_PERFORMANCE);
        Ok(StudentContext {
            name: student.name.clone(),
            grade: student.grade.clone(),
            accuracy: student.accuracy.clone(),
            recent_performance: history,
            weak_areas: student.weak_topics(),
        })
    }

    /// 列出课程计划（按学生筛选时最新的在前）
    pub async fn list_lesson_plans(&self, student_id: Option<&str>, limit: usize) -> AppResult<Vec<LessonPlan>> {
        let student_id = student_id.filter(|id| !id.trim().is_empty());
        self.lesson_plans.list(student_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{DocumentStore, MemoryDocumentStore, ScriptedGenerator};
    use crate::models::{GradeRecord, Session, SessionOrigin};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    struct Fixture {
        generator: Arc<ScriptedGenerator>,
        students: Arc<StudentRepository>,
        grade_history: Arc<GradeHistoryRepository>,
        sessions: Arc<SessionRepository>,
        service: LessonService,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let generator = Arc::new(ScriptedGenerator::new());
        let students = Arc::new(StudentRepository::new(store.clone(), "test"));
        let grade_history = Arc::new(GradeHistoryRepository::new(store.clone(), "test"));
        let sessions = Arc::new(SessionRepository::new(store.clone(), "test"));
        let service = LessonService::new(
            Arc::new(LlmService::new(generator.clone())),
            students.clone(),
            grade_history.clone(),
            Arc::new(LessonPlanRepository::new(store, "test")),
            sessions.clone(),
        );
        Fixture {
            generator,
            students,
            grade_history,
            sessions,
            service,
        }
    }

    fn request(student_id: &str) -> LessonPlanRequest {
        LessonPlanRequest {
            topic: "Fractions".to_string(),
            duration: 60,
            student_id: student_id.to_string(),
            worksheet_id: None,
            session_id: None,
            use_student_data: true,
        }
    }

    async fn seed_student(f: &Fixture) {
        f.students
            .put(&Student {
                student_id: "s1".to_string(),
                name: "Mia".to_string(),
                grade: Some("Year 7".to_string()),
                accuracy: BTreeMap::from([("Fractions".to_string(), 0.4)]),
                email: None,
                notes: None,
            })
            .await
            .unwrap();
        for day in 1..=4 {
            f.grade_history
                .put(&GradeRecord {
                    grade_id: format!("g{}", day),
                    student_id: "s1".to_string(),
                    worksheet_id: None,
                    score: format!("{}0%", day + 4),
                    topics: vec![],
                    weaknesses: vec![],
                    insights: String::new(),
                    graded_at: format!("2025-01-0{}T10:00:00Z", day),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_generates_plan_with_context() {
        let f = fixture();
        seed_student(&f).await;
        f.generator.push_reply("**Warmup (9 minutes)**\n- fraction walls");

        let generated = f.service.generate_lesson_plan(request("s1")).await.unwrap();
        let plan = &generated.lesson_plan;
        assert!(plan.lesson_plan_id.starts_with("lesson_"));
        assert_eq!(plan.lesson_plan_id.len(), "lesson_".len() + 8);
        assert_eq!(plan.objectives[1], "Address identified weak areas");
        assert_eq!(plan.structure.main_practice, "30 minutes - Guided problem solving");

        let context = plan.student_context.as_ref().unwrap();
        assert_eq!(context.recent_performance.len(), 3);
        assert_eq!(context.recent_performance[0].grade_id, "g4");
        assert_eq!(context.weak_areas, vec!["Fractions".to_string()]);
        assert_eq!(
            generated.summary(),
            "Generated 60-minute lesson plan for Mia on Fractions"
        );

        let listed = f.service.list_lesson_plans(Some("s1"), 10).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_student() {
        let f = fixture();
        let err = f.service.generate_lesson_plan(request("ghost")).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(f.generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_attaches_plan_to_session() {
        let f = fixture();
        seed_student(&f).await;
        let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        f.sessions
            .put(&Session {
                session_id: "sess_20250106_s1".to_string(),
                student_id: "s1".to_string(),
                schedule_id: None,
                date,
                time: "14:00".to_string(),
                duration_minutes: 60,
                lesson_plan_id: None,
                notes: None,
                created_by: SessionOrigin::Auto,
                created_at: String::new(),
            })
            .await
            .unwrap();
        f.generator.push_reply("notes");

        let mut req = request("s1");
        req.session_id = Some("sess_20250106_s1".to_string());
        req.use_student_data = false;
        let generated = f.service.generate_lesson_plan(req).await.unwrap();
        assert!(generated.lesson_plan.student_context.is_none());
        assert_eq!(generated.lesson_plan.objectives[1], "Build solid foundation");

        let session = f.sessions.get("sess_20250106_s1").await.unwrap().unwrap();
        assert_eq!(
            session.lesson_plan_id.as_deref(),
            Some(generated.lesson_plan.lesson_plan_id.as_str())
        );
    }
}
