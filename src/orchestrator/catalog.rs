//! 智能助手可调用的七个工具
//!
//! | 工具 | 能力 |
//! |---|---|
//! | `query_students` | 按姓名 / ID 查学生，或列出全部 |
//! | `query_grade_history` | 学生成绩记录与走势 |
//! | `query_questions` | 按知识点、难度查题库 |
//! | `get_schedule` | 未来 N 天的课程安排 |
//! | `generate_lesson_plan` | 生成并保存课程计划 |
//! | `create_session` | 手动新建课次 |
//! | `query_lesson_plans` | 列出课程计划 |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};

use super::tools::{parse_input, Tool, ToolOutcome, ToolRegistry};
use crate::error::{AppError, AppResult};
use crate::models::{Difficulty, GradeTrend};
use crate::repositories::{GradeHistoryRepository, QuestionRepository, StudentRepository};
use crate::services::session_service::created_message;
use crate::services::{LessonPlanRequest, LessonService, NewSession, SessionService};

pub const QUERY_STUDENTS: &str = "query_students";
pub const QUERY_GRADE_HISTORY: &str = "query_grade_history";
pub const QUERY_QUESTIONS: &str = "query_questions";
pub const GET_SCHEDULE: &str = "get_schedule";
pub const GENERATE_LESSON_PLAN: &str = "generate_lesson_plan";
pub const CREATE_SESSION: &str = "create_session";
pub const QUERY_LESSON_PLANS: &str = "query_lesson_plans";

/// 返回"今天"的时钟
pub type Today = fn() -> NaiveDate;

/// 本地时区的今天
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// 注册全部工具
///
/// `today` 决定 `get_schedule` 的起始日期
pub fn build_registry(
    students: Arc<StudentRepository>,
    grade_history: Arc<GradeHistoryRepository>,
    questions: Arc<QuestionRepository>,
    sessions: Arc<SessionService>,
    lessons: Arc<LessonService>,
    today: Today,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(QueryStudentsTool { students }));
    registry.register(Arc::new(QueryGradeHistoryTool { grade_history }));
    registry.register(Arc::new(QueryQuestionsTool { questions }));
    registry.register(Arc::new(GetScheduleTool {
        sessions: sessions.clone(),
        today,
    }));
    registry.register(Arc::new(GenerateLessonPlanTool {
        lessons: lessons.clone(),
    }));
    registry.register(Arc::new(CreateSessionTool { sessions }));
    registry.register(Arc::new(QueryLessonPlansTool { lessons }));
    registry
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ========== query_students ==========

pub struct QueryStudentsTool {
    students: Arc<StudentRepository>,
}

#[derive(Deserialize)]
struct QueryStudentsInput {
    #[serde(default)]
    student_name: Option<String>,
    #[serde(default)]
    student_id: Option<String>,
}

#[async_trait]
impl Tool for QueryStudentsTool {
    fn name(&self) -> &str {
        QUERY_STUDENTS
    }

    fn description(&self) -> &str {
        "Look up students by name or ID, or list every student when no filter is given. \
         Returns profile, grade level and per-topic accuracy."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "student_name": {"type": "string", "description": "Full or partial student name (case-insensitive)"},
                "student_id": {"type": "string", "description": "Exact student ID"}
            }
        })
    }

    async fn invoke(&self, input: Value) -> AppResult<ToolOutcome> {
        let input: QueryStudentsInput = parse_input(self.name(), input)?;
        let students = if let Some(id) = non_empty(input.student_id) {
            let student = self
                .students
                .get(&id)
                .await?
                .ok_or_else(|| AppError::not_found("学生", &id))?;
            vec![student]
        } else if let Some(name) = non_empty(input.student_name) {
            let student = self
                .students
                .find_by_name(&name)
                .await?
                .ok_or_else(|| AppError::not_found("学生", &name))?;
            vec![student]
        } else {
            self.students.list_all().await?
        };

        let summary = format!("Found {}", plural(students.len(), "student"));
        Ok(ToolOutcome::new(
            json!({"students": students, "count": students.len()}),
            summary,
        ))
    }
}

// ========== query_grade_history ==========

pub struct QueryGradeHistoryTool {
    grade_history: Arc<GradeHistoryRepository>,
}

#[derive(Deserialize)]
struct GradeHistoryInput {
    student_id: String,
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    10
}

#[async_trait]
impl Tool for QueryGradeHistoryTool {
    fn name(&self) -> &str {
        QUERY_GRADE_HISTORY
    }

    fn description(&self) -> &str {
        "Get a student's graded worksheets (newest first) with scores, topics, weaknesses and insights, \
         plus a performance trend."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "student_id": {"type": "string", "description": "Student ID"},
                "limit": {"type": "integer", "description": "Maximum records to return", "default": 10}
            },
            "required": ["student_id"]
        })
    }

    async fn invoke(&self, input: Value) -> AppResult<ToolOutcome> {
        let input: GradeHistoryInput = parse_input(self.name(), input)?;
        let history = self
            .grade_history
            .list_for_student(&input.student_id, input.limit)
            .await?;
        let trend = GradeTrend::from_history(&history);

        let summary = format!(
            "Found {} for {} (trend: {})",
            plural(history.len(), "grade record"),
            input.student_id,
            serde_json::to_value(trend)?.as_str().unwrap_or_default()
        );
        Ok(ToolOutcome::new(
            json!({"history": history, "count": history.len(), "trend": trend}),
            summary,
        ))
    }
}

// ========== query_questions ==========

pub struct QueryQuestionsTool {
    questions: Arc<QuestionRepository>,
}

#[derive(Deserialize)]
struct QueryQuestionsInput {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default = "default_question_limit")]
    limit: usize,
}

fn default_question_limit() -> usize {
    50
}

#[async_trait]
impl Tool for QueryQuestionsTool {
    fn name(&self) -> &str {
        QUERY_QUESTIONS
    }

    fn description(&self) -> &str {
        "Search the question bank by topic (partial, case-insensitive) and difficulty."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": {"type": "string", "description": "Topic, e.g. Quadratic Equations"},
                "difficulty": {"type": "string", "enum": ["Easy", "Medium", "Hard"]},
                "limit": {"type": "integer", "description": "Maximum questions to return", "default": 50}
            }
        })
    }

    async fn invoke(&self, input: Value) -> AppResult<ToolOutcome> {
        let input: QueryQuestionsInput = parse_input(self.name(), input)?;
        let topic = non_empty(input.topic);
        let difficulty = match non_empty(input.difficulty) {
            Some(raw) => Some(
                Difficulty::parse(&raw)
                    .ok_or_else(|| AppError::invalid_input(format!("未知难度: {}", raw)))?,
            ),
            None => None,
        };

        let questions = self
            .questions
            .search(topic.as_deref(), difficulty, input.limit)
            .await?;
        let summary = format!("Found {}", plural(questions.len(), "question"));
        Ok(ToolOutcome::new(
            json!({
                "questions": questions,
                "count": questions.len(),
                "filters_applied": {"topic": topic, "difficulty": difficulty},
            }),
            summary,
        ))
    }
}

// ========== get_schedule ==========

pub struct GetScheduleTool {
    sessions: Arc<SessionService>,
    today: Today,
}

#[derive(Deserialize)]
struct GetScheduleInput {
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default = "default_days_ahead")]
    days_ahead: u32,
}

fn default_days_ahead() -> u32 {
    7
}

#[async_trait]
impl Tool for GetScheduleTool {
    fn name(&self) -> &str {
        GET_SCHEDULE
    }

    fn description(&self) -> &str {
        "List upcoming tutoring sessions from the weekly schedule, optionally for one student, \
         and whether each already has a lesson plan."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "student_id": {"type": "string", "description": "Only this student's sessions"},
                "days_ahead": {"type": "integer", "description": "Days to look ahead including today", "default": 7}
            }
        })
    }

    async fn invoke(&self, input: Value) -> AppResult<ToolOutcome> {
        let input: GetScheduleInput = parse_input(self.name(), input)?;
        let student_id = non_empty(input.student_id);
        let sessions = self
            .sessions
            .upcoming(student_id.as_deref(), input.days_ahead, (self.today)())
            .await?;

        let unprepared = sessions.iter().filter(|s| !s.has_lesson_plan).count();
        let summary = format!(
            "Found {} in the next {} days ({} without a lesson plan)",
            plural(sessions.len(), "session"),
            input.days_ahead,
            unprepared
        );
        Ok(ToolOutcome::new(
            json!({"sessions": sessions, "count": sessions.len(), "days_ahead": input.days_ahead}),
            summary,
        ))
    }
}

// ========== generate_lesson_plan ==========

pub struct GenerateLessonPlanTool {
    lessons: Arc<LessonService>,
}

#[async_trait]
impl Tool for GenerateLessonPlanTool {
    fn name(&self) -> &str {
        GENERATE_LESSON_PLAN
    }

    fn description(&self) -> &str {
        "Generate and save a personalised lesson plan for a student, using their accuracy and recent grades. \
         Links the plan to a session when session_id is given."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": {"type": "string", "description": "Lesson topic"},
                "duration": {"type": "integer", "description": "Lesson length in minutes"},
                "student_id": {"type": "string", "description": "Student ID"},
                "worksheet_id": {"type": "string", "description": "Worksheet to use in the lesson"},
                "session_id": {"type": "string", "description": "Session to attach the plan to"},
                "use_student_data": {"type": "boolean", "default": true}
            },
            "required": ["topic", "duration", "student_id"]
        })
    }

    async fn invoke(&self, input: Value) -> AppResult<ToolOutcome> {
        let request: LessonPlanRequest = parse_input(self.name(), input)?;
        let generated = self.lessons.generate_lesson_plan(request).await?;
        let summary = generated.summary();
        Ok(ToolOutcome::new(
            json!({
                "lesson_plan_id": generated.lesson_plan.lesson_plan_id,
                "lesson_plan": generated.lesson_plan,
            }),
            summary,
        ))
    }
}

// ========== create_session ==========

pub struct CreateSessionTool {
    sessions: Arc<SessionService>,
}

#[async_trait]
impl Tool for CreateSessionTool {
    fn name(&self) -> &str {
        CREATE_SESSION
    }

    fn description(&self) -> &str {
        "Create a one-off tutoring session for a student on a specific date and time."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "student_id": {"type": "string"},
                "session_date": {"type": "string", "description": "YYYY-MM-DD"},
                "time": {"type": "string", "description": "HH:MM, 24-hour"},
                "duration": {"type": "integer", "description": "Minutes"},
                "lesson_plan_id": {"type": "string"},
                "notes": {"type": "string"}
            },
            "required": ["student_id", "session_date", "time", "duration"]
        })
    }

    async fn invoke(&self, input: Value) -> AppResult<ToolOutcome> {
        let request: NewSession = parse_input(self.name(), input)?;
        let session = self.sessions.create_manual_session(request).await?;
        let summary = created_message(&session);
        Ok(ToolOutcome::new(json!({"session": session}), summary))
    }
}

// ========== query_lesson_plans ==========

pub struct QueryLessonPlansTool {
    lessons: Arc<LessonService>,
}

#[derive(Deserialize)]
struct QueryLessonPlansInput {
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default = "default_plan_limit")]
    limit: usize,
}

fn default_plan_limit() -> usize {
    20
}

#[async_trait]
impl Tool for QueryLessonPlansTool {
    fn name(&self) -> &str {
        QUERY_LESSON_PLANS
    }

    fn description(&self) -> &str {
        "List saved lesson plans, optionally for one student (newest first)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "student_id": {"type": "string"},
                "limit": {"type": "integer", "default": 20}
            }
        })
    }

    async fn invoke(&self, input: Value) -> AppResult<ToolOutcome> {
        let input: QueryLessonPlansInput = parse_input(self.name(), input)?;
        let plans = self
            .lessons
            .list_lesson_plans(input.student_id.as_deref(), input.limit)
            .await?;
        let summary = format!("Found {}", plural(plans.len(), "lesson plan"));
        Ok(ToolOutcome::new(
            json!({"lesson_plans": plans, "count": plans.len()}),
            summary,
        ))
    }
}
