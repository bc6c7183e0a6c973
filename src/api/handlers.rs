//! 路由处理函数
//!
//! 只做请求解析和响应包装，业务全部委托给服务层。
//! 成功响应统一为 `{ "success": true, "data": ... }`。

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::error::ApiResult;
use crate::app::AppContext;
use crate::error::AppError;
use crate::infrastructure::llm::ChatTurn;
use crate::models::session::parse_date;
use crate::models::{
    CandidateQuestion, Classification, Explanation, GradeRecord, GradeTrend, LessonPlan,
    RecurringSchedule, SelectionCriteria, Session, Student,
};
use crate::orchestrator::ActionTrace;
use crate::services::{
    CreatedWorksheet, ExtractedAnswers, ExtractedDocument, GeneratedLessonPlan, GradeRequest,
    GradedWorksheet, LessonPlanRequest, NewSchedule, NewSession, NewWorksheet, PresignedUpload,
    SessionListing,
};

type Ctx = State<Arc<AppContext>>;

/// 学生详情中附带的成绩记录条数
const STUDENT_HISTORY_LIMIT: usize = 10;
/// 课程计划列表默认条数
const DEFAULT_LESSON_PLAN_LIMIT: usize = 20;

/// 成功响应
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { success: true, data })
}

fn require_body(bytes: Bytes) -> ApiResult<Vec<u8>> {
    if bytes.is_empty() {
        return Err(AppError::invalid_input("请求体为空，需要上传文件内容").into());
    }
    Ok(bytes.to_vec())
}

fn require_text(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::invalid_input(format!("{} 不能为空", field)).into());
    }
    Ok(())
}

// ========== 健康检查 ==========

pub async fn root() -> Json<Value> {
    Json(json!({
        "service": crate::SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
    }))
}

pub async fn health(State(ctx): Ctx) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": crate::SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "store_backend": format!("{:?}", ctx.config.store_backend).to_lowercase(),
    }))
}

// ========== 题目 ==========

#[derive(Debug, Deserialize)]
pub struct QuestionTextRequest {
    pub question_text: String,
}

pub async fn classify_question(
    State(ctx): Ctx,
    payload: Result<Json<QuestionTextRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<Classification>>> {
    let Json(request) = payload?;
    require_text("question_text", &request.question_text)?;
    Ok(ok(ctx.llm.classify_question(&request.question_text).await))
}

pub async fn explain_question(
    State(ctx): Ctx,
    payload: Result<Json<QuestionTextRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<Explanation>>> {
    let Json(request) = payload?;
    require_text("question_text", &request.question_text)?;
    Ok(ok(ctx.llm.generate_explanation(&request.question_text).await))
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub questions: Vec<CandidateQuestion>,
    #[serde(default)]
    pub criteria: SelectionCriteria,
}

#[derive(Debug, Serialize)]
pub struct SelectResponse {
    #[serde(rename = "selectedIndices")]
    pub selected_indices: Vec<usize>,
}

pub async fn select_questions(
    State(ctx): Ctx,
    payload: Result<Json<SelectRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<SelectResponse>>> {
    let Json(request) = payload?;
    let selected_indices = ctx.llm.select_questions(&request.questions, &request.criteria).await;
    Ok(ok(SelectResponse { selected_indices }))
}

// ========== 文档 ==========

pub async fn extract_document(State(ctx): Ctx, body: Bytes) -> ApiResult<Json<Envelope<ExtractedDocument>>> {
    let bytes = require_body(body)?;
    Ok(ok(ctx.documents.extract_from_bytes(bytes).await?))
}

#[derive(Debug, Deserialize)]
pub struct StoredDocumentRequest {
    #[serde(default)]
    pub bucket: Option<String>,
    pub key: String,
}

pub async fn extract_stored_document(
    State(ctx): Ctx,
    payload: Result<Json<StoredDocumentRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<ExtractedDocument>>> {
    let Json(request) = payload?;
    require_text("key", &request.key)?;
    let document = ctx
        .documents
        .extract_from_object(request.bucket.as_deref(), &request.key)
        .await?;
    Ok(ok(document))
}

pub async fn extract_answers(State(ctx): Ctx, body: Bytes) -> ApiResult<Json<Envelope<ExtractedAnswers>>> {
    let bytes = require_body(body)?;
    Ok(ok(ctx.documents.extract_answers(bytes).await?))
}

#[derive(Debug, Deserialize)]
pub struct PresignRequest {
    pub file_name: String,
}

pub async fn presign_upload(
    State(ctx): Ctx,
    payload: Result<Json<PresignRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<PresignedUpload>>> {
    let Json(request) = payload?;
    Ok(ok(ctx.storage.presign_upload(&request.file_name)?))
}

// ========== 课程计划 ==========

#[derive(Debug, Deserialize)]
pub struct LessonNotesRequest {
    pub topic: String,
    pub duration: u32,
    pub student_id: String,
}

#[derive(Debug, Serialize)]
pub struct LessonNotesResponse {
    pub teaching_notes: String,
    pub ai_reasoning: String,
}

/// 只生成讲义文本，不落库
pub async fn generate_lesson_notes(
    State(ctx): Ctx,
    payload: Result<Json<LessonNotesRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<LessonNotesResponse>>> {
    let Json(request) = payload?;
    require_text("topic", &request.topic)?;
    let teaching_notes = ctx
        .llm
        .generate_lesson_notes(&request.topic, request.duration, &request.student_id)
        .await?;
    Ok(ok(LessonNotesResponse {
        teaching_notes,
        ai_reasoning: format!(
            "Generated {}-minute lesson plan on {}",
            request.duration, request.topic
        ),
    }))
}

/// 生成完整课程计划并保存
pub async fn create_lesson_plan(
    State(ctx): Ctx,
    payload: Result<Json<LessonPlanRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<GeneratedLessonPlan>>> {
    let Json(request) = payload?;
    let generated = ctx.lessons.generate_lesson_plan(request).await?;
    info!("📝 {}", generated.summary());
    Ok(ok(generated))
}

#[derive(Debug, Deserialize)]
pub struct LessonPlanQuery {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn list_lesson_plans(
    State(ctx): Ctx,
    Query(query): Query<LessonPlanQuery>,
) -> ApiResult<Json<Envelope<Vec<LessonPlan>>>> {
    let plans = ctx
        .lessons
        .list_lesson_plans(
            query.student_id.as_deref(),
            query.limit.unwrap_or(DEFAULT_LESSON_PLAN_LIMIT),
        )
        .await?;
    Ok(ok(plans))
}

// ========== 批改与练习卷 ==========

pub async fn grade_worksheet(
    State(ctx): Ctx,
    payload: Result<Json<GradeRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<GradedWorksheet>>> {
    let Json(request) = payload?;
    Ok(ok(ctx.worksheets.grade_and_record(request).await?))
}

pub async fn create_worksheet(
    State(ctx): Ctx,
    payload: Result<Json<NewWorksheet>, JsonRejection>,
) -> ApiResult<Json<Envelope<CreatedWorksheet>>> {
    let Json(request) = payload?;
    let created = ctx.worksheets.create_worksheet(request).await?;
    info!("📄 {}", created.summary());
    Ok(ok(created))
}

// ========== 学生 ==========

pub async fn list_students(State(ctx): Ctx) -> ApiResult<Json<Envelope<Vec<Student>>>> {
    Ok(ok(ctx.students.list_all().await?))
}

#[derive(Debug, Serialize)]
pub struct StudentDetail {
    pub student: Student,
    pub weak_topics: Vec<String>,
    pub recent_grades: Vec<GradeRecord>,
    pub trend: GradeTrend,
}

pub async fn get_student(
    State(ctx): Ctx,
    Path(student_id): Path<String>,
) -> ApiResult<Json<Envelope<StudentDetail>>> {
    let student = ctx
        .students
        .get(&student_id)
        .await?
        .ok_or_else(|| AppError::not_found("学生", &student_id))?;
    let recent_grades = ctx
        .grade_history
        .list_for_student(&student_id, STUDENT_HISTORY_LIMIT)
        .await?;
    Ok(ok(StudentDetail {
        weak_topics: student.weak_topics(),
        trend: GradeTrend::from_history(&recent_grades),
        student,
        recent_grades,
    }))
}

// ========== 固定课表 ==========

pub async fn create_schedule(
    State(ctx): Ctx,
    payload: Result<Json<NewSchedule>, JsonRejection>,
) -> ApiResult<Json<Envelope<RecurringSchedule>>> {
    let Json(request) = payload?;
    Ok(ok(ctx.sessions.create_schedule(request).await?))
}

#[derive(Debug, Deserialize)]
pub struct StudentFilter {
    #[serde(default)]
    pub student_id: Option<String>,
}

pub async fn list_schedules(
    State(ctx): Ctx,
    Query(filter): Query<StudentFilter>,
) -> ApiResult<Json<Envelope<Vec<RecurringSchedule>>>> {
    Ok(ok(ctx.sessions.list_schedules(filter.student_id.as_deref()).await?))
}

#[derive(Debug, Deserialize)]
pub struct DeleteScheduleQuery {
    #[serde(default)]
    pub permanent: bool,
}

/// 默认只停用；`?permanent=true` 时物理删除
pub async fn delete_schedule(
    State(ctx): Ctx,
    Path(schedule_id): Path<String>,
    Query(query): Query<DeleteScheduleQuery>,
) -> ApiResult<Json<Envelope<Value>>> {
    if query.permanent {
        ctx.sessions.delete_schedule(&schedule_id).await?;
        return Ok(ok(json!({ "schedule_id": schedule_id, "deleted": true })));
    }
    let schedule = ctx.sessions.deactivate_schedule(&schedule_id).await?;
    Ok(ok(json!({ "schedule_id": schedule.schedule_id, "deleted": false, "is_active": schedule.is_active })))
}

// ========== 课次 ==========

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl SessionQuery {
    /// 起止日期必须同时给出
    fn range(&self) -> Result<Option<(NaiveDate, NaiveDate)>, AppError> {
        match (&self.start_date, &self.end_date) {
            (Some(start), Some(end)) => Ok(Some((
                parse_date("start_date", start)?,
                parse_date("end_date", end)?,
            ))),
            (None, None) => Ok(None),
            _ => Err(AppError::invalid_input("start_date 和 end_date 需要同时提供")),
        }
    }
}

pub async fn list_sessions(
    State(ctx): Ctx,
    Query(query): Query<SessionQuery>,
) -> ApiResult<Json<Envelope<SessionListing>>> {
    let range = query.range()?;
    let listing = ctx
        .sessions
        .list_sessions(query.student_id.as_deref(), range)
        .await?;
    Ok(ok(listing))
}

pub async fn create_session(
    State(ctx): Ctx,
    payload: Result<Json<NewSession>, JsonRejection>,
) -> ApiResult<Json<Envelope<Session>>> {
    let Json(request) = payload?;
    Ok(ok(ctx.sessions.create_manual_session(request).await?))
}

#[derive(Debug, Deserialize)]
pub struct MaterializeRequest {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Serialize)]
pub struct MaterializeResponse {
    pub created: Vec<Session>,
    pub count: usize,
}

pub async fn materialize_sessions(
    State(ctx): Ctx,
    payload: Result<Json<MaterializeRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<MaterializeResponse>>> {
    let Json(request) = payload?;
    let start = parse_date("start_date", &request.start_date)?;
    let end = parse_date("end_date", &request.end_date)?;
    let created = ctx.materializer.materialize(start, end).await?;
    Ok(ok(MaterializeResponse {
        count: created.len(),
        created,
    }))
}

// ========== 智能助手 ==========

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: String,
    pub action_traces: Vec<ActionTrace>,
}

pub async fn agent_chat(
    State(ctx): Ctx,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<ChatResponse>>> {
    let Json(request) = payload?;
    require_text("message", &request.message)?;
    let reply = ctx.agent.chat(&request.message, &request.history).await;
    Ok(ok(ChatResponse {
        response: reply.response,
        conversation_id: request
            .conversation_id
            .unwrap_or_else(|| "new-session".to_string()),
        action_traces: reply.action_traces,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

pub async fn agent_ask(
    State(ctx): Ctx,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<Value>>> {
    let Json(request) = payload?;
    require_text("message", &request.message)?;
    let response = ctx.agent.ask(&request.message, &request.history).await?;
    Ok(ok(json!({ "response": response })))
}
