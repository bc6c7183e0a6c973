//! 练习卷服务
//!
//! ## 出卷流程
//! 1. 从题库按知识点、难度取候选题
//! 2. 交给选题能力挑出目标题量
//! 3. 渲染为纯文本练习卷并上传
//! 4. 保存练习卷元数据（7 天下载链接）
//!
//! ## 批改流程
//! 批改本身不会失败；指定学生且批出题目时写入成绩记录。

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::session::short_id;
use crate::models::{
    CandidateQuestion, Difficulty, GradeRecord, GradingResult, Question, SelectionCriteria, Worksheet,
};
use crate::repositories::{GradeHistoryRepository, QuestionRepository, WorksheetRepository};
use crate::services::llm_service::LlmService;
use crate::services::storage_service::StorageService;

/// 每次出卷最多取的候选题数
const CANDIDATE_POOL: usize = 50;

fn default_question_count() -> usize {
    10
}

fn default_include_answer_key() -> bool {
    true
}

/// 出卷请求
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewWorksheet {
    pub title: String,
    pub topic: String,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default = "default_question_count")]
    pub question_count: usize,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default = "default_include_answer_key")]
    pub include_answer_key: bool,
}

/// 出卷结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedWorksheet {
    pub worksheet: Worksheet,
    pub questions: Vec<Question>,
}

impl CreatedWorksheet {
    pub fn summary(&self) -> String {
        format!(
            "Created worksheet '{}' with {} questions",
            self.worksheet.title,
            self.questions.len()
        )
    }
}

/// 批改请求
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GradeRequest {
    pub extracted_text: String,
    pub student_name: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub worksheet_id: Option<String>,
}

/// 批改结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradedWorksheet {
    #[serde(flatten)]
    pub result: GradingResult,
    /// 写入的成绩记录 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_id: Option<String>,
}

/// 练习卷服务
pub struct WorksheetService {
    llm: Arc<LlmService>,
    storage: Arc<StorageService>,
    questions: Arc<QuestionRepository>,
    worksheets: Arc<WorksheetRepository>,
    grade_history: Arc<GradeHistoryRepository>,
}

impl WorksheetService {
    pub fn new(
        llm: Arc<LlmService>,
        storage: Arc<StorageService>,
        questions: Arc<QuestionRepository>,
        worksheets: Arc<WorksheetRepository>,
        grade_history: Arc<GradeHistoryRepository>,
    ) -> Self {
        Self {
            llm,
            storage,
            questions,
            worksheets,
            grade_history,
        }
    }

    /// 出卷
    ///
    /// # 错误
    /// 题库中没有符合条件的题目时返回 `InvalidInput`
    pub async fn create_worksheet(&self, request: NewWorksheet) -> AppResult<CreatedWorksheet> {
        let title = request.title.trim();
        let topic = request.topic.trim();
        if title.is_empty() || topic.is_empty() {
            return Err(AppError::invalid_input("title 和 topic 不能为空"));
        }
        if request.question_count == 0 {
            return Err(AppError::invalid_input("question_count 必须大于 0"));
        }

        let pool = self
            .questions
            .search(Some(topic), request.difficulty, CANDIDATE_POOL)
            .await?;
        if pool.is_empty() {
            return Err(AppError::invalid_input(format!(
                "题库中没有符合条件的题目: {} / {:?}",
                topic, request.difficulty
            )));
        }

        let candidates: Vec<CandidateQuestion> = pool
            .iter()
            .map(|q| CandidateQuestion {
                topic: Some(q.topic.clone()),
                difficulty: Some(q.difficulty.to_string()),
                text: q.question_text.clone(),
            })
            .collect();
        let criteria = SelectionCriteria {
            topics: vec![topic.to_string()],
            difficulty: request.difficulty.map(|d| d.to_string()).into_iter().collect(),
            question_count: request.question_count,
            sections: None,
        };
        let picked = self.llm.select_questions(&candidates, &criteria).await;
        let questions: Vec<Question> = picked.iter().filter_map(|&i| pool.get(i).cloned()).collect();
        if questions.len() < request.question_count {
            warn!(
                "⚠️ 题库只有 {} 道候选题，少于需要的 {} 道",
                questions.len(),
                request.question_count
            );
        }

        let worksheet_id = format!("worksheet_{}", &uuid::Uuid::new_v4().simple().to_string()[..10]);
        let content = render_worksheet(title, topic, &questions, request.include_answer_key);
        let stored = self
            .storage
            .put(
                &format!("worksheets/{}.txt", worksheet_id),
                content.into_bytes(),
                "text/plain; charset=utf-8",
            )
            .await?;

        let worksheet = Worksheet {
            worksheet_id,
            title: title.to_string(),
            topic: topic.to_string(),
            difficulty: request.difficulty,
            student_id: request.student_id.clone(),
            question_ids: questions.iter().map(|q| q.question_id.clone()).collect(),
            object_key: stored.key,
            download_url: stored.download_url,
            created_at: Utc::now().to_rfc3339(),
        };
        self.worksheets.put(&worksheet).await?;

        let created = CreatedWorksheet { worksheet, questions };
        info!("📝 {}", created.summary());
        Ok(created)
    }

    /// 批改并记录成绩
    pub async fn grade_and_record(&self, request: GradeRequest) -> AppResult<GradedWorksheet> {
        let result = self
            .llm
            .grade_worksheet(&request.extracted_text, &request.student_name)
            .await;

        let student_id = request.student_id.filter(|id| !id.trim().is_empty());
        let grade_id = match student_id {
            Some(student_id) if result.total_questions > 0 => {
                let record = GradeRecord {
                    grade_id: format!("grade_{}", short_id()),
                    student_id,
                    worksheet_id: request.worksheet_id,
                    score: result.percent_label(),
                    topics: result.topics(),
                    weaknesses: result.weaknesses.clone(),
                    insights: result.insights.clone(),
                    graded_at: Utc::now().to_rfc3339(),
                };
                self.grade_history.put(&record).await?;
                info!("📊 已记录成绩 {} ({})", record.grade_id, record.score);
                Some(record.grade_id)
            }
            _ => None,
        };

        Ok(GradedWorksheet { result, grade_id })
    }
}

/// 渲染纯文本练习卷
fn render_worksheet(title: &str, topic: &str, questions: &[Question], include_answer_key: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "LUMIX WORKSHEET\n");
    let _ = writeln!(out, "Title: {}", title);
    let _ = writeln!(out, "Topic: {}\n", topic);
    let _ = writeln!(out, "Name: ____________________    Date: ____________\n");
    let _ = writeln!(out, "QUESTIONS:\n");
    for (idx, question) in questions.iter().enumerate() {
        let _ = writeln!(out, "{}. {}\n", idx + 1, question.question_text.trim());
        let _ = writeln!(out, "   Answer: ______________________________\n");
    }

    if include_answer_key {
        let _ = writeln!(out, "\nANSWER KEY:\n");
        for (idx, question) in questions.iter().enumerate() {
            let answer = question.answer.as_deref().unwrap_or("(no answer on file)");
            let _ = writeln!(out, "{}. {}", idx + 1, answer);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, text: &str, answer: Option<&str>) -> Question {
        Question {
            question_id: id.to_string(),
            question_text: text.to_string(),
            topic: "Algebra".to_string(),
            difficulty: Difficulty::Easy,
            answer: answer.map(str::to_string),
            explanation: None,
            teaching_tips: None,
        }
    }

    #[test]
    fn test_render_worksheet() {
        let questions = vec![
            question("q1", "Solve x + 2 = 5", Some("x = 3")),
            question("q2", "Solve 2x = 8", None),
        ];
        let text = render_worksheet("Linear practice", "Algebra", &questions, true);
        assert!(text.starts_with("LUMIX WORKSHEET"));
        assert!(text.contains("1. Solve x + 2 = 5"));
        assert!(text.contains("2. Solve 2x = 8"));
        assert!(text.contains("ANSWER KEY:\n\n1. x = 3\n2. (no answer on file)"));

        let without_key = render_worksheet("Linear practice", "Algebra", &questions, false);
        assert!(!without_key.contains("ANSWER KEY"));
    }

    #[test]
    fn test_request_defaults() {
        let request: NewWorksheet = serde_json::from_value(serde_json::json!({
            "title": "Practice",
            "topic": "Algebra",
            "difficulty": "beginner"
        }))
        .unwrap();
        assert_eq!(request.question_count, 10);
        assert!(request.include_answer_key);
        assert_eq!(request.difficulty, Some(Difficulty::Easy));
    }
}
