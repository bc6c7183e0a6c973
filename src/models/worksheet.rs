use serde::{Deserialize, Serialize};

use super::question::Difficulty;
use crate::utils::{ExtractError, Validate};

/// 已生成的练习卷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub worksheet_id: String,
    pub title: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    pub question_ids: Vec<String>,
    pub object_key: String,
    pub download_url: String,
    #[serde(default)]
    pub created_at: String,
}

/// 选题条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionCriteria {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub difficulty: Vec<String>,
    #[serde(default = "default_question_count")]
    pub question_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<SectionPlan>,
}

fn default_question_count() -> usize {
    10
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            difficulty: Vec::new(),
            question_count: default_question_count(),
            sections: None,
        }
    }
}

/// 各部分题量
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SectionPlan {
    #[serde(default)]
    pub warmup: usize,
    #[serde(default)]
    pub practice: usize,
    #[serde(default)]
    pub challenge: usize,
}

/// 选题候选项（只给模型看摘要）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateQuestion {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default, alias = "question_text")]
    pub text: String,
}

/// 模型返回的选题结果
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionResponse {
    #[serde(rename = "selectedIndices")]
    pub selected_indices: Vec<i64>,
}

impl Validate for SelectionResponse {
    fn validate(&self) -> Result<(), ExtractError> {
        if self.selected_indices.is_empty() {
            return Err(ExtractError::invalid_field("selectedIndices", "不能为空"));
        }
        Ok(())
    }
}

/// 单题批改结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    #[serde(default)]
    pub question_id: String,
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub topic: String,
    pub is_correct: bool,
    #[serde(default)]
    pub student_answer: String,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default)]
    pub feedback: String,
}

/// 整卷批改结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    pub total_questions: u32,
    pub correct_answers: u32,
    pub score: String,
    #[serde(default)]
    pub question_results: Vec<QuestionResult>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub insights: String,
}

impl Default for GradingResult {
    fn default() -> Self {
        Self {
            total_questions: 0,
            correct_answers: 0,
            score: "0/0".to_string(),
            question_results: Vec::new(),
            weaknesses: Vec::new(),
            insights: "Unable to grade worksheet automatically. Please review manually."
                .to_string(),
        }
    }
}

impl Validate for GradingResult {
    fn validate(&self) -> Result<(), ExtractError> {
        if self.correct_answers > self.total_questions {
            return Err(ExtractError::invalid_field(
                "correct_answers",
                format!("{} 大于总题数 {}", self.correct_answers, self.total_questions),
            ));
        }
        Ok(())
    }
}

impl GradingResult {
    /// 涉及的知识点（去重，保持出现顺序）
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for result in &self.question_results {
            if !result.topic.is_empty() && !topics.contains(&result.topic) {
                topics.push(result.topic.clone());
            }
        }
        topics
    }

    /// 百分比分数，如 `70%`
    pub fn percent_label(&self) -> String {
        if self.total_questions == 0 {
            return "0%".to_string();
        }
        let percent = f64::from(self.correct_answers) / f64::from(self.total_questions) * 100.0;
        format!("{:.0}%", percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_defaults_and_camel_case() {
        let c: SelectionCriteria = serde_json::from_str("{}").unwrap();
        assert_eq!(c.question_count, 10);

        let c: SelectionCriteria = serde_json::from_value(serde_json::json!({
            "topics": ["Algebra"],
            "questionCount": 4,
            "sections": {"warmup": 1, "practice": 2, "challenge": 1}
        }))
        .unwrap();
        assert_eq!(c.question_count, 4);
        assert_eq!(c.sections.unwrap().practice, 2);
    }

    #[test]
    fn test_grading_validation_and_labels() {
        let result = GradingResult {
            total_questions: 10,
            correct_answers: 7,
            score: "7/10".to_string(),
            ..GradingResult::default()
        };
        assert!(result.validate().is_ok());
        assert_eq!(result.percent_label(), "70%");

        let broken = GradingResult {
            total_questions: 2,
            correct_answers: 3,
            ..GradingResult::default()
        };
        assert!(broken.validate().is_err());
        assert_eq!(GradingResult::default().percent_label(), "0%");
    }
}
