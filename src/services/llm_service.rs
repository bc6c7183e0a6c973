//! LLM 服务 - 业务能力层
//!
//! 只负责"让模型做判断"的能力：分类、讲解、选题、批改、课堂讲义。
//!
//! ## 降级约定
//! 分类、讲解、选题、批改都遵循同一流程：
//! 拼 prompt（要求只返回 JSON）→ 调用模型 → 去掉代码块 → 解析 → 校验。
//! 任一步失败都返回固定默认值或非 AI 的兜底结果，从不把错误抛给调用方。
//! 课堂讲义是例外，失败时原样返回错误。

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::index::sample;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::{GenerationParams, TextGenerator};
use crate::models::worksheet::SelectionResponse;
use crate::models::{CandidateQuestion, Classification, Explanation, GradingResult, SelectionCriteria};
use crate::utils::{extract_json, truncate_text, Validate};

/// 候选题在 prompt 中展示的最大字符数
const PREVIEW_CHARS: usize = 100;

/// LLM 服务
///
/// 职责：
/// - 为每种 AI 能力拼装 prompt、设定解码参数
/// - 解析并校验模型输出
/// - 失败时给出确定的默认值
pub struct LlmService {
    generator: Arc<dyn TextGenerator>,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// 通用的 LLM 调用函数
    ///
    /// 这是最基础的调用接口，其他功能都基于此函数。
    ///
    /// # 参数
    /// - `prompt`: 用户消息内容
    /// - `params`: 解码参数
    ///
    /// # 返回
    /// 返回模型响应文本（已去掉首尾空白）
    pub async fn send_to_llm(&self, prompt: &str, params: &GenerationParams) -> AppResult<String> {
        debug!(
            "调用 LLM，模型: {}，prompt {} 字符，temperature {}",
            self.generator.model_name(),
            prompt.len(),
            params.temperature
        );
        let response = self.generator.generate(prompt, params).await?;
        debug!("LLM 响应: {}", truncate_text(&response, 200));
        Ok(response)
    }

    /// 调用模型并解析为指定结构，失败返回 `None` 并记录原因
    async fn ask_json<T>(&self, task: &str, prompt: &str, params: &GenerationParams) -> Option<T>
    where
        T: DeserializeOwned + Validate,
    {
        let response = match self.send_to_llm(prompt, params).await {
            Ok(response) => response,
            Err(e) => {
                warn!("⚠️ [{}] LLM 调用失败，使用兜底结果: {}", task, e);
                return None;
            }
        };
        match extract_json::<T>(&response) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(
                    "⚠️ [{}] LLM 输出无法使用，使用兜底结果: {} (原文: {})",
                    task,
                    e,
                    truncate_text(&response, 120)
                );
                None
            }
        }
    }

    /// 判断题目的知识点和难度
    ///
    /// # 返回
    /// 失败时返回 `{General Math, Medium, 0.5}`
    pub async fn classify_question(&self, question_text: &str) -> Classification {
        let prompt = format!(
            r#"You are a math education expert. Classify the math question below.

Question: {question_text}

Respond with JSON in exactly this shape:
{{
  "topic": "main topic, e.g. Quadratic Equations, Trigonometry, Linear Equations, Geometry, Functions",
  "difficulty": "Easy, Medium, or Hard",
  "confidence": number between 0 and 1
}}

Return only the JSON, no other text."#
        );
        let params = GenerationParams::default().with_temperature(0.3);
        let classification = self
            .ask_json("题目分类", &prompt, &params)
            .await
            .unwrap_or_default();
        debug!("题目分类结果: {:?}", classification);
        classification
    }

    /// 生成题目讲解和教学建议
    ///
    /// # 返回
    /// 失败时返回固定的占位文本
    pub async fn generate_explanation(&self, question_text: &str) -> Explanation {
        let prompt = format!(
            r#"You are a patient math tutor. Explain how to solve the question below and give tips for teaching it.

Question: {question_text}

Respond with JSON in exactly this shape:
{{
  "explanation": "clear step-by-step solution",
  "teaching_tips": "practical advice for teaching this concept"
}}

Return only the JSON, no other text."#
        );
        let params = GenerationParams::default().with_temperature(0.7);
        self.ask_json("题目讲解", &prompt, &params)
            .await
            .unwrap_or_default()
    }

    /// 生成课堂讲义（Warmup / Main Teaching Content / Practice Problems / Recap）
    ///
    /// 与其他能力不同，失败时返回错误。
    pub async fn generate_lesson_notes(&self, topic: &str, duration: u32, student_id: &str) -> AppResult<String> {
        info!("📝 为学生 {} 生成 {} 分钟讲义: {}", student_id, duration, topic);
        let prompt = format!(
            r#"Write teaching notes for a {duration}-minute tutoring lesson on {topic}.

Split the lesson into timed sections with short teaching bullet points, using exactly these headings:

**Warmup (X minutes)**
- ...

**Main Teaching Content (X minutes)**
- ...

**Practice Problems (X minutes)**
- ...

**Recap (X minutes)**
- ...

Keep it concise and practical."#
        );
        let params = GenerationParams::default()
            .with_max_tokens(1000)
            .with_temperature(0.7);
        self.send_to_llm(&prompt, &params).await
    }

    /// 从候选题中选出一套练习卷
    ///
    /// # 参数
    /// - `questions`: 候选题
    /// - `criteria`: 选题条件（题量默认 10）
    ///
    /// # 返回
    /// 选中的候选题下标。候选不足时返回全部；模型失败时均匀随机抽样（升序）。
    pub async fn select_questions(
        &self,
        questions: &[CandidateQuestion],
        criteria: &SelectionCriteria,
    ) -> Vec<usize> {
        let count = criteria.question_count;
        if questions.len() <= count {
            return (0..questions.len()).collect();
        }

        let prompt = build_selection_prompt(questions, criteria);
        let params = GenerationParams::default()
            .with_temperature(0.5)
            .with_max_tokens(2048);

        if let Some(response) = self
            .ask_json::<SelectionResponse>("智能选题", &prompt, &params)
            .await
        {
            let picked = sanitize_indices(&response.selected_indices, questions.len(), count);
            if !picked.is_empty() {
                info!("✓ 模型选出 {} / {} 道题", picked.len(), questions.len());
                return picked;
            }
            warn!("⚠️ 模型返回的下标全部无效，改为随机抽样");
        }
        random_selection(questions.len(), count)
    }

    /// 批改练习卷
    ///
    /// # 返回
    /// 失败时返回全零结果并提示人工复核
    pub async fn grade_worksheet(&self, extracted_text: &str, student_name: &str) -> GradingResult {
        let prompt = format!(
            r#"You are an experienced math tutor grading {student_name}'s worksheet.

Worksheet text (from OCR):
{extracted_text}

For every question: identify the question and the student's answer, name its topic, decide whether the answer is correct, and give brief feedback.
Then list the student's weak topics and overall insights.

Respond with JSON in exactly this shape:
{{
  "total_questions": 10,
  "correct_answers": 7,
  "score": "7/10",
  "question_results": [
    {{
      "question_id": "q1",
      "question_text": "question text",
      "topic": "Quadratic Equations",
      "is_correct": true,
      "student_answer": "x = 2, 3",
      "correct_answer": "x = 2, 3",
      "feedback": "Well done"
    }}
  ],
  "weaknesses": ["topic"],
  "insights": "overall recommendations"
}}

Return only the JSON, no other text."#
        );
        let params = GenerationParams::default()
            .with_temperature(0.3)
            .with_max_tokens(4096);
        let result: GradingResult = self
            .ask_json("试卷批改", &prompt, &params)
            .await
            .unwrap_or_default();
        info!(
            "📊 {} 批改完成: {} ({} 题)",
            student_name, result.score, result.total_questions
        );
        result
    }
}

fn build_selection_prompt(questions: &[CandidateQuestion], criteria: &SelectionCriteria) -> String {
    let count = criteria.question_count;
    let metadata: Vec<_> = questions
        .iter()
        .enumerate()
        .map(|(index, q)| {
            json!({
                "index": index,
                "topic": q.topic,
                "difficulty": q.difficulty,
                "preview": q.text.chars().take(PREVIEW_CHARS).collect::<String>(),
            })
        })
        .collect();
    let listing = serde_json::to_string_pretty(&metadata).unwrap_or_default();

    let sections = criteria
        .sections
        .map(|s| {
            format!(
                "- Sections: Warm-up ({}), Practice ({}), Challenge ({})\n",
                s.warmup, s.practice, s.challenge
            )
        })
        .unwrap_or_default();
    let section_rule = if criteria.sections.is_some() {
        "5. Respect the sections: easier questions for warm-up, harder ones for challenge\n"
    } else {
        ""
    };

    format!(
        r#"You are an expert math tutor building a worksheet. Choose the best {count} questions from the list below.

Criteria:
- Topics: {topics}
- Difficulty levels: {difficulty}
- Total questions needed: {count}
{sections}
Available questions:
{listing}

Prefer a selection that:
1. Covers a variety of topics
2. Progresses sensibly in difficulty
3. Avoids near-duplicates
4. Gives a balanced learning experience
{section_rule}
Respond with JSON listing the chosen indices in worksheet order:
{{
  "selectedIndices": [0, 5, 12]
}}

Return only the JSON, no other text."#,
        topics = criteria.topics.join(", "),
        difficulty = criteria.difficulty.join(", "),
    )
}

/// 去掉越界和重复的下标，截断到目标题量
fn sanitize_indices(raw: &[i64], pool: usize, count: usize) -> Vec<usize> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|&i| usize::try_from(i).ok())
        .filter(|&i| i < pool && seen.insert(i))
        .take(count)
        .collect()
}

/// 均匀随机抽取 `count` 个下标（升序）
fn random_selection(pool: usize, count: usize) -> Vec<usize> {
    let mut rng = rand::thread_rng();
    let mut picked = sample(&mut rng, pool, count.min(pool)).into_vec();
    picked.sort_unstable();
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ScriptedGenerator;
    use crate::models::Difficulty;

    fn service() -> (Arc<ScriptedGenerator>, LlmService) {
        let generator = Arc::new(ScriptedGenerator::new());
        let service = LlmService::new(generator.clone());
        (generator, service)
    }

    fn candidates(n: usize) -> Vec<CandidateQuestion> {
        (0..n)
            .map(|i| CandidateQuestion {
                topic: Some("Algebra".to_string()),
                difficulty: Some("Easy".to_string()),
                text: format!("Question number {}", i),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_classify_parses_fenced_json() {
        let (generator, service) = service();
        generator.push_reply(
            "```json\n{\"topic\": \"Trigonometry\", \"difficulty\": \"hard\", \"confidence\": 0.92}\n```",
        );
        let result = service.classify_question("sin(x) = 0.5").await;
        assert_eq!(result.topic, "Trigonometry");
        assert_eq!(result.difficulty, Difficulty::Hard);

        let (prompt, params) = &generator.prompts()[0];
        assert!(prompt.contains("sin(x) = 0.5"));
        assert_eq!(params.temperature, 0.3);
    }

    #[tokio::test]
    async fn test_classify_defaults_when_generation_fails() {
        let (generator, service) = service();
        generator.push_reply_error("provider down");
        let result = service.classify_question("2 + 2").await;
        assert_eq!(
            result,
            Classification {
                topic: "General Math".to_string(),
                difficulty: Difficulty::Medium,
                confidence: 0.5,
            }
        );
    }

    #[tokio::test]
    async fn test_classify_defaults_on_invalid_fields() {
        let (generator, service) = service();
        generator.push_reply("{\"topic\": \"Algebra\", \"difficulty\": \"Medium\", \"confidence\": 7}");
        assert_eq!(service.classify_question("x").await, Classification::default());

        generator.push_reply("I think it's algebra");
        assert_eq!(service.classify_question("x").await, Classification::default());
    }

    #[tokio::test]
    async fn test_explanation_default() {
        let (generator, service) = service();
        generator.push_reply("{\"wrong\": true}");
        let explanation = service.generate_explanation("x").await;
        assert_eq!(explanation.explanation, "Unable to generate explanation at this time.");
        assert_eq!(
            explanation.teaching_tips,
            "Review the problem with the student step by step."
        );
    }

    #[tokio::test]
    async fn test_lesson_notes_propagate_errors() {
        let (generator, service) = service();
        generator.push_reply_error("timeout");
        assert!(service.generate_lesson_notes("Fractions", 60, "s1").await.is_err());

        generator.push_reply("**Warmup (9 minutes)**\n- recall");
        let notes = service.generate_lesson_notes("Fractions", 60, "s1").await.unwrap();
        assert!(notes.starts_with("**Warmup"));
        let (_, params) = generator.prompts().pop().unwrap();
        assert_eq!(params.max_tokens, 1000);
    }

    #[tokio::test]
    async fn test_select_returns_all_when_pool_is_small() {
        let (generator, service) = service();
        let criteria = SelectionCriteria {
            question_count: 5,
            ..SelectionCriteria::default()
        };
        assert_eq!(service.select_questions(&candidates(3), &criteria).await, vec![0, 1, 2]);
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_select_sanitizes_model_indices() {
        let (generator, service) = service();
        generator.push_reply("{\"selectedIndices\": [7, 7, 99, -1, 2, 4, 5]}");
        let criteria = SelectionCriteria {
            question_count: 3,
            ..SelectionCriteria::default()
        };
        let picked = service.select_questions(&candidates(10), &criteria).await;
        assert_eq!(picked, vec![7, 2, 4]);
    }

    #[tokio::test]
    async fn test_select_falls_back_to_random_sample() {
        let (generator, service) = service();
        generator.push_reply("no idea");
        let criteria = SelectionCriteria {
            question_count: 4,
            ..SelectionCriteria::default()
        };
        let picked = service.select_questions(&candidates(12), &criteria).await;
        assert_eq!(picked.len(), 4);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
        assert!(picked.iter().all(|&i| i < 12));
    }

    #[tokio::test]
    async fn test_grading_default_on_failure() {
        let (generator, service) = service();
        generator.push_reply("{\"total_questions\": 1, \"correct_answers\": 5, \"score\": \"5/1\"}");
        let result = service.grade_worksheet("1. 2+2 = 4", "Jo").await;
        assert_eq!(result, GradingResult::default());
    }

    #[tokio::test]
    async fn test_grading_success() {
        let (generator, service) = service();
        generator.push_reply(
            r#"{"total_questions": 2, "correct_answers": 1, "score": "1/2",
                "question_results": [
                  {"question_id": "q1", "question_text": "2+2", "topic": "Arithmetic", "is_correct": true,
                   "student_answer": "4", "correct_answer": "4", "feedback": "Good"},
                  {"question_id": "q2", "question_text": "3*3", "topic": "Arithmetic", "is_correct": false,
                   "student_answer": "6", "correct_answer": "9", "feedback": "Multiply, don't add"}
                ],
                "weaknesses": ["Multiplication"], "insights": "Practice times tables"}"#,
        );
        let result = service.grade_worksheet("...", "Jo").await;
        assert_eq!(result.correct_answers, 1);
        assert_eq!(result.topics(), vec!["Arithmetic".to_string()]);
        assert_eq!(generator.prompts()[0].1.max_tokens, 4096);
    }

    #[test]
    fn test_selection_prompt_mentions_sections() {
        let criteria = SelectionCriteria {
            topics: vec!["Algebra".to_string()],
            question_count: 2,
            sections: Some(crate::models::SectionPlan {
                warmup: 1,
                practice: 1,
                challenge: 0,
            }),
            ..SelectionCriteria::default()
        };
        let prompt = build_selection_prompt(&candidates(3), &criteria);
        assert!(prompt.contains("Warm-up (1)"));
        assert!(prompt.contains("\"index\": 2"));
    }
}
