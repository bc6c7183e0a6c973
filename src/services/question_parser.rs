//! 题目解析 - 从 OCR 文本中切分题目
//!
//! 两条路径：
//! - AI 解析：交给模型切题，置信度由模型给出（约 0.9+）
//! - 正则解析：按行首题号切分（0.7），切不出时按空行分段（0.5）
//!
//! 任何情况下都不返回错误，最差返回空列表。

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ParseStrategy;
use crate::infrastructure::GenerationParams;
use crate::models::ParsedQuestion;
use crate::services::llm_service::LlmService;
use crate::utils::{extract_json, truncate_text};

/// 少于该字符数（去掉首尾空白后）的文本不做解析
const MIN_TEXT_CHARS: usize = 20;
/// 题号切分后保留的最短题目长度
const MIN_QUESTION_CHARS: usize = 10;
/// 段落切分后保留的最短段落长度
const MIN_PARAGRAPH_CHARS: usize = 20;

const REGEX_CONFIDENCE: f64 = 0.7;
const PARAGRAPH_CONFIDENCE: f64 = 0.5;

/// 行首题号：`1.` `1)` `1:` `Q1.` `(a)`
const QUESTION_MARKER: &str = r"(?mi)^[ \t]*(?:Q?\d+[.):]|\([a-z]\))";
/// 答案标记：`Answer: ...` / `Ans ...`
const ANSWER_MARKER: &str = r"(?i)\b(?:Answer|Ans)[:\s]+([^\n]+)";

/// 题目解析器
pub struct QuestionParser {
    llm: Arc<LlmService>,
    strategy: ParseStrategy,
}

impl QuestionParser {
    pub fn new(llm: Arc<LlmService>, strategy: ParseStrategy) -> Self {
        Self { llm, strategy }
    }

    /// 按配置的策略解析题目
    ///
    /// - `Ai`: 先 AI，失败或为空时走正则
    /// - `Regex`: 先正则，切不出题时再试 AI
    pub async fn parse(&self, text: &str) -> Vec<ParsedQuestion> {
        if text.trim().chars().count() < MIN_TEXT_CHARS {
            debug!("文本过短，跳过题目解析");
            return Vec::new();
        }

        let questions = match self.strategy {
            ParseStrategy::Ai => match self.ai_parse(text).await {
                Some(questions) if !questions.is_empty() => questions,
                _ => fallback_parse_questions(text),
            },
            ParseStrategy::Regex => {
                let questions = fallback_parse_questions(text);
                if questions.is_empty() {
                    self.ai_parse(text).await.unwrap_or_default()
                } else {
                    questions
                }
            }
        };
        info!("🔍 解析出 {} 道题 (策略: {:?})", questions.len(), self.strategy);
        questions
    }

    /// AI 解析
    ///
    /// # 返回
    /// 模型调用失败或输出不是列表时返回 `None`
    pub async fn ai_parse(&self, text: &str) -> Option<Vec<ParsedQuestion>> {
        let prompt = format!(
            r#"Extract every individual math question from the worksheet text below (OCR output, may contain noise).

Text:
{text}

Respond with a JSON array; each element has the full question text and your confidence that it is a complete question:
[
  {{"text": "Solve for x: 2x + 5 = 13", "confidence": 0.95}}
]

Return only the JSON array, no other text."#
        );
        let params = GenerationParams::default()
            .with_temperature(0.3)
            .with_max_tokens(4096);

        let response = match self.llm.send_to_llm(&prompt, &params).await {
            Ok(response) => response,
            Err(e) => {
                warn!("⚠️ AI 题目解析失败，改用正则: {}", e);
                return None;
            }
        };

        let items: Vec<Value> = match extract_json(&response) {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    "⚠️ AI 题目解析输出不是列表: {} (原文: {})",
                    e,
                    truncate_text(&response, 120)
                );
                return None;
            }
        };

        Some(items.iter().filter_map(parsed_from_value).collect())
    }
}

fn parsed_from_value(item: &Value) -> Option<ParsedQuestion> {
    let text = item.get("text")?.as_str()?.trim();
    let confidence = item.get("confidence")?.as_f64()?;
    if text.chars().count() <= MIN_QUESTION_CHARS {
        return None;
    }
    Some(ParsedQuestion {
        text: text.to_string(),
        confidence,
    })
}

/// 正则兜底解析
///
/// 先按行首题号切分，取题号之后到下一个题号之前的题干；
/// 切不出任何题目时按空行分段。
pub fn fallback_parse_questions(text: &str) -> Vec<ParsedQuestion> {
    let by_marker = split_on_markers(text);
    if !by_marker.is_empty() {
        return by_marker;
    }

    text.split("\n\n")
        .map(str::trim)
        .filter(|p| p.chars().count() > MIN_PARAGRAPH_CHARS)
        .map(|p| ParsedQuestion {
            text: p.to_string(),
            confidence: PARAGRAPH_CONFIDENCE,
        })
        .collect()
}

fn split_on_markers(text: &str) -> Vec<ParsedQuestion> {
    let Ok(marker) = Regex::new(QUESTION_MARKER) else {
        return Vec::new();
    };

    // (题号起点, 题干起点)
    let spans: Vec<(usize, usize)> = marker.find_iter(text).map(|m| (m.start(), m.end())).collect();
    let mut questions = Vec::new();
    for (i, &(_, body_start)) in spans.iter().enumerate() {
        let end = spans.get(i + 1).map(|&(next, _)| next).unwrap_or(text.len());
        // 只保留题号之后的题干，长度按题干计算
        let body = text[body_start..end].trim();
        if body.chars().count() > MIN_QUESTION_CHARS {
            questions.push(ParsedQuestion {
                text: body.to_string(),
                confidence: REGEX_CONFIDENCE,
            });
        }
    }
    questions
}

/// 提取 `Answer:` / `Ans` 标记后的答案，保持出现顺序
pub fn extract_answers(text: &str) -> Vec<String> {
    let Ok(re) = Regex::new(ANSWER_MARKER) else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|a| !a.is_empty())
        .collect()
}
