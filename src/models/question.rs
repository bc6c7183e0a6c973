use phf::phf_map;
use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::{ExtractError, Validate};

/// 题目难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// 难度别名（小写） → 难度
static DIFFICULTY_ALIASES: phf::Map<&'static str, Difficulty> = phf_map! {
    "easy" => Difficulty::Easy,
    "beginner" => Difficulty::Easy,
    "medium" => Difficulty::Medium,
    "intermediate" => Difficulty::Medium,
    "hard" => Difficulty::Hard,
    "advanced" => Difficulty::Hard,
};

impl Difficulty {
    /// 获取标准名称
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }

    /// 从字符串解析难度（忽略大小写，支持别名）
    pub fn parse(s: &str) -> Option<Self> {
        DIFFICULTY_ALIASES
            .get(s.trim().to_ascii_lowercase().as_str())
            .copied()
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Difficulty::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("未知难度: {}", raw)))
    }
}

/// 题库中的题目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    #[serde(alias = "text")]
    pub question_text: String,
    pub topic: String,
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teaching_tips: Option<String>,
}

/// 题目分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub topic: String,
    pub difficulty: Difficulty,
    pub confidence: f64,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            topic: "General Math".to_string(),
            difficulty: Difficulty::Medium,
            confidence: 0.5,
        }
    }
}

impl Validate for Classification {
    fn validate(&self) -> Result<(), ExtractError> {
        if self.topic.trim().is_empty() {
            return Err(ExtractError::invalid_field("topic", "不能为空"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ExtractError::invalid_field(
                "confidence",
                format!("{} 超出 [0, 1]", self.confidence),
            ));
        }
        Ok(())
    }
}

/// 题目讲解与教学建议
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub explanation: String,
    pub teaching_tips: String,
}

impl Default for Explanation {
    fn default() -> Self {
        Self {
            explanation: "Unable to generate explanation at this time.".to_string(),
            teaching_tips: "Review the problem with the student step by step.".to_string(),
        }
    }
}

impl Validate for Explanation {
    fn validate(&self) -> Result<(), ExtractError> {
        if self.explanation.trim().is_empty() {
            return Err(ExtractError::invalid_field("explanation", "不能为空"));
        }
        Ok(())
    }
}

/// 从 OCR 文本中解析出的题目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuestion {
    pub text: String,
    /// LLM 解析约 0.9+，正则 0.7，段落切分 0.5
    pub confidence: f64,
}

impl Validate for ParsedQuestion {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_aliases() {
        assert_eq!(Difficulty::parse("HARD"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::parse(" beginner "), Some(Difficulty::Easy));
        assert_eq!(Difficulty::parse("Intermediate"), Some(Difficulty::Medium));
        assert_eq!(Difficulty::parse("impossible"), None);
    }

    #[test]
    fn test_difficulty_serde() {
        let d: Difficulty = serde_json::from_str("\"advanced\"").unwrap();
        assert_eq!(d, Difficulty::Hard);
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"Hard\"");
        assert!(serde_json::from_str::<Difficulty>("\"extreme\"").is_err());
    }

    #[test]
    fn test_question_accepts_text_alias() {
        let q: Question = serde_json::from_value(serde_json::json!({
            "question_id": "q1",
            "text": "Solve x + 1 = 2",
            "topic": "Linear Equations",
            "difficulty": "Easy"
        }))
        .unwrap();
        assert_eq!(q.question_text, "Solve x + 1 = 2");
        assert!(q.answer.is_none());
    }

    #[test]
    fn test_classification_validation() {
        let bad = Classification {
            confidence: 1.5,
            ..Classification::default()
        };
        assert!(bad.validate().is_err());
        assert!(Classification::default().validate().is_ok());
    }
}
