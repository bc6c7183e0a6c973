//! LLM 输出的 JSON 提取
//!
//! 模型经常把 JSON 包在 Markdown 代码块里，这里统一处理：
//! 去掉代码块 → 解析 JSON → 反序列化为目标结构 → 字段语义校验。
//! 三种失败原因分别对应 [`ExtractError`] 的三个变体。

use serde::de::DeserializeOwned;
use thiserror::Error;

/// JSON 提取失败原因
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    /// 文本不是合法 JSON
    #[error("不是合法的JSON: {0}")]
    NotJson(String),
    /// JSON 结构与期望不符
    #[error("JSON结构不符: {0}")]
    WrongShape(String),
    /// 字段取值不合法
    #[error("字段 {field} 不合法: {reason}")]
    InvalidField { field: String, reason: String },
}

impl ExtractError {
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ExtractError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 反序列化之后的语义校验
pub trait Validate {
    fn validate(&self) -> Result<(), ExtractError> {
        Ok(())
    }
}

impl Validate for serde_json::Value {}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), ExtractError> {
        self.iter().try_for_each(Validate::validate)
    }
}

/// 去掉可选的 Markdown 代码块包裹
///
/// 支持 ```` ```json ```` 与 ```` ``` ```` 两种开头，结尾的 ```` ``` ```` 可缺省。
pub fn strip_code_fence(raw: &str) -> &str {
    let text = raw.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // 跳过语言标记（如 json）所在的第一行
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest.trim_start_matches("json"),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// 从 LLM 原始输出中提取并校验 JSON
///
/// # 参数
/// - `raw`: 模型返回的原始文本
///
/// # 返回
/// 解析并校验通过的结构，或具体的失败原因
pub fn extract_json<T>(raw: &str) -> Result<T, ExtractError>
where
    T: DeserializeOwned + Validate,
{
    let body = strip_code_fence(raw);
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ExtractError::NotJson(e.to_string()))?;
    let parsed: T =
        serde_json::from_value(value).map_err(|e| ExtractError::WrongShape(e.to_string()))?;
    parsed.validate()?;
    Ok(parsed)
}
