//! 文本生成 - 基础设施层
//!
//! 三种调用方式：
//! - `generate`：单轮生成，返回去掉首尾空白的原始文本
//! - `converse`：带工具清单的多轮调用，返回文本、工具调用请求和停止原因
//! - `stream_reply`：流式多轮对话，拼接为完整文本

pub mod openai;
pub mod scripted;
mod wire;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;

pub use openai::OpenAiGenerator;
pub use scripted::ScriptedGenerator;

/// 解码参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

impl GenerationParams {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// 对话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 历史对话中的一轮（纯文本）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// 模型请求的一次工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// 回传给模型的工具执行结果
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub content: Value,
}

/// 工具调用对话中的消息
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    User(String),
    Assistant {
        text: String,
        tool_calls: Vec<ToolCall>,
    },
    ToolResults(Vec<ToolResult>),
}

impl From<&ChatTurn> for ChatMessage {
    fn from(turn: &ChatTurn) -> Self {
        match turn.role {
            Role::User => ChatMessage::User(turn.content.clone()),
            Role::Assistant => ChatMessage::Assistant {
                text: turn.content.clone(),
                tool_calls: Vec::new(),
            },
        }
    }
}

/// 提供给模型的工具声明
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// 停止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 模型给出最终回答
    EndTurn,
    /// 模型请求执行工具
    ToolUse,
    /// 达到输出上限
    MaxTokens,
    Other,
}

/// 一轮模型输出
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTurn {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
}

impl ModelTurn {
    /// 仅含文本的最终回答
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
            stop_reason: StopReason::EndTurn,
        }
    }

    /// 请求执行工具
    pub fn tool_use(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: String::new(),
            tool_calls,
            stop_reason: StopReason::ToolUse,
        }
    }

    pub fn wants_tools(&self) -> bool {
        self.stop_reason == StopReason::ToolUse
    }
}

/// 文本生成能力
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// 当前模型名（日志用）
    fn model_name(&self) -> &str;

    /// 单轮生成
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError>;

    /// 带工具清单的一轮调用
    async fn converse(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        params: &GenerationParams,
    ) -> Result<ModelTurn, LlmError>;

    /// 流式多轮对话，返回拼接后的完整回答
    async fn stream_reply(
        &self,
        system: &str,
        turns: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<String, LlmError>;
}
