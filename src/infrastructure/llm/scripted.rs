//! 按脚本回放的文本生成器
//!
//! 不访问网络，按顺序返回预先设定的回复，并记录收到的请求。
//! 本地演示和测试使用。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatMessage, ChatTurn, GenerationParams, ModelTurn, TextGenerator, ToolSpec};
use crate::error::LlmError;

/// 一次 `converse` 调用的快照
#[derive(Debug, Clone)]
pub struct RecordedConversation {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tool_names: Vec<String>,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<String, String>>,
    turns: VecDeque<Result<ModelTurn, String>>,
    /// 脚本耗尽后 `converse` 一直返回的回复
    repeat_turn: Option<ModelTurn>,
    prompts: Vec<(String, GenerationParams)>,
    conversations: Vec<RecordedConversation>,
}

/// 按脚本回放的文本生成器
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<Script>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        // 锁中毒只可能来自测试内 panic，继续使用内部数据即可
        let mut guard = match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// 追加一条 `generate` / `stream_reply` 回复
    pub fn push_reply(&self, text: impl Into<String>) -> &Self {
        let text = text.into();
        self.with_script(|s| s.replies.push_back(Ok(text)));
        self
    }

    /// 追加一次 `generate` / `stream_reply` 失败
    pub fn push_reply_error(&self, message: impl Into<String>) -> &Self {
        let message = message.into();
        self.with_script(|s| s.replies.push_back(Err(message)));
        self
    }

    /// 追加一轮 `converse` 输出
    pub fn push_turn(&self, turn: ModelTurn) -> &Self {
        self.with_script(|s| s.turns.push_back(Ok(turn)));
        self
    }

    /// 追加一次 `converse` 失败
    pub fn push_turn_error(&self, message: impl Into<String>) -> &Self {
        let message = message.into();
        self.with_script(|s| s.turns.push_back(Err(message)));
        self
    }

    /// 脚本耗尽后每次 `converse` 都返回该输出
    pub fn repeat_turn(&self, turn: ModelTurn) -> &Self {
        self.with_script(|s| s.repeat_turn = Some(turn));
        self
    }

    /// 收到的单轮 prompt 及参数
    pub fn prompts(&self) -> Vec<(String, GenerationParams)> {
        self.with_script(|s| s.prompts.clone())
    }

    /// 收到的工具对话请求
    pub fn conversations(&self) -> Vec<RecordedConversation> {
        self.with_script(|s| s.conversations.clone())
    }

    fn next_reply(&self) -> Result<String, LlmError> {
        self.with_script(|s| s.replies.pop_front())
            .unwrap_or_else(|| Err("脚本已耗尽".to_string()))
            .map_err(|detail| LlmError::InvalidResponse {
                model: "scripted".to_string(),
                detail,
            })
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        self.with_script(|s| s.prompts.push((prompt.to_string(), *params)));
        self.next_reply().map(|text| text.trim().to_string())
    }

    async fn converse(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        _params: &GenerationParams,
    ) -> Result<ModelTurn, LlmError> {
        let next = self.with_script(|s| {
            s.conversations.push(RecordedConversation {
                system: system.to_string(),
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });
            s.turns
                .pop_front()
                .or_else(|| s.repeat_turn.clone().map(Ok))
        });
        match next {
            Some(Ok(turn)) => Ok(turn),
            Some(Err(detail)) => Err(LlmError::InvalidResponse {
                model: "scripted".to_string(),
                detail,
            }),
            None => Err(LlmError::EmptyResponse {
                model: "scripted".to_string(),
            }),
        }
    }

    async fn stream_reply(
        &self,
        system: &str,
        turns: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let transcript = turns
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.with_script(|s| {
            s.prompts
                .push((format!("{}\n{}", system, transcript), *params))
        });
        self.next_reply()
    }
}
