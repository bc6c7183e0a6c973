//! OpenAI 兼容 `/chat/completions` 工具调用的请求 / 响应结构

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChatMessage, ModelTurn, StopReason, ToolCall, ToolSpec};

#[derive(Debug, Serialize)]
pub(super) struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool<'a>>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub(super) enum WireMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<WireToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub(super) struct WireToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: WireFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub(super) struct WireFunctionCall {
    pub name: String,
    /// JSON 字符串
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub(super) struct WireTool<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct WireFunction<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
pub(super) struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireChoice {
    pub message: WireResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

pub(super) fn to_wire_messages(system: &str, messages: &[ChatMessage]) -> Vec<WireMessage> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    wire.push(WireMessage::System {
        content: system.to_string(),
    });
    for message in messages {
        match message {
            ChatMessage::User(text) => wire.push(WireMessage::User {
                content: text.clone(),
            }),
            ChatMessage::Assistant { text, tool_calls } => wire.push(WireMessage::Assistant {
                content: if text.is_empty() { None } else { Some(text.clone()) },
                tool_calls: tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: function_type(),
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: call.input.to_string(),
                        },
                    })
                    .collect(),
            }),
            // 每个结果单独一条 tool 消息
            ChatMessage::ToolResults(results) => {
                wire.extend(results.iter().map(|result| WireMessage::Tool {
                    tool_call_id: result.call_id.clone(),
                    content: result.content.to_string(),
                }))
            }
        }
    }
    wire
}

pub(super) fn to_wire_tools(tools: &[ToolSpec]) -> Vec<WireTool<'_>> {
    tools
        .iter()
        .map(|tool| WireTool {
            kind: "function",
            function: WireFunction {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.input_schema,
            },
        })
        .collect()
}

fn stop_reason(finish_reason: Option<&str>, has_tool_calls: bool) -> StopReason {
    match finish_reason {
        Some("tool_calls") | Some("function_call") => StopReason::ToolUse,
        Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        None if has_tool_calls => StopReason::ToolUse,
        None => StopReason::EndTurn,
        Some(_) => StopReason::Other,
    }
}

impl WireChoice {
    pub(super) fn into_turn(self) -> ModelTurn {
        let tool_calls: Vec<ToolCall> = self
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                // 参数不是合法 JSON 时原样保留，由工具自身报错
                input: serde_json::from_str(&call.function.arguments)
                    .unwrap_or(Value::String(call.function.arguments)),
            })
            .collect();
        ModelTurn {
            text: self.message.content.unwrap_or_default().trim().to_string(),
            stop_reason: stop_reason(self.finish_reason.as_deref(), !tool_calls.is_empty()),
            tool_calls,
        }
    }
}
