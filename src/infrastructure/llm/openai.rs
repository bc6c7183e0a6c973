//! OpenAI 兼容接口的文本生成实现
//!
//! ## 技术栈
//! - 单轮生成、流式对话使用 `async-openai`
//! - 工具调用直接走 `reqwest` + 自定义请求结构，便于精确控制 tool 消息格式
//! - 兼容 OpenAI API 的服务均可接入（自定义 API 端点和模型）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, warn};

use super::wire::{self, CompletionRequest, CompletionResponse};
use super::{ChatMessage, ChatTurn, GenerationParams, ModelTurn, Role, TextGenerator, ToolSpec};
use crate::error::LlmError;

/// OpenAI 兼容的文本生成服务
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model_name: String,
}

impl OpenAiGenerator {
    /// 创建新的文本生成服务
    ///
    /// # 参数
    /// - `api_base`: API 地址（如 `https://api.openai.com/v1`）
    /// - `model_name`: 模型名
    pub fn new(api_key: &str, api_base: &str, model_name: &str) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Self {
            client: Client::with_config(openai_config),
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model_name: model_name.to_string(),
        }
    }

    fn api_failed(&self, source: impl std::error::Error + Send + Sync + 'static) -> LlmError {
        LlmError::ApiCallFailed {
            model: self.model_name.clone(),
            source: Box::new(source),
        }
    }

    fn build_history(
        &self,
        system: &str,
        turns: &[ChatTurn],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()
            .map_err(|e| self.api_failed(e))?;
        messages.push(ChatCompletionRequestMessage::System(system_msg));

        for turn in turns {
            let message = match turn.role {
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(turn.content.as_str())
                        .build()
                        .map_err(|e| self.api_failed(e))?,
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(turn.content.as_str())
                        .build()
                        .map_err(|e| self.api_failed(e))?,
                ),
            };
            messages.push(message);
        }
        Ok(messages)
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", prompt.len());

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| self.api_failed(e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(params.temperature)
            .top_p(params.top_p)
            .max_tokens(params.max_tokens)
            .build()
            .map_err(|e| self.api_failed(e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            self.api_failed(e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| LlmError::EmptyResponse {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }

    async fn converse(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        params: &GenerationParams,
    ) -> Result<ModelTurn, LlmError> {
        debug!(
            "调用 LLM 工具对话，模型: {}，消息 {} 条，工具 {} 个",
            self.model_name,
            messages.len(),
            tools.len()
        );

        let request = CompletionRequest {
            model: &self.model_name,
            messages: wire::to_wire_messages(system, messages),
            tools: wire::to_wire_tools(tools),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("LLM 工具对话请求失败: {}", e);
                self.api_failed(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("LLM 工具对话返回异常: {} {}", status, body);
            return Err(LlmError::InvalidResponse {
                model: self.model_name.clone(),
                detail: format!("HTTP {}: {}", status, body),
            });
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| self.api_failed(e))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::EmptyResponse {
                model: self.model_name.clone(),
            })?;

        let turn = choice.into_turn();
        debug!(
            "LLM 工具对话完成: {:?}，请求工具 {} 个",
            turn.stop_reason,
            turn.tool_calls.len()
        );
        Ok(turn)
    }

    async fn stream_reply(
        &self,
        system: &str,
        turns: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let messages = self.build_history(system, turns)?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(params.temperature)
            .top_p(params.top_p)
            .max_tokens(params.max_tokens)
            .build()
            .map_err(|e| self.api_failed(e))?;

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| self.api_failed(e))?;

        let mut answer = String::new();
        let mut chunks = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                warn!("LLM 流式响应中断: {}", e);
                self.api_failed(e)
            })?;
            for choice in chunk.choices {
                if let Some(delta) = choice.delta.content {
                    answer.push_str(&delta);
                }
            }
            chunks += 1;
        }
        debug!("LLM 流式响应完成，共 {} 个分片", chunks);

        if answer.trim().is_empty() {
            return Err(LlmError::EmptyResponse {
                model: self.model_name.clone(),
            });
        }
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::llm::StopReason;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_converse_parses_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer key"))
            .and(body_partial_json(json!({"model": "m1", "tools": [{"type": "function"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": "",
                        "tool_calls": [{
                            "id": "call_a",
                            "type": "function",
                            "function": {"name": "query_students", "arguments": "{\"student_name\":\"Jo\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new("key", &server.uri(), "m1");
        let tools = vec![ToolSpec {
            name: "query_students".to_string(),
            description: "find students".to_string(),
            input_schema: json!({"type": "object"}),
        }];
        let turn = generator
            .converse(
                "sys",
                &[ChatMessage::User("find Jo".to_string())],
                &tools,
                &GenerationParams::default(),
            )
            .await
            .unwrap();
        assert_eq!(turn.stop_reason, StopReason::ToolUse);
        assert_eq!(turn.tool_calls[0].name, "query_students");
        assert_eq!(turn.tool_calls[0].input["student_name"], "Jo");
    }

    #[tokio::test]
    async fn test_converse_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new("key", &server.uri(), "m1");
        let err = generator
            .converse("sys", &[], &[], &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    #[ignore] // 需要真实的 API 凭据
    async fn test_generate_live() {
        let _ = tracing_subscriber::fmt::try_init();
        let config = crate::config::Config::from_env();
        let generator = OpenAiGenerator::new(
            &config.llm_api_key,
            &config.llm_api_base_url,
            &config.llm_model_name,
        );
        let reply = generator
            .generate("Reply with the single word: ready", &GenerationParams::default())
            .await
            .unwrap();
        assert!(!reply.is_empty());
    }
}
