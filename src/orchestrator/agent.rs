//! 智能助手 - 有界的工具调用循环
//!
//! ## 状态流转
//!
//! ```text
//! AwaitingModel ──(请求工具)──> ExecutingTools ──(结果回传)──> AwaitingModel
//!       │
//!       └──(最终回答)──> Done
//! ```
//!
//! - 最多 5 轮模型调用，到达上限后返回最后一次的文本（可能为空）
//! - 模型调用失败立即结束，回答替换为固定的致歉语
//! - 单个工具失败不会中断循环，错误作为该工具的结果回传给模型
//! - 历史对话只保留最近 5 轮

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::prompt::{ASK_PROMPT, SYSTEM_PROMPT};
use super::tools::ToolRegistry;
use crate::error::AppResult;
use crate::infrastructure::llm::{ChatMessage, ChatTurn, Role, ToolCall, ToolResult};
use crate::infrastructure::{GenerationParams, TextGenerator};
use crate::utils::truncate_text;

/// 模型调用轮数上限
pub const MAX_AGENT_ROUNDS: usize = 5;
/// 保留的历史对话轮数
pub const HISTORY_WINDOW: usize = 5;
/// 模型调用失败时的回答
pub const APOLOGY: &str =
    "I'm sorry, I encountered an error while processing your request. Please try again.";

/// 一次工具调用的记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionTrace {
    pub tool: String,
    pub input: Value,
    pub summary: String,
    pub success: bool,
}

/// 助手的回答
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReply {
    pub response: String,
    pub action_traces: Vec<ActionTrace>,
    /// 实际进行的模型调用轮数
    pub rounds: usize,
}

enum AgentState {
    AwaitingModel,
    ExecutingTools(Vec<ToolCall>),
    Done(String),
}

/// 智能助手
pub struct AgentOrchestrator {
    generator: Arc<dyn TextGenerator>,
    registry: Arc<ToolRegistry>,
    params: GenerationParams,
}

impl AgentOrchestrator {
    pub fn new(generator: Arc<dyn TextGenerator>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            generator,
            registry,
            params: GenerationParams::default().with_max_tokens(4096),
        }
    }

    /// 回答一条消息，必要时调用工具
    ///
    /// # 参数
    /// - `message`: 本轮用户消息
    /// - `history`: 之前的对话，只取最后 5 轮
    ///
    /// # 返回
    /// 从不返回错误；模型不可用时回答为致歉语
    pub async fn chat(&self, message: &str, history: &[ChatTurn]) -> AgentReply {
        let mut messages: Vec<ChatMessage> = recent(history).iter().map(ChatMessage::from).collect();
        messages.push(ChatMessage::User(message.to_string()));
        let tools = self.registry.specs();

        info!("🤖 助手收到消息: {}", truncate_text(message, 80));

        let mut traces = Vec::new();
        let mut last_text = String::new();
        let mut rounds = 0;
        let mut state = AgentState::AwaitingModel;

        loop {
            state = match state {
                AgentState::AwaitingModel => {
                    if rounds == MAX_AGENT_ROUNDS {
                        warn!("⚠️ 已达到 {} 轮上限，返回最后一次的回答", MAX_AGENT_ROUNDS);
                        break;
                    }
                    rounds += 1;
                    debug!("第 {} 轮模型调用，消息 {} 条", rounds, messages.len());

                    let turn = match self
                        .generator
                        .converse(SYSTEM_PROMPT, &messages, &tools, &self.params)
                        .await
                    {
                        Ok(turn) => turn,
                        Err(e) => {
                            error!("❌ 第 {} 轮模型调用失败，结束对话: {}", rounds, e);
                            return AgentReply {
                                response: APOLOGY.to_string(),
                                action_traces: traces,
                                rounds,
                            };
                        }
                    };

                    last_text = turn.text.clone();
                    if turn.wants_tools() && !turn.tool_calls.is_empty() {
                        messages.push(ChatMessage::Assistant {
                            text: turn.text,
                            tool_calls: turn.tool_calls.clone(),
                        });
                        AgentState::ExecutingTools(turn.tool_calls)
                    } else {
                        AgentState::Done(turn.text)
                    }
                }
                AgentState::ExecutingTools(calls) => {
                    let results = self.execute_tools(&calls, &mut traces).await;
                    messages.push(ChatMessage::ToolResults(results));
                    AgentState::AwaitingModel
                }
                AgentState::Done(text) => {
                    info!("✓ 助手完成：{} 轮，调用工具 {} 次", rounds, traces.len());
                    return AgentReply {
                        response: text,
                        action_traces: traces,
                        rounds,
                    };
                }
            };
        }

        AgentReply {
            response: last_text,
            action_traces: traces,
            rounds,
        }
    }

    /// 按模型给出的顺序逐个执行工具
    async fn execute_tools(&self, calls: &[ToolCall], traces: &mut Vec<ActionTrace>) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            debug!("执行工具 {}: {}", call.name, call.input);
            let (content, trace) = match self.registry.execute(&call.name, call.input.clone()).await {
                Ok(outcome) => {
                    info!("🔧 {} → {}", call.name, outcome.summary);
                    let trace = ActionTrace {
                        tool: call.name.clone(),
                        input: call.input.clone(),
                        summary: outcome.summary.clone(),
                        success: true,
                    };
                    (outcome.into_payload(), trace)
                }
                Err(e) => {
                    warn!("⚠️ 工具 {} 执行失败: {}", call.name, e);
                    let trace = ActionTrace {
                        tool: call.name.clone(),
                        input: call.input.clone(),
                        summary: format!("Failed to execute {}", call.name),
                        success: false,
                    };
                    (json!({"error": e.to_string()}), trace)
                }
            };
            traces.push(trace);
            results.push(ToolResult {
                call_id: call.id.clone(),
                content,
            });
        }
        results
    }

    /// 不带工具的问答（流式生成后拼接）
    pub async fn ask(&self, message: &str, history: &[ChatTurn]) -> AppResult<String> {
        let mut turns = recent(history).to_vec();
        turns.push(ChatTurn {
            role: Role::User,
            content: message.to_string(),
        });
        let answer = self
            .generator
            .stream_reply(ASK_PROMPT, &turns, &self.params)
            .await?;
        Ok(answer)
    }
}

fn recent(history: &[ChatTurn]) -> &[ChatTurn] {
    &history[history.len().saturating_sub(HISTORY_WINDOW)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::infrastructure::llm::ModelTurn;
    use crate::infrastructure::ScriptedGenerator;
    use crate::orchestrator::tools::{Tool, ToolOutcome};
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes input"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn invoke(&self, input: Value) -> AppResult<ToolOutcome> {
            Ok(ToolOutcome::new(json!({"echo": input}), "echoed"))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn invoke(&self, _input: Value) -> AppResult<ToolOutcome> {
            Err(AppError::invalid_input("boom"))
        }
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            input: json!({"id": id}),
        }
    }

    fn agent() -> (Arc<ScriptedGenerator>, AgentOrchestrator) {
        let generator = Arc::new(ScriptedGenerator::new());
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(BrokenTool));
        let agent = AgentOrchestrator::new(generator.clone(), Arc::new(registry));
        (generator, agent)
    }

    #[tokio::test]
    async fn test_final_answer_without_tools() {
        let (generator, agent) = agent();
        generator.push_turn(ModelTurn::final_text("Hello teacher"));

        let reply = agent.chat("hi", &[]).await;
        assert_eq!(reply.response, "Hello teacher");
        assert!(reply.action_traces.is_empty());
        assert_eq!(reply.rounds, 1);

        let conversation = &generator.conversations()[0];
        assert_eq!(conversation.system, SYSTEM_PROMPT);
        assert_eq!(conversation.tool_names, vec!["broken", "echo"]);
    }

    #[tokio::test]
    async fn test_round_ceiling() {
        let (generator, agent) = agent();
        generator.repeat_turn(ModelTurn::tool_use(vec![call("c", "echo")]));

        let reply = agent.chat("loop forever", &[]).await;
        assert_eq!(reply.rounds, MAX_AGENT_ROUNDS);
        assert_eq!(generator.conversations().len(), MAX_AGENT_ROUNDS);
        assert_eq!(reply.action_traces.len(), MAX_AGENT_ROUNDS);
        assert_eq!(reply.response, "");
    }

    #[tokio::test]
    async fn test_failing_tool_does_not_stop_the_turn() {
        let (generator, agent) = agent();
        generator
            .push_turn(ModelTurn::tool_use(vec![
                call("c1", "echo"),
                call("c2", "broken"),
                call("c3", "echo"),
            ]))
            .push_turn(ModelTurn::final_text("Done"));

        let reply = agent.chat("do three things", &[]).await;
        assert_eq!(reply.response, "Done");
        assert_eq!(reply.action_traces.len(), 3);
        assert!(reply.action_traces[0].success);
        assert!(!reply.action_traces[1].success);
        assert_eq!(reply.action_traces[1].summary, "Failed to execute broken");
        assert!(reply.action_traces[2].success);

        let second = &generator.conversations()[1];
        let Some(ChatMessage::ToolResults(results)) = second.messages.last() else {
            panic!("expected tool results as last message");
        };
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].content["summary"], "echoed");
        assert!(results[1].content["error"].as_str().unwrap().contains("boom"));
        assert_eq!(results[1].content.as_object().unwrap().len(), 1);
        assert_eq!(results[2].call_id, "c3");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let (generator, agent) = agent();
        generator
            .push_turn(ModelTurn::tool_use(vec![call("c1", "web_search")]))
            .push_turn(ModelTurn::final_text("I can't search the web"));

        let reply = agent.chat("search", &[]).await;
        assert_eq!(reply.rounds, 2);
        assert!(!reply.action_traces[0].success);
        assert_eq!(reply.action_traces[0].summary, "Failed to execute web_search");
    }

    #[tokio::test]
    async fn test_model_failure_returns_apology() {
        let (generator, agent) = agent();
        generator
            .push_turn(ModelTurn::tool_use(vec![call("c1", "echo")]))
            .push_turn_error("throttled");

        let reply = agent.chat("hi", &[]).await;
        assert_eq!(reply.response, APOLOGY);
        assert_eq!(reply.action_traces.len(), 1);
        assert_eq!(reply.rounds, 2);
    }

    #[tokio::test]
    async fn test_history_window() {
        let (generator, agent) = agent();
        generator.push_turn(ModelTurn::final_text("ok"));
        let history: Vec<ChatTurn> = (0..8)
            .map(|i| ChatTurn {
                role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                content: format!("turn {}", i),
            })
            .collect();

        agent.chat("latest", &history).await;
        let messages = &generator.conversations()[0].messages;
        assert_eq!(messages.len(), HISTORY_WINDOW + 1);
        assert_eq!(
            messages[0],
            ChatMessage::Assistant {
                text: "turn 3".to_string(),
                tool_calls: vec![]
            }
        );
        assert_eq!(messages[5], ChatMessage::User("latest".to_string()));
    }

    #[tokio::test]
    async fn test_ask_streams_without_tools() {
        let (generator, agent) = agent();
        generator.push_reply("x = 4");
        assert_eq!(agent.ask("solve 2x = 8", &[]).await.unwrap(), "x = 4");
        let (prompt, _) = generator.prompts().pop().unwrap();
        assert!(prompt.starts_with(ASK_PROMPT));
        assert!(prompt.ends_with("solve 2x = 8"));
    }
}
