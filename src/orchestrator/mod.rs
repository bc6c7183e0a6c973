//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层让模型通过"工具调用"使用系统自身的数据和业务能力，是智能助手的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `tools` - 工具接口与注册表
//! - 定义 `Tool` trait（名字、描述、输入 Schema、执行）
//! - 按名字注册、查找、执行
//!
//! ### `catalog` - 七个内置工具
//! - 学生、成绩、题库、课表、课程计划的查询与创建
//! - 每个成功结果都带一行可读摘要
//!
//! ### `agent` - 有界的工具调用循环
//! - 拼装系统提示词、最近 5 轮历史和本轮消息
//! - 顺序执行模型请求的工具，结果回传模型
//! - 最多 5 轮，模型失败时返回致歉语
//!
//! ## 层次关系
//!
//! ```text
//! agent (多轮对话)
//!     ↓
//! tools::ToolRegistry (按名字分派)
//!     ↓
//! catalog (七个工具)
//!     ↓
//! services / repositories
//! ```

pub mod agent;
pub mod catalog;
pub mod prompt;
pub mod tools;

pub use agent::{ActionTrace, AgentOrchestrator, AgentReply, MAX_AGENT_ROUNDS};
pub use catalog::{build_registry, local_today, Today};
pub use tools::{Tool, ToolOutcome, ToolRegistry};
