//! # Tutor Assistant
//!
//! 面向家教老师的 AI 助教服务：题目分类与讲解、OCR 试卷解析、
//! 智能选题出卷、自动批改、课程计划生成、课表管理，以及可调用工具的智能助手。
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有外部资源的客户端，只暴露能力
//! - `DocumentStore` - 文档存储（内存 / HTTP 网关）
//! - `ObjectStore` + `UrlSigner` - 文件存储与限时签名链接
//! - `TextGenerator` - 文本生成（OpenAI 兼容接口 / 脚本回放）
//! - `OcrEngine` - 文档文字识别
//!
//! ### ② 数据访问层（Repositories）
//! - `repositories/` - 每个实体一个仓储，不含业务逻辑
//!
//! ### ③ 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `LlmService` - 分类、讲解、选题、批改，失败时降级为默认结果
//! - `QuestionParser` / `DocumentService` - OCR 文本拆题、提取答案
//! - `LessonService` / `WorksheetService` / `SessionService` - 课程计划、练习卷、课表
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - `SessionMaterializer` 按固定课表批量生成课次，可重复执行
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/` - 工具注册表、七个内置工具、有界的工具调用循环
//!
//! ### HTTP 接口（API）
//! - `api/` - axum 路由，薄适配层
//!
//! ## 模块结构

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod repositories;
pub mod services;
pub mod utils;
pub mod workflow;

/// 对外报告的服务名
pub const SERVICE_NAME: &str = "lumix-ai-service";

// 重新导出常用类型
pub use app::{App, AppContext, Backends};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::{AgentOrchestrator, AgentReply};
pub use workflow::SessionMaterializer;
