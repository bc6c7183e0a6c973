//! 日志工具模块
//!
//! 提供日志初始化和输出的辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化全局日志订阅器
///
/// `RUST_LOG` 存在时优先使用，否则使用配置中的日志级别；
/// 配置值不是合法过滤表达式时回退到 `info`。
///
/// # 参数
/// - `log_level`: 配置中的日志级别
pub fn init(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| log_level.parse::<EnvFilter>())
        .unwrap_or_else(|e| {
            eprintln!("⚠️ 日志级别 '{}' 无效 ({})，回退到 info", log_level, e);
            EnvFilter::new("info")
        });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 当前生效的配置
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - {} v{}", crate::SERVICE_NAME, env!("CARGO_PKG_VERSION"));
    info!("🌐 监听地址: {}", config.bind_address);
    info!("🗄️ 存储后端: {:?} (表前缀: {})", config.store_backend, config.table_prefix);
    info!("🤖 模型: {} / Agent: {}", config.llm_model_name, config.agent_model_name);
    info!("{}", "=".repeat(60));
}

/// 记录程序退出信息
pub fn log_shutdown() {
    info!("{}", "─".repeat(60));
    info!("👋 服务已停止");
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
