use std::path::Path;

use serde::Deserialize;

use crate::error::{AppResult, ConfigError};

/// 文档存储后端
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 进程内存储（本地开发 / 测试）
    Memory,
    /// 远端 JSON REST 网关
    Http,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "http" => Ok(StoreBackend::Http),
            other => Err(format!("未知存储后端: {}", other)),
        }
    }
}

/// 题目解析策略
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseStrategy {
    /// 先用 LLM 解析，失败后回退到正则
    Ai,
    /// 先用正则解析，无结果时再尝试 LLM
    Regex,
}

impl std::str::FromStr for ParseStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ai" => Ok(ParseStrategy::Ai),
            "regex" => Ok(ParseStrategy::Regex),
            other => Err(format!("未知解析策略: {}", other)),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP 监听地址
    pub bind_address: String,
    /// 日志级别（RUST_LOG 优先）
    pub log_level: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// Agent 使用的模型（需支持工具调用）
    pub agent_model_name: String,
    // --- 文档存储配置 ---
    pub store_backend: StoreBackend,
    pub store_base_url: String,
    /// 表名前缀，实际表名为 `<prefix>-<entity>`
    pub table_prefix: String,
    // --- 对象存储配置 ---
    pub object_store_base_url: String,
    pub object_bucket: String,
    pub signing_secret: String,
    /// 上传链接有效期（秒）
    pub upload_url_ttl_secs: u64,
    /// 下载链接有效期（秒）
    pub download_url_ttl_secs: u64,
    // --- OCR 配置 ---
    pub ocr_base_url: String,
    pub question_parse_strategy: ParseStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            log_level: "info".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            agent_model_name: "gpt-4o-mini".to_string(),
            store_backend: StoreBackend::Memory,
            store_base_url: "http://localhost:8001".to_string(),
            table_prefix: "lumix".to_string(),
            object_store_base_url: "http://localhost:8002".to_string(),
            object_bucket: "lumix-documents".to_string(),
            signing_secret: "change-me".to_string(),
            upload_url_ttl_secs: 3600,
            download_url_ttl_secs: 604_800,
            ocr_base_url: "http://localhost:8003".to_string(),
            question_parse_strategy: ParseStrategy::Ai,
        }
    }
}

impl Config {
    /// 默认值 + 环境变量覆盖
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 读取 TOML 配置文件，再叠加环境变量覆盖
    ///
    /// # 参数
    /// - `path`: TOML 文件路径，缺省字段取默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: display.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&content, &display)?;
        Ok(config.with_env_overrides())
    }

    /// 加载配置：`TUTOR_CONFIG` 指向的文件存在则读文件，否则只用环境变量
    pub fn load() -> AppResult<Self> {
        let config = match std::env::var("TUTOR_CONFIG") {
            Ok(path) => Self::from_toml_file(path)?,
            Err(_) => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    fn from_toml_str(content: &str, path: &str) -> AppResult<Self> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::ParseFailed {
            path: path.to_string(),
            source,
        })?;
        Ok(config)
    }

    fn with_env_overrides(self) -> Self {
        Self {
            bind_address: std::env::var("BIND_ADDRESS").unwrap_or(self.bind_address),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(self.log_level),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            agent_model_name: std::env::var("AGENT_MODEL_NAME").unwrap_or(self.agent_model_name),
            store_backend: std::env::var("STORE_BACKEND").ok().and_then(|v| v.parse().ok()).unwrap_or(self.store_backend),
            store_base_url: std::env::var("STORE_BASE_URL").unwrap_or(self.store_base_url),
            table_prefix: std::env::var("TABLE_PREFIX").unwrap_or(self.table_prefix),
            object_store_base_url: std::env::var("OBJECT_STORE_BASE_URL").unwrap_or(self.object_store_base_url),
            object_bucket: std::env::var("OBJECT_BUCKET").unwrap_or(self.object_bucket),
            signing_secret: std::env::var("SIGNING_SECRET").unwrap_or(self.signing_secret),
            upload_url_ttl_secs: std::env::var("UPLOAD_URL_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.upload_url_ttl_secs),
            download_url_ttl_secs: std::env::var("DOWNLOAD_URL_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.download_url_ttl_secs),
            ocr_base_url: std::env::var("OCR_BASE_URL").unwrap_or(self.ocr_base_url),
            question_parse_strategy: std::env::var("QUESTION_PARSE_STRATEGY").ok().and_then(|v| v.parse().ok()).unwrap_or(self.question_parse_strategy),
        }
    }

    /// 校验配置项取值
    pub fn validate(&self) -> AppResult<()> {
        if self.upload_url_ttl_secs == 0 {
            return Err(invalid("upload_url_ttl_secs", "必须大于 0"));
        }
        if self.download_url_ttl_secs == 0 {
            return Err(invalid("download_url_ttl_secs", "必须大于 0"));
        }
        if self.object_bucket.trim().is_empty() {
            return Err(invalid("object_bucket", "不能为空"));
        }
        if self.table_prefix.trim().is_empty() {
            return Err(invalid("table_prefix", "不能为空"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::AppError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
