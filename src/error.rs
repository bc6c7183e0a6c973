//! 错误类型
//!
//! 两级错误策略：
//! - AI 相关能力（分类、讲解、解析、选题、批改）在服务层内部降级，不向上抛出
//! - 存储 / 对象存储错误记录日志后原样向上传播，由调用方决定如何响应

use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 文档存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 对象存储错误
    #[error("对象存储错误: {0}")]
    ObjectStore(#[from] ObjectStoreError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// OCR 服务错误
    #[error("OCR错误: {0}")]
    Ocr(#[from] OcrError),
    /// 业务逻辑错误
    #[error("业务错误: {0}")]
    Business(#[from] BusinessError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 文档存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 网络请求失败
    #[error("请求表 {table} 失败: {source}")]
    RequestFailed { table: String, source: BoxedSource },
    /// 服务端返回非成功状态码
    #[error("表 {table} 返回异常状态 {status}: {body}")]
    BadResponse {
        table: String,
        status: u16,
        body: String,
    },
    /// 条件更新的目标不存在
    #[error("表 {table} 中不存在记录 {key}")]
    NotFound { table: String, key: String },
    /// 写入的记录缺少主键字段
    #[error("写入表 {table} 的记录缺少主键字段 {key_field}")]
    MissingKey { table: String, key_field: String },
    /// 未声明的二级索引
    #[error("表 {table} 不存在索引 {index}")]
    UnknownIndex { table: String, index: String },
    /// 记录序列化 / 反序列化失败
    #[error("表 {table} 记录格式错误: {source}")]
    Serde {
        table: String,
        source: serde_json::Error,
    },
}

/// 对象存储错误
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// 网络请求失败
    #[error("访问对象 {key} 失败: {source}")]
    RequestFailed { key: String, source: BoxedSource },
    /// 服务端返回非成功状态码
    #[error("对象 {key} 返回异常状态 {status}")]
    BadResponse { key: String, status: u16 },
    /// 对象不存在
    #[error("对象 {key} 不存在")]
    NotFound { key: String },
    /// 签名 URL 校验失败
    #[error("签名URL无效: {reason}")]
    InvalidSignature { reason: String },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed { model: String, source: BoxedSource },
    /// 返回结果为空
    #[error("LLM返回结果为空 (模型: {model})")]
    EmptyResponse { model: String },
    /// 返回内容无法识别
    #[error("LLM返回内容无法识别 (模型: {model}): {detail}")]
    InvalidResponse { model: String, detail: String },
}

/// OCR 服务错误
#[derive(Debug, Error)]
pub enum OcrError {
    /// 网络请求失败
    #[error("OCR请求失败: {source}")]
    RequestFailed { source: BoxedSource },
    /// 服务端返回非成功状态码
    #[error("OCR服务返回异常状态 {status}: {body}")]
    BadResponse { status: u16, body: String },
}

/// 业务逻辑错误
#[derive(Debug, Error)]
pub enum BusinessError {
    /// 输入参数不合法
    #[error("参数不合法: {0}")]
    InvalidInput(String),
    /// 实体不存在
    #[error("{entity} 不存在: {id}")]
    NotFound { entity: String, id: String },
    /// 未注册的工具
    #[error("未知工具: {0}")]
    UnknownTool(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("读取配置文件 {path} 失败: {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },
    /// 配置文件解析失败
    #[error("解析配置文件 {path} 失败: {source}")]
    ParseFailed {
        path: String,
        source: toml::de::Error,
    },
    /// 配置项取值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: String, reason: String },
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON处理失败: {}", err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建参数不合法错误
    pub fn invalid_input(message: impl Into<String>) -> Self {
        AppError::Business(BusinessError::InvalidInput(message.into()))
    }

    /// 创建实体不存在错误
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        AppError::Business(BusinessError::NotFound {
            entity: entity.into(),
            id: id.into(),
        })
    }

    /// 是否属于调用方输入问题（用于 HTTP 400 映射）
    pub fn is_client_error(&self) -> bool {
        matches!(self, AppError::Business(BusinessError::InvalidInput(_)))
    }

    /// 是否属于资源不存在（用于 HTTP 404 映射）
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::Business(BusinessError::NotFound { .. })
                | AppError::Store(StoreError::NotFound { .. })
                | AppError::ObjectStore(ObjectStoreError::NotFound { .. })
        )
    }
}

impl StoreError {
    /// 创建网络请求失败错误
    pub fn request_failed(
        table: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StoreError::RequestFailed {
            table: table.into(),
            source: Box::new(source),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err: AppError = StoreError::NotFound {
            table: "lumix-sessions".to_string(),
            key: "sess_1".to_string(),
        }
        .into();
        assert!(err.is_not_found());
        assert!(!err.is_client_error());

        let err = AppError::not_found("学生", "s1");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "业务错误: 学生 不存在: s1");
    }

    #[test]
    fn test_invalid_input_is_client_error() {
        let err = AppError::invalid_input("日期格式错误");
        assert!(err.is_client_error());
        assert!(!err.is_not_found());
    }
}
