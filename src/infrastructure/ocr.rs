//! 文档 OCR - 基础设施层
//!
//! 输入原始字节或对象存储引用，返回识别出的版面块。
//! 上层只使用 LINE 块的文本。

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::OcrError;

/// 待识别的文档
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    /// 原始文件字节
    Bytes(Vec<u8>),
    /// 已上传到对象存储的文件
    Stored { bucket: String, key: String },
}

/// 版面块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockType {
    Page,
    Line,
    Word,
    #[serde(other)]
    Other,
}

/// 识别出的版面块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub block_type: BlockType,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// OCR 结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrDocument {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl OcrDocument {
    /// 有文本的 LINE 块，保持原顺序
    pub fn lines(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter(|b| b.block_type == BlockType::Line)
            .filter_map(|b| b.text.as_deref())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// 所有行以换行拼接
    pub fn text(&self) -> String {
        self.lines().join("\n")
    }
}

/// 文档 OCR 能力
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn detect_document_text(&self, source: &DocumentSource) -> Result<OcrDocument, OcrError>;
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum WireDocument<'a> {
    Bytes(String),
    S3Object { bucket: &'a str, name: &'a str },
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    document: WireDocument<'a>,
}

/// 通过 HTTP 调用的 OCR 服务（`POST {base}/detect-document-text`）
pub struct HttpOcrEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOcrEngine {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl OcrEngine for HttpOcrEngine {
    async fn detect_document_text(&self, source: &DocumentSource) -> Result<OcrDocument, OcrError> {
        let document = match source {
            DocumentSource::Bytes(bytes) => {
                debug!("OCR 识别上传文件 ({} 字节)", bytes.len());
                WireDocument::Bytes(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            DocumentSource::Stored { bucket, key } => {
                debug!("OCR 识别存储对象 {}/{}", bucket, key);
                WireDocument::S3Object { bucket, name: key }
            }
        };

        let response = self
            .client
            .post(format!("{}/detect-document-text", self.base_url))
            .json(&DetectRequest { document })
            .send()
            .await
            .map_err(|e| {
                error!("❌ OCR 请求失败: {}", e);
                OcrError::RequestFailed { source: Box::new(e) }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ OCR 服务返回异常: {} {}", status, body);
            return Err(OcrError::BadResponse {
                status: status.as_u16(),
                body,
            });
        }

        let document: OcrDocument = response
            .json()
            .await
            .map_err(|e| OcrError::RequestFailed { source: Box::new(e) })?;
        debug!("OCR 返回 {} 个版面块", document.blocks.len());
        Ok(document)
    }
}
