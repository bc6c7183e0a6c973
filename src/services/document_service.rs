//! 文档服务 - OCR 文本提取与题目解析

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::error::AppResult;
use crate::infrastructure::{DocumentSource, OcrEngine};
use crate::models::ParsedQuestion;
use crate::services::question_parser::{extract_answers, QuestionParser};

/// 题目提取结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedDocument {
    pub extracted_text: String,
    pub questions: Vec<ParsedQuestion>,
}

/// 答案提取结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedAnswers {
    pub answers: Vec<String>,
    pub raw_text: String,
}

/// 文档服务
///
/// OCR 失败属于传输层错误，直接返回给调用方；
/// 题目解析自身从不失败。
pub struct DocumentService {
    ocr: Arc<dyn OcrEngine>,
    parser: Arc<QuestionParser>,
    bucket: String,
}

impl DocumentService {
    pub fn new(ocr: Arc<dyn OcrEngine>, parser: Arc<QuestionParser>, bucket: &str) -> Self {
        Self {
            ocr,
            parser,
            bucket: bucket.to_string(),
        }
    }

    async fn ocr_text(&self, source: &DocumentSource) -> AppResult<String> {
        let document = self.ocr.detect_document_text(source).await.map_err(|e| {
            error!("❌ OCR 识别失败: {}", e);
            e
        })?;
        Ok(document.text())
    }

    /// 识别上传文件并解析题目
    pub async fn extract_from_bytes(&self, bytes: Vec<u8>) -> AppResult<ExtractedDocument> {
        info!("📄 识别上传文件 ({} 字节)", bytes.len());
        let text = self.ocr_text(&DocumentSource::Bytes(bytes)).await?;
        self.parse(text).await
    }

    /// 识别已存储的对象并解析题目
    ///
    /// # 参数
    /// - `bucket`: 为空时使用默认存储桶
    pub async fn extract_from_object(&self, bucket: Option<&str>, key: &str) -> AppResult<ExtractedDocument> {
        let bucket = bucket.filter(|b| !b.is_empty()).unwrap_or(&self.bucket);
        info!("📄 识别存储对象 {}/{}", bucket, key);
        let source = DocumentSource::Stored {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        let text = self.ocr_text(&source).await?;
        self.parse(text).await
    }

    /// 识别答案页，提取 `Answer:` 标记后的答案
    pub async fn extract_answers(&self, bytes: Vec<u8>) -> AppResult<ExtractedAnswers> {
        let raw_text = self.ocr_text(&DocumentSource::Bytes(bytes)).await?;
        let answers = extract_answers(&raw_text);
        info!("✓ 提取到 {} 个答案", answers.len());
        Ok(ExtractedAnswers { answers, raw_text })
    }

    async fn parse(&self, extracted_text: String) -> AppResult<ExtractedDocument> {
        let questions = self.parser.parse(&extracted_text).await;
        Ok(ExtractedDocument {
            extracted_text,
            questions,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::config::ParseStrategy;
    use crate::error::OcrError;
    use crate::infrastructure::ocr::{Block, BlockType};
    use crate::infrastructure::{OcrDocument, ScriptedGenerator};
    use crate::services::llm_service::LlmService;

    /// 记录收到的文档来源，返回固定行
    struct RecordingOcr {
        lines: Vec<&'static str>,
        sources: Mutex<Vec<DocumentSource>>,
    }

    #[async_trait]
    impl OcrEngine for RecordingOcr {
        async fn detect_document_text(&self, source: &DocumentSource) -> Result<OcrDocument, OcrError> {
            if let Ok(mut sources) = self.sources.lock() {
                sources.push(source.clone());
            }
            let mut blocks = vec![Block {
                block_type: BlockType::Page,
                text: None,
                confidence: None,
            }];
            blocks.extend(self.lines.iter().map(|line| Block {
                block_type: BlockType::Line,
                text: Some(line.to_string()),
                confidence: Some(98.5),
            }));
            Ok(OcrDocument { blocks })
        }
    }

    fn service(lines: Vec<&'static str>) -> (Arc<RecordingOcr>, DocumentService) {
        let ocr = Arc::new(RecordingOcr {
            lines,
            sources: Mutex::new(Vec::new()),
        });
        let llm = Arc::new(LlmService::new(Arc::new(ScriptedGenerator::new())));
        let parser = Arc::new(QuestionParser::new(llm, ParseStrategy::Regex));
        (ocr.clone(), DocumentService::new(ocr, parser, "lumix-documents"))
    }

    #[tokio::test]
    async fn test_stored_object_uses_default_bucket() {
        let (ocr, service) = service(vec![
            "Quiz 4",
            "1. Simplify 3(x + 2) - x",
            "2. Solve 5x - 7 = 18 for x",
        ]);

        let document = service
            .extract_from_object(None, "uploads/abc/quiz.pdf")
            .await
            .unwrap();
        assert_eq!(
            document.extracted_text,
            "Quiz 4\n1. Simplify 3(x + 2) - x\n2. Solve 5x - 7 = 18 for x"
        );
        assert_eq!(document.questions.len(), 2);
        assert_eq!(document.questions[0].text, "Simplify 3(x + 2) - x");

        service.extract_from_object(Some(""), "k2").await.unwrap();
        service.extract_from_object(Some("other"), "k3").await.unwrap();

        let sources = ocr.sources.lock().unwrap().clone();
        assert_eq!(
            sources,
            vec![
                DocumentSource::Stored {
                    bucket: "lumix-documents".to_string(),
                    key: "uploads/abc/quiz.pdf".to_string(),
                },
                DocumentSource::Stored {
                    bucket: "lumix-documents".to_string(),
                    key: "k2".to_string(),
                },
                DocumentSource::Stored {
                    bucket: "other".to_string(),
                    key: "k3".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_extract_answers_keeps_raw_text() {
        let (ocr, service) = service(vec!["1. 3 + 4", "Answer: 7"]);
        let answers = service.extract_answers(b"img".to_vec()).await.unwrap();
        assert_eq!(answers.answers, vec!["7".to_string()]);
        assert_eq!(answers.raw_text, "1. 3 + 4\nAnswer: 7");
        assert_eq!(
            ocr.sources.lock().unwrap()[0],
            DocumentSource::Bytes(b"img".to_vec())
        );
    }
}
