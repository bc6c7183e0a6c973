//! 集成测试共用的装配与请求辅助函数

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use tutor_assistant::error::OcrError;
use tutor_assistant::infrastructure::ocr::{Block, BlockType};
use tutor_assistant::infrastructure::{
    DocumentSource, MemoryDocumentStore, MemoryObjectStore, OcrDocument, OcrEngine,
    ScriptedGenerator, UrlSigner,
};
use tutor_assistant::models::{Difficulty, Question, Student};
use tutor_assistant::{api, AppContext, Backends, Config};

/// 固定返回若干行文本的 OCR
pub struct FixedOcr {
    lines: Vec<String>,
}

impl FixedOcr {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }
}

#[async_trait]
impl OcrEngine for FixedOcr {
    async fn detect_document_text(&self, _source: &DocumentSource) -> Result<OcrDocument, OcrError> {
        let blocks = self
            .lines
            .iter()
            .map(|line| Block {
                block_type: BlockType::Line,
                text: Some(line.clone()),
                confidence: Some(99.0),
            })
            .collect();
        Ok(OcrDocument { blocks })
    }
}

/// 全内存的应用环境
pub struct TestApp {
    pub ctx: Arc<AppContext>,
    pub router: Router,
    pub generator: Arc<ScriptedGenerator>,
    pub agent_generator: Arc<ScriptedGenerator>,
}

pub fn test_app(ocr_lines: &[&str]) -> TestApp {
    let config = Config::default();
    let generator = Arc::new(ScriptedGenerator::new());
    let agent_generator = Arc::new(ScriptedGenerator::new());
    let backends = Backends {
        documents: Arc::new(MemoryDocumentStore::new()),
        objects: Arc::new(MemoryObjectStore::new(
            &config.object_bucket,
            "http://objects.test",
            UrlSigner::new("test-secret"),
        )),
        generator: generator.clone(),
        agent_generator: agent_generator.clone(),
        ocr: Arc::new(FixedOcr::new(ocr_lines)),
    };
    let ctx = Arc::new(AppContext::new(config, backends));
    TestApp {
        router: api::router(ctx.clone()),
        ctx,
        generator,
        agent_generator,
    }
}

pub fn student(id: &str, name: &str, accuracy: &[(&str, f64)]) -> Student {
    Student {
        student_id: id.to_string(),
        name: name.to_string(),
        grade: Some("8".to_string()),
        accuracy: accuracy
            .iter()
            .map(|(topic, acc)| (topic.to_string(), *acc))
            .collect::<BTreeMap<_, _>>(),
        email: None,
        notes: None,
    }
}

pub fn question(id: &str, topic: &str, text: &str) -> Question {
    Question {
        question_id: id.to_string(),
        question_text: text.to_string(),
        topic: topic.to_string(),
        difficulty: Difficulty::Medium,
        answer: Some("42".to_string()),
        explanation: None,
        teaching_tips: None,
    }
}

/// 发送请求，返回状态码和 JSON 响应体
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_bytes(uri: &str, bytes: &[u8]) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/octet-stream")
        .body(Body::from(bytes.to_vec()))
        .unwrap()
}
