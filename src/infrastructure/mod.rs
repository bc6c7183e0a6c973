//! 基础设施层（Infrastructure）
//!
//! 持有外部资源的客户端，只暴露能力，不包含业务判断。
//! 每种能力都以 trait 表达，进程启动时构造一次，之后以 `Arc<dyn Trait>` 注入。

pub mod document_store;
pub mod llm;
pub mod object_store;
pub mod ocr;
pub mod signing;

pub use document_store::{
    DocumentStore, HttpDocumentStore, IndexQuery, IndexSpec, MemoryDocumentStore, ScanFilter,
    Table, TableSpec,
};
pub use llm::{GenerationParams, OpenAiGenerator, ScriptedGenerator, TextGenerator};
pub use object_store::{HttpObjectStore, MemoryObjectStore, ObjectStore};
pub use ocr::{DocumentSource, HttpOcrEngine, OcrDocument, OcrEngine};
pub use signing::{UrlMethod, UrlSigner};
