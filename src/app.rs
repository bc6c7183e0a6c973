//! 应用装配与运行
//!
//! 进程启动时按配置构造一次全部外部客户端和服务，组成 `AppContext`，
//! 之后显式传给路由和智能助手。测试通过 `Backends` 注入内存实现。

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api;
use crate::config::{Config, StoreBackend};
use crate::infrastructure::{
    DocumentStore, HttpDocumentStore, HttpObjectStore, HttpOcrEngine, MemoryDocumentStore,
    MemoryObjectStore, ObjectStore, OcrEngine, OpenAiGenerator, TextGenerator, UrlSigner,
};
use crate::orchestrator::{build_registry, local_today, AgentOrchestrator};
use crate::repositories::{
    GradeHistoryRepository, LessonPlanRepository, QuestionRepository, ScheduleRepository,
    SessionRepository, StudentRepository, WorksheetRepository,
};
use crate::services::{
    DocumentService, LessonService, LlmService, QuestionParser, SessionService, StorageService,
    WorksheetService,
};
use crate::utils::logging;
use crate::workflow::SessionMaterializer;

/// 外部协作方
pub struct Backends {
    pub documents: Arc<dyn DocumentStore>,
    pub objects: Arc<dyn ObjectStore>,
    /// 领域服务使用的模型
    pub generator: Arc<dyn TextGenerator>,
    /// 智能助手使用的模型（需支持工具调用）
    pub agent_generator: Arc<dyn TextGenerator>,
    pub ocr: Arc<dyn OcrEngine>,
}

impl Backends {
    /// 按配置创建外部客户端
    pub fn from_config(config: &Config) -> Self {
        let signer = UrlSigner::new(&config.signing_secret);

        let (documents, objects): (Arc<dyn DocumentStore>, Arc<dyn ObjectStore>) =
            match config.store_backend {
                StoreBackend::Memory => {
                    warn!("⚠️ 使用进程内存储，重启后数据丢失");
                    (
                        Arc::new(MemoryDocumentStore::new()),
                        Arc::new(MemoryObjectStore::new(
                            &config.object_bucket,
                            &config.object_store_base_url,
                            signer,
                        )),
                    )
                }
                StoreBackend::Http => (
                    Arc::new(HttpDocumentStore::new(&config.store_base_url)),
                    Arc::new(HttpObjectStore::new(
                        &config.object_store_base_url,
                        &config.object_bucket,
                        signer,
                    )),
                ),
            };

        if config.llm_api_key.is_empty() {
            warn!("⚠️ 未配置 LLM_API_KEY，模型调用将失败并走降级逻辑");
        }

        Self {
            documents,
            objects,
            generator: Arc::new(OpenAiGenerator::new(
                &config.llm_api_key,
                &config.llm_api_base_url,
                &config.llm_model_name,
            )),
            agent_generator: Arc::new(OpenAiGenerator::new(
                &config.llm_api_key,
                &config.llm_api_base_url,
                &config.agent_model_name,
            )),
            ocr: Arc::new(HttpOcrEngine::new(&config.ocr_base_url)),
        }
    }
}

/// 进程级上下文
pub struct AppContext {
    pub config: Config,
    pub students: Arc<StudentRepository>,
    pub grade_history: Arc<GradeHistoryRepository>,
    pub questions: Arc<QuestionRepository>,
    pub llm: Arc<LlmService>,
    pub storage: Arc<StorageService>,
    pub documents: Arc<DocumentService>,
    pub lessons: Arc<LessonService>,
    pub sessions: Arc<SessionService>,
    pub worksheets: Arc<WorksheetService>,
    pub materializer: Arc<SessionMaterializer>,
    pub agent: Arc<AgentOrchestrator>,
}

impl AppContext {
    /// 用给定的外部协作方装配全部仓储和服务
    pub fn new(config: Config, backends: Backends) -> Self {
        let prefix = config.table_prefix.as_str();
        let store = backends.documents;

        // 仓储
        let students = Arc::new(StudentRepository::new(store.clone(), prefix));
        let grade_history = Arc::new(GradeHistoryRepository::new(store.clone(), prefix));
        let questions = Arc::new(QuestionRepository::new(store.clone(), prefix));
        let lesson_plans = Arc::new(LessonPlanRepository::new(store.clone(), prefix));
        let schedules = Arc::new(ScheduleRepository::new(store.clone(), prefix));
        let session_repo = Arc::new(SessionRepository::new(store.clone(), prefix));
        let worksheet_repo = Arc::new(WorksheetRepository::new(store, prefix));

        // 服务
        let llm = Arc::new(LlmService::new(backends.generator));
        let storage = Arc::new(StorageService::new(
            backends.objects,
            config.upload_url_ttl_secs,
            config.download_url_ttl_secs,
        ));
        let parser = Arc::new(QuestionParser::new(llm.clone(), config.question_parse_strategy));
        let documents = Arc::new(DocumentService::new(backends.ocr, parser, storage.bucket()));
        let lessons = Arc::new(LessonService::new(
            llm.clone(),
            students.clone(),
            grade_history.clone(),
            lesson_plans,
            session_repo.clone(),
        ));
        let sessions = Arc::new(SessionService::new(schedules.clone(), session_repo.clone()));
        let worksheets = Arc::new(WorksheetService::new(
            llm.clone(),
            storage.clone(),
            questions.clone(),
            worksheet_repo,
            grade_history.clone(),
        ));
        let materializer = Arc::new(SessionMaterializer::new(schedules, session_repo));

        // 智能助手
        let registry = Arc::new(build_registry(
            students.clone(),
            grade_history.clone(),
            questions.clone(),
            sessions.clone(),
            lessons.clone(),
            local_today,
        ));
        info!("🧰 已注册 {} 个助手工具", registry.len());
        let agent = Arc::new(AgentOrchestrator::new(backends.agent_generator, registry));

        Self {
            config,
            students,
            grade_history,
            questions,
            llm,
            storage,
            documents,
            lessons,
            sessions,
            worksheets,
            materializer,
            agent,
        }
    }

    /// 按配置创建外部客户端并装配
    pub fn from_config(config: Config) -> Self {
        let backends = Backends::from_config(&config);
        Self::new(config, backends)
    }
}

/// 应用主结构
pub struct App {
    ctx: Arc<AppContext>,
    listener: TcpListener,
}

impl App {
    /// 初始化应用：装配上下文并绑定监听地址
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(&config);

        let listener = TcpListener::bind(&config.bind_address)
            .await
            .with_context(|| format!("无法监听 {}", config.bind_address))?;
        let ctx = Arc::new(AppContext::from_config(config));

        Ok(Self { ctx, listener })
    }

    pub fn router(&self) -> Router {
        api::router(self.ctx.clone())
    }

    /// 运行 HTTP 服务，收到 Ctrl-C / SIGTERM 后优雅退出
    pub async fn run(self) -> Result<()> {
        let app = self.router();
        let addr = self.listener.local_addr()?;
        info!("🌐 HTTP 服务已启动: http://{}", addr);

        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP 服务异常退出")?;

        logging::log_shutdown();
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️ 无法注册 Ctrl-C 信号处理: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!("⚠️ 无法注册 SIGTERM 信号处理: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("🛑 收到退出信号，开始优雅关闭");
}
