//! HTTP 接口层
//!
//! 负责把外部请求转交给服务层，自身不包含业务逻辑。
//!
//! ## 路由
//!
//! | 前缀 | 能力 |
//! |---|---|
//! | `/`、`/health` | 健康检查 |
//! | `/api/questions` | 分类、讲解、选题 |
//! | `/api/documents`、`/api/uploads` | OCR 提取、上传链接 |
//! | `/api/lessons` | 讲义与课程计划 |
//! | `/api/grading`、`/api/worksheets` | 批改、出卷 |
//! | `/api/students` | 学生档案 |
//! | `/api/schedules`、`/api/sessions` | 固定课表、课次、批量生成 |
//! | `/api/agent` | 智能助手 |

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::app::AppContext;

pub use error::{ApiError, ApiResult};

/// 上传文件的最大字节数
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// 构建完整路由
pub fn router(ctx: Arc<AppContext>) -> Router {
    let api = Router::new()
        .route("/questions/classify", post(handlers::classify_question))
        .route("/questions/explain", post(handlers::explain_question))
        .route("/questions/select", post(handlers::select_questions))
        .route("/documents/extract", post(handlers::extract_document))
        .route("/documents/extract-s3", post(handlers::extract_stored_document))
        .route("/documents/extract-answers", post(handlers::extract_answers))
        .route("/uploads/presign", post(handlers::presign_upload))
        .route("/lessons/generate", post(handlers::generate_lesson_notes))
        .route(
            "/lessons",
            get(handlers::list_lesson_plans).post(handlers::create_lesson_plan),
        )
        .route("/grading/grade-worksheet", post(handlers::grade_worksheet))
        .route("/worksheets", post(handlers::create_worksheet))
        .route("/students", get(handlers::list_students))
        .route("/students/{id}", get(handlers::get_student))
        .route(
            "/schedules",
            get(handlers::list_schedules).post(handlers::create_schedule),
        )
        .route("/schedules/{id}", delete(handlers::delete_schedule))
        .route(
            "/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route("/sessions/materialize", post(handlers::materialize_sessions))
        .route("/agent/chat", post(handlers::agent_chat))
        .route("/agent/ask", post(handlers::agent_ask));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any)
}
