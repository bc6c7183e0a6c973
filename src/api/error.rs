//! HTTP 错误响应
//!
//! 处理函数统一返回 `ApiResult<T>`，错误在这里映射为状态码和
//! `{ "success": false, "error": ... }` 响应体。
//! 服务端错误只返回概括信息，详细原因写日志。

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use crate::error::AppError;

/// HTTP 层错误
#[derive(Debug)]
pub struct ApiError(pub AppError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(AppError::invalid_input(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("❌ 请求处理失败: {}", self.0);
            "internal server error".to_string()
        } else {
            warn!("⚠️ 请求被拒绝 ({}): {}", status.as_u16(), self.0);
            self.0.to_string()
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
