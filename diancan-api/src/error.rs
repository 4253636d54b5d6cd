use axum::{response::{IntoResponse, Response}, http::StatusCode, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("缓存错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("参数错误: {0}")]
    Validation(String),

    #[error("未找到: {0}")]
    NotFound(String),

    #[error("无权操作: {0}")]
    Forbidden(String),

    #[error("认证失败: {0}")]
    Auth(String),

    #[error("状态冲突: {0}")]
    Conflict(String),

    #[error("当前状态不可退款: {0}")]
    NotRefundable(String),

    #[error("已全额退款: {0}")]
    AlreadyRefunded(String),

    #[error("退款金额超出可退余额: {0}")]
    ExceedsRemaining(String),

    #[error("签名验证失败: {0}")]
    SignatureInvalid(String),

    #[error("支付渠道错误: {0}")]
    Provider(String),

    #[error("加解密错误: {0}")]
    Crypto(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<openssl::error::ErrorStack> for ApiError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        ApiError::Crypto(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DatabaseError"),
            ApiError::Redis(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CacheError"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            ApiError::Auth(_) => (StatusCode::UNAUTHORIZED, "AuthError"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            ApiError::NotRefundable(_) => (StatusCode::CONFLICT, "NotRefundable"),
            ApiError::AlreadyRefunded(_) => (StatusCode::CONFLICT, "AlreadyRefunded"),
            ApiError::ExceedsRemaining(_) => (StatusCode::BAD_REQUEST, "ExceedsRemaining"),
            ApiError::SignatureInvalid(_) => (StatusCode::BAD_REQUEST, "InvalidSignature"),
            ApiError::Provider(_) => (StatusCode::BAD_GATEWAY, "ProviderError"),
            ApiError::Crypto(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CryptoError"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "type": error_type,
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}
