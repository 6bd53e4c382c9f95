//! 认证错误处理模块
//!
//! 提供统一的错误类型定义及 HTTP 响应映射

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 认证错误
#[derive(Debug, Error)]
pub enum AuthError {
    /// 缺少 API 令牌
    #[error("Token is required")]
    TokenRequired,

    /// API 令牌不匹配
    #[error("Invalid token")]
    InvalidApiToken,

    /// 缺少邮箱
    #[error("Email is required")]
    EmailRequired,

    /// 请求体超过缓冲上限
    #[error("Request body too large")]
    PayloadTooLarge,

    /// 用户不存在
    #[error("User not found")]
    UserNotFound,

    /// JWT 无效、过期或用户不存在
    #[error("Unauthorized")]
    Unauthorized,

    /// 验证失败次数过多，参数为建议的重试等待秒数
    #[error("Too many verification attempts. Please try again in {} minutes.", .0 / 60)]
    RateLimited(u64),

    /// 验证码错误
    #[error("Invalid verification code")]
    InvalidCode,

    /// 邮箱已被注册
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// 账户不存在
    #[error("Account not found: {0}")]
    AccountNotFound(u64),

    /// 存储错误
    #[error("Storage error: {0}")]
    StorageError(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// TOTP 错误
    #[error("TOTP error: {0}")]
    TotpError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// 错误响应结构（用于 API 返回）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误消息
    pub error: String,
    /// 错误标识
    pub code: String,
    /// 建议的重试等待时间（秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl AuthError {
    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::TokenRequired => StatusCode::BAD_REQUEST,
            AuthError::InvalidApiToken => StatusCode::UNAUTHORIZED,
            AuthError::EmailRequired => StatusCode::BAD_REQUEST,
            AuthError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AuthError::InvalidCode => StatusCode::UNAUTHORIZED,
            AuthError::AccountExists(_) => StatusCode::CONFLICT,
            AuthError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            AuthError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::TotpError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 转换为错误标识
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::TokenRequired => "token_required",
            AuthError::InvalidApiToken => "invalid_token",
            AuthError::EmailRequired => "email_required",
            AuthError::PayloadTooLarge => "payload_too_large",
            AuthError::UserNotFound => "user_not_found",
            AuthError::Unauthorized => "unauthorized",
            AuthError::RateLimited(_) => "rate_limited",
            AuthError::InvalidCode => "invalid_code",
            AuthError::AccountExists(_) => "account_exists",
            AuthError::AccountNotFound(_) => "account_not_found",
            AuthError::StorageError(_) => "storage_error",
            AuthError::ConfigError(_) => "config_error",
            AuthError::TotpError(_) => "totp_error",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    /// 转换为错误响应
    ///
    /// 服务端内部错误不向客户端暴露细节
    pub fn to_response(&self) -> ErrorResponse {
        let message = if self.status_code().is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        ErrorResponse {
            error: message,
            code: self.error_code().to_string(),
            retry_after: match self {
                AuthError::RateLimited(secs) => Some(*secs),
                _ => None,
            },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let mut response = (self.status_code(), Json(self.to_response())).into_response();
        if let AuthError::RateLimited(secs) = self {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
