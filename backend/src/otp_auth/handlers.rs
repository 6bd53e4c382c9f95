//! 认证 API 处理器模块
//!
//! - 登录 API (POST /api/v1/login)
//! - 示例受保护端点 (GET /api/v1/example/protected)
//! - 健康检查 (GET /health)

use crate::otp_auth::middleware::CurrentUser;
use crate::otp_auth::params::RequestParams;
use crate::otp_auth::state::AuthState;
use crate::otp_auth::types::{UserData, VerifyOutcome};
use crate::otp_auth::AuthError;
use axum::{
    extract::{FromRequest, Request, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

/// 登录请求
///
/// 参数可以来自查询字符串、JSON 或表单请求体。`token`（API 访问令牌）
/// 由中间件校验，这里不再读取。
#[derive(Debug, Default)]
pub struct LoginRequest {
    pub email: Option<String>,
    /// 认证器 App 生成的验证码
    pub otp_code: Option<String>,
}

#[axum::async_trait]
impl<S> FromRequest<S> for LoginRequest
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let RequestParams(mut params) = RequestParams::from_request(request, state).await?;
        Ok(LoginRequest {
            email: params.remove("email"),
            otp_code: params.remove("otp_code"),
        })
    }
}

/// 登录响应
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub jwt: String,
    pub user: UserData,
}

/// 受保护端点中返回的用户摘要
#[derive(Debug, Serialize, Deserialize)]
pub struct ProtectedUser {
    pub id: u64,
    pub email: String,
    pub name: String,
}

/// 受保护端点响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ProtectedResponse {
    pub message: String,
    pub user: ProtectedUser,
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// ============================================================================
// Login API
// ============================================================================

/// 登录 API
///
/// POST /api/v1/login
///
/// 1. 邮箱为空 → 400
/// 2. 用户不存在 → 404
/// 3. OTP 被限流 → 429，验证码错误 → 401
/// 4. 成功 → 签发 JWT 并返回用户信息
pub async fn login(
    State(state): State<Arc<AuthState>>,
    req: LoginRequest,
) -> Result<Json<LoginResponse>, AuthError> {
    let email = req
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or(AuthError::EmailRequired)?;

    let account = state.store.find_by_email(email).await.ok_or_else(|| {
        debug!("Login for unknown email");
        AuthError::UserNotFound
    })?;

    let now = Utc::now();
    let code = req.otp_code.as_deref().unwrap_or_default();
    match state.authenticator.authenticate(account.id, code, now).await? {
        VerifyOutcome::Verified => {}
        VerifyOutcome::RateLimited => {
            warn!("Login blocked by OTP rate limit: user={}", account.id);
            return Err(AuthError::RateLimited(
                state.authenticator.policy().retry_after_secs(),
            ));
        }
        VerifyOutcome::InvalidCode => {
            warn!("Login rejected, invalid OTP: user={}", account.id);
            return Err(AuthError::InvalidCode);
        }
    }

    let jwt = state.jwt.issue(&account, now)?;
    info!("Login successful: user={}", account.id);

    Ok(Json(LoginResponse {
        jwt,
        user: UserData::from(&account),
    }))
}

// ============================================================================
// Protected API
// ============================================================================

/// 示例受保护端点
///
/// GET /api/v1/example/protected
pub async fn protected_action(CurrentUser(account): CurrentUser) -> Json<ProtectedResponse> {
    Json(ProtectedResponse {
        message: "This is a protected endpoint".to_string(),
        user: ProtectedUser {
            id: account.id,
            email: account.email,
            name: account.name,
        },
    })
}

/// 健康检查
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
