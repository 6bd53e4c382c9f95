//! 认证中间件模块
//!
//! 实现 Axum 中间件，用于保护 `/api/v1` 下的端点。
//!
//! ## 功能
//! - API 访问令牌校验：从查询参数或请求体（JSON / 表单）的 `token` 字段读取
//! - JWT 认证：仅当 `Authorization` 以 `Bearer ` 开头时执行
//! - 将当前用户注入请求上下文

use crate::otp_auth::error::AuthError;
use crate::otp_auth::state::AuthState;
use crate::otp_auth::types::Account;
use crate::otp_auth::params::read_params;
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

/// Authorization Header 前缀
const BEARER_PREFIX: &str = "Bearer ";

/// API 令牌参数名
const API_TOKEN_PARAM: &str = "token";

/// API 访问令牌中间件
///
/// - 缺少或为空 → 400 `Token is required`
/// - 不匹配 → 401 `Invalid token`
/// - 请求体超过缓冲上限 → 413
///
/// 令牌从查询参数或请求体（JSON / 表单）的 `token` 字段读取，
/// 请求体读取后原样交给下游。
pub async fn api_token_guard(
    State(state): State<Arc<AuthState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut params, request) = match read_params(request).await {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    match params.remove(API_TOKEN_PARAM).filter(|t| !t.trim().is_empty()) {
        None => {
            debug!("API token missing: {} {}", request.method(), request.uri().path());
            AuthError::TokenRequired.into_response()
        }
        Some(t) if !state.api_token_matches(&t) => {
            debug!("API token mismatch: {} {}", request.method(), request.uri().path());
            AuthError::InvalidApiToken.into_response()
        }
        Some(_) => next.run(request).await,
    }
}

/// 从请求中提取 Bearer 令牌
///
/// 返回 None 表示请求没有使用 Bearer 认证（此时跳过 JWT 认证）
fn extract_bearer_token(request: &Request<Body>) -> Option<String> {
    let auth_header = request.headers().get(header::AUTHORIZATION)?;
    let auth_str = auth_header.to_str().ok()?;
    auth_str
        .strip_prefix(BEARER_PREFIX)
        .map(|token| token.trim().to_string())
}

/// JWT 认证中间件
///
/// ## 行为
/// - 没有 `Bearer ` 前缀的 Authorization（或没有该 Header）时直接放行，不设置当前用户
/// - 令牌无效、过期、缺少 `user_id` 或用户不存在时返回 401 `Unauthorized`
/// - 成功时把 [`CurrentUser`] 注入请求扩展
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AuthState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer_token(&request) {
        Some(t) => t,
        None => return next.run(request).await,
    };

    let claims = match state.jwt.decode(&token) {
        Ok(c) => c,
        Err(e) => {
            debug!("JWT authentication failed for {}: {}", request.uri().path(), e);
            return AuthError::Unauthorized.into_response();
        }
    };

    match state.store.find_by_id(claims.user_id).await {
        Some(account) => {
            debug!("JWT authenticated user {} for {}", account.id, request.uri().path());
            request.extensions_mut().insert(CurrentUser(account));
            next.run(request).await
        }
        None => {
            debug!("JWT references unknown user {}", claims.user_id);
            AuthError::Unauthorized.into_response()
        }
    }
}

/// 当前已认证用户
///
/// 由 [`jwt_auth_middleware`] 注入，可直接作为处理器参数使用；
/// 请求未通过 JWT 认证时提取失败并返回 401。
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Account);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}
