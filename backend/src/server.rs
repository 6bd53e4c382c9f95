//! HTTP 服务模块
//!
//! 组装路由并启动服务

use crate::config::AppConfig;
use crate::otp_auth::{
    api_token_guard, create_auth_state, health, jwt_auth_middleware, login, open_account_store,
    protected_action, AuthState,
};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// 构建应用路由
///
/// `/api/v1` 下的端点依次经过 API 令牌校验和 JWT 认证中间件
pub fn build_router(state: Arc<AuthState>) -> Router {
    let api = Router::new()
        .route("/login", post(login))
        .route("/example/protected", get(protected_action))
        .layer(from_fn_with_state(state.clone(), jwt_auth_middleware))
        .layer(from_fn_with_state(state.clone(), api_token_guard));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .with_state(state)
}

/// 加载账户并启动 HTTP 服务
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let store = Arc::new(open_account_store(&config.storage.accounts_path).await?);
    let state = create_auth_state(&config, store);
    let app = build_router(state);

    let listener = TcpListener::bind(&config.server.listen_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
