//! 认证状态管理模块
//!
//! 汇总 HTTP 层需要的运行时服务：
//! - 账户存储
//! - OTP 认证服务
//! - JWT 服务
//! - API 访问令牌摘要

use crate::config::AppConfig;
use crate::otp_auth::authenticator::OtpAuthenticator;
use crate::otp_auth::store::AccountStore;
use crate::otp_auth::token::JwtService;
use crate::otp_auth::totp::TotpRsEngine;
use crate::otp_auth::verifier::OtpVerifier;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// 认证状态
pub struct AuthState {
    /// 账户存储
    pub store: Arc<AccountStore>,
    /// OTP 认证服务
    pub authenticator: OtpAuthenticator<TotpRsEngine>,
    /// JWT 服务
    pub jwt: JwtService,
    /// API 访问令牌的 SHA-256 摘要
    api_token_digest: [u8; 32],
}

impl AuthState {
    /// 根据配置创建认证状态
    ///
    /// `config` 应已经过 [`AppConfig::finalize`] 处理
    pub fn new(config: &AppConfig, store: Arc<AccountStore>) -> Self {
        let verifier = OtpVerifier::new(config.otp.policy(), TotpRsEngine::new());
        Self {
            authenticator: OtpAuthenticator::new(Arc::clone(&store), verifier),
            jwt: JwtService::new(config.jwt_secret(), config.jwt_expiry()),
            api_token_digest: digest(config.api_secret_token()),
            store,
        }
    }

    /// 校验 API 访问令牌
    ///
    /// 比较的是两侧的 SHA-256 摘要，比较耗时与令牌内容无关
    pub fn api_token_matches(&self, provided: &str) -> bool {
        let provided = digest(provided);
        provided
            .iter()
            .zip(self.api_token_digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}

/// 创建共享的认证状态
pub fn create_auth_state(config: &AppConfig, store: Arc<AccountStore>) -> Arc<AuthState> {
    Arc::new(AuthState::new(config, store))
}
