//! TOTP 引擎模块
//!
//! 提供 TOTP 密钥生成、otpauth URI 生成和验证功能，遵循 RFC 6238 标准。
//! 验证逻辑通过 [`TotpEngine`] trait 抽象，便于在测试中替换。

use chrono::{DateTime, Duration, Utc};
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::warn;

use super::error::AuthError;

/// TOTP 时间步长（秒）
pub const TOTP_STEP: u64 = 30;

/// TOTP 码位数
pub const TOTP_DIGITS: usize = 6;

/// 默认发行者名称
pub const DEFAULT_ISSUER: &str = "Contractor Portal";

/// TOTP 验证引擎
///
/// 给定共享密钥、提交的验证码、允许的时钟漂移和当前时间，判断验证码是否有效。
pub trait TotpEngine: Send + Sync {
    fn validate(&self, secret: &str, code: &str, drift: Duration, at: DateTime<Utc>) -> bool;
}

/// 基于 totp-rs 的 TOTP 引擎
///
/// 漂移只向过去方向容差：接受 `[at - drift, at]` 区间内任一时间步的验证码。
#[derive(Debug, Clone, Copy, Default)]
pub struct TotpRsEngine;

impl TotpRsEngine {
    pub fn new() -> Self {
        Self
    }

    /// 生成新的 TOTP 密钥
    ///
    /// # Returns
    /// * Base32 编码的密钥字符串（160 位）
    pub fn generate_secret() -> String {
        Secret::generate_secret().to_encoded().to_string()
    }

    /// 创建 TOTP 实例
    ///
    /// skew 固定为 0，漂移由 [`TotpEngine::validate`] 按时间步逐一检查。
    fn create_totp(secret: &str, issuer: &str, account: &str) -> Result<TOTP, AuthError> {
        let secret_bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| AuthError::TotpError(format!("invalid secret encoding: {:?}", e)))?;

        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            0,
            TOTP_STEP,
            secret_bytes,
            Some(issuer.to_string()),
            account.to_string(),
        )
        .map_err(|e| AuthError::TotpError(format!("failed to build TOTP: {}", e)))
    }

    /// 获取 otpauth:// URI（用于在认证器 App 中录入）
    ///
    /// # Arguments
    /// * `secret` - Base32 编码的密钥
    /// * `issuer` - 发行者名称
    /// * `account` - 账户名称（通常为邮箱）
    pub fn provisioning_uri(secret: &str, issuer: &str, account: &str) -> Result<String, AuthError> {
        let totp = Self::create_totp(secret, issuer, account)?;
        Ok(totp.get_url())
    }

    /// 生成 QR 码（Data URL 格式的 Base64 PNG）
    pub fn qr_code_data_url(secret: &str, issuer: &str, account: &str) -> Result<String, AuthError> {
        let totp = Self::create_totp(secret, issuer, account)?;
        let base64 = totp
            .get_qr_base64()
            .map_err(|e| AuthError::TotpError(format!("failed to render QR code: {}", e)))?;
        Ok(format!("data:image/png;base64,{}", base64))
    }

    /// 获取指定时间的验证码
    pub fn code_at(secret: &str, at: DateTime<Utc>) -> Result<String, AuthError> {
        let totp = Self::create_totp(secret, DEFAULT_ISSUER, "user")?;
        Ok(totp.generate(unix_secs(at)))
    }

    /// 验证密钥格式是否有效
    pub fn is_valid_secret(secret: &str) -> bool {
        Self::create_totp(secret, DEFAULT_ISSUER, "user").is_ok()
    }
}

impl TotpEngine for TotpRsEngine {
    fn validate(&self, secret: &str, code: &str, drift: Duration, at: DateTime<Utc>) -> bool {
        let totp = match Self::create_totp(secret, DEFAULT_ISSUER, "user") {
            Ok(t) => t,
            Err(e) => {
                warn!("TOTP validation skipped: {}", e);
                return false;
            }
        };

        let code = code.trim();
        let now = unix_secs(at);
        let earliest = unix_secs(at - drift.abs());

        let mut step = now / TOTP_STEP;
        let first_step = earliest / TOTP_STEP;
        loop {
            if totp.check(code, step * TOTP_STEP) {
                return true;
            }
            if step <= first_step {
                return false;
            }
            step -= 1;
        }
    }
}

fn unix_secs(at: DateTime<Utc>) -> u64 {
    at.timestamp().max(0) as u64
}
