//! OTP 认证类型定义模块
//!
//! 定义账户记录、OTP 失败跟踪状态、限流策略和 JWT Claims 等核心数据结构

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::rate_limiter::{MAX_OTP_ATTEMPTS, OTP_ATTEMPT_WINDOW_SECS, OTP_DRIFT_SECS};

/// OTP 验证策略
///
/// 在构造 [`OtpVerifier`](super::verifier::OtpVerifier) 时传入，不使用全局可变常量。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpPolicy {
    /// 窗口内允许的最大失败次数
    pub max_attempts: u32,
    /// 失败窗口长度（以首次失败时间为锚点）
    pub window: Duration,
    /// TOTP 时钟漂移容差
    pub allowed_drift: Duration,
}

impl OtpPolicy {
    /// 窗口长度（秒），用于 429 响应中的重试提示
    pub fn retry_after_secs(&self) -> u64 {
        self.window.num_seconds().max(0) as u64
    }
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_OTP_ATTEMPTS,
            window: Duration::seconds(OTP_ATTEMPT_WINDOW_SECS),
            allowed_drift: Duration::seconds(OTP_DRIFT_SECS),
        }
    }
}

/// 账户的 OTP 状态
///
/// 不变量：`first_failed_at.is_none() == (failed_attempts_count == 0)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OtpAccountState {
    /// 共享密钥 (Base32 编码)，创建账户时生成，之后不再修改
    #[serde(rename = "otp_secret_key", default)]
    pub secret: String,
    /// 当前窗口内的失败次数
    #[serde(rename = "otp_failed_attempts_count", default)]
    pub failed_attempts_count: u32,
    /// 当前失败窗口的起点
    #[serde(rename = "otp_first_failed_at", default)]
    pub first_failed_at: Option<DateTime<Utc>>,
}

impl OtpAccountState {
    /// 使用给定密钥创建无失败记录的状态
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            failed_attempts_count: 0,
            first_failed_at: None,
        }
    }

    /// 是否没有未解决的失败记录
    pub fn is_clear(&self) -> bool {
        self.first_failed_at.is_none() && self.failed_attempts_count == 0
    }

    /// 返回清空失败跟踪后的状态（密钥保持不变）
    pub fn cleared(&self) -> Self {
        Self {
            secret: self.secret.clone(),
            failed_attempts_count: 0,
            first_failed_at: None,
        }
    }

    /// 返回记录一次失败后的状态
    ///
    /// 首次失败开启新窗口，否则仅累加计数
    pub fn with_failure(&self, now: DateTime<Utc>) -> Self {
        match self.first_failed_at {
            None => Self {
                secret: self.secret.clone(),
                failed_attempts_count: 1,
                first_failed_at: Some(now),
            },
            Some(first) => Self {
                secret: self.secret.clone(),
                failed_attempts_count: self.failed_attempts_count.saturating_add(1),
                first_failed_at: Some(first),
            },
        }
    }
}

/// 限流预检结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// 允许尝试
    Allowed,
    /// 窗口已过期，状态已重置，允许尝试
    WindowExpired,
    /// 窗口内失败次数已达上限
    Limited,
}

impl RateLimitDecision {
    pub fn is_limited(&self) -> bool {
        matches!(self, RateLimitDecision::Limited)
    }
}

/// 一次验证尝试的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// 验证码正确
    Verified,
    /// 被限流拒绝，未调用 TOTP 引擎
    RateLimited,
    /// 验证码错误、为空，或账户没有密钥
    InvalidCode,
}

impl VerifyOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerifyOutcome::Verified)
    }
}

/// 账户记录（存储在 accounts.json）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub legal_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub preferred_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// OTP 状态，与账户字段平铺存储
    #[serde(flatten)]
    pub otp: OtpAccountState,
}

/// 创建账户的参数
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub legal_name: Option<String>,
    pub preferred_name: Option<String>,
    /// 为空时自动生成
    pub otp_secret: Option<String>,
}

/// 登录响应中返回的用户信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub id: u64,
    pub email: String,
    pub name: String,
    pub legal_name: Option<String>,
    pub preferred_name: Option<String>,
}

impl From<&Account> for UserData {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            name: account.name.clone(),
            legal_name: account.legal_name.clone(),
            preferred_name: account.preferred_name.clone(),
        }
    }
}

/// JWT Claims
///
/// `exp` 可缺省：缺少过期时间的令牌仍被接受
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: u64,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exp: Option<i64>,
}
