//! OTP 验证器模块
//!
//! 在 TOTP 校验之外叠加以账户为单位的固定窗口限流。
//! 验证器本身不做持久化，只在调用方传入的状态上完成状态迁移：
//!
//! | 状态 | 触发 | 下一状态 |
//! |------|------|----------|
//! | CLEAR | 错误验证码 | OPEN(count=1, first=now) |
//! | CLEAR | 正确验证码 | CLEAR |
//! | OPEN(count<MAX) | 窗口内错误验证码 | OPEN(count+1) |
//! | OPEN(count<MAX) | 窗口内正确验证码 | CLEAR |
//! | OPEN(count≥MAX) | 窗口内任意尝试 | 预检拒绝 |
//! | OPEN | 窗口过期后任意尝试 | CLEAR，随后重新评估本次尝试 |

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::rate_limiter::evaluate;
use super::totp::TotpEngine;
use super::types::{OtpAccountState, OtpPolicy, RateLimitDecision, VerifyOutcome};

/// OTP 验证器
pub struct OtpVerifier<E> {
    policy: OtpPolicy,
    engine: E,
}

impl<E: TotpEngine> OtpVerifier<E> {
    /// 创建新的验证器
    pub fn new(policy: OtpPolicy, engine: E) -> Self {
        Self { policy, engine }
    }

    pub fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    /// 限流预检
    ///
    /// 注意这不是纯谓词：窗口过期时会把 `state` 重置为无失败状态。
    pub fn is_rate_limited(&self, state: &mut OtpAccountState, now: DateTime<Utc>) -> bool {
        let (decision, next) = evaluate(&self.policy, state, now);
        *state = next;
        decision.is_limited()
    }

    /// 验证提交的验证码
    pub fn verify(&self, state: &mut OtpAccountState, code: &str, now: DateTime<Utc>) -> bool {
        self.attempt(state, code, now).is_verified()
    }

    /// 执行一次验证尝试并返回区分限流与验证码错误的结果
    ///
    /// 空验证码或账户缺少密钥时直接失败，且不计入失败次数。
    pub fn attempt(
        &self,
        state: &mut OtpAccountState,
        code: &str,
        now: DateTime<Utc>,
    ) -> VerifyOutcome {
        if self.is_rate_limited(state, now) {
            debug!(
                "OTP attempt rejected by rate limit ({} failures since {:?})",
                state.failed_attempts_count, state.first_failed_at
            );
            return VerifyOutcome::RateLimited;
        }

        if code.trim().is_empty() || state.secret.trim().is_empty() {
            debug!("OTP attempt with blank code or missing secret");
            return VerifyOutcome::InvalidCode;
        }

        if self
            .engine
            .validate(&state.secret, code, self.policy.allowed_drift, now)
        {
            if !state.is_clear() {
                *state = state.cleared();
            }
            return VerifyOutcome::Verified;
        }

        *state = state.with_failure(now);
        if state.failed_attempts_count >= self.policy.max_attempts {
            warn!(
                "OTP failure limit reached ({} attempts), further attempts blocked",
                state.failed_attempts_count
            );
        }
        VerifyOutcome::InvalidCode
    }

    /// 纯函数形式的限流评估，返回决策和新状态
    pub fn evaluate(
        &self,
        state: &OtpAccountState,
        now: DateTime<Utc>,
    ) -> (RateLimitDecision, OtpAccountState) {
        evaluate(&self.policy, state, now)
    }
}
