//! OTP 限流模块
//!
//! 实现以账户为单位的固定窗口限流，防止对验证码的暴力破解。
//! - 阈值：窗口内失败 5 次后拒绝继续验证
//! - 窗口：以本轮首次失败时间为锚点，10 分钟
//! - 成功验证或窗口过期后清空失败记录
//!
//! 窗口不会因后续失败而延长：一连串失败之后静默等待，
//! 会在距首次失败恰好一个窗口长度之后完全重置。

use chrono::{DateTime, Utc};
use tracing::debug;

use super::types::{OtpAccountState, OtpPolicy, RateLimitDecision};

/// 窗口内最大失败次数
pub const MAX_OTP_ATTEMPTS: u32 = 5;

/// 失败窗口（秒）：10 分钟
pub const OTP_ATTEMPT_WINDOW_SECS: i64 = 10 * 60;

/// TOTP 漂移容差（秒）
pub const OTP_DRIFT_SECS: i64 = 60;

/// 评估账户当前是否被限流
///
/// 纯函数：不修改传入状态，窗口过期时返回重置后的新状态，由调用方负责持久化。
///
/// - 没有失败记录 → `Allowed`
/// - 距首次失败超过窗口（严格大于） → `WindowExpired`，返回清空后的状态
/// - 否则失败次数达到上限 → `Limited`
pub fn evaluate(
    policy: &OtpPolicy,
    state: &OtpAccountState,
    now: DateTime<Utc>,
) -> (RateLimitDecision, OtpAccountState) {
    let first_failed_at = match state.first_failed_at {
        Some(t) => t,
        None => return (RateLimitDecision::Allowed, state.clone()),
    };

    let since_first_failure = now - first_failed_at;
    if since_first_failure > policy.window {
        debug!(
            "OTP failure window expired after {}s ({} failures), resetting",
            since_first_failure.num_seconds(),
            state.failed_attempts_count
        );
        return (RateLimitDecision::WindowExpired, state.cleared());
    }

    if state.failed_attempts_count >= policy.max_attempts {
        (RateLimitDecision::Limited, state.clone())
    } else {
        (RateLimitDecision::Allowed, state.clone())
    }
}

/// 获取窗口内剩余尝试次数
pub fn remaining_attempts(policy: &OtpPolicy, state: &OtpAccountState, now: DateTime<Utc>) -> u32 {
    let (_, state) = evaluate(policy, state, now);
    policy.max_attempts.saturating_sub(state.failed_attempts_count)
}

/// 获取距离窗口过期的剩余秒数，没有未解决的失败时返回 None
pub fn window_remaining_secs(
    policy: &OtpPolicy,
    state: &OtpAccountState,
    now: DateTime<Utc>,
) -> Option<i64> {
    let first = state.first_failed_at?;
    let remaining = (first + policy.window - now).num_seconds();
    if remaining >= 0 {
        Some(remaining)
    } else {
        None
    }
}
