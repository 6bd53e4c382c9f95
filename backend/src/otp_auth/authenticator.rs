//! OTP 认证服务模块
//!
//! 把存储和验证器串起来：加载账户状态 → 验证 → 写回。
//! 同一账户的验证按账户加锁串行执行，保证失败计数在并发请求下不丢失更新。

use crate::otp_auth::rate_limiter::{remaining_attempts, window_remaining_secs};
use crate::otp_auth::store::AccountStore;
use crate::otp_auth::totp::TotpEngine;
use crate::otp_auth::types::{OtpPolicy, VerifyOutcome};
use crate::otp_auth::verifier::OtpVerifier;
use crate::otp_auth::AuthError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 账户 OTP 限流状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpStatus {
    pub rate_limited: bool,
    pub failed_attempts: u32,
    pub remaining_attempts: u32,
    /// 距离失败窗口过期的秒数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_remaining_secs: Option<i64>,
}

/// OTP 认证服务
pub struct OtpAuthenticator<E> {
    store: Arc<AccountStore>,
    verifier: OtpVerifier<E>,
    /// 账户 ID -> 账户锁
    account_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl<E: TotpEngine> OtpAuthenticator<E> {
    pub fn new(store: Arc<AccountStore>, verifier: OtpVerifier<E>) -> Self {
        Self {
            store,
            verifier,
            account_locks: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &OtpPolicy {
        self.verifier.policy()
    }

    pub fn store(&self) -> &Arc<AccountStore> {
        &self.store
    }

    fn account_lock(&self, account_id: u64) -> Arc<Mutex<()>> {
        self.account_locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 对账户执行一次 OTP 验证
    ///
    /// 状态有变化时才写回存储。
    pub async fn authenticate(
        &self,
        account_id: u64,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifyOutcome, AuthError> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().await;

        let before = self.store.otp_state(account_id).await?;
        let mut state = before.clone();
        let outcome = self.verifier.attempt(&mut state, code, now);

        if state != before {
            self.store.save_otp_state(account_id, &state).await?;
        }

        match outcome {
            VerifyOutcome::Verified => {
                info!("OTP verified: account={}", account_id);
            }
            VerifyOutcome::RateLimited => {
                warn!(
                    "OTP verification blocked by rate limit: account={}, failures={}",
                    account_id, state.failed_attempts_count
                );
            }
            VerifyOutcome::InvalidCode => {
                debug!(
                    "OTP verification failed: account={}, failures={}",
                    account_id, state.failed_attempts_count
                );
            }
        }

        Ok(outcome)
    }

    /// 限流预检，窗口过期时持久化重置后的状态
    pub async fn is_rate_limited(
        &self,
        account_id: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().await;

        let before = self.store.otp_state(account_id).await?;
        let mut state = before.clone();
        let limited = self.verifier.is_rate_limited(&mut state, now);

        if state != before {
            self.store.save_otp_state(account_id, &state).await?;
        }
        Ok(limited)
    }

    /// 读取账户的限流状态快照（不修改存储）
    pub async fn status(&self, account_id: u64, now: DateTime<Utc>) -> Result<OtpStatus, AuthError> {
        let state = self.store.otp_state(account_id).await?;
        let policy = self.verifier.policy();
        let (decision, effective) = self.verifier.evaluate(&state, now);

        Ok(OtpStatus {
            rate_limited: decision.is_limited(),
            failed_attempts: effective.failed_attempts_count,
            remaining_attempts: remaining_attempts(policy, &effective, now),
            window_remaining_secs: window_remaining_secs(policy, &effective, now),
        })
    }
}
