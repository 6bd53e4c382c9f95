//! OTP 认证模块
//!
//! 提供基于 TOTP 的登录验证：以账户为单位的失败窗口限流、
//! API 访问令牌校验和 JWT 签发/认证。

pub mod authenticator;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod params;
pub mod rate_limiter;
pub mod state;
pub mod store;
pub mod token;
pub mod totp;
pub mod types;
pub mod verifier;

// 导出核心类型
pub use authenticator::{OtpAuthenticator, OtpStatus};
pub use error::{AuthError, ErrorResponse};
pub use handlers::{health, login, protected_action};
pub use middleware::{api_token_guard, jwt_auth_middleware, CurrentUser};
pub use params::RequestParams;
pub use rate_limiter::{evaluate, MAX_OTP_ATTEMPTS, OTP_ATTEMPT_WINDOW_SECS, OTP_DRIFT_SECS};
pub use state::{create_auth_state, AuthState};
pub use store::{open_account_store, AccountStore, DEFAULT_ACCOUNT_STORE_PATH};
pub use token::{JwtService, JWT_EXPIRY_HOURS};
pub use totp::{TotpEngine, TotpRsEngine, DEFAULT_ISSUER, TOTP_DIGITS, TOTP_STEP};
pub use types::{
    Account, NewAccount, OtpAccountState, OtpPolicy, RateLimitDecision, TokenClaims, UserData,
    VerifyOutcome,
};
pub use verifier::OtpVerifier;
