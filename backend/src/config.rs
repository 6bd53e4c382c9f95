//! 应用配置模块
//!
//! 配置从 `config/app.toml` 读取，文件不存在时使用默认值；
//! 密钥类配置可通过环境变量覆盖。

use crate::otp_auth::rate_limiter::{MAX_OTP_ATTEMPTS, OTP_ATTEMPT_WINDOW_SECS, OTP_DRIFT_SECS};
use crate::otp_auth::token::{JwtService, JWT_EXPIRY_HOURS};
use crate::otp_auth::totp::DEFAULT_ISSUER;
use crate::otp_auth::{AuthError, OtpPolicy};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub otp: OtpConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

/// 认证相关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// 基础密钥，未单独配置 JWT 密钥或 API 令牌时作为回退值
    pub secret_key_base: Option<String>,
    /// JWT 签名密钥
    pub jwt_secret: Option<String>,
    /// API 访问令牌
    pub api_secret_token: Option<String>,
    /// JWT 有效期（小时）
    pub jwt_expiry_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key_base: None,
            jwt_secret: None,
            api_secret_token: None,
            jwt_expiry_hours: JWT_EXPIRY_HOURS,
        }
    }
}

/// OTP 策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
    pub max_attempts: u32,
    pub window_secs: i64,
    pub drift_secs: i64,
    /// otpauth URI 中的发行者名称
    pub issuer: String,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_OTP_ATTEMPTS,
            window_secs: OTP_ATTEMPT_WINDOW_SECS,
            drift_secs: OTP_DRIFT_SECS,
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }
}

impl OtpConfig {
    pub fn policy(&self) -> OtpPolicy {
        OtpPolicy {
            max_attempts: self.max_attempts,
            window: Duration::seconds(self.window_secs),
            allowed_drift: Duration::seconds(self.drift_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 账户文件路径
    pub accounts_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            accounts_path: crate::otp_auth::store::DEFAULT_ACCOUNT_STORE_PATH.to_string(),
        }
    }
}

impl AppConfig {
    /// 从 TOML 文件加载配置，文件不存在时返回默认配置
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AuthError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AuthError::ConfigError(format!("failed to read {:?}: {}", path, e)))?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| AuthError::ConfigError(format!("failed to parse {:?}: {}", path, e)))?;

        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    /// 使用环境变量覆盖配置
    ///
    /// 支持 `JWT_SECRET`、`API_SECRET_TOKEN`、`SECRET_KEY_BASE`、`LISTEN_ADDR`、`ACCOUNTS_PATH`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("JWT_SECRET") {
            self.auth.jwt_secret = Some(v);
        }
        if let Some(v) = get("API_SECRET_TOKEN") {
            self.auth.api_secret_token = Some(v);
        }
        if let Some(v) = get("SECRET_KEY_BASE") {
            self.auth.secret_key_base = Some(v);
        }
        if let Some(v) = get("LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Some(v) = get("ACCOUNTS_PATH") {
            self.storage.accounts_path = v;
        }
    }

    /// 校验配置并补全缺失的基础密钥
    ///
    /// 未配置 `secret_key_base` 时生成随机值，重启后已签发的令牌将失效。
    pub fn finalize(mut self) -> Result<Self, AuthError> {
        if self.otp.max_attempts == 0 {
            return Err(AuthError::ConfigError("otp.max_attempts must be at least 1".to_string()));
        }
        if self.otp.window_secs <= 0 {
            return Err(AuthError::ConfigError("otp.window_secs must be positive".to_string()));
        }
        if self.otp.drift_secs < 0 {
            return Err(AuthError::ConfigError("otp.drift_secs must not be negative".to_string()));
        }
        if self.auth.jwt_expiry_hours <= 0 {
            return Err(AuthError::ConfigError("auth.jwt_expiry_hours must be positive".to_string()));
        }

        if self.auth.secret_key_base.is_none() {
            warn!("secret_key_base not configured, generating a random one for this process");
            self.auth.secret_key_base = Some(JwtService::generate_random_secret());
        }
        Ok(self)
    }

    fn secret_key_base(&self) -> &str {
        self.auth.secret_key_base.as_deref().unwrap_or_default()
    }

    /// JWT 签名密钥，未配置时回退到 `secret_key_base`
    pub fn jwt_secret(&self) -> &str {
        self.auth
            .jwt_secret
            .as_deref()
            .unwrap_or_else(|| self.secret_key_base())
    }

    /// API 访问令牌，未配置时回退到 `secret_key_base`
    pub fn api_secret_token(&self) -> &str {
        self.auth
            .api_secret_token
            .as_deref()
            .unwrap_or_else(|| self.secret_key_base())
    }

    pub fn jwt_expiry(&self) -> Duration {
        Duration::hours(self.auth.jwt_expiry_hours)
    }
}
