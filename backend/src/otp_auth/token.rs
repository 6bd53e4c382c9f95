//! JWT 服务模块
//!
//! 登录成功后签发 HS256 JWT，载荷为 `{ user_id, email, exp }`，有效期 24 小时。
//! 解码时 `user_id` 必须存在；缺少 `exp` 的令牌按 JWT 库默认行为接受。

use crate::otp_auth::error::AuthError;
use crate::otp_auth::types::{Account, TokenClaims};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use tracing::debug;

/// JWT 有效期（小时）
pub const JWT_EXPIRY_HOURS: i64 = 24;

/// JWT 服务
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: Duration,
}

impl JwtService {
    /// 创建新的 JWT 服务
    ///
    /// # Arguments
    /// * `secret` - 签名密钥
    /// * `expiry` - 令牌有效期
    pub fn new(secret: &str, expiry: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry,
        }
    }

    /// 生成随机签名密钥（32 字节，十六进制编码）
    pub fn generate_random_secret() -> String {
        let mut rng = rand::thread_rng();
        let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
        hex::encode(bytes)
    }

    /// 为账户签发令牌
    pub fn issue(&self, account: &Account, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = TokenClaims {
            user_id: account.id,
            email: account.email.clone(),
            exp: Some((now + self.expiry).timestamp()),
        };
        self.encode_claims(&claims)
    }

    /// 编码任意 Claims
    pub fn encode_claims(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::InternalError(format!("JWT encode error: {}", e)))
    }

    /// 验证并解码令牌
    ///
    /// 签名错误、已过期、格式错误或缺少 `user_id` 时返回 `Unauthorized`
    pub fn decode(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims::<&str>(&[]);

        decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("JWT rejected: {:?}", e.kind());
                AuthError::Unauthorized
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp_auth::types::OtpAccountState;

    fn account() -> Account {
        Account {
            id: 12,
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            legal_name: None,
            preferred_name: None,
            created_at: Utc::now(),
            otp: OtpAccountState::new("SECRET"),
        }
    }

    fn service() -> JwtService {
        JwtService::new("test_secret", Duration::hours(JWT_EXPIRY_HOURS))
    }

    #[test]
    fn test_issue_and_decode() {
        let svc = service();
        let now = Utc::now();
        let token = svc.issue(&account(), now).unwrap();

        let claims = svc.decode(&token).unwrap();
        assert_eq!(claims.user_id, 12);
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.exp, Some((now + Duration::hours(24)).timestamp()));
    }

    #[test]
    fn test_expired_token_rejected() {
        let svc = service();
        let token = svc.issue(&account(), Utc::now() - Duration::hours(25)).unwrap();
        assert!(matches!(svc.decode(&token), Err(AuthError::Unauthorized)));
    }

    #[test]
    fn test_wrong_signature_rejected() {
        let other = JwtService::new("wrong_secret", Duration::hours(24));
        let token = other.issue(&account(), Utc::now()).unwrap();
        assert!(matches!(service().decode(&token), Err(AuthError::Unauthorized)));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            service().decode("invalid_jwt_token"),
            Err(AuthError::Unauthorized)
        ));
    }

    #[test]
    fn test_missing_exp_accepted() {
        let svc = service();
        let token = svc
            .encode_claims(&TokenClaims {
                user_id: 12,
                email: "alice@example.com".to_string(),
                exp: None,
            })
            .unwrap();
        let claims = svc.decode(&token).unwrap();
        assert_eq!(claims.user_id, 12);
        assert!(claims.exp.is_none());
    }

    #[test]
    fn test_missing_user_id_rejected() {
        let key = EncodingKey::from_secret(b"test_secret");
        let payload = serde_json::json!({
            "email": "alice@example.com",
            "exp": (Utc::now() + Duration::hours(1)).timestamp(),
        });
        let token = encode(&Header::new(Algorithm::HS256), &payload, &key).unwrap();
        assert!(matches!(service().decode(&token), Err(AuthError::Unauthorized)));
    }

    #[test]
    fn test_random_secret() {
        let a = JwtService::generate_random_secret();
        let b = JwtService::generate_random_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
