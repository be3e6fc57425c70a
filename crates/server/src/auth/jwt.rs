/// 会话令牌 (JWT)

use chrono::{DateTime, Duration, Utc};
use common::{Error, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// 令牌声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户名
    pub sub: String,
    /// 服务端会话 ID，注销后令牌随之失效
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// 从现在起算的过期时间
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc::now() + self.ttl
    }

    /// 签发令牌
    pub fn issue(&self, username: &str, sid: &str, expires_at: DateTime<Utc>) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            sid: sid.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("签发令牌失败: {}", e)))
    }

    /// 校验签名与有效期
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| Error::AuthRejected(format!("令牌无效: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let issuer = TokenIssuer::new("test-secret", 12);
        let expires_at = issuer.expires_at();
        let token = issuer.issue("alice", "sid-1", expires_at).unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.sid, "sid-1");
        assert_eq!(claims.exp, expires_at.timestamp());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let issuer = TokenIssuer::new("secret-a", 12);
        let token = issuer.issue("alice", "sid-1", issuer.expires_at()).unwrap();
        let err = TokenIssuer::new("secret-b", 12).verify(&token).unwrap_err();
        assert!(matches!(err, Error::AuthRejected(_)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let issuer = TokenIssuer::new("test-secret", 12);
        let claims = Claims {
            sub: "alice".to_string(),
            sid: "sid-1".to_string(),
            iat: Utc::now().timestamp() - 7200,
            exp: Utc::now().timestamp() - 3600,
        };
        let token = encode(&Header::default(), &claims, &issuer.encoding).unwrap();
        assert!(issuer.verify(&token).is_err());
    }
}
