//! 会话令牌与口令
//! Session tokens and password hashing

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use futures_util::future::{ready, Ready};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::domain::{UserId, UserRecord};
use crate::error::{AppError, AppResult};

/// 当前令牌载荷版本
pub const SESSION_CLAIMS_VERSION: u8 = 1;

/// 会话令牌载荷
/// Versioned session claims carried inside the signed token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "ver")]
    pub version: u8,
    pub sub: UserId,
    pub username: String,
    pub is_verified: bool,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

/// 令牌签名密钥 (HMAC-SHA256)
#[derive(Clone)]
pub struct SessionKeys {
    key: Hmac<Sha256>,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_seconds: i64) -> AppResult<Self> {
        let key = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid session secret: {}", e)))?;
        Ok(Self {
            key,
            ttl: Duration::seconds(ttl_seconds),
        })
    }

    /// 为用户签发令牌
    pub fn issue(&self, user: &UserRecord) -> AppResult<String> {
        let now = Utc::now();
        let claims = SessionClaims {
            version: SESSION_CLAIMS_VERSION,
            sub: user.id,
            username: user.username.clone(),
            is_verified: user.is_verified,
            issued_at: now.timestamp(),
            expires_at: (now + self.ttl).timestamp(),
        };
        claims
            .sign_with_key(&self.key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to sign session: {}", e)))
    }

    /// 校验签名、版本与过期时间
    pub fn verify(&self, token: &str) -> AppResult<SessionClaims> {
        let claims: SessionClaims = token
            .verify_with_key(&self.key)
            .map_err(|_| AppError::unauthenticated("Not Authenticated"))?;
        if claims.version != SESSION_CLAIMS_VERSION {
            return Err(AppError::unauthenticated("Session format is no longer supported"));
        }
        if claims.expires_at <= Utc::now().timestamp() {
            return Err(AppError::unauthenticated("Session expired"));
        }
        Ok(claims)
    }
}

/// 已认证会话提取器：`Authorization: Bearer <token>`，SSE 可用 `?token=`
/// Authenticated-session extractor
#[derive(Debug, Clone)]
pub struct AuthSession(pub SessionClaims);

impl AuthSession {
    pub fn user_id(&self) -> UserId {
        self.0.sub
    }

    fn from_request_sync(req: &HttpRequest) -> AppResult<Self> {
        let keys = req
            .app_data::<web::Data<SessionKeys>>()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("session keys not configured")))?;

        let token = bearer_token(req)
            .or_else(|| query_token(req))
            .ok_or_else(|| AppError::unauthenticated("Not Authenticated"))?;

        keys.verify(&token).map(AuthSession)
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn query_token(req: &HttpRequest) -> Option<String> {
    req.query_string()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == "token")
        .and_then(|(_, v)| urlencoding::decode(v).ok())
        .map(|v| v.into_owned())
        .filter(|t| !t.is_empty())
}

impl FromRequest for AuthSession {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_request_sync(req))
    }
}

/// argon2 口令哈希
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Registration;
    use actix_web::{test, App, HttpResponse};

    fn user() -> UserRecord {
        let mut user = Registration {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            verify_code: "123456".to_string(),
            verify_code_expires: Utc::now(),
        }
        .into_new_user();
        user.is_verified = true;
        user
    }

    #[::core::prelude::v1::test]
    fn test_issue_then_verify() {
        let keys = SessionKeys::new("a-test-secret-of-some-length", 3600).unwrap();
        let alice = user();
        let token = keys.issue(&alice).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, alice.id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.version, SESSION_CLAIMS_VERSION);
    }

    #[::core::prelude::v1::test]
    fn test_rejects_foreign_and_expired_tokens() {
        let keys = SessionKeys::new("a-test-secret-of-some-length", 3600).unwrap();
        let other = SessionKeys::new("another-secret-entirely", 3600).unwrap();
        let token = other.issue(&user()).unwrap();
        assert!(matches!(keys.verify(&token), Err(AppError::Unauthenticated { .. })));

        let expired = SessionKeys::new("a-test-secret-of-some-length", -10).unwrap();
        let token = expired.issue(&user()).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[::core::prelude::v1::test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("anything", "not-a-hash"));
    }

    async fn whoami(session: AuthSession) -> HttpResponse {
        HttpResponse::Ok().body(session.0.username)
    }

    #[actix_web::test]
    async fn test_extractor_requires_token() {
        let keys = SessionKeys::new("a-test-secret-of-some-length", 3600).unwrap();
        let token = keys.issue(&user()).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(keys))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/me").to_request()).await;
        assert_eq!(resp.status(), 401);

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let req = test::TestRequest::get()
            .uri(&format!("/me?token={}", token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }
}
