use chrono::{Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::mailer::{send_with_retry, Mailer};
use crate::auth::{hash_password, verify_password, SessionKeys};
use crate::domain::user::{validate_email, validate_username};
use crate::domain::{Registration, UserId};
use crate::error::{AppError, AppResult};
use crate::store::MessageStore;

/// 验证码有效期
const VERIFY_CODE_TTL_HOURS: i64 = 1;
/// 邮件重试间隔
const MAIL_RETRY_DELAY: StdDuration = StdDuration::from_millis(1500);
const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SignUpRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SignInRequest {
    /// 用户名或邮箱
    pub identifier: String,
    pub password: String,
}

/// 登录成功后返回的用户信息
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    #[schema(value_type = String)]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_verified: bool,
    pub is_accepting_messages: bool,
}

#[derive(Debug, Clone)]
pub struct SignedIn {
    pub token: String,
    pub user: SessionUser,
}

/// 6 位验证码
pub fn generate_verify_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// 账号：注册、验证、用户名检查、登录
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn MessageStore>,
    mailer: Arc<dyn Mailer>,
    keys: SessionKeys,
    mail_max_attempts: u32,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        mailer: Arc<dyn Mailer>,
        keys: SessionKeys,
        mail_max_attempts: u32,
    ) -> Self {
        Self {
            store,
            mailer,
            keys,
            mail_max_attempts,
        }
    }

    #[instrument(skip(self, req), fields(username = %req.username))]
    pub async fn sign_up(&self, req: &SignUpRequest) -> AppResult<()> {
        validate_username(&req.username)?;
        validate_email(&req.email)?;
        if req.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::validation(
                "password",
                format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
            ));
        }

        if let Some(holder) = self.store.find_user_by_username(&req.username).await? {
            if holder.is_verified {
                return Err(AppError::validation("username", "Username already exists"));
            }
        }

        let registration = Registration {
            username: req.username.clone(),
            email: req.email.clone(),
            password_hash: hash_password(&req.password)?,
            verify_code: generate_verify_code(),
            verify_code_expires: Utc::now() + Duration::hours(VERIFY_CODE_TTL_HOURS),
        };

        match self.store.find_user_by_email(&req.email).await? {
            Some(existing) if existing.is_verified => {
                return Err(AppError::validation(
                    "email",
                    "User already exists with this email",
                ));
            }
            Some(existing) => {
                self.store
                    .refresh_registration(existing.id, &registration)
                    .await?;
                info!("刷新未验证账号的注册信息");
            }
            None => {
                self.store
                    .insert_user(&registration.clone().into_new_user())
                    .await?;
                info!("新用户已注册");
            }
        }

        send_with_retry(
            self.mailer.as_ref(),
            &registration.email,
            &registration.username,
            &registration.verify_code,
            self.mail_max_attempts,
            MAIL_RETRY_DELAY,
        )
        .await
    }

    #[instrument(skip(self, code))]
    pub async fn verify_code(&self, username: &str, code: &str) -> AppResult<()> {
        let username = urlencoding::decode(username)
            .map(|u| u.into_owned())
            .unwrap_or_else(|_| username.to_string());
        let user = self
            .store
            .find_user_by_username(&username)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;

        if user.verify_code != code.trim() {
            return Err(AppError::validation("code", "Incorrect verification code"));
        }
        if user.verify_code_expires <= Utc::now() {
            return Err(AppError::validation(
                "code",
                "Verification code has expired. Please sign up again to get a new code.",
            ));
        }

        self.store.mark_verified(user.id).await?;
        info!("账号已验证");
        Ok(())
    }

    /// 用户名是否可用（仅已验证账号占用用户名）
    pub async fn check_username(&self, username: &str) -> AppResult<()> {
        validate_username(username)?;
        match self.store.find_user_by_username(username).await? {
            Some(user) if user.is_verified => {
                Err(AppError::validation("username", "Username already exists"))
            }
            _ => Ok(()),
        }
    }

    #[instrument(skip(self, req), fields(identifier = %req.identifier))]
    pub async fn sign_in(&self, req: &SignInRequest) -> AppResult<SignedIn> {
        let user = self
            .store
            .find_user_by_identifier(req.identifier.trim())
            .await?
            .ok_or_else(|| AppError::unauthenticated("No user found with this email or username"))?;

        if !user.is_verified {
            return Err(AppError::unauthenticated(
                "Please verify your account first",
            ));
        }
        if !verify_password(&req.password, &user.password_hash) {
            return Err(AppError::unauthenticated("Incorrect password"));
        }

        let token = self.keys.issue(&user)?;
        info!(user_id = %user.id, "登录成功");
        Ok(SignedIn {
            token,
            user: SessionUser {
                id: user.id,
                username: user.username,
                email: user.email,
                is_verified: user.is_verified,
                is_accepting_messages: user.accepting_messages,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::mailer::LogMailer;
    use crate::store::MemoryStore;

    fn service() -> (Arc<MemoryStore>, AccountService) {
        let store = Arc::new(MemoryStore::new());
        let keys = SessionKeys::new("a-test-secret-of-some-length", 3600).unwrap();
        let accounts = AccountService::new(store.clone(), Arc::new(LogMailer), keys, 3);
        (store, accounts)
    }

    fn sign_up_req(username: &str, email: &str) -> SignUpRequest {
        SignUpRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: "secret-password".to_string(),
        }
    }

    #[test]
    fn test_verify_code_is_six_digits() {
        for _ in 0..100 {
            let code: u32 = generate_verify_code().parse().unwrap();
            assert!((100_000..=999_999).contains(&code));
        }
    }

    #[tokio::test]
    async fn test_sign_up_verify_sign_in() {
        let (store, accounts) = service();
        accounts.sign_up(&sign_up_req("alice", "alice@example.com")).await.unwrap();

        let user = store.find_user_by_username("alice").await.unwrap().unwrap();
        assert!(!user.is_verified);
        assert!(user.accepting_messages);

        let sign_in = SignInRequest {
            identifier: "alice".to_string(),
            password: "secret-password".to_string(),
        };
        assert!(matches!(
            accounts.sign_in(&sign_in).await,
            Err(AppError::Unauthenticated { .. })
        ));

        assert!(accounts.verify_code("alice", "000000").await.is_err());
        accounts.verify_code("alice", &user.verify_code).await.unwrap();

        let signed_in = accounts.sign_in(&sign_in).await.unwrap();
        assert_eq!(signed_in.user.username, "alice");
        assert!(!signed_in.token.is_empty());

        let by_email = SignInRequest {
            identifier: "alice@example.com".to_string(),
            password: "wrong-password".to_string(),
        };
        assert!(accounts.sign_in(&by_email).await.is_err());
    }

    #[tokio::test]
    async fn test_unverified_email_is_refreshed() {
        let (store, accounts) = service();
        accounts.sign_up(&sign_up_req("alice", "alice@example.com")).await.unwrap();
        let first = store.find_user_by_email("alice@example.com").await.unwrap().unwrap();

        accounts.sign_up(&sign_up_req("alice", "alice@example.com")).await.unwrap();
        let second = store.find_user_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_ne!(first.password_hash, second.password_hash);
    }

    #[tokio::test]
    async fn test_verified_username_and_email_are_taken() {
        let (store, accounts) = service();
        accounts.sign_up(&sign_up_req("alice", "alice@example.com")).await.unwrap();
        let user = store.find_user_by_username("alice").await.unwrap().unwrap();
        accounts.verify_code("alice", &user.verify_code).await.unwrap();

        assert!(accounts.check_username("alice").await.is_err());
        assert!(accounts.check_username("bob").await.is_ok());
        assert!(accounts.check_username("b!").await.is_err());

        let err = accounts
            .sign_up(&sign_up_req("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let err = accounts
            .sign_up(&sign_up_req("carol", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_unknown_user_cannot_verify() {
        let (_store, accounts) = service();
        let err = accounts.verify_code("ghost", "123456").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }
}
