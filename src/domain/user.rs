use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]{2,20}$").unwrap();
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
}

/// 用户内部标识，同时作为推送频道名
/// Internal user id; doubles as the user's push channel name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// 推送频道名
    pub fn channel(&self) -> String {
        self.0.to_string()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// 校验用户名：2-20 位字母、数字或下划线
pub fn validate_username(username: &str) -> AppResult<()> {
    if username.chars().count() < 2 {
        return Err(AppError::validation("username", "Username must be at least 2 characters"));
    }
    if username.chars().count() > 20 {
        return Err(AppError::validation("username", "Username must be no more than 20 characters"));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(AppError::validation(
            "username",
            "Username must not contain special characters",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> AppResult<()> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(AppError::validation("email", "Invalid email address"))
    }
}

/// 用户记录
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub verify_code: String,
    pub verify_code_expires: DateTime<Utc>,
    pub is_verified: bool,
    pub accepting_messages: bool,
}

/// 注册信息（新建或刷新未验证账号）
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub verify_code: String,
    pub verify_code_expires: DateTime<Utc>,
}

impl Registration {
    /// 生成新用户记录：未验证，默认接收消息
    pub fn into_new_user(self) -> UserRecord {
        UserRecord {
            id: UserId::new(),
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            verify_code: self.verify_code,
            verify_code_expires: self.verify_code_expires,
            is_verified: false,
            accepting_messages: true,
        }
    }
}
