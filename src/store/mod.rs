//! 消息存储：按用户保存消息与接收开关
//! Message store: per-user messages plus the accept flag

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use crate::comm::enhanced_config::mask_sensitive_info;
use crate::domain::{MessageId, Registration, StoredMessage, UserId, UserRecord};
use crate::error::AppError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx 错误: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("迁移错误: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("用户不存在: {0}")]
    MissingUser(UserId),
    #[error("唯一约束冲突: {0}")]
    Conflict(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MissingUser(_) => AppError::not_found("User"),
            StoreError::Conflict(field) => {
                AppError::validation(field.clone(), format!("{} is already taken", field))
            }
            other => AppError::database(other.to_string()),
        }
    }
}

/// 存储抽象，便于在内存实现与 Postgres 之间替换
/// Store abstraction, swappable between in-memory and Postgres
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>>;
    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;

    /// 按用户名或邮箱查找
    async fn find_user_by_identifier(&self, identifier: &str) -> StoreResult<Option<UserRecord>> {
        match self.find_user_by_username(identifier).await? {
            Some(user) => Ok(Some(user)),
            None => self.find_user_by_email(identifier).await,
        }
    }

    async fn insert_user(&self, user: &UserRecord) -> StoreResult<()>;

    /// 刷新未验证账号的注册信息
    async fn refresh_registration(&self, id: UserId, registration: &Registration)
        -> StoreResult<()>;

    async fn mark_verified(&self, id: UserId) -> StoreResult<()>;

    /// 追加消息；接收者不存在时返回 `MissingUser`
    async fn append_message(&self, message: &StoredMessage) -> StoreResult<()>;

    /// 新消息在前
    async fn list_messages(&self, user: UserId) -> StoreResult<Vec<StoredMessage>>;

    /// 删除消息，返回是否确实删除
    async fn remove_message(&self, user: UserId, id: MessageId) -> StoreResult<bool>;

    /// 设置接收开关，用户不存在时返回 None
    async fn set_accepting(&self, user: UserId, accepting: bool) -> StoreResult<Option<bool>>;

    async fn health(&self) -> StoreResult<()>;

    /// 存储后端名称（健康检查输出）
    fn backend(&self) -> &'static str;
}

/// 显式持有的数据库句柄，首次使用时建立连接池
/// Explicitly owned database handle; the pool is created on first use
pub struct Database {
    url: String,
    max_connections: u32,
    pool: OnceCell<Pool<Postgres>>,
}

impl Database {
    pub fn new(url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            url: url.into(),
            max_connections,
            pool: OnceCell::new(),
        }
    }

    /// 连接（若尚未连接）；并发调用只会建立一个连接池
    pub async fn ensure_connected(&self) -> StoreResult<&Pool<Postgres>> {
        self.pool
            .get_or_try_init(|| async {
                info!("连接数据库: {}", mask_sensitive_info(&self.url));
                PgPoolOptions::new()
                    .max_connections(self.max_connections)
                    .min_connections(1)
                    .max_lifetime(Some(Duration::from_secs(1800)))
                    .idle_timeout(Some(Duration::from_secs(300)))
                    .acquire_timeout(Duration::from_secs(3))
                    .connect(&self.url)
                    .await
                    .map_err(StoreError::from)
            })
            .await
    }

    /// 执行内嵌的 SQL 迁移
    pub async fn migrate(&self) -> StoreResult<()> {
        let pool = self.ensure_connected().await?;
        sqlx::migrate!("./migrations").run(pool).await?;
        info!("数据库迁移完成");
        Ok(())
    }
}
