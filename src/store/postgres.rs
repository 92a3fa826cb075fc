use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::{Database, MessageStore, StoreError, StoreResult};
use crate::domain::{MessageId, Registration, StoredMessage, UserId, UserRecord};

const USER_COLUMNS: &str = "id, username, email, password_hash, verify_code, \
     verify_code_expires, is_verified, accepting_messages";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    verify_code: String,
    verify_code_expires: DateTime<Utc>,
    is_verified: bool,
    accepting_messages: bool,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id.into(),
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            verify_code: row.verify_code,
            verify_code_expires: row.verify_code_expires,
            is_verified: row.is_verified,
            accepting_messages: row.accepting_messages,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    recipient_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for StoredMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id.into(),
            recipient_id: row.recipient_id.into(),
            content: row.content,
            created_at: row.created_at,
        }
    }
}

/// 唯一约束冲突映射为 Conflict
fn map_unique(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some(c) if c.contains("email") => "email",
                _ => "username",
            };
            return StoreError::Conflict(field.to_string());
        }
    }
    StoreError::Sqlx(e)
}

/// Postgres 存储
pub struct PostgresStore {
    db: Arc<Database>,
}

impl PostgresStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn find_user_where(&self, column: &str, value: &str) -> StoreResult<Option<UserRecord>> {
        let pool = self.db.ensure_connected().await?;
        let sql = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, column);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(UserRecord::from))
    }
}

#[async_trait]
impl MessageStore for PostgresStore {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        self.find_user_where("username", username).await
    }

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        let pool = self.db.ensure_connected().await?;
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(pool)
            .await?;
        Ok(row.map(UserRecord::from))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        self.find_user_where("email", email).await
    }

    async fn insert_user(&self, user: &UserRecord) -> StoreResult<()> {
        let pool = self.db.ensure_connected().await?;
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, verify_code, \
             verify_code_expires, is_verified, accepting_messages) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.verify_code)
        .bind(user.verify_code_expires)
        .bind(user.is_verified)
        .bind(user.accepting_messages)
        .execute(pool)
        .await
        .map_err(map_unique)?;
        Ok(())
    }

    async fn refresh_registration(
        &self,
        id: UserId,
        registration: &Registration,
    ) -> StoreResult<()> {
        let pool = self.db.ensure_connected().await?;
        let result = sqlx::query(
            "UPDATE users SET username = $2, password_hash = $3, verify_code = $4, \
             verify_code_expires = $5 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(&registration.username)
        .bind(&registration.password_hash)
        .bind(&registration.verify_code)
        .bind(registration.verify_code_expires)
        .execute(pool)
        .await
        .map_err(map_unique)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingUser(id));
        }
        Ok(())
    }

    async fn mark_verified(&self, id: UserId) -> StoreResult<()> {
        let pool = self.db.ensure_connected().await?;
        let result = sqlx::query("UPDATE users SET is_verified = TRUE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingUser(id));
        }
        Ok(())
    }

    async fn append_message(&self, message: &StoredMessage) -> StoreResult<()> {
        let pool = self.db.ensure_connected().await?;
        let result = sqlx::query(
            "INSERT INTO messages (id, recipient_id, content, created_at) \
             SELECT $1, $2, $3, $4 WHERE EXISTS (SELECT 1 FROM users WHERE id = $2)",
        )
        .bind(message.id.as_uuid())
        .bind(message.recipient_id.as_uuid())
        .bind(&message.content)
        .bind(message.created_at)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingUser(message.recipient_id));
        }
        Ok(())
    }

    async fn list_messages(&self, user: UserId) -> StoreResult<Vec<StoredMessage>> {
        let pool = self.db.ensure_connected().await?;
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, recipient_id, content, created_at FROM messages \
             WHERE recipient_id = $1 ORDER BY created_at DESC, seq DESC",
        )
        .bind(user.as_uuid())
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(StoredMessage::from).collect())
    }

    async fn remove_message(&self, user: UserId, id: MessageId) -> StoreResult<bool> {
        let pool = self.db.ensure_connected().await?;
        let result = sqlx::query("DELETE FROM messages WHERE id = $1 AND recipient_id = $2")
            .bind(id.as_uuid())
            .bind(user.as_uuid())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_accepting(&self, user: UserId, accepting: bool) -> StoreResult<Option<bool>> {
        let pool = self.db.ensure_connected().await?;
        let value: Option<bool> = sqlx::query_scalar(
            "UPDATE users SET accepting_messages = $2 WHERE id = $1 RETURNING accepting_messages",
        )
        .bind(user.as_uuid())
        .bind(accepting)
        .fetch_optional(pool)
        .await?;
        Ok(value)
    }

    async fn health(&self) -> StoreResult<()> {
        let pool = self.db.ensure_connected().await?;
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
