use std::sync::Arc;
use tracing::info;

use crate::domain::{MessageId, MessageView, UserId};
use crate::error::{AppError, AppResult};
use crate::store::MessageStore;

/// 已认证用户的收件箱操作
#[derive(Clone)]
pub struct Inbox {
    store: Arc<dyn MessageStore>,
}

impl Inbox {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// 新消息在前
    pub async fn list(&self, user: UserId) -> AppResult<Vec<MessageView>> {
        let messages = self.store.list_messages(user).await?;
        Ok(messages.iter().map(|m| m.to_view()).collect())
    }

    pub async fn delete(&self, user: UserId, id: MessageId) -> AppResult<()> {
        if self.store.remove_message(user, id).await? {
            info!(message_id = %id, "消息已删除");
            Ok(())
        } else {
            Err(AppError::not_found("Message"))
        }
    }

    pub async fn accepting(&self, user: UserId) -> AppResult<bool> {
        self.store
            .find_user_by_id(user)
            .await?
            .map(|u| u.accepting_messages)
            .ok_or_else(|| AppError::not_found("User"))
    }

    pub async fn set_accepting(&self, user: UserId, accepting: bool) -> AppResult<bool> {
        let value = self
            .store
            .set_accepting(user, accepting)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        info!(accepting = value, "接收开关已更新");
        Ok(value)
    }
}
