use std::sync::Arc;
use tracing::{info, instrument};

use super::fanout::FanoutPublisher;
use crate::domain::{MessageContent, MessageView, StoredMessage};
use crate::error::{AppError, AppResult};
use crate::store::MessageStore;

/// 匿名消息入库
/// Accepts an anonymous message for a recipient handle
#[derive(Clone)]
pub struct MessageIngestion {
    store: Arc<dyn MessageStore>,
    fanout: FanoutPublisher,
    max_length: usize,
}

impl MessageIngestion {
    pub fn new(store: Arc<dyn MessageStore>, fanout: FanoutPublisher, max_length: usize) -> Self {
        Self {
            store,
            fanout,
            max_length,
        }
    }

    /// 校验 -> 查找接收者 -> 检查开关 -> 入库 -> 扇出
    #[instrument(skip(self, content), fields(content_len = content.chars().count()))]
    pub async fn ingest(&self, username: &str, content: &str) -> AppResult<MessageView> {
        // 长度校验先于任何存储访问
        let content = MessageContent::parse(content, self.max_length)?;

        let recipient = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;

        if !recipient.accepting_messages {
            return Err(AppError::forbidden("User is not accepting messages"));
        }

        let message = StoredMessage::new(recipient.id, content);
        self.store.append_message(&message).await?;
        info!(message_id = %message.id, "消息已保存");

        let view = message.to_view();
        self.fanout.publish_new_message(recipient.id, &view).await;
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Registration;
    use crate::relay::RelayHub;
    use crate::store::MemoryStore;
    use chrono::Utc;

    async fn setup(accepting: bool) -> (Arc<MemoryStore>, Arc<RelayHub>, MessageIngestion, crate::domain::UserId) {
        let store = Arc::new(MemoryStore::new());
        let mut user = Registration {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            verify_code: "123456".to_string(),
            verify_code_expires: Utc::now(),
        }
        .into_new_user();
        user.accepting_messages = accepting;
        store.insert_user(&user).await.unwrap();

        let hub = Arc::new(RelayHub::new());
        let ingestion = MessageIngestion::new(store.clone(), FanoutPublisher::new(hub.clone()), 300);
        (store, hub, ingestion, user.id)
    }

    #[tokio::test]
    async fn test_ingest_stores_and_fans_out() {
        let (store, hub, ingestion, alice) = setup(true).await;
        let mut rx = hub.subscribe(&alice.channel());

        let view = ingestion.ingest("alice", "Hello").await.unwrap();
        assert_eq!(view.content, "Hello");
        assert_eq!(store.message_count(alice), 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.data["id"], view.id);
    }

    #[tokio::test]
    async fn test_not_accepting_is_forbidden_and_not_stored() {
        let (store, _hub, ingestion, alice) = setup(false).await;
        let err = ingestion.ingest("alice", "Hello").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
        assert_eq!(store.message_count(alice), 0);
    }

    #[tokio::test]
    async fn test_unknown_recipient() {
        let (_store, _hub, ingestion, _) = setup(true).await;
        let err = ingestion.ingest("nobody", "Hello").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_over_long_content_rejected_first() {
        let (store, _hub, ingestion, alice) = setup(true).await;
        // 未知接收者也应先报长度错误
        let err = ingestion.ingest("nobody", &"x".repeat(301)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(store.message_count(alice), 0);
    }
}
