use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{MessageStore, StoreError, StoreResult};
use crate::domain::{MessageId, Registration, StoredMessage, UserId, UserRecord};

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, UserRecord>,
    messages: HashMap<UserId, Vec<StoredMessage>>,
}

/// 内存存储（测试与 `--memory` 模式）
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 某用户的消息数量
    pub fn message_count(&self, user: UserId) -> usize {
        self.inner
            .read()
            .messages
            .get(&user)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let inner = self.inner.read();
        Ok(inner.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.inner.read().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let inner = self.inner.read();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: &UserRecord) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("username".to_string()));
        }
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email".to_string()));
        }
        inner.users.insert(user.id, user.clone());
        inner.messages.entry(user.id).or_default();
        Ok(())
    }

    async fn refresh_registration(
        &self,
        id: UserId,
        registration: &Registration,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if inner
            .users
            .values()
            .any(|u| u.id != id && u.username == registration.username)
        {
            return Err(StoreError::Conflict("username".to_string()));
        }
        let user = inner.users.get_mut(&id).ok_or(StoreError::MissingUser(id))?;
        user.username = registration.username.clone();
        user.password_hash = registration.password_hash.clone();
        user.verify_code = registration.verify_code.clone();
        user.verify_code_expires = registration.verify_code_expires;
        Ok(())
    }

    async fn mark_verified(&self, id: UserId) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let user = inner.users.get_mut(&id).ok_or(StoreError::MissingUser(id))?;
        user.is_verified = true;
        Ok(())
    }

    async fn append_message(&self, message: &StoredMessage) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if !inner.users.contains_key(&message.recipient_id) {
            return Err(StoreError::MissingUser(message.recipient_id));
        }
        inner
            .messages
            .entry(message.recipient_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn list_messages(&self, user: UserId) -> StoreResult<Vec<StoredMessage>> {
        let inner = self.inner.read();
        let mut messages: Vec<StoredMessage> = inner
            .messages
            .get(&user)
            .map(|list| list.iter().rev().cloned().collect())
            .unwrap_or_default();
        // 插入顺序逆序后再按时间稳定排序
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }

    async fn remove_message(&self, user: UserId, id: MessageId) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        let Some(list) = inner.messages.get_mut(&user) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|m| m.id != id);
        Ok(list.len() != before)
    }

    async fn set_accepting(&self, user: UserId, accepting: bool) -> StoreResult<Option<bool>> {
        let mut inner = self.inner.write();
        Ok(inner.users.get_mut(&user).map(|u| {
            u.accepting_messages = accepting;
            u.accepting_messages
        }))
    }

    async fn health(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageContent;
    use chrono::{Duration, Utc};

    fn user(name: &str) -> UserRecord {
        Registration {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password_hash: "hash".to_string(),
            verify_code: "123456".to_string(),
            verify_code_expires: Utc::now() + Duration::hours(1),
        }
        .into_new_user()
    }

    fn message(recipient: UserId, text: &str) -> StoredMessage {
        StoredMessage::new(recipient, MessageContent::parse(text, 300).unwrap())
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.insert_user(&alice).await.unwrap();

        let mut first = message(alice.id, "first");
        first.created_at = Utc::now() - Duration::seconds(10);
        store.append_message(&first).await.unwrap();
        store.append_message(&message(alice.id, "second")).await.unwrap();

        let listed = store.list_messages(alice.id).await.unwrap();
        assert_eq!(listed[0].content, "second");
        assert_eq!(listed[1].content, "first");
    }

    #[tokio::test]
    async fn test_remove_unknown_leaves_store_unchanged() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.insert_user(&alice).await.unwrap();
        store.append_message(&message(alice.id, "hi")).await.unwrap();

        assert!(!store.remove_message(alice.id, MessageId::new()).await.unwrap());
        assert_eq!(store.message_count(alice.id), 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let store = MemoryStore::new();
        store.insert_user(&user("alice")).await.unwrap();
        let err = store.insert_user(&user("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_append_to_missing_user_fails() {
        let store = MemoryStore::new();
        let err = store.append_message(&message(UserId::new(), "hi")).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingUser(_)));
    }

    #[tokio::test]
    async fn test_identifier_lookup_matches_email() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.insert_user(&alice).await.unwrap();
        let found = store
            .find_user_by_identifier("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, alice.id);
    }
}
