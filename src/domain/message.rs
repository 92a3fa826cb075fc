use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::user::UserId;
use crate::error::{AppError, AppResult};

/// 推送事件名 / Push event name for a newly stored message
pub const NEW_MESSAGE_EVENT: &str = "new-message";

/// 消息内容默认长度上限（字符数）
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 300;

/// 消息标识 / Message identifier, printable as a string on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MessageId {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| AppError::validation("messageId", "Invalid Message ID format."))
    }
}

/// 经过长度校验的消息内容
/// Message content that passed the length policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent(String);

impl MessageContent {
    /// 按字符数（而非字节数）校验长度
    pub fn parse(raw: &str, max_length: usize) -> AppResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("content", "Message content cannot be empty"));
        }
        if raw.chars().count() > max_length {
            return Err(AppError::validation(
                "content",
                format!("The content should not be more than {} characters", max_length),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// 存储中的消息记录
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: MessageId,
    pub recipient_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(recipient_id: UserId, content: MessageContent) -> Self {
        Self {
            id: MessageId::new(),
            recipient_id,
            content: content.into_inner(),
            created_at: Utc::now(),
        }
    }

    /// 转换为对外视图（不含 recipientId）
    pub fn to_view(&self) -> MessageView {
        MessageView {
            id: self.id.to_string(),
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }
}

/// 对外消息视图：HTTP 响应、推送载荷、客户端缓存共用
/// Wire form of a message shared by responses, push payloads and the client cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_limit_counts_characters() {
        let exactly = "é".repeat(300);
        assert!(MessageContent::parse(&exactly, 300).is_ok());

        let over = "a".repeat(301);
        let err = MessageContent::parse(&over, 300).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_blank_content_rejected() {
        for blank in ["", "   ", "\n\t "] {
            let err = MessageContent::parse(blank, 300).unwrap_err();
            assert!(matches!(err, AppError::Validation { .. }));
        }
        // 非空内容原样保存
        let kept = MessageContent::parse("  hi  ", 300).unwrap();
        assert_eq!(kept.as_str(), "  hi  ");
    }

    #[test]
    fn test_message_id_parse() {
        let id = MessageId::new();
        assert_eq!(id.to_string().parse::<MessageId>().unwrap(), id);
        assert!("not-a-uuid".parse::<MessageId>().is_err());
    }

    #[test]
    fn test_view_serializes_string_id_and_camel_case() {
        let msg = StoredMessage::new(
            UserId::new(),
            MessageContent::parse("Hello", 300).unwrap(),
        );
        let value = serde_json::to_value(msg.to_view()).unwrap();
        assert_eq!(value["id"], msg.id.to_string());
        assert_eq!(value["content"], "Hello");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("recipientId").is_none());
    }
}
