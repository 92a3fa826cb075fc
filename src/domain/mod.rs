/// 领域模型 / Domain model
pub mod message;
pub mod user;

pub use message::{MessageContent, MessageId, MessageView, StoredMessage, NEW_MESSAGE_EVENT};
pub use user::{Registration, UserId, UserRecord};
