use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{MessageView, UserId, NEW_MESSAGE_EVENT};
use crate::relay::Publisher;

/// 新消息扇出：失败只记录日志，不影响入库结果
/// Fan-out of stored messages; failures are logged and swallowed
#[derive(Clone)]
pub struct FanoutPublisher {
    publisher: Arc<dyn Publisher>,
}

impl FanoutPublisher {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }

    pub fn backend(&self) -> &'static str {
        self.publisher.name()
    }

    /// 在接收者频道上发布 `new-message`，返回是否成功
    pub async fn publish_new_message(&self, recipient: UserId, message: &MessageView) -> bool {
        let data = match serde_json::to_value(message) {
            Ok(data) => data,
            Err(e) => {
                warn!(message_id = %message.id, "消息序列化失败: {}", e);
                return false;
            }
        };

        let channel = recipient.channel();
        match self.publisher.publish(&channel, NEW_MESSAGE_EVENT, &data).await {
            Ok(()) => {
                debug!(message_id = %message.id, "推送成功 ({})", self.publisher.name());
                true
            }
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    relay = self.publisher.name(),
                    "推送失败，已忽略: {}",
                    e
                );
                false
            }
        }
    }
}
