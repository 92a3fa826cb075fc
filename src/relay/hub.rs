use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::{PushEvent, Publisher, RelayError};

/// 每个频道的缓冲事件数
const CHANNEL_CAPACITY: usize = 64;

/// 进程内中继：每个频道一个 broadcast 发送端
/// In-process relay: one broadcast sender per channel
#[derive(Default)]
pub struct RelayHub {
    channels: DashMap<String, broadcast::Sender<PushEvent>>,
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅频道；频道不存在时创建
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<PushEvent> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// 发送事件，返回收到事件的订阅者数量
    pub fn send(&self, channel: &str, event: PushEvent) -> usize {
        match self.channels.get(channel) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => {
                trace!("频道 {} 无订阅者", channel);
                0
            }
        }
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// 清理已无订阅者的频道
    pub fn prune(&self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
        let removed = before - self.channels.len();
        if removed > 0 {
            debug!("清理空闲频道 {} 个", removed);
        }
        removed
    }
}

#[async_trait]
impl Publisher for RelayHub {
    async fn publish(&self, channel: &str, event: &str, data: &Value) -> Result<(), RelayError> {
        let delivered = self.send(
            channel,
            PushEvent {
                event: event.to_string(),
                data: data.clone(),
            },
        );
        debug!("频道 {} 事件 {} 送达 {} 个订阅者", channel, event, delivered);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
