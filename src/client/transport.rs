//! 推送订阅
//!
//! `subscribe` 返回的 [`Subscription`] 持有后台任务，drop 时（包括 panic 展开）终止任务。
//! A subscription owns its background task and aborts it when dropped.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::api::{check_status, ClientError, HttpApi};
use crate::relay::RelayHub;

/// 事件回调，参数为事件 data
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// 订阅频道上的某个事件；返回时订阅已生效
    async fn subscribe(
        &self,
        channel: &str,
        event: &str,
        handler: EventHandler,
    ) -> Result<Subscription, ClientError>;
}

/// 订阅句柄
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    task: JoinHandle<()>,
}

impl Subscription {
    fn new(channel: &str, task: JoinHandle<()>) -> Self {
        Self {
            channel: channel.to_string(),
            task,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
        debug!("取消订阅频道 {}", self.channel);
    }
}

/// 进程内订阅，直接挂在 RelayHub 上
#[derive(Clone)]
pub struct LocalTransport {
    hub: Arc<RelayHub>,
}

impl LocalTransport {
    pub fn new(hub: Arc<RelayHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl PushTransport for LocalTransport {
    async fn subscribe(
        &self,
        channel: &str,
        event: &str,
        handler: EventHandler,
    ) -> Result<Subscription, ClientError> {
        let mut rx = self.hub.subscribe(channel);
        let event = event.to_string();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(push) if push.event == event => handler(push.data),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => warn!("订阅落后，丢弃 {} 个事件", skipped),
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Ok(Subscription::new(channel, task))
    }
}

/// 一帧 SSE 事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// 增量 SSE 解析器：按空行切帧，忽略注释行
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    // 跨块截断的 UTF-8 字节
    pending: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                return self.feed(&text);
            }
        };
        let rest = self.pending.split_off(valid);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        self.feed(&text)
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(&chunk.replace("\r\n", "\n"));
        let mut frames = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = parse_block(&block) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut event = String::from("message");
    let mut data: Vec<&str> = Vec::new();
    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = value.to_string(),
            "data" => data.push(value),
            _ => {}
        }
    }
    if data.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data.join("\n"),
    })
}

/// 通过服务端 `/api/events` 的 SSE 订阅
#[derive(Clone)]
pub struct SseTransport {
    api: HttpApi,
    // 流式连接不设整体超时，单独一个 client
    stream_client: reqwest::Client,
}

impl SseTransport {
    pub fn new(api: HttpApi) -> Result<Self, ClientError> {
        let stream_client = reqwest::Client::builder().build()?;
        Ok(Self { api, stream_client })
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn subscribe(
        &self,
        channel: &str,
        event: &str,
        handler: EventHandler,
    ) -> Result<Subscription, ClientError> {
        let token = self.api.token().ok_or(ClientError::MissingToken)?;
        let url = format!(
            "{}/api/events?channel={}",
            self.api.base_url(),
            urlencoding::encode(channel)
        );
        let response = self
            .stream_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await?;
        let response = check_status(response).await?;

        let event = event.to_string();
        let mut stream = response.bytes_stream();
        let task = tokio::spawn(async move {
            let mut parser = SseParser::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("SSE 连接中断: {}", e);
                        break;
                    }
                };
                for frame in parser.feed_bytes(&chunk) {
                    if frame.event != event {
                        continue;
                    }
                    match serde_json::from_str::<Value>(&frame.data) {
                        Ok(data) => handler(data),
                        Err(e) => warn!("无法解析推送数据: {}", e),
                    }
                }
            }
        });
        Ok(Subscription::new(channel, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::Publisher;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_sse_parser_handles_split_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(": connected\n\n").is_empty());
        assert!(parser.feed("event: new-message\nda").is_empty());
        let frames = parser.feed("ta: {\"id\":\"1\"}\r\n\r\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: "new-message".into(),
                data: "{\"id\":\"1\"}".into()
            }]
        );
    }

    #[test]
    fn test_sse_parser_keeps_split_utf8() {
        let mut parser = SseParser::new();
        let frame = "event: new-message\ndata: \"你好\"\n\n".as_bytes();
        let cut = frame.len() - 4;
        assert!(parser.feed_bytes(&frame[..cut]).is_empty());
        let frames = parser.feed_bytes(&frame[cut..]);
        assert_eq!(frames[0].data, "\"你好\"");
    }

    #[tokio::test]
    async fn test_local_transport_filters_event_and_stops_on_drop() {
        let hub = Arc::new(RelayHub::new());
        let transport = LocalTransport::new(hub.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: EventHandler = Arc::new(move |v: Value| sink.lock().push(v));

        let sub = transport.subscribe("u1", "new-message", handler).await.unwrap();
        hub.publish("u1", "other", &json!(0)).await.unwrap();
        hub.publish("u1", "new-message", &json!(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock(), vec![json!(1)]);

        drop(sub);
        tokio::time::sleep(Duration::from_millis(20)).await;
        hub.publish("u1", "new-message", &json!(2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(hub.subscriber_count("u1"), 0);
    }
}
