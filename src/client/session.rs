//! 收件箱会话
//!
//! 组合 [`MessageApi`]、[`PushTransport`] 与 [`MessageCache`]：登录后订阅自己的频道，
//! 拉取列表，切换接收开关，乐观删除。状态锁从不跨越 `.await`。

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::api::{ClientError, MessageApi};
use super::cache::{AcceptFlag, MessageCache};
use super::transport::{EventHandler, PushTransport, Subscription};
use crate::domain::{MessageView, NEW_MESSAGE_EVENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// 面向用户的提示（toast）
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// 只写日志的提示
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => info!("{}", message),
            NoticeLevel::Error => warn!("{}", message),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    cache: MessageCache,
    accept: AcceptFlag,
}

pub struct DashboardSession {
    channel: String,
    api: Arc<dyn MessageApi>,
    transport: Arc<dyn PushTransport>,
    notifier: Arc<dyn Notifier>,
    state: Arc<Mutex<SessionState>>,
    // 同一时刻至多一个订阅
    subscription: Mutex<Option<Subscription>>,
}

impl DashboardSession {
    /// `channel` 为当前用户 id
    pub fn new(
        channel: impl Into<String>,
        api: Arc<dyn MessageApi>,
        transport: Arc<dyn PushTransport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            channel: channel.into(),
            api,
            transport,
            notifier,
            state: Arc::new(Mutex::new(SessionState::default())),
            subscription: Mutex::new(None),
        }
    }

    /// 订阅、首次拉取、读取接收开关
    pub async fn start(&self) -> Result<(), ClientError> {
        // 先领取凭证再订阅：拉取期间到达的推送在快照应用后仍保留
        let ticket = self.state.lock().cache.begin_fetch();
        self.subscribe().await?;
        let snapshot = self.fetch_or_notify().await?;
        self.state.lock().cache.replace_all(ticket, snapshot);
        self.load_accept_flag().await?;
        Ok(())
    }

    /// 订阅自己的频道，替换已有订阅
    pub async fn subscribe(&self) -> Result<(), ClientError> {
        let state = self.state.clone();
        let notifier = self.notifier.clone();
        let handler: EventHandler = Arc::new(move |data: Value| {
            match serde_json::from_value::<MessageView>(data) {
                Ok(message) => {
                    let id = message.id.clone();
                    let inserted = state.lock().cache.insert_one(message);
                    if inserted {
                        debug!("收到推送消息 {}", id);
                        notifier.notify(NoticeLevel::Info, "New message received");
                    }
                }
                Err(e) => warn!("推送载荷无法解析: {}", e),
            }
        });
        let subscription = self
            .transport
            .subscribe(&self.channel, NEW_MESSAGE_EVENT, handler)
            .await?;
        let previous = self.subscription.lock().replace(subscription);
        drop(previous);
        Ok(())
    }

    /// 重新拉取；过期快照会被丢弃
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let ticket = self.state.lock().cache.begin_fetch();
        let snapshot = self.fetch_or_notify().await?;
        if !self.state.lock().cache.replace_all(ticket, snapshot) {
            debug!("丢弃过期的消息快照");
        }
        Ok(())
    }

    async fn fetch_or_notify(&self) -> Result<Vec<MessageView>, ClientError> {
        self.api.fetch_messages().await.map_err(|e| {
            self.notifier
                .notify(NoticeLevel::Error, &format!("Failed to fetch messages: {}", e));
            e
        })
    }

    pub async fn load_accept_flag(&self) -> Result<bool, ClientError> {
        let accepting = self.api.get_accepting().await.map_err(|e| {
            self.notifier.notify(
                NoticeLevel::Error,
                &format!("Failed to fetch message settings: {}", e),
            );
            e
        })?;
        self.state.lock().accept = AcceptFlag::from_bool(accepting);
        Ok(accepting)
    }

    /// 乐观翻转接收开关；失败时回滚并提示。状态未知时拒绝
    pub async fn toggle_accepting(&self) -> Result<bool, ClientError> {
        let (prior, desired) = {
            let mut state = self.state.lock();
            let prior = state.accept;
            let next = prior
                .toggled()
                .ok_or_else(|| ClientError::InvalidState("接收状态尚未加载".to_string()))?;
            state.accept = next;
            (prior, next)
        };
        let desired = desired.as_bool().unwrap_or_default();

        match self.api.set_accepting(desired).await {
            Ok(confirmed) => {
                self.state.lock().accept = AcceptFlag::from_bool(confirmed);
                let state = if confirmed { "ON" } else { "OFF" };
                self.notifier.notify(
                    NoticeLevel::Info,
                    &format!("Message acceptance is now {}", state),
                );
                Ok(confirmed)
            }
            Err(e) => {
                self.state.lock().accept = prior;
                self.notifier.notify(
                    NoticeLevel::Error,
                    &format!("Failed to update message settings: {}", e),
                );
                Err(e)
            }
        }
    }

    /// 乐观删除；服务端报告不存在时视为已删除，其余失败回滚
    pub async fn delete_message(&self, id: &str) -> Result<(), ClientError> {
        let removed = self.state.lock().cache.remove_by_id(id);

        match self.api.delete_message(id).await {
            Ok(()) => {
                self.state.lock().cache.confirm_removed(id);
                self.notifier.notify(NoticeLevel::Info, "Message deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                self.state.lock().cache.confirm_removed(id);
                self.notifier
                    .notify(NoticeLevel::Error, "Message not found or already deleted");
                Err(e)
            }
            Err(e) => {
                {
                    let mut state = self.state.lock();
                    match removed {
                        Some(removed) => state.cache.restore(removed),
                        None => state.cache.forget_removal(id),
                    }
                }
                self.notifier.notify(
                    NoticeLevel::Error,
                    &format!("Failed to delete message: {}", e),
                );
                Err(e)
            }
        }
    }

    /// 按时间倒序的消息列表
    pub fn messages(&self) -> Vec<MessageView> {
        self.state.lock().cache.messages()
    }

    pub fn accept_flag(&self) -> AcceptFlag {
        self.state.lock().accept
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .as_ref()
            .map(Subscription::is_active)
            .unwrap_or(false)
    }

    /// 释放订阅；会话本身 drop 时同样释放
    pub fn close(&self) {
        let subscription = self.subscription.lock().take();
        drop(subscription);
    }
}
