//! 推送中继：进程内广播与外部 webhook
//! Push relay: in-process broadcast hub and external webhook

pub mod hub;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::AppError;

pub use hub::RelayHub;
pub use webhook::WebhookRelay;

/// 频道上的一次推送事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub event: String,
    pub data: Value,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("中继请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("中继返回状态 {status}: {body}")]
    Status { status: u16, body: String },
    #[error("序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("中继配置错误: {0}")]
    Config(String),
}

impl From<RelayError> for AppError {
    fn from(e: RelayError) -> Self {
        AppError::external_service("relay", e.to_string())
    }
}

/// 发布者：把事件投递到某个频道
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &str, event: &str, data: &Value) -> Result<(), RelayError>;

    fn name(&self) -> &'static str;
}
