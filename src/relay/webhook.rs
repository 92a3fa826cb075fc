use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tracing::info;

use super::{Publisher, RelayError};

type HmacSha256 = Hmac<Sha256>;

/// 签名请求头
pub const SIGNATURE_HEADER: &str = "X-Nymity-Signature";

/// 外部中继：把事件 POST 到配置的地址
/// External relay: POSTs `{channel, event, data}` to the configured URL
pub struct WebhookRelay {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl WebhookRelay {
    pub fn new(url: impl Into<String>, secret: Option<String>, timeout_ms: u64) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            secret,
        })
    }
}

/// 对请求体计算签名：`sha256=<hex>`
pub fn sign_payload(body: &[u8], secret: &str) -> Result<String, RelayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| RelayError::Config(e.to_string()))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[async_trait]
impl Publisher for WebhookRelay {
    async fn publish(&self, channel: &str, event: &str, data: &Value) -> Result<(), RelayError> {
        let body = serde_json::to_vec(&json!({
            "channel": channel,
            "event": event,
            "data": data,
        }))?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(&body, secret)?);
        }

        let response = request.body(body).send().await?;
        if response.status().is_success() {
            info!("webhook 事件 {} 已投递到频道 {}", event, channel);
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(RelayError::Status { status, body })
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
