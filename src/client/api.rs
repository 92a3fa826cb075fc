use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::domain::MessageView;
use crate::service::account::SessionUser;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("服务端返回 {status}: {message}")]
    Api { status: u16, message: String },
    #[error("无效的响应数据: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("未登录")]
    MissingToken,
    #[error("{0}")]
    InvalidState(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// 服务端报告资源不存在
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND.as_u16())
    }
}

/// 收件箱所需的服务端操作
#[async_trait]
pub trait MessageApi: Send + Sync {
    async fn fetch_messages(&self) -> Result<Vec<MessageView>, ClientError>;

    async fn delete_message(&self, id: &str) -> Result<(), ClientError>;

    async fn get_accepting(&self) -> Result<bool, ClientError>;

    /// 返回服务端确认后的值
    async fn set_accepting(&self, accept: bool) -> Result<bool, ClientError>;
}

#[derive(Deserialize)]
struct MessagesBody {
    messages: Vec<MessageView>,
}

#[derive(Deserialize)]
struct SentBody {
    message: MessageView,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptBody {
    is_accepting_messages: bool,
}

#[derive(Deserialize)]
struct SignInBody {
    token: String,
    user: SessionUser,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// 基于 reqwest 的 HTTP 客户端
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::MissingToken)?;
        Ok(builder.bearer_auth(token))
    }

    /// 登录并保存令牌
    #[instrument(skip(self, password))]
    pub async fn sign_in(&mut self, identifier: &str, password: &str) -> Result<SessionUser, ClientError> {
        let response = self
            .client
            .post(self.url("/api/sign-in"))
            .json(&json!({ "identifier": identifier, "password": password }))
            .send()
            .await?;
        let body: SignInBody = decode(response).await?;
        self.token = Some(body.token);
        Ok(body.user)
    }

    /// 匿名投递，无需登录
    pub async fn send_message(&self, username: &str, content: &str) -> Result<MessageView, ClientError> {
        let response = self
            .client
            .post(self.url("/api/send-message"))
            .json(&json!({ "username": username, "content": content }))
            .send()
            .await?;
        let body: SentBody = decode(response).await?;
        Ok(body.message)
    }
}

#[async_trait]
impl MessageApi for HttpApi {
    async fn fetch_messages(&self) -> Result<Vec<MessageView>, ClientError> {
        let response = self
            .authorized(self.client.get(self.url("/api/get-messages")))?
            .send()
            .await?;
        let body: MessagesBody = decode(response).await?;
        debug!("拉取到 {} 条消息", body.messages.len());
        Ok(body.messages)
    }

    async fn delete_message(&self, id: &str) -> Result<(), ClientError> {
        let path = format!("/api/delete-message/{}", urlencoding::encode(id));
        let response = self
            .authorized(self.client.delete(self.url(&path)))?
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    async fn get_accepting(&self) -> Result<bool, ClientError> {
        let response = self
            .authorized(self.client.get(self.url("/api/accept-messages")))?
            .send()
            .await?;
        let body: AcceptBody = decode(response).await?;
        Ok(body.is_accepting_messages)
    }

    async fn set_accepting(&self, accept: bool) -> Result<bool, ClientError> {
        let response = self
            .authorized(self.client.post(self.url("/api/accept-messages")))?
            .json(&json!({ "acceptMessages": accept }))
            .send()
            .await?;
        let body: AcceptBody = decode(response).await?;
        Ok(body.is_accepting_messages)
    }
}

/// 非 2xx 时取响应体里的 message 字段
pub(crate) async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.message)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = ClientError::Api {
            status: 404,
            message: "Message not found".into(),
        };
        assert!(err.is_not_found());
        assert!(!ClientError::MissingToken.is_not_found());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let api = HttpApi::new("http://localhost:3000/").unwrap();
        assert_eq!(api.url("/api/get-messages"), "http://localhost:3000/api/get-messages");
    }

    #[tokio::test]
    async fn test_requires_token() {
        let api = HttpApi::new("http://localhost:1").unwrap();
        assert!(matches!(api.fetch_messages().await, Err(ClientError::MissingToken)));
    }
}
