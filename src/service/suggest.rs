use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, instrument};

use crate::comm::config::ConfigError;
use crate::comm::AppConfiguration;
use crate::error::{AppError, AppResult};

const SUGGESTION_PROMPT: &str = "Create a list of three open-ended and engaging questions \
formatted as a single string. Each question should be separated by '||'. These questions are \
for an anonymous social messaging platform and should avoid sensitive topics.";

/// 生成式语言接口的消息建议
#[derive(Clone)]
pub struct SuggestionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl SuggestionClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        }
    }

    pub fn from_config(c: &AppConfiguration) -> Self {
        Self::new(&c.suggest_endpoint, &c.suggest_model, c.suggest_api_key.clone())
    }

    #[instrument(skip(self))]
    pub async fn suggest(&self) -> AppResult<Vec<String>> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(AppError::Config(ConfigError::KeyNotFound {
                key: "suggest.api_key".to_string(),
            }))?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        );
        // 错误信息去掉 URL，查询串里带着 API key
        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&json!({ "contents": [{ "parts": [{ "text": SUGGESTION_PROMPT }] }] }))
            .send()
            .await
            .map_err(|e| AppError::external_service("suggest", e.without_url().to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::external_service("suggest", e.without_url().to_string()))?;

        if !status.is_success() {
            let message = body["error"]["message"].as_str().unwrap_or("upstream error");
            error!(%status, "建议接口返回错误: {}", message);
            return Err(AppError::external_service("suggest", message));
        }

        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| AppError::external_service("suggest", "unexpected response shape"))?;
        Ok(split_suggestions(text))
    }
}

/// 按 `||` 拆分，去掉首尾空白与空项
pub fn split_suggestions(text: &str) -> Vec<String> {
    text.split("||")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn test_split_suggestions() {
        let parts = split_suggestions(" What's your hobby? ||Favorite film?|| ||Dream trip?\n");
        assert_eq!(parts, vec!["What's your hobby?", "Favorite film?", "Dream trip?"]);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_server_error() {
        let client = SuggestionClient::new("http://127.0.0.1:9", "model", None);
        let err = client.suggest().await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let client = SuggestionClient::new("http://127.0.0.1:9", "model", Some("key".into()));
        let err = client.suggest().await.unwrap_err();
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn test_upstream_error_does_not_echo_api_key() {
        let client = SuggestionClient::new(
            "http://127.0.0.1:9",
            "model",
            Some("secret-key-123".into()),
        );
        let err = client.suggest().await.unwrap_err();
        assert!(!err.to_string().contains("secret-key-123"));
        assert!(!format!("{:?}", err).contains("secret-key-123"));
    }
}
