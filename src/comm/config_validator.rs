use crate::comm::config::ConfigError;
use serde::{Deserialize, Serialize};

/// 推送中继模式
/// Push relay mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushMode {
    /// 进程内中继（SSE 订阅）
    Local,
    /// 外部中继（HTTP webhook）
    Webhook,
}

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfiguration {
    pub environment: String,
    pub server_host: String,
    pub server_port: u16,
    pub server_workers: Option<usize>,
    pub server_debug: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub logging_level: String,
    pub logging_json_format: bool,
    #[serde(skip_serializing)]
    pub session_secret: String,
    pub session_ttl_seconds: i64,
    pub rate_limit_enabled: bool,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_whitelist: Vec<String>,
    pub rate_limit_trusted_proxies: Vec<String>,
    pub push_mode: PushMode,
    pub push_webhook_url: Option<String>,
    #[serde(skip_serializing)]
    pub push_webhook_secret: Option<String>,
    pub push_timeout_ms: u64,
    #[serde(skip_serializing)]
    pub suggest_api_key: Option<String>,
    pub suggest_endpoint: String,
    pub suggest_model: String,
    pub messages_max_length: usize,
    pub mail_max_attempts: u32,
}

impl Default for AppConfiguration {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
            server_workers: Some(4),
            server_debug: false,
            database_url: None,
            database_max_connections: 10,
            logging_level: "info".to_string(),
            logging_json_format: true,
            session_secret: "nymity-development-secret".to_string(),
            session_ttl_seconds: 30 * 24 * 3600,
            rate_limit_enabled: true,
            rate_limit_max_requests: 5,
            rate_limit_window_seconds: 60,
            rate_limit_whitelist: Vec::new(),
            rate_limit_trusted_proxies: Vec::new(),
            push_mode: PushMode::Local,
            push_webhook_url: None,
            push_webhook_secret: None,
            push_timeout_ms: 3000,
            suggest_api_key: None,
            suggest_endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            suggest_model: "gemini-2.5-flash".to_string(),
            messages_max_length: 300,
            mail_max_attempts: 3,
        }
    }
}

impl AppConfiguration {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// 配置验证器
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    /// 验证整个配置
    pub fn validate_config(&self, config: &AppConfiguration) -> Result<(), ConfigError> {
        if config.server_host.is_empty() {
            return Err(invalid("server.host", "服务器主机不能为空"));
        }

        if config.server_port < 1024 {
            return Err(invalid("server.port", "端口必须在1024-65535范围内"));
        }

        if let Some(workers) = config.server_workers {
            if workers == 0 || workers > 32 {
                return Err(invalid("server.workers", "工作线程数必须在1-32范围内"));
            }
        }

        if config.database_max_connections == 0 {
            return Err(invalid("database.max_connections", "连接池大小必须大于0"));
        }

        if !LOG_LEVELS.contains(&config.logging_level.to_lowercase().as_str()) {
            return Err(invalid(
                "logging.level",
                format!("日志级别必须是 {:?} 之一", LOG_LEVELS),
            ));
        }

        if config.session_secret.len() < 16 {
            return Err(invalid("session.secret", "会话密钥至少需要16个字符"));
        }

        if config.is_production() && config.session_secret == AppConfiguration::default().session_secret {
            return Err(invalid("session.secret", "生产环境不能使用默认会话密钥"));
        }

        if config.session_ttl_seconds <= 0 {
            return Err(invalid("session.ttl_seconds", "会话有效期必须大于0"));
        }

        if config.rate_limit_max_requests == 0 || config.rate_limit_window_seconds == 0 {
            return Err(invalid("rate_limit", "限流请求数和窗口大小必须大于0"));
        }

        if config.push_mode == PushMode::Webhook && config.push_webhook_url.is_none() {
            return Err(invalid("push.webhook_url", "webhook 模式需要配置中继地址"));
        }

        if config.messages_max_length == 0 {
            return Err(invalid("messages.max_length", "消息长度上限必须大于0"));
        }

        if config.mail_max_attempts == 0 {
            return Err(invalid("mail.max_attempts", "邮件重试次数必须大于0"));
        }

        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration_is_valid() {
        assert!(ConfigValidator::new()
            .validate_config(&AppConfiguration::default())
            .is_ok());
    }

    #[test]
    fn test_rejects_low_port() {
        let config = AppConfiguration {
            server_port: 80,
            ..Default::default()
        };
        assert!(ConfigValidator::new().validate_config(&config).is_err());
    }

    #[test]
    fn test_production_requires_own_secret() {
        let config = AppConfiguration {
            environment: "production".to_string(),
            ..Default::default()
        };
        let err = ConfigValidator::new().validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("session.secret"));
    }

    #[test]
    fn test_webhook_mode_requires_url() {
        let config = AppConfiguration {
            push_mode: PushMode::Webhook,
            ..Default::default()
        };
        assert!(ConfigValidator::new().validate_config(&config).is_err());
    }
}
