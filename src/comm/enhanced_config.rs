use crate::comm::config::{ConfigError, ConfigManager, ConfigSource};
use crate::comm::config_validator::{AppConfiguration, ConfigValidator, PushMode};
use crate::error::{AppError, AppResult};
use config::FileFormat;
use tracing::{debug, info};

/// 环境变量前缀，例如 `NYMITY_SERVER__PORT=8080`
pub const ENV_PREFIX: &str = "NYMITY";

/// 增强的配置管理器：分层加载 + 类型化 + 验证
pub struct EnhancedConfigManager {
    config_manager: ConfigManager,
    app_config: AppConfiguration,
}

impl EnhancedConfigManager {
    /// 从默认配置源创建
    /// default.toml -> {env}.toml -> 环境变量
    pub fn new() -> AppResult<Self> {
        let environment = std::env::var(format!("{}_ENV", ENV_PREFIX))
            .unwrap_or_else(|_| "development".to_string());
        info!("当前环境: {}", environment);

        let sources = vec![
            ConfigSource::File {
                path: "config/default.toml".to_string(),
                format: Some(FileFormat::Toml),
                required: false,
            },
            ConfigSource::File {
                path: format!("config/{}.toml", environment),
                format: Some(FileFormat::Toml),
                required: false,
            },
            ConfigSource::Env {
                prefix: ENV_PREFIX.to_string(),
                separator: "__",
            },
        ];

        let mut manager = Self::with_sources(sources)?;
        manager.app_config.environment = environment;
        ConfigValidator::new().validate_config(&manager.app_config)?;
        Ok(manager)
    }

    /// 使用指定的配置源创建（测试与嵌入场景）
    pub fn with_sources(sources: Vec<ConfigSource>) -> AppResult<Self> {
        let config_manager = ConfigManager::with_sources(sources).map_err(|e| {
            AppError::Config(ConfigError::InitializationError {
                message: e.to_string(),
            })
        })?;

        let app_config = Self::load_app_config(&config_manager)?;
        ConfigValidator::new().validate_config(&app_config)?;

        info!("配置加载和验证成功");
        debug!("应用配置: {:?}", app_config);

        Ok(Self {
            config_manager,
            app_config,
        })
    }

    /// 加载应用配置：缺失项保留默认值，类型错误直接报错
    fn load_app_config(cm: &ConfigManager) -> Result<AppConfiguration, ConfigError> {
        let mut c = AppConfiguration::default();

        macro_rules! load {
            ($key:expr => $field:expr) => {
                if let Some(value) = cm.get_optional($key)? {
                    $field = value;
                }
            };
            ($key:expr => some $field:expr) => {
                if let Some(value) = cm.get_optional($key)? {
                    $field = Some(value);
                }
            };
        }

        load!("environment" => c.environment);
        load!("server.host" => c.server_host);
        load!("server.port" => c.server_port);
        load!("server.workers" => some c.server_workers);
        load!("server.debug" => c.server_debug);
        load!("database.url" => some c.database_url);
        load!("database.max_connections" => c.database_max_connections);
        load!("logging.level" => c.logging_level);
        load!("logging.json_format" => c.logging_json_format);
        load!("session.secret" => c.session_secret);
        load!("session.ttl_seconds" => c.session_ttl_seconds);
        load!("rate_limit.enabled" => c.rate_limit_enabled);
        load!("rate_limit.max_requests" => c.rate_limit_max_requests);
        load!("rate_limit.window_seconds" => c.rate_limit_window_seconds);
        load!("rate_limit.whitelist" => c.rate_limit_whitelist);
        load!("rate_limit.trusted_proxies" => c.rate_limit_trusted_proxies);
        load!("push.mode" => c.push_mode);
        load!("push.webhook_url" => some c.push_webhook_url);
        load!("push.webhook_secret" => some c.push_webhook_secret);
        load!("push.timeout_ms" => c.push_timeout_ms);
        load!("suggest.api_key" => some c.suggest_api_key);
        load!("suggest.endpoint" => c.suggest_endpoint);
        load!("suggest.model" => c.suggest_model);
        load!("messages.max_length" => c.messages_max_length);
        load!("mail.max_attempts" => c.mail_max_attempts);

        Ok(c)
    }

    /// 获取应用配置
    pub fn get_app_config(&self) -> &AppConfiguration {
        &self.app_config
    }

    /// 获取可变应用配置（命令行覆盖）
    pub fn app_config_mut(&mut self) -> &mut AppConfiguration {
        &mut self.app_config
    }

    /// 验证必需的配置项
    pub fn validate_required_config(&self) -> AppResult<()> {
        if !self.app_config.is_production() {
            return Ok(());
        }
        self.config_manager
            .validate_required_keys(&["database.url", "session.secret"])?;
        Ok(())
    }

    /// 打印配置摘要
    pub fn print_config_summary(&self) {
        let c = &self.app_config;
        info!("=== 配置摘要 ===");
        info!("环境: {}", c.environment);
        info!("服务器: {}:{}", c.server_host, c.server_port);
        info!("工作线程: {:?}", c.server_workers);
        info!("日志级别: {} (JSON: {})", c.logging_level, c.logging_json_format);
        match &c.database_url {
            Some(url) => info!("数据库: {}", mask_sensitive_info(url)),
            None => info!("数据库: 内存存储"),
        }
        info!(
            "限流: {} 次 / {} 秒 (启用: {})",
            c.rate_limit_max_requests, c.rate_limit_window_seconds, c.rate_limit_enabled
        );
        match c.push_mode {
            PushMode::Local => info!("推送: 进程内中继"),
            PushMode::Webhook => info!(
                "推送: webhook {}",
                c.push_webhook_url.as_deref().unwrap_or("-")
            ),
        }
        info!("AI 建议: {}", if c.suggest_api_key.is_some() { "已配置" } else { "未配置" });

        self.config_manager.log_sources_info();
    }
}

/// 屏蔽连接串中的密码
pub fn mask_sensitive_info(url: &str) -> String {
    let Some(start) = url.find("://") else {
        return url.to_string();
    };
    let credentials_start = start + 3;
    let Some(at_pos) = url[credentials_start..].find('@') else {
        return url.to_string();
    };
    let credentials_end = credentials_start + at_pos;
    match url[credentials_start..credentials_end].find(':') {
        Some(colon_pos) => {
            let mut result = url.to_string();
            result.replace_range(credentials_start + colon_pos + 1..credentials_end, "***");
            result
        }
        None => url.to_string(),
    }
}
