//! 运行时组件初始化：存储、推送中继、会话密钥
//! Runtime component initialization from configuration

use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::SessionKeys;
use crate::comm::{AppConfiguration, PushMode};
use crate::error::{AppError, AppResult};
use crate::relay::{Publisher, RelayHub, WebhookRelay};
use crate::store::{Database, MemoryStore, MessageStore, PostgresStore};

/// 初始化会话密钥
pub fn init_session_keys(config: &AppConfiguration) -> AppResult<SessionKeys> {
    SessionKeys::new(&config.session_secret, config.session_ttl_seconds)
}

/// 初始化存储
///
/// 配置了 `database.url` 且未强制内存模式时使用 Postgres 并执行迁移，否则使用内存存储
pub async fn init_store(config: &AppConfiguration, memory: bool) -> AppResult<Arc<dyn MessageStore>> {
    match (&config.database_url, memory) {
        (Some(url), false) => {
            let db = Arc::new(Database::new(url.clone(), config.database_max_connections));
            db.migrate().await?;
            info!("使用 Postgres 存储");
            Ok(Arc::new(PostgresStore::new(db)))
        }
        (None, false) if config.is_production() => Err(AppError::database(
            "database.url is required in production",
        )),
        _ => {
            warn!("使用内存存储，重启后数据丢失");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// 初始化推送发布者
///
/// `local` 模式直接发布到进程内中继；`webhook` 模式投递到外部中继
pub fn init_publisher(config: &AppConfiguration, hub: Arc<RelayHub>) -> AppResult<Arc<dyn Publisher>> {
    match config.push_mode {
        PushMode::Local => {
            info!("推送模式: local");
            Ok(hub)
        }
        PushMode::Webhook => {
            let url = config.push_webhook_url.clone().ok_or_else(|| {
                AppError::Config(crate::comm::config::ConfigError::KeyNotFound {
                    key: "push.webhook_url".to_string(),
                })
            })?;
            info!("推送模式: webhook -> {}", url);
            let relay = WebhookRelay::new(
                url,
                config.push_webhook_secret.clone(),
                config.push_timeout_ms,
            )?;
            Ok(Arc::new(relay))
        }
    }
}
