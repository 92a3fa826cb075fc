use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};

/// 验证码邮件发送
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, email: &str, username: &str, code: &str) -> AppResult<()>;
}

/// 默认实现：只写日志
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification(&self, email: &str, username: &str, code: &str) -> AppResult<()> {
        info!(%email, %username, %code, "验证码邮件（日志投递）");
        Ok(())
    }
}

/// 带重试的投递，每次间隔固定时长
pub async fn send_with_retry(
    mailer: &dyn Mailer,
    email: &str,
    username: &str,
    code: &str,
    max_attempts: u32,
    delay: Duration,
) -> AppResult<()> {
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match mailer.send_verification(email, username, code).await {
            Ok(()) => {
                info!(%email, attempt, "验证码邮件已发送");
                return Ok(());
            }
            Err(e) if attempt < max_attempts => {
                warn!(%email, attempt, "验证码邮件发送失败，稍后重试: {}", e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(%email, attempt, "验证码邮件发送失败: {}", e);
            }
        }
    }
    Err(AppError::external_service(
        "mailer",
        "Error sending verification email",
    ))
}
