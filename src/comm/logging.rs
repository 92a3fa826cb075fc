use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// 初始化日志：`RUST_LOG` 优先，其次为配置中的 `logging.level`
/// Initialize logging; `RUST_LOG` wins over the configured level
///
/// `try_init` 同时安装 `log` 到 `tracing` 的桥接，actix 访问日志因此进入同一输出。
pub fn init_tracing(level: &str, json_format: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{},sqlx=warn", level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json_format {
        let formatting_layer = BunyanFormattingLayer::new("nymity".into(), std::io::stdout);
        Registry::default()
            .with(env_filter)
            .with(JsonStorageLayer)
            .with(formatting_layer)
            .try_init()
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt::layer().compact().with_target(false))
            .try_init()
    };

    // 已初始化时忽略（测试中可能多次调用）
    if let Err(e) = result {
        eprintln!("tracing subscriber already set: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_installs_global_dispatcher_once() {
        init_tracing("debug", false);
        assert!(tracing::dispatcher::has_been_set());
        // 重复初始化不应 panic
        init_tracing("info", true);
        assert!(tracing::dispatcher::has_been_set());
    }
}
