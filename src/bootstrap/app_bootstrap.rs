use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::SessionKeys;
use crate::bootstrap::route_registry::{configure_global_routes, get_global_route_registry};
use crate::comm::AppConfiguration;
use crate::conf::{init_publisher, init_session_keys, init_store};
use crate::error::{AppError, AppResult};
use crate::middleware::{RateLimitConfig, RateLimiter};
use crate::relay::RelayHub;
use crate::state::AppState;

/// 限流记录与空闲频道的清理间隔
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// 访问日志只记录路径（`%U`），不含查询串：`/api/events?token=` 携带会话令牌
const ACCESS_LOG_FORMAT: &str = r#"%a "%{method}xi %U" %s %b %T"#;

fn access_logger() -> Logger {
    Logger::new(ACCESS_LOG_FORMAT).custom_request_replace("method", |req| req.method().to_string())
}

/// 各 worker 共享的应用上下文
#[derive(Clone)]
pub struct AppContext {
    pub state: web::Data<AppState>,
    pub keys: web::Data<SessionKeys>,
    pub limiter: web::Data<RateLimiter>,
}

impl AppContext {
    pub fn new(state: AppState, keys: SessionKeys, limiter: RateLimiter) -> Self {
        Self {
            state: web::Data::new(state),
            keys: web::Data::new(keys),
            limiter: web::Data::new(limiter),
        }
    }

    /// 按配置组装存储、中继、服务与限流器
    pub async fn from_config(config: &AppConfiguration, memory: bool) -> AppResult<Self> {
        let store = init_store(config, memory).await?;
        let hub = Arc::new(RelayHub::new());
        let publisher = init_publisher(config, hub.clone())?;
        let keys = init_session_keys(config)?;
        let state = AppState::new(config, store, hub, publisher, keys.clone());
        let limiter = RateLimiter::new(RateLimitConfig::from(config));
        Ok(Self::new(state, keys, limiter))
    }

    /// 定期清理过期限流记录和无订阅者的频道
    pub fn spawn_cleanup(&self) {
        let limiter = self.limiter.get_ref().clone();
        let hub = self.state.hub.clone();
        actix_web::rt::spawn(async move {
            let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                ticker.tick().await;
                let keys = limiter.cleanup_expired();
                let channels = hub.prune();
                debug!("定期清理: 限流记录 {} 个, 频道 {} 个", keys, channels);
            }
        });
    }
}

/// 把上下文、提取器配置与全局路由装配到 ServiceConfig
pub fn configure_app(cfg: &mut web::ServiceConfig, ctx: &AppContext) {
    cfg.app_data(ctx.state.clone())
        .app_data(ctx.keys.clone())
        .app_data(ctx.limiter.clone())
        .app_data(web::JsonConfig::default().error_handler(|err, _req| {
            AppError::validation("body", err.to_string()).into()
        }))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| {
            AppError::validation("query", err.to_string()).into()
        }))
        .app_data(web::PathConfig::default().error_handler(|err, _req| {
            AppError::validation("path", err.to_string()).into()
        }))
        .configure(configure_global_routes);
}

/// 应用启动器
pub struct AppBootstrap {
    config: AppConfiguration,
    memory: bool,
}

impl AppBootstrap {
    pub fn new(config: AppConfiguration) -> Self {
        Self {
            config,
            memory: false,
        }
    }

    /// 强制使用内存存储
    pub fn with_memory_store(mut self, memory: bool) -> Self {
        self.memory = memory;
        self
    }

    /// 运行应用服务器
    #[instrument(skip(self), fields(host = %self.config.server_host, port = self.config.server_port))]
    pub async fn run(self) -> AppResult<()> {
        crate::init_routes();
        get_global_route_registry().log_routes_info();

        let ctx = AppContext::from_config(&self.config, self.memory).await?;
        ctx.spawn_cleanup();

        let bind_addr = format!("{}:{}", self.config.server_host, self.config.server_port);
        info!("服务器将在 {} 上启动", bind_addr);

        let result = self.start_http_server(ctx, &bind_addr).await;
        match &result {
            Ok(()) => info!("服务器已停止"),
            Err(e) => error!("服务器启动失败: {}", e),
        }
        result
    }

    /// 启动HTTP服务器
    async fn start_http_server(&self, ctx: AppContext, bind_addr: &str) -> AppResult<()> {
        let mut server = HttpServer::new(move || {
            let ctx = ctx.clone();
            App::new()
                .wrap(access_logger())
                // 集成 Swagger UI 文档（使用通配路径以兼容静态资源与尾随斜杠）
                .service(SwaggerUi::new("/swagger-ui/{_:.*}").url(
                    "/api-doc/openapi.json",
                    crate::api::swagger::ApiDoc::openapi(),
                ))
                .configure(move |cfg| configure_app(cfg, &ctx))
        });
        if let Some(workers) = self.config.server_workers {
            server = server.workers(workers);
        }

        server
            .bind(bind_addr)
            .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?
            .run()
            .await
            .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;

        Ok(())
    }
}
