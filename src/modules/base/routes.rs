use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub store_healthy: bool,
    pub version: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuggestionsResponse {
    pub success: bool,
    pub suggestions: Vec<String>,
}

/// 存活检查，附带存储状态
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, body = HealthResponse),
        (status = 503, description = "存储不可用", body = HealthResponse)
    ),
    tag = "Base"
)]
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let store_healthy = match state.store.health().await {
        Ok(()) => true,
        Err(e) => {
            warn!("存储健康检查失败: {}", e);
            false
        }
    };

    let body = HealthResponse {
        status: if store_healthy { "ok" } else { "degraded" }.to_string(),
        store: state.store.backend().to_string(),
        store_healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    if store_healthy {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// AI 生成的三条消息建议
#[utoipa::path(
    post,
    path = "/api/suggest-messages",
    responses(
        (status = 200, body = SuggestionsResponse),
        (status = 500, description = "未配置 API key"),
        (status = 502, description = "上游服务错误")
    ),
    tag = "Base"
)]
#[post("/api/suggest-messages")]
pub async fn suggest_messages(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let suggestions = state.suggestions.suggest().await?;
    Ok(HttpResponse::Ok().json(SuggestionsResponse {
        success: true,
        suggestions,
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(suggest_messages);
}
