use actix_web::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use actix_web::web::Bytes;
use actix_web::{delete, get, post, web, HttpResponse};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::auth::AuthSession;
use crate::comm::PushMode;
use crate::domain::{MessageId, MessageView};
use crate::error::{AppError, AppResult};
use crate::middleware::RateLimitMiddleware;
use crate::relay::PushEvent;
use crate::state::AppState;

/// SSE 心跳间隔
const KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub username: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message: MessageView,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessagesResponse {
    pub success: bool,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcceptMessagesRequest {
    pub accept_messages: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcceptMessagesResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub is_accepting_messages: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EventsQuery {
    /// 可选，必须等于当前用户的频道
    pub channel: Option<String>,
}

/// 匿名发送消息（限流）
#[utoipa::path(
    post,
    path = "/api/send-message",
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "消息已保存", body = SendMessageResponse),
        (status = 400, description = "内容不合法"),
        (status = 403, description = "接收者已关闭接收"),
        (status = 404, description = "接收者不存在"),
        (status = 429, description = "请求过于频繁")
    ),
    tag = "Messages"
)]
#[post("/api/send-message", wrap = "RateLimitMiddleware::shared()")]
#[instrument(skip(state, body), fields(username = %body.username))]
pub async fn send_message(
    state: web::Data<AppState>,
    body: web::Json<SendMessageRequest>,
) -> AppResult<HttpResponse> {
    let message = state.ingestion.ingest(&body.username, &body.content).await?;
    Ok(HttpResponse::Ok().json(SendMessageResponse {
        success: true,
        message,
    }))
}

/// 当前用户的消息（新消息在前）
#[utoipa::path(
    get,
    path = "/api/get-messages",
    responses(
        (status = 200, body = MessagesResponse),
        (status = 401, description = "未登录")
    ),
    security(("bearer" = [])),
    tag = "Messages"
)]
#[get("/api/get-messages")]
#[instrument(skip_all, fields(user_id = %session.user_id()))]
pub async fn get_messages(
    state: web::Data<AppState>,
    session: AuthSession,
) -> AppResult<HttpResponse> {
    let messages = state.inbox.list(session.user_id()).await?;
    Ok(HttpResponse::Ok().json(MessagesResponse {
        success: true,
        messages,
    }))
}

/// 删除一条消息
#[utoipa::path(
    delete,
    path = "/api/delete-message/{id}",
    params(("id" = String, Path, description = "消息 ID")),
    responses(
        (status = 200, description = "已删除"),
        (status = 400, description = "ID 格式错误"),
        (status = 401, description = "未登录"),
        (status = 404, description = "消息不存在")
    ),
    security(("bearer" = [])),
    tag = "Messages"
)]
#[delete("/api/delete-message/{id}")]
#[instrument(skip_all, fields(user_id = %session.user_id(), message_id = %path))]
pub async fn delete_message(
    state: web::Data<AppState>,
    session: AuthSession,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id: MessageId = path.parse()?;
    state.inbox.delete(session.user_id(), id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Message deleted",
    })))
}

/// 查询接收开关
#[utoipa::path(
    get,
    path = "/api/accept-messages",
    responses((status = 200, body = AcceptMessagesResponse), (status = 401)),
    security(("bearer" = [])),
    tag = "Messages"
)]
#[get("/api/accept-messages")]
pub async fn get_accept_messages(
    state: web::Data<AppState>,
    session: AuthSession,
) -> AppResult<HttpResponse> {
    let accepting = state.inbox.accepting(session.user_id()).await?;
    Ok(HttpResponse::Ok().json(AcceptMessagesResponse {
        success: true,
        message: None,
        is_accepting_messages: accepting,
    }))
}

/// 更新接收开关
#[utoipa::path(
    post,
    path = "/api/accept-messages",
    request_body = AcceptMessagesRequest,
    responses((status = 200, body = AcceptMessagesResponse), (status = 401)),
    security(("bearer" = [])),
    tag = "Messages"
)]
#[post("/api/accept-messages")]
#[instrument(skip_all, fields(user_id = %session.user_id(), accept = body.accept_messages))]
pub async fn set_accept_messages(
    state: web::Data<AppState>,
    session: AuthSession,
    body: web::Json<AcceptMessagesRequest>,
) -> AppResult<HttpResponse> {
    let accepting = state
        .inbox
        .set_accepting(session.user_id(), body.accept_messages)
        .await?;
    Ok(HttpResponse::Ok().json(AcceptMessagesResponse {
        success: true,
        message: Some(format!(
            "Message acceptance is now {}",
            if accepting { "ON" } else { "OFF" }
        )),
        is_accepting_messages: accepting,
    }))
}

/// SSE 帧
pub fn sse_frame(event: &PushEvent) -> String {
    format!("event: {}\ndata: {}\n\n", event.event, event.data)
}

/// 当前用户频道的 SSE 推送流
#[utoipa::path(
    get,
    path = "/api/events",
    params(EventsQuery),
    responses(
        (status = 200, description = "text/event-stream"),
        (status = 401, description = "未登录"),
        (status = 403, description = "只能订阅自己的频道"),
        (status = 404, description = "推送由外部中继投递时不提供本地事件流")
    ),
    security(("bearer" = [])),
    tag = "Messages"
)]
#[get("/api/events")]
pub async fn events(
    state: web::Data<AppState>,
    session: AuthSession,
    query: web::Query<EventsQuery>,
) -> AppResult<HttpResponse> {
    if state.push_mode == PushMode::Webhook {
        return Err(AppError::not_found("Local event stream"));
    }

    let channel = session.user_id().channel();
    if let Some(requested) = &query.channel {
        if *requested != channel {
            return Err(AppError::forbidden("Cannot subscribe to another user's channel"));
        }
    }

    let rx = state.hub.subscribe(&channel);
    info!(%channel, "SSE 订阅建立");

    let updates = stream::unfold(rx, |mut rx| async move {
        loop {
            match tokio::time::timeout(KEEP_ALIVE, rx.recv()).await {
                Ok(Ok(event)) => {
                    return Some((Ok::<_, actix_web::Error>(Bytes::from(sse_frame(&event))), rx));
                }
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!("SSE 订阅落后，跳过 {} 条事件", skipped);
                }
                Ok(Err(RecvError::Closed)) => return None,
                Err(_) => return Some((Ok(Bytes::from_static(b": keep-alive\n\n")), rx)),
            }
        }
    });
    let body = stream::once(async { Ok::<_, actix_web::Error>(Bytes::from_static(b": connected\n\n")) })
        .chain(updates);

    Ok(HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .streaming(body))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(send_message)
        .service(get_messages)
        .service(delete_message)
        .service(get_accept_messages)
        .service(set_accept_messages)
        .service(events);
}
