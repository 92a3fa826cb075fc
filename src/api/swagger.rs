use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::domain::MessageView;
use crate::modules::account::routes as account;
use crate::modules::base::routes as base;
use crate::modules::messages::routes as messages;
use crate::service::account::{SessionUser, SignInRequest, SignUpRequest};

/// Bearer 会话令牌
struct SessionSecurity;

impl Modify for SessionSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI 文档聚合
#[derive(OpenApi)]
#[openapi(
    paths(
        base::health,
        base::suggest_messages,
        messages::send_message,
        messages::get_messages,
        messages::delete_message,
        messages::get_accept_messages,
        messages::set_accept_messages,
        messages::events,
        account::sign_up,
        account::verify_code,
        account::check_username_unique,
        account::sign_in,
    ),
    components(
        schemas(
            MessageView,
            messages::SendMessageRequest,
            messages::SendMessageResponse,
            messages::MessagesResponse,
            messages::AcceptMessagesRequest,
            messages::AcceptMessagesResponse,
            account::VerifyCodeRequest,
            account::SignInResponse,
            SignUpRequest,
            SignInRequest,
            SessionUser,
            base::HealthResponse,
            base::SuggestionsResponse,
        )
    ),
    modifiers(&SessionSecurity),
    tags(
        (name = "Base", description = "健康检查与消息建议"),
        (name = "Messages", description = "匿名投递、收件箱、接收开关与推送"),
        (name = "Account", description = "注册、验证与登录")
    )
)]
pub struct ApiDoc;
