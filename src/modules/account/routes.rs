use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

use crate::error::AppResult;
use crate::service::account::{SessionUser, SignInRequest, SignUpRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyCodeRequest {
    pub username: String,
    pub code: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignInResponse {
    pub success: bool,
    pub token: String,
    pub user: SessionUser,
}

/// 注册并发送验证码
#[utoipa::path(
    post,
    path = "/api/sign-up",
    request_body = SignUpRequest,
    responses(
        (status = 200, description = "验证码已发送"),
        (status = 400, description = "用户名或邮箱已被占用")
    ),
    tag = "Account"
)]
#[post("/api/sign-up")]
pub async fn sign_up(
    state: web::Data<AppState>,
    body: web::Json<SignUpRequest>,
) -> AppResult<HttpResponse> {
    state.accounts.sign_up(&body).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Verification email sent successfully",
    })))
}

/// 校验验证码
#[utoipa::path(
    post,
    path = "/api/verify-code",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "账号已验证"),
        (status = 400, description = "验证码错误或已过期"),
        (status = 404, description = "用户不存在")
    ),
    tag = "Account"
)]
#[post("/api/verify-code")]
#[instrument(skip_all, fields(username = %body.username))]
pub async fn verify_code(
    state: web::Data<AppState>,
    body: web::Json<VerifyCodeRequest>,
) -> AppResult<HttpResponse> {
    state.accounts.verify_code(&body.username, &body.code).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Account verified successfully",
    })))
}

/// 用户名是否可用
#[utoipa::path(
    get,
    path = "/api/check-username-unique",
    params(UsernameQuery),
    responses(
        (status = 200, description = "可用"),
        (status = 400, description = "格式错误或已被占用")
    ),
    tag = "Account"
)]
#[get("/api/check-username-unique")]
pub async fn check_username_unique(
    state: web::Data<AppState>,
    query: web::Query<UsernameQuery>,
) -> AppResult<HttpResponse> {
    state.accounts.check_username(&query.username).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Username is unique",
    })))
}

/// 登录并签发会话令牌
#[utoipa::path(
    post,
    path = "/api/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, body = SignInResponse),
        (status = 401, description = "用户不存在、未验证或口令错误")
    ),
    tag = "Account"
)]
#[post("/api/sign-in")]
pub async fn sign_in(
    state: web::Data<AppState>,
    body: web::Json<SignInRequest>,
) -> AppResult<HttpResponse> {
    let signed_in = state.accounts.sign_in(&body).await?;
    Ok(HttpResponse::Ok().json(SignInResponse {
        success: true,
        token: signed_in.token,
        user: signed_in.user,
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(sign_up)
        .service(verify_code)
        .service(check_username_unique)
        .service(sign_in);
}
