use actix_web::http::StatusCode;
use actix_web::{test, App};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use nymity::auth::{hash_password, SessionKeys};
use nymity::bootstrap::{configure_app, AppContext};
use nymity::client::{ClientError, DashboardSession, LocalTransport, LogNotifier, MessageApi};
use nymity::comm::AppConfiguration;
use nymity::domain::{MessageView, Registration, UserId, UserRecord};
use nymity::middleware::{RateLimitConfig, RateLimiter};
use nymity::relay::{Publisher, RelayHub};
use nymity::service::Inbox;
use nymity::state::AppState;
use nymity::store::{MemoryStore, MessageStore};

const PASSWORD: &str = "correct-horse";

struct Harness {
    ctx: AppContext,
    store: Arc<MemoryStore>,
    hub: Arc<RelayHub>,
    user: UserRecord,
}

async fn harness() -> Harness {
    nymity::init_routes();

    let config = AppConfiguration::default();
    let store = Arc::new(MemoryStore::new());
    let hub = Arc::new(RelayHub::new());
    let keys = SessionKeys::new("integration-test-secret-value", 3600).unwrap();

    let mut user = Registration {
        username: "alice".into(),
        email: "alice@example.com".into(),
        password_hash: hash_password(PASSWORD).unwrap(),
        verify_code: "123456".into(),
        verify_code_expires: chrono::Utc::now() + chrono::Duration::hours(1),
    }
    .into_new_user();
    user.is_verified = true;
    store.insert_user(&user).await.unwrap();

    let publisher: Arc<dyn Publisher> = hub.clone();
    let state = AppState::new(&config, store.clone(), hub.clone(), publisher, keys.clone());
    let limiter = RateLimiter::new(RateLimitConfig::from(&config));
    Harness {
        ctx: AppContext::new(state, keys, limiter),
        store,
        hub,
        user,
    }
}

fn send_req(ip: &str, content: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/send-message")
        .peer_addr(format!("{}:40000", ip).parse().unwrap())
        .set_json(json!({ "username": "alice", "content": content }))
}

#[actix_web::test]
async fn test_send_then_disable_acceptance() {
    let h = harness().await;
    let ctx = h.ctx.clone();
    let app = test::init_service(App::new().configure(move |cfg| configure_app(cfg, &ctx))).await;

    let resp = test::call_service(&app, send_req("10.0.0.1", "Hello").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/sign-in")
            .set_json(json!({ "identifier": "alice", "password": PASSWORD }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let token = body["token"].as_str().unwrap().to_string();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/accept-messages")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({ "acceptMessages": false }))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["isAcceptingMessages"], json!(false));

    let resp = test::call_service(&app, send_req("10.0.0.1", "Again").to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(h.store.message_count(h.user.id), 1);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/get-messages")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["messages"][0]["content"], json!("Hello"));
}

#[actix_web::test]
async fn test_sixth_send_from_same_address_is_limited() {
    let h = harness().await;
    let ctx = h.ctx.clone();
    let app = test::init_service(App::new().configure(move |cfg| configure_app(cfg, &ctx))).await;

    for i in 0..5 {
        let resp =
            test::call_service(&app, send_req("203.0.113.9", &format!("m{}", i)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let resp = test::call_service(&app, send_req("203.0.113.9", "m5").to_request()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("Retry-After"));

    // 其他地址不受影响
    let resp = test::call_service(&app, send_req("203.0.113.10", "other").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.store.message_count(h.user.id), 6);
}

#[actix_web::test]
async fn test_spoofed_forwarding_headers_share_the_peer_budget() {
    let h = harness().await;
    let ctx = h.ctx.clone();
    let app = test::init_service(App::new().configure(move |cfg| configure_app(cfg, &ctx))).await;

    for i in 0..6 {
        let req = send_req("198.51.100.7", &format!("m{}", i))
            .insert_header(("X-Forwarded-For", format!("192.0.2.{}", i)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        if i < 5 {
            assert_eq!(resp.status(), StatusCode::OK);
        } else {
            assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        }
    }
    assert_eq!(h.store.message_count(h.user.id), 5);
}

#[actix_web::test]
async fn test_delete_unknown_message_is_not_found() {
    let h = harness().await;
    let keys = h.ctx.keys.get_ref().clone();
    let token = keys.issue(&h.user).unwrap();
    let ctx = h.ctx.clone();
    let app = test::init_service(App::new().configure(move |cfg| configure_app(cfg, &ctx))).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/api/delete-message/{}", uuid::Uuid::new_v4()))
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri("/api/delete-message/not-a-uuid")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/get-messages").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

/// 直接调用收件箱服务的客户端实现
struct InProcessApi {
    inbox: Inbox,
    user: UserId,
}

fn to_client(e: nymity::AppError) -> ClientError {
    use actix_web::ResponseError;
    ClientError::Api {
        status: e.status_code().as_u16(),
        message: e.to_string(),
    }
}

#[async_trait]
impl MessageApi for InProcessApi {
    async fn fetch_messages(&self) -> Result<Vec<MessageView>, ClientError> {
        self.inbox.list(self.user).await.map_err(to_client)
    }

    async fn delete_message(&self, id: &str) -> Result<(), ClientError> {
        let id = id.parse().map_err(to_client)?;
        self.inbox.delete(self.user, id).await.map_err(to_client)
    }

    async fn get_accepting(&self) -> Result<bool, ClientError> {
        self.inbox.accepting(self.user).await.map_err(to_client)
    }

    async fn set_accepting(&self, accept: bool) -> Result<bool, ClientError> {
        self.inbox.set_accepting(self.user, accept).await.map_err(to_client)
    }
}

#[tokio::test]
async fn test_dashboard_sees_pushed_message_once() {
    let h = harness().await;
    let state = h.ctx.state.clone();
    let api = Arc::new(InProcessApi {
        inbox: state.inbox.clone(),
        user: h.user.id,
    });
    let session = DashboardSession::new(
        h.user.id.channel(),
        api,
        Arc::new(LocalTransport::new(h.hub.clone())),
        Arc::new(LogNotifier),
    );
    session.start().await.unwrap();
    assert!(session.messages().is_empty());

    let sent = state.ingestion.ingest("alice", "pushed hello").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.refresh().await.unwrap();

    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, sent.id);

    session.delete_message(&sent.id).await.unwrap();
    assert!(session.messages().is_empty());
    assert_eq!(h.store.message_count(h.user.id), 0);

    // 再删一次：服务端 404，本地保持删除
    assert!(session.delete_message(&sent.id).await.unwrap_err().is_not_found());
    assert!(session.messages().is_empty());
}
