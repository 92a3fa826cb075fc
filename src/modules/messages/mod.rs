/// Messages 模块：匿名投递、收件箱、接收开关、SSE 推送
pub mod routes;

use crate::register_route;

/// 注册 messages 模块的路由
pub fn register_messages_routes() {
    register_route!(
        "messages",
        "匿名投递、收件箱与推送订阅",
        "messages",
        routes::configure
    );
}
