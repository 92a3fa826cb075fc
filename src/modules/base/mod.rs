/// Base 模块
/// 健康检查与消息建议

pub mod routes;

use crate::register_route;

/// 注册base模块的路由
pub fn register_base_routes() {
    register_route!("base", "健康检查与消息建议", "base", routes::configure);
}
