/// Account 模块：注册、验证、登录
pub mod routes;

use crate::register_route;

/// 注册 account 模块的路由
pub fn register_account_routes() {
    register_route!("account", "注册、验证码与登录", "account", routes::configure);
}
