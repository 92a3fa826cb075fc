/// 模块管理
/// 包含所有业务模块的定义和导出
pub mod account;
pub mod base;
pub mod messages;

/// 注册所有模块的路由
pub fn register_all_routes() {
    base::register_base_routes();
    messages::register_messages_routes();
    account::register_account_routes();
}
