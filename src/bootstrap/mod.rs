/// 启动相关：命令行、路由注册、服务器装配
pub mod app_bootstrap;
pub mod command_registry;
pub mod route_registry;

pub use app_bootstrap::{configure_app, AppBootstrap, AppContext};
pub use command_registry::{build_app, handle_version_command, ServerOverrides};
pub use route_registry::configure_global_routes;
