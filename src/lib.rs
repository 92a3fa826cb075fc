pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod client;
pub mod comm;
pub mod conf;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod modules;
pub mod relay;
pub mod service;
pub mod state;
pub mod store;

/// 初始化所有模块的路由
pub fn init_routes() {
    modules::register_all_routes();
}

pub use bootstrap::{AppBootstrap, AppContext};
pub use error::{AppError, AppResult};
