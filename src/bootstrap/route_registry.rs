use actix_web::web;
use lazy_static::lazy_static;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// 路由配置函数类型
pub type RouteConfigFn = fn(&mut web::ServiceConfig);

/// 路由信息结构
#[derive(Debug, Clone)]
pub struct RouteInfo {
    pub name: String,
    pub description: String,
    pub module: String,
    pub config_fn: RouteConfigFn,
}

/// 全局路由注册器；同名注册会覆盖，重复注册是幂等的
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: BTreeMap<String, RouteInfo>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册路由
    pub fn register_route(&mut self, route_info: RouteInfo) {
        self.routes.insert(route_info.name.clone(), route_info);
    }

    /// 配置所有路由到 ServiceConfig
    pub fn configure_all_routes(&self, cfg: &mut web::ServiceConfig) {
        for route_info in self.routes.values() {
            (route_info.config_fn)(cfg);
        }
    }

    /// 获取路由统计信息
    pub fn get_stats(&self) -> (usize, Vec<String>) {
        let modules: BTreeSet<String> = self.routes.values().map(|r| r.module.clone()).collect();
        (self.routes.len(), modules.into_iter().collect())
    }

    /// 打印路由信息
    pub fn log_routes_info(&self) {
        info!("路由注册信息:");
        for route in self.routes.values() {
            info!("  - [{}] {}: {}", route.module, route.name, route.description);
        }
        info!("总计: {} 个路由组", self.routes.len());
    }
}

// 全局路由注册器实例
lazy_static! {
    static ref GLOBAL_ROUTE_REGISTRY: RwLock<RouteRegistry> = RwLock::new(RouteRegistry::new());
}

/// 获取全局路由注册器的读锁
pub fn get_global_route_registry() -> RwLockReadGuard<'static, RouteRegistry> {
    GLOBAL_ROUTE_REGISTRY.read()
}

/// 获取全局路由注册器的写锁
pub fn get_global_route_registry_mut() -> RwLockWriteGuard<'static, RouteRegistry> {
    GLOBAL_ROUTE_REGISTRY.write()
}

/// 注册路由到全局注册器
pub fn register_global_route(route_info: RouteInfo) {
    get_global_route_registry_mut().register_route(route_info);
}

/// 配置所有全局路由
pub fn configure_global_routes(cfg: &mut web::ServiceConfig) {
    get_global_route_registry().configure_all_routes(cfg);
}

/// 便捷宏：注册路由
#[macro_export]
macro_rules! register_route {
    ($name:expr, $description:expr, $module:expr, $config_fn:expr) => {
        $crate::bootstrap::route_registry::register_global_route(
            $crate::bootstrap::route_registry::RouteInfo {
                name: $name.to_string(),
                description: $description.to_string(),
                module: $module.to_string(),
                config_fn: $config_fn,
            },
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut web::ServiceConfig) {}

    #[test]
    fn test_registration_is_idempotent() {
        let mut registry = RouteRegistry::new();
        for _ in 0..2 {
            registry.register_route(RouteInfo {
                name: "messages".into(),
                description: "d".into(),
                module: "messages".into(),
                config_fn: noop,
            });
        }
        registry.register_route(RouteInfo {
            name: "base".into(),
            description: "d".into(),
            module: "base".into(),
            config_fn: noop,
        });
        let (total, modules) = registry.get_stats();
        assert_eq!(total, 2);
        assert_eq!(modules, vec!["base".to_string(), "messages".to_string()]);
    }
}
