/// 通用模块：配置与日志
/// Common module: configuration and logging

pub mod config;
pub mod config_validator;
pub mod enhanced_config;
pub mod logging;

// 重新导出主要的公共接口
pub use config_validator::{AppConfiguration, PushMode};
pub use enhanced_config::EnhancedConfigManager;
