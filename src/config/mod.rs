//! 配置管理模块
//!
//! 提供配置文件解析、验证以及从配置构建检查器的功能

pub mod builder;
pub mod loader;
pub mod types;

// 重新导出主要类型
pub use builder::build_checker;
pub use loader::{get_default_config_path, ConfigLoader, TomlConfigLoader};
pub use types::{validate_config, CheckConfig, Config, GlobalConfig, WebConfig};
