//! Health Vitals - 健康检查聚合引擎
//!
//! 把多个组件的健康探针聚合为一个系统状态，支持：
//! - 连续失败次数和持续失败时长两种抗抖动阈值
//! - 按需检查与周期检查
//! - 结果缓存、拦截器与中间件链
//! - 组件级和系统级状态监听器
//! - HTTP健康端点和命令行工具

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod web;

// 重新导出主要类型
pub use config::{build_checker, CheckConfig, Config, GlobalConfig, WebConfig};
pub use error::{HealthVitalsError, ProbeError, RegistrationError};
pub use health::{
    AvailabilityStatus, Check, CheckContext, CheckState, Checker, CheckerBuilder, CheckerResult,
    CheckerState, Schedule,
};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
