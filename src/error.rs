//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use std::time::Duration;
use thiserror::Error;

/// Health Vitals 的主要错误类型
#[derive(Error, Debug)]
pub enum HealthVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 检查注册相关错误
    #[error("注册错误: {0}")]
    Registration(#[from] RegistrationError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 检查注册错误类型
///
/// 结构性的配置问题在构建 `Checker` 时立即报告，而不是推迟到运行期。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// 检查名称为空
    #[error("检查名称不能为空")]
    EmptyName,

    /// 检查名称重复
    #[error("检查名称重复: {name}")]
    DuplicateCheck { name: String },

    /// 连续失败阈值无效
    #[error("检查 {name} 的连续失败阈值必须大于0")]
    InvalidThreshold { name: String },

    /// 超时时间无效
    #[error("检查 {name} 的超时时间必须大于0")]
    InvalidTimeout { name: String },

    /// 检测间隔无效
    #[error("检查 {name} 的检测间隔必须大于0")]
    InvalidInterval { name: String },

    /// 全局超时时间无效
    #[error("全局超时时间必须大于0")]
    InvalidGlobalTimeout,

    /// 并发数无效
    #[error("最大并发检测数不能为0")]
    InvalidConcurrency,

    /// 当前线程没有 tokio 运行时
    #[error("启动周期检查需要 tokio 运行时")]
    NoRuntime,
}

/// 探针执行错误类型
///
/// 所有探针错误最终都会写入 `CheckState::error`，不会传播给查询调用方。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// 探针返回了错误
    #[error("{0}")]
    Failure(String),

    /// 探针执行超时
    #[error("检查超时 ({}ms)", .0.as_millis())]
    Timeout(Duration),

    /// 探针内部崩溃
    #[error("检查崩溃: {0}")]
    Crash(String),
}

impl ProbeError {
    /// 从 panic 负载构造崩溃错误
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        ProbeError::Crash(panic_message(payload.as_ref()))
    }
}

/// 状态监听器故障，仅记录日志，不会传播给调用方
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("状态监听器 {listener} 执行失败: {message}")]
pub struct ListenerFault {
    /// 监听器描述（组件名称或 system）
    pub listener: String,
    /// panic 信息
    pub message: String,
}

/// 从 panic 负载中提取可读的错误信息
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, HealthVitalsError>;
