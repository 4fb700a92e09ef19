//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// 主配置结构，包含全局配置、HTTP 端点配置和检查列表
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 健康端点配置
    #[serde(default)]
    pub web: WebConfig,
    /// 检查配置列表
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 全局检查超时时间（秒）
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// 结果缓存时长（毫秒），0 表示禁用缓存
    #[serde(default = "default_cache_duration")]
    pub cache_duration_ms: u64,
    /// 结果中是否包含各检查详情
    #[serde(default = "default_true")]
    pub details: bool,
    /// 错误信息最大长度（字符）
    #[serde(default = "default_max_error_message_length")]
    pub max_error_message_length: usize,
    /// 周期检查的最大并发数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_checks: usize,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 是否输出JSON格式日志
    #[serde(default)]
    pub log_json: bool,
    /// 全局请求头，检查自身的同名请求头优先
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            cache_duration_ms: default_cache_duration(),
            details: true,
            max_error_message_length: default_max_error_message_length(),
            max_concurrent_checks: default_max_concurrent(),
            log_level: default_log_level(),
            log_json: false,
            headers: HashMap::new(),
        }
    }
}

/// 健康端点配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebConfig {
    /// 绑定地址
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 健康端点路径
    #[serde(default = "default_path")]
    pub path: String,
    /// 系统正常时的HTTP状态码
    #[serde(default = "default_up_status_code")]
    pub up_status_code: u16,
    /// 系统异常时的HTTP状态码
    #[serde(default = "default_down_status_code")]
    pub down_status_code: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            path: default_path(),
            up_status_code: default_up_status_code(),
            down_status_code: default_down_status_code(),
        }
    }
}

/// 单个 HTTP 检查的配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckConfig {
    /// 检查名称
    pub name: String,
    /// 检查URL
    pub url: String,
    /// HTTP方法
    #[serde(default = "default_method")]
    pub method: String,
    /// 期望的状态码列表
    #[serde(default = "default_expected_status_codes")]
    pub expected_status_codes: Vec<u16>,
    /// 检查专属超时时间（秒），未设置时使用全局超时
    pub timeout_seconds: Option<u64>,
    /// 连续失败阈值
    #[serde(default = "default_max_contiguous_fails")]
    pub max_contiguous_fails: u32,
    /// 持续失败时长阈值（秒），0 表示禁用
    #[serde(default)]
    pub max_time_in_error_seconds: u64,
    /// 检测间隔（秒），设置后成为周期检查
    pub interval_seconds: Option<u64>,
    /// 周期检查首次执行前的延迟（秒）
    #[serde(default)]
    pub initial_delay_seconds: u64,
    /// 是否启用
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 检查描述
    pub description: Option<String>,
    /// 检查专属请求头
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 请求体（用于POST/PUT请求）
    pub body: Option<serde_json::Value>,
}

// 默认值函数
fn default_timeout() -> u64 {
    10
}

fn default_cache_duration() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_max_error_message_length() -> usize {
    500
}

fn default_max_concurrent() -> usize {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_path() -> String {
    "/health".to_string()
}

fn default_up_status_code() -> u16 {
    200
}

fn default_down_status_code() -> u16 {
    503
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_expected_status_codes() -> Vec<u16> {
    vec![200]
}

fn default_max_contiguous_fails() -> u32 {
    1
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.timeout_seconds == 0 {
        return Err("全局超时时间不能为0".to_string());
    }

    if config.global.max_concurrent_checks == 0 {
        return Err("最大并发检测数不能为0".to_string());
    }

    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    // 验证健康端点配置
    let web = &config.web;
    if web.port == 0 {
        return Err("健康端点端口不能为0".to_string());
    }

    if web.bind_address.is_empty() {
        return Err("健康端点绑定地址不能为空".to_string());
    }

    if !web.path.starts_with('/') {
        return Err(format!("健康端点路径必须以 / 开头: {}", web.path));
    }

    for code in [web.up_status_code, web.down_status_code] {
        if !(100..=599).contains(&code) {
            return Err(format!("健康端点状态码 {code} 无效"));
        }
    }

    // 验证检查配置
    if config.checks.is_empty() {
        return Err("至少需要配置一个检查".to_string());
    }

    let mut names = HashSet::new();
    for check in &config.checks {
        if check.name.trim().is_empty() {
            return Err("检查名称不能为空".to_string());
        }

        if !names.insert(check.name.as_str()) {
            return Err(format!("检查名称重复: {}", check.name));
        }

        if !check.url.starts_with("http://") && !check.url.starts_with("https://") {
            return Err(format!("检查 {} 的URL格式无效", check.name));
        }

        if check.expected_status_codes.is_empty() {
            return Err(format!("检查 {} 必须指定期望的状态码", check.name));
        }

        for &code in &check.expected_status_codes {
            if !(100..=599).contains(&code) {
                return Err(format!("检查 {} 的状态码 {} 无效", check.name, code));
            }
        }

        let valid_methods = ["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"];
        if !valid_methods.contains(&check.method.as_str()) {
            return Err(format!(
                "检查 {} 的HTTP方法 {} 无效，支持的方法: {:?}",
                check.name, check.method, valid_methods
            ));
        }

        if check.max_contiguous_fails == 0 {
            return Err(format!("检查 {} 的连续失败阈值不能为0", check.name));
        }

        if check.timeout_seconds == Some(0) {
            return Err(format!("检查 {} 的超时时间不能为0", check.name));
        }

        if check.interval_seconds == Some(0) {
            return Err(format!("检查 {} 的检测间隔不能为0", check.name));
        }
    }

    Ok(())
}
