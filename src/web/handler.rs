//! 健康端点处理函数
//!
//! 每个请求执行一次健康查询，把系统状态映射为HTTP状态码并写出结果

use crate::config::WebConfig;
use crate::error::{ConfigError, Result};
use crate::health::{Checker, CheckerResult};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// 把查询结果写成HTTP响应
pub trait ResultWriter: Send + Sync {
    /// 写出响应
    ///
    /// # 参数
    /// * `result` - 聚合结果
    /// * `status_code` - 根据系统状态选定的HTTP状态码
    fn write(&self, result: &CheckerResult, status_code: StatusCode) -> Response;
}

/// JSON格式的结果写出器
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResultWriter;

impl ResultWriter for JsonResultWriter {
    fn write(&self, result: &CheckerResult, status_code: StatusCode) -> Response {
        match serde_json::to_vec(result) {
            Ok(body) => (
                status_code,
                [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                error!("健康检查结果序列化失败: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "健康检查结果序列化失败").into_response()
            }
        }
    }
}

/// 健康端点处理器
#[derive(Clone)]
pub struct HealthHandler {
    checker: Checker,
    up_status_code: StatusCode,
    down_status_code: StatusCode,
    writer: Arc<dyn ResultWriter>,
}

impl HealthHandler {
    /// 创建处理器，默认正常返回 200、异常返回 503
    pub fn new(checker: Checker) -> Self {
        Self {
            checker,
            up_status_code: StatusCode::OK,
            down_status_code: StatusCode::SERVICE_UNAVAILABLE,
            writer: Arc::new(JsonResultWriter),
        }
    }

    /// 按健康端点配置创建处理器
    pub fn from_config(checker: Checker, config: &WebConfig) -> Result<Self> {
        let up = parse_status_code(config.up_status_code)?;
        let down = parse_status_code(config.down_status_code)?;
        Ok(Self::new(checker).with_status_codes(up, down))
    }

    /// 设置正常与异常时的HTTP状态码
    pub fn with_status_codes(mut self, up: StatusCode, down: StatusCode) -> Self {
        self.up_status_code = up;
        self.down_status_code = down;
        self
    }

    /// 设置结果写出器
    pub fn with_result_writer(mut self, writer: Arc<dyn ResultWriter>) -> Self {
        self.writer = writer;
        self
    }

    /// 执行一次健康查询并生成响应
    pub async fn handle(&self) -> Response {
        let result = self.checker.check().await;
        let status_code = if result.status.is_down() {
            self.down_status_code
        } else {
            self.up_status_code
        };

        debug!("健康端点响应: {} ({})", result.status, status_code);
        self.writer.write(&result, status_code)
    }
}

impl std::fmt::Debug for HealthHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthHandler")
            .field("checker", &self.checker)
            .field("up_status_code", &self.up_status_code)
            .field("down_status_code", &self.down_status_code)
            .finish()
    }
}

fn parse_status_code(code: u16) -> Result<StatusCode> {
    StatusCode::from_u16(code)
        .map_err(|_| ConfigError::ValidationError(format!("无效的HTTP状态码: {code}")).into())
}

/// axum 处理函数
pub async fn health_endpoint(State(handler): State<HealthHandler>) -> Response {
    handler.handle().await
}

/// 创建挂载健康端点的路由
pub fn health_router(handler: HealthHandler, path: &str) -> Router {
    Router::new()
        .route(path, get(health_endpoint))
        .with_state(handler)
        .layer(TraceLayer::new_for_http())
}
